//! # Airtime Core Library
//!
//! This library provides the consumption modelling engine behind the airtime
//! breathing-apparatus board. It estimates the minutes left in a cylinder from
//! its pressure and personalizes that estimate per operator from their
//! completed sessions. A standalone CLI binary exposes every operation.
//!
//! ## Architecture
//!
//! - **Curves**: a clamped affine pressure -> minutes model plus the fixed
//!   reference chart operators are measured against
//! - **Fitting**: median consumption ratio over an operator's history, used to
//!   scale the chart into a personalized curve
//! - **Sessions**: active -> completed lifecycle; completion archives exactly
//!   one historical record
//! - **Engine**: store ownership, curve resolution, refresh passes and the
//!   periodic refresh loop
//! - **Storage**: SQLite (or in-memory) persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: session lifecycle and refresh passes
//! - [`CalibrationCurve`]: the estimate function
//! - [`ConsumptionFitter`]: personalization
//! - [`Database`]: persistent [`Store`] implementation
//! - [`Config`]: application configuration management

pub mod curve;
pub mod engine;
pub mod error;
pub mod fitting;
pub mod operator;
pub mod seed;
pub mod session;
pub mod storage;

pub use curve::{Anchor, CalibrationCurve, Coefficients, CurveId, Pressure, ReferenceTable};
pub use engine::{
    Engine, ModelReport, Prediction, RefreshOutcome, RefreshReport, RefreshScheduler,
    SessionUpdate,
};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use fitting::{ConsumptionFitter, CurveFit, FitOutcome};
pub use operator::{Operator, OperatorId};
pub use session::{
    ActiveSession, HistoricalRecord, MetadataPatch, RecordId, SessionId, SessionState,
};
pub use storage::{Config, Database, MemoryStore, Store};
