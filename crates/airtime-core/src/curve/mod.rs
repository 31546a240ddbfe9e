//! Pressure to time models.
//!
//! Two pieces live here: the affine [`CalibrationCurve`] that produces the
//! remaining-time estimate shown for a session, and the fixed
//! [`ReferenceTable`] that personalization measures an operator against.

mod calibration;
mod reference;

pub use calibration::{Anchor, CalibrationCurve, Coefficients};
pub use reference::ReferenceTable;

/// Pressure in bar.
pub type Pressure = i32;

/// Curve identifier assigned by the store.
pub type CurveId = i64;
