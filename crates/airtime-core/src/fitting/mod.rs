//! Personalized curve fitting.
//!
//! This module turns an operator's archived sessions into a personalized
//! calibration curve by measuring how their actual durations compare with the
//! reference chart.

mod fitter;

pub use fitter::{median, ConsumptionFitter, CurveFit, FitOutcome};
