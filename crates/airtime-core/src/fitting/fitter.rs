//! Consumption fitter.
//!
//! For every archived session with a non-zero duration the fitter computes a
//! consumption ratio, `actual / expected(initial_pressure)`. The median ratio
//! scales both ends of the reference chart and the scaled anchors are solved
//! into a new slope/intercept pair. The median keeps a single aborted entry or
//! equipment fault from dragging the curve.

use serde::{Deserialize, Serialize};

use crate::curve::{Anchor, CalibrationCurve, Coefficients, ReferenceTable};
use crate::error::{CoreError, Result};
use crate::operator::Operator;
use crate::session::HistoricalRecord;
use crate::storage::ModelConfig;

/// Median with even-length sets averaging the two middle values.
///
/// Returns `None` for an empty slice.
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut values = samples.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// A successful personalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub slope: f64,
    pub intercept: f64,
    /// Median consumption ratio (> 1.0 means the operator lasts longer than charted)
    pub ratio: f64,
    /// Records that contributed a ratio
    pub points: usize,
}

impl CurveFit {
    pub fn coefficients(&self) -> Coefficients {
        Coefficients {
            slope: self.slope,
            intercept: self.intercept,
        }
    }

    pub fn description(&self) -> String {
        format!(
            "Personalized model based on {} points (consumption ratio={:.2})",
            self.points, self.ratio
        )
    }
}

/// Result of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitOutcome {
    Personalized(CurveFit),
    /// Not enough qualifying history; `fallback` is the default curve's pair.
    InsufficientData {
        qualifying: usize,
        required: usize,
        fallback: Coefficients,
    },
}

impl FitOutcome {
    /// Coefficients this outcome resolves to.
    pub fn coefficients(&self) -> Coefficients {
        match self {
            FitOutcome::Personalized(fit) => fit.coefficients(),
            FitOutcome::InsufficientData { fallback, .. } => *fallback,
        }
    }

    pub fn is_personalized(&self) -> bool {
        matches!(self, FitOutcome::Personalized(_))
    }
}

/// Fits personalized curves against a reference chart.
#[derive(Debug, Clone)]
pub struct ConsumptionFitter {
    /// Minimum qualifying records before personalization activates
    pub min_entries: usize,
    reference: ReferenceTable,
    fallback: Coefficients,
}

impl ConsumptionFitter {
    pub fn new(min_entries: usize, reference: ReferenceTable, fallback: Coefficients) -> Self {
        Self {
            min_entries,
            reference,
            fallback,
        }
    }

    /// Fitter over the standard chart falling back to `default_curve`.
    pub fn from_config(model: &ModelConfig, default_curve: &CalibrationCurve) -> Self {
        Self::new(
            model.min_entries,
            ReferenceTable::standard(),
            default_curve.coefficients(),
        )
    }

    pub fn reference(&self) -> &ReferenceTable {
        &self.reference
    }

    pub fn fallback(&self) -> Coefficients {
        self.fallback
    }

    /// Consumption ratios of every record that carries a duration.
    pub fn ratios(&self, history: &[HistoricalRecord]) -> Vec<f64> {
        history
            .iter()
            .filter(|r| r.has_signal())
            .map(|r| r.duration as f64 / self.reference.expected_duration(r.initial_pressure))
            .collect()
    }

    /// Fit a curve to `history`.
    ///
    /// # Errors
    /// Returns [`CoreError::FitComputation`] when the median ratio is not a
    /// positive finite number, or the reference table cannot anchor a line.
    pub fn fit(&self, history: &[HistoricalRecord]) -> Result<FitOutcome> {
        let ratios = self.ratios(history);
        let required = self.min_entries.max(1);
        let insufficient = FitOutcome::InsufficientData {
            qualifying: ratios.len(),
            required,
            fallback: self.fallback,
        };
        if ratios.len() < required {
            return Ok(insufficient);
        }
        let Some(ratio) = median(&ratios) else {
            return Ok(insufficient);
        };
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CoreError::FitComputation(format!(
                "median consumption ratio {ratio} over {} records",
                ratios.len()
            )));
        }

        let (p_hi, p_lo) = (self.reference.max_pressure(), self.reference.min_pressure());
        if p_hi <= p_lo {
            return Err(CoreError::FitComputation(format!(
                "reference table spans a single pressure ({p_lo} bar)"
            )));
        }
        let high = Anchor::new(p_hi, self.reference.expected_duration(p_hi) * ratio);
        let low = Anchor::new(p_lo, self.reference.expected_duration(p_lo) * ratio);
        let coefficients = Coefficients::through(high, low);
        if !coefficients.slope.is_finite() || !coefficients.intercept.is_finite() {
            return Err(CoreError::FitComputation(format!(
                "non-finite coefficients (slope={}, intercept={})",
                coefficients.slope, coefficients.intercept
            )));
        }

        Ok(FitOutcome::Personalized(CurveFit {
            slope: coefficients.slope,
            intercept: coefficients.intercept,
            ratio,
            points: ratios.len(),
        }))
    }

    /// Persistable curve for `operator` from a successful fit.
    pub fn curve_for(&self, operator: &Operator, fit: &CurveFit) -> Option<CalibrationCurve> {
        let operator_id = operator.id?;
        Some(CalibrationCurve::personalized(
            operator_id,
            format!("Custom Model - {}", operator.display_name()),
            fit.description(),
            fit.coefficients(),
            self.reference.min_pressure(),
            self.reference.max_pressure(),
        ))
    }
}
