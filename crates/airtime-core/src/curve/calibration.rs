//! Calibration curve: clamped affine pressure -> minutes.

use serde::{Deserialize, Serialize};

use super::{CurveId, Pressure};
use crate::operator::OperatorId;

/// A known (pressure, minutes) point used to solve a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub pressure: Pressure,
    pub minutes: f64,
}

impl Anchor {
    pub fn new(pressure: Pressure, minutes: f64) -> Self {
        Self { pressure, minutes }
    }
}

/// Slope/intercept pair of an affine curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    /// Minutes per bar
    pub slope: f64,
    /// Minutes at 0 bar
    pub intercept: f64,
}

impl Coefficients {
    /// Solve the line through two anchors.
    ///
    /// `slope = (t_hi - t_lo) / (p_hi - p_lo)`, `intercept = t_lo - slope * p_lo`.
    /// Callers guarantee the pressures differ.
    pub fn through(high: Anchor, low: Anchor) -> Self {
        let slope = (high.minutes - low.minutes) / f64::from(high.pressure - low.pressure);
        let intercept = low.minutes - slope * f64::from(low.pressure);
        Self { slope, intercept }
    }
}

/// Affine model from cylinder pressure to remaining minutes.
///
/// Inputs outside `[min_pressure, max_pressure]` are clamped to the nearest
/// bound, so [`evaluate`](Self::evaluate) is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurve {
    pub id: Option<CurveId>,
    pub name: String,
    pub description: String,
    pub slope: f64,
    pub intercept: f64,
    pub max_pressure: Pressure,
    pub min_pressure: Pressure,
    pub is_default: bool,
    /// Owning operator; `None` only for the system-wide default.
    pub operator_id: Option<OperatorId>,
}

impl CalibrationCurve {
    /// Build the system default curve from its two anchors.
    pub fn default_from_anchors(high: Anchor, low: Anchor) -> Self {
        let coefficients = Coefficients::through(high, low);
        Self {
            id: None,
            name: "Standard Linear Model".to_string(),
            description: format!(
                "Linear model from {}min@{}bar to {}min@{}bar",
                high.minutes, high.pressure, low.minutes, low.pressure
            ),
            slope: coefficients.slope,
            intercept: coefficients.intercept,
            max_pressure: high.pressure,
            min_pressure: low.pressure,
            is_default: true,
            operator_id: None,
        }
    }

    /// The 38min@300bar / 17min@150bar standard curve.
    pub fn standard() -> Self {
        Self::default_from_anchors(Anchor::new(300, 38.0), Anchor::new(150, 17.0))
    }

    /// A curve owned by one operator.
    pub fn personalized(
        operator_id: OperatorId,
        name: String,
        description: String,
        coefficients: Coefficients,
        min_pressure: Pressure,
        max_pressure: Pressure,
    ) -> Self {
        Self {
            id: None,
            name,
            description,
            slope: coefficients.slope,
            intercept: coefficients.intercept,
            max_pressure,
            min_pressure,
            is_default: false,
            operator_id: Some(operator_id),
        }
    }

    pub fn coefficients(&self) -> Coefficients {
        Coefficients {
            slope: self.slope,
            intercept: self.intercept,
        }
    }

    pub fn clamp(&self, pressure: Pressure) -> Pressure {
        pressure.clamp(self.min_pressure, self.max_pressure)
    }

    /// Estimated minutes remaining at `pressure`, rounded half-to-even.
    pub fn evaluate(&self, pressure: Pressure) -> i32 {
        let p = f64::from(self.clamp(pressure));
        (self.slope * p + self.intercept).round_ties_even() as i32
    }

    /// True once a reading has reached the bottom of the working range.
    pub fn is_exhausted(&self, pressure: Pressure) -> bool {
        pressure <= self.min_pressure
    }

    /// Average consumption over the working range in bar per minute.
    ///
    /// `None` when the rounded estimates at both bounds coincide.
    pub fn consumption_rate(&self) -> Option<f64> {
        let minutes = self.evaluate(self.max_pressure) - self.evaluate(self.min_pressure);
        if minutes == 0 {
            return None;
        }
        Some(f64::from(self.max_pressure - self.min_pressure) / f64::from(minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_curve_hits_both_anchors() {
        let curve = CalibrationCurve::standard();
        assert_eq!(curve.evaluate(300), 38);
        assert_eq!(curve.evaluate(150), 17);
        assert!(curve.is_default);
        assert!(curve.operator_id.is_none());
    }

    #[test]
    fn standard_curve_interior_points() {
        let curve = CalibrationCurve::standard();
        // 0.14 min/bar, -4 min intercept
        assert_eq!(curve.evaluate(200), 24);
        assert_eq!(curve.evaluate(260), 32);
        assert_eq!(curve.evaluate(290), 37);
    }

    #[test]
    fn evaluate_clamps_instead_of_extrapolating() {
        let curve = CalibrationCurve::standard();
        assert_eq!(curve.evaluate(400), 38);
        assert_eq!(curve.evaluate(0), 17);
        assert_eq!(curve.evaluate(-20), 17);
    }

    #[test]
    fn coefficients_through_anchors() {
        let c = Coefficients::through(Anchor::new(300, 42.0), Anchor::new(150, 18.0));
        assert!((c.slope - 0.16).abs() < 1e-12);
        assert!((c.intercept - -6.0).abs() < 1e-9);
    }

    #[test]
    fn consumption_rate_of_standard_curve() {
        let rate = CalibrationCurve::standard().consumption_rate().unwrap();
        // 150 bar over 21 minutes
        assert!((rate - 150.0 / 21.0).abs() < 1e-12);
    }

    #[test]
    fn flat_curve_has_no_consumption_rate() {
        let mut curve = CalibrationCurve::standard();
        curve.slope = 0.0;
        curve.intercept = 20.0;
        assert!(curve.consumption_rate().is_none());
    }

    #[test]
    fn exhausted_at_or_below_min_pressure() {
        let curve = CalibrationCurve::standard();
        assert!(curve.is_exhausted(150));
        assert!(curve.is_exhausted(120));
        assert!(!curve.is_exhausted(151));
    }

    proptest! {
        #[test]
        fn evaluate_saturates_above_max(p in 300i32..10_000) {
            let curve = CalibrationCurve::standard();
            prop_assert_eq!(curve.evaluate(p), curve.evaluate(curve.max_pressure));
        }

        #[test]
        fn evaluate_saturates_below_min(p in -10_000i32..=150) {
            let curve = CalibrationCurve::standard();
            prop_assert_eq!(curve.evaluate(p), curve.evaluate(curve.min_pressure));
        }

        #[test]
        fn evaluate_is_monotone_for_positive_slope(a in 0i32..400, b in 0i32..400) {
            let curve = CalibrationCurve::standard();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(curve.evaluate(lo) <= curve.evaluate(hi));
        }
    }
}
