//! Reference pressure/duration chart.
//!
//! The chart is the "expected" baseline: what an average wearer gets out of a
//! cylinder filled to a given pressure. Between charted points the duration is
//! interpolated linearly; outside the chart it is clamped to the nearest end.

use serde::Serialize;

use super::Pressure;
use crate::error::{Result, ValidationError};

/// Standard chart, ascending by pressure.
const STANDARD_CHART: [(Pressure, f64); 16] = [
    (150, 17.0),
    (160, 19.0),
    (170, 20.0),
    (180, 22.0),
    (190, 23.0),
    (200, 25.0),
    (210, 27.0),
    (220, 28.0),
    (230, 29.0),
    (240, 30.0),
    (250, 31.0),
    (260, 32.0),
    (270, 34.0),
    (280, 35.0),
    (290, 37.0),
    (300, 38.0),
];

/// Immutable lookup with piecewise-linear interpolation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceTable {
    points: Vec<(Pressure, f64)>,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ReferenceTable {
    pub fn standard() -> Self {
        Self {
            points: STANDARD_CHART.to_vec(),
        }
    }

    /// Build a table from points sorted by strictly increasing pressure.
    ///
    /// # Errors
    /// Returns a validation error for an empty or unsorted point list.
    pub fn new(points: Vec<(Pressure, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(ValidationError::EmptyCollection("reference points".into()).into());
        }
        if let Some(index) = points.windows(2).position(|w| w[0].0 >= w[1].0) {
            return Err(ValidationError::NotIncreasing {
                collection: "reference points".into(),
                index: index + 1,
            }
            .into());
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(Pressure, f64)] {
        &self.points
    }

    pub fn min_pressure(&self) -> Pressure {
        self.points[0].0
    }

    pub fn max_pressure(&self) -> Pressure {
        self.points[self.points.len() - 1].0
    }

    /// Charted duration at exactly `pressure`, if charted.
    pub fn charted(&self, pressure: Pressure) -> Option<f64> {
        self.points
            .binary_search_by_key(&pressure, |&(p, _)| p)
            .ok()
            .map(|i| self.points[i].1)
    }

    /// Expected minutes for a cylinder at `pressure`. Not rounded.
    pub fn expected_duration(&self, pressure: Pressure) -> f64 {
        match self.points.binary_search_by_key(&pressure, |&(p, _)| p) {
            Ok(i) => self.points[i].1,
            Err(0) => self.points[0].1,
            Err(i) if i == self.points.len() => self.points[i - 1].1,
            Err(i) => {
                let (p1, t1) = self.points[i - 1];
                let (p2, t2) = self.points[i];
                t1 + (t2 - t1) * f64::from(pressure - p1) / f64::from(p2 - p1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exact_points_return_charted_value() {
        let table = ReferenceTable::standard();
        assert_eq!(table.expected_duration(300), 38.0);
        assert_eq!(table.expected_duration(150), 17.0);
        assert_eq!(table.expected_duration(200), 25.0);
        assert_eq!(table.charted(270), Some(34.0));
        assert_eq!(table.charted(275), None);
    }

    #[test]
    fn interpolates_between_points() {
        let table = ReferenceTable::standard();
        assert!((table.expected_duration(295) - 37.5).abs() < 1e-12);
        assert!((table.expected_duration(155) - 18.0).abs() < 1e-12);
        // 200 -> 25, 210 -> 27
        assert!((table.expected_duration(203) - 25.6).abs() < 1e-12);
    }

    #[test]
    fn clamps_outside_the_chart() {
        let table = ReferenceTable::standard();
        assert_eq!(table.expected_duration(320), 38.0);
        assert_eq!(table.expected_duration(100), 17.0);
        assert_eq!(table.expected_duration(-5), 17.0);
    }

    #[test]
    fn bounds_match_chart_ends() {
        let table = ReferenceTable::standard();
        assert_eq!(table.min_pressure(), 150);
        assert_eq!(table.max_pressure(), 300);
        assert_eq!(table.points().len(), 16);
    }

    #[test]
    fn new_rejects_unsorted_points() {
        let err = ReferenceTable::new(vec![(100, 10.0), (100, 11.0)]).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
        assert!(ReferenceTable::new(Vec::new()).is_err());
    }

    #[test]
    fn custom_table_single_point_is_constant() {
        let table = ReferenceTable::new(vec![(200, 20.0)]).unwrap();
        assert_eq!(table.expected_duration(50), 20.0);
        assert_eq!(table.expected_duration(500), 20.0);
    }

    proptest! {
        #[test]
        fn expected_duration_is_non_decreasing(a in 0i32..400, b in 0i32..400) {
            let table = ReferenceTable::standard();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(table.expected_duration(lo) <= table.expected_duration(hi));
        }

        #[test]
        fn expected_duration_stays_within_chart_range(p in -1000i32..1000) {
            let d = ReferenceTable::standard().expected_duration(p);
            prop_assert!((17.0..=38.0).contains(&d));
        }
    }
}
