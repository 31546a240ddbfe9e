//! Curve verification report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Engine;
use crate::curve::{CalibrationCurve, CurveId, Pressure};
use crate::error::Result;
use crate::operator::OperatorId;
use crate::storage::Store;

/// Pressures every curve is sampled at.
pub const REPORT_PRESSURES: [Pressure; 3] = [300, 200, 150];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveReport {
    pub curve_id: Option<CurveId>,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub operator_id: Option<OperatorId>,
    /// "first last" of the owning operator
    pub operator_name: Option<String>,
    pub estimates: BTreeMap<Pressure, i32>,
    /// Bar per minute across the working range
    pub consumption_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub total: usize,
    pub curves: Vec<CurveReport>,
}

impl CurveReport {
    fn new(curve: &CalibrationCurve, operator_name: Option<String>) -> Self {
        Self {
            curve_id: curve.id,
            name: curve.name.clone(),
            description: curve.description.clone(),
            is_default: curve.is_default,
            operator_id: curve.operator_id,
            operator_name,
            estimates: REPORT_PRESSURES
                .iter()
                .map(|&p| (p, curve.evaluate(p)))
                .collect(),
            consumption_rate: curve.consumption_rate(),
        }
    }
}

impl<S: Store> Engine<S> {
    /// Sample every stored curve at [`REPORT_PRESSURES`].
    pub fn model_report(&self) -> Result<ModelReport> {
        self.with_store(|store| {
            let curves = store
                .list_curves()?
                .iter()
                .map(|curve| {
                    let owner = match curve.operator_id {
                        Some(id) => store.get_operator(id)?.map(|o| o.display_name()),
                        None => None,
                    };
                    Ok(CurveReport::new(curve, owner))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ModelReport {
                total: curves.len(),
                curves,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ModelConfig};

    #[test]
    fn default_curve_report() {
        let engine = Engine::new(MemoryStore::new(), &ModelConfig::default()).unwrap();
        let report = engine.model_report().unwrap();
        assert_eq!(report.total, 1);

        let curve = &report.curves[0];
        assert!(curve.is_default);
        assert!(curve.operator_name.is_none());
        assert_eq!(curve.estimates[&300], 38);
        assert_eq!(curve.estimates[&200], 24);
        assert_eq!(curve.estimates[&150], 17);
        let rate = curve.consumption_rate.unwrap();
        assert!((rate - 150.0 / 21.0).abs() < 1e-9);
    }
}
