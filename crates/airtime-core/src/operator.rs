//! Operators: the people whose air consumption is modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::curve::CurveId;

/// Operator identifier assigned by the store.
pub type OperatorId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: Option<OperatorId>,
    pub badge_number: String,
    pub first_name: String,
    pub last_name: String,
    /// Only active operators take part in refresh passes.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    /// Personalized curve, if one has been fitted.
    pub custom_curve_id: Option<CurveId>,
}

impl Operator {
    pub fn new(badge_number: &str, first_name: &str, last_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            badge_number: badge_number.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            active: true,
            created_at: now,
            custom_curve_id: None,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
