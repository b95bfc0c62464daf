use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single watering of one tree. Read-only to the balance pipeline, which
/// aggregates these per tree per day.
///
/// Older exports spelled the volume field `litres`; both spellings are
/// accepted at the ingestion boundary and stored canonically as `liters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrigationEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tree_id: String,
    pub date: DateTime<Utc>,
    #[serde(alias = "litres")]
    pub liters: f64,
}
