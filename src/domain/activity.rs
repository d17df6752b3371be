// Activity report domain model
use chrono::NaiveDateTime;
use serde::Serialize;

/// Result of one analysis pass over a window of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityReport {
    pub sampling_interval_ms: u64,
    pub window_duration_ms: u64,
    pub step_count_delta: u32,
    pub step_count_total: u32,
    pub calorie_increment: f64,
    pub calorie_total: f64,
    pub created_at: NaiveDateTime,
}
