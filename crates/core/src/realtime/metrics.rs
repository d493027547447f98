use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Timings of the most recent successful update or tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub config_update_time: Duration,
    pub route_recalculation_time: Duration,
    pub filtering_update_time: Duration,
    pub total_update_time: Duration,
    pub vehicles_reprocessed: usize,
    pub last_update_timestamp: Option<DateTime<Utc>>,
}
