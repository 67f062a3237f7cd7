use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finished result of one scan: the open ports plus enough context to
/// render it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub total_ports: usize,
    /// Strictly ascending, no duplicates.
    pub open_ports: Vec<u16>,
    pub concurrency: usize,
    pub timeout_ms: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ScanReport {
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}
