use chrono::{DateTime, NaiveDate, Utc};

/// Per-farm counter of live provider calls. One row per farm; rollover is
/// implicit because a counter carrying yesterday's date no longer gates.
#[derive(Debug, Clone)]
pub struct QuotaCounter {
    pub count: u32,
    pub date: NaiveDate,
    pub last_success: Option<DateTime<Utc>>,
}

impl QuotaCounter {
    /// Quota exhaustion only applies while the counter is for today's date.
    pub fn allows_live_call(&self, today: NaiveDate, daily_cap: u32) -> bool {
        self.date != today || self.count < daily_cap
    }
}
