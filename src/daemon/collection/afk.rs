use std::time::Duration;

pub struct AfkEvaluator {
    threshold: Duration,
}

impl AfkEvaluator {
    pub fn from_seconds(threshold_s: u64) -> Self {
        Self {
            threshold: Duration::from_secs(threshold_s),
        }
    }

    pub fn is_afk(&self, idle_time: Duration) -> bool {
        self.threshold < idle_time
    }
}
