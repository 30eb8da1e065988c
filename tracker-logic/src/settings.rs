use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Tunables for a [crate::LocationTracker]
pub struct TrackerSettings {
    /// Max number of readings kept in the session history, 0 keeps everything
    pub history_limit: usize,
}

impl TrackerSettings {
    pub(crate) fn truncate<T>(&self, history: &mut Vec<T>) {
        if self.history_limit != 0 {
            history.truncate(self.history_limit);
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self { history_limit: 100 }
    }
}
