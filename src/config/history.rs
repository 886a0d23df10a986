use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HistorySettings {
    /// Upper bound on point-in-time reads issued by one history call.
    ///
    /// `0` means unbounded. When the bound is hit the walk stops early and
    /// returns what it has collected so far.
    #[serde(default)]
    pub max_revisions_scanned: u64,
}

impl HistorySettings {
    pub fn is_bounded(&self) -> bool {
        self.max_revisions_scanned > 0
    }
}
