use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base attributes of a hosted server instance, as persisted by the store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceData {
    pub id: i64,
    pub name: String,
    pub port: u16,
    pub max_players: u32,
    pub memory_mb: u32,
    pub expires_at: DateTime<Utc>,
    pub auto_start: bool,
}

impl InstanceData {
    pub fn expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Launch attributes selecting how the instance is brought up.
///
/// `last_core` tracks the core whose file tree currently populates the
/// instance directory; a mismatch with `core` triggers a fresh copy on the
/// next start.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartData {
    pub core: String,
    pub last_core: String,
    pub starter: String,
    pub world: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Reported by a starter when the managed process dies unexpectedly.
    Crashed,
}
