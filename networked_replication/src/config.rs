//! Configuration of a [`ReplicationContext`](crate::registry::ReplicationContext)
use core::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// How long the id of a forgotten object is remembered.
    ///
    /// Updates that reference an id inside this window are dropped silently: they were
    /// in flight when the object went away. The server only reuses an id once it has left the window.
    pub client_timeout: Duration,
    /// Speed at which the smoothed position moves towards the last received position
    pub position_lerp_speed: f32,
    /// Log a warning when a message references an id that is neither live nor recently forgotten
    pub warn_on_missing_id: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(5),
            position_lerp_speed: 10.0,
            warn_on_missing_id: true,
        }
    }
}
