use std::time::Duration;

/// The configuration of the collab system
#[derive(Debug, Clone)]
pub struct Config {
    /// How many members a single room can hold
    pub max_members: usize,
    /// How long a room lives after creation, in seconds
    pub room_lifetime_in_seconds: f32,
    /// How long a fully disconnected room is kept around before deletion, in seconds
    pub grace_period_in_seconds: f32,
    /// How often the expiry sweep runs, in seconds
    pub sweep_interval_in_seconds: f32,
}

impl Config {
    /// The maximum age of a room before it expires
    pub fn room_lifetime(&self) -> Duration {
        Duration::from_secs_f32(self.room_lifetime_in_seconds)
    }

    /// How long a reconnection can still save a fully disconnected room
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f32(self.grace_period_in_seconds)
    }

    /// How often expired rooms are cleaned up in the background
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs_f32(self.sweep_interval_in_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Estimation sessions are small groups
            max_members: 10,
            // Rooms are intentionally short-lived
            room_lifetime_in_seconds: 60.0 * 10.,
            grace_period_in_seconds: 30.0,
            sweep_interval_in_seconds: 60.0,
        }
    }
}
