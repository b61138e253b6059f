//! Real-time relay core: one actor per room, one pump pair per connection.

pub mod errors;
pub mod playback;
pub mod registry;
pub mod room;
pub mod session;

use std::time::Duration;

pub use errors::*;
pub use registry::RoomRegistry;
pub use room::RoomSnapshot;
pub use session::{read_pump, write_pump, CloseMessage, PumpExit, Session};

/// Timing and sizing knobs the relay depends on.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// A room asks one member for a fresh sync after this long without one
    pub sync_interval: Duration,
    /// Deadline for writing a single frame
    pub send_wait: Duration,
    /// Read deadline, refreshed by every pong
    pub pong_wait: Duration,
    /// Ping period when no application frame was written
    pub ping_period: Duration,
    pub max_message_size: usize,
    /// Outbound queue capacity per session
    pub send_buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            send_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(40),
            ping_period: Duration::from_secs(30),
            max_message_size: 1024,
            send_buffer_size: 16,
        }
    }
}
