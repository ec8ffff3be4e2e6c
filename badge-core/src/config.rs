//! Compile-time limits and tunable timings for the badge core.

use crate::scheduler::RelativeTime;

/// Number of tasks the firmware may have pending at any time.
pub const MAX_SCHEDULED_TASKS: usize = 16;

/// Largest frame the wire protocol exchanges, header included.
pub const PROTOCOL_MAX_MESSAGE_SIZE: usize = 16;

/// Type byte plus the two checksum bytes.
pub const WIRE_HEADER_SIZE: usize = 3;

/// Largest payload any message type may declare.
pub const MAX_PAYLOAD_SIZE: usize = PROTOCOL_MAX_MESSAGE_SIZE - WIRE_HEADER_SIZE;

/// Message types at or above this value belong to the application.
pub const APPLICATION_MESSAGE_TYPE_RANGE_BEGIN: u8 = 10;

/// Number of application message types the catalog can describe.
pub const MAX_APPLICATION_MESSAGE_TYPES: usize = 8;

pub const DEFAULT_BASE_PERIOD_MS: RelativeTime = 100;
pub const DEFAULT_SESSION_TIMEOUT_MS: RelativeTime = 15_000;
pub const DEFAULT_RETRANSMIT_TIMEOUT_MS: RelativeTime = 500;
pub const DEFAULT_WAIT_TO_INITIATE_TICKS: u8 = 3;

/// Timing knobs for the network handler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkConfig {
    /// Period of the network handler task.
    pub base_period_ms: RelativeTime,
    /// Silence tolerated before an active session is torn down.
    pub session_timeout_ms: RelativeTime,
    /// Delay after which an unacknowledged frame is sent again.
    pub retransmit_timeout_ms: RelativeTime,
    /// Handler runs the left-most node waits before announcing itself.
    pub wait_to_initiate_ticks: u8,
}

impl NetworkConfig {
    /// Configuration used by the badge firmware.
    pub const fn new() -> Self {
        Self {
            base_period_ms: DEFAULT_BASE_PERIOD_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            retransmit_timeout_ms: DEFAULT_RETRANSMIT_TIMEOUT_MS,
            wait_to_initiate_ticks: DEFAULT_WAIT_TO_INITIATE_TICKS,
        }
    }

    #[must_use]
    pub const fn with_base_period(mut self, period_ms: RelativeTime) -> Self {
        self.base_period_ms = period_ms;
        self
    }

    #[must_use]
    pub const fn with_session_timeout(mut self, timeout_ms: RelativeTime) -> Self {
        self.session_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub const fn with_retransmit_timeout(mut self, timeout_ms: RelativeTime) -> Self {
        self.retransmit_timeout_ms = timeout_ms;
        self
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::new()
    }
}
