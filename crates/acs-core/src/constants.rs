//! Timing and sizing constants for the access-control terminal.
//!
//! Durations are expressed in milliseconds, mirroring how they are written in
//! the TOML configuration (`[timing]` section). Values that can be tuned per
//! installation have a matching field in [`TimingConfig`](crate::config::TimingConfig);
//! the rest are fixed properties of the hardware loop.
//!
//! # Usage
//!
//! ```
//! use acs_core::constants::*;
//! use std::time::Duration;
//!
//! let settle = Duration::from_millis(PRESENCE_FAST_POLL_MS) * PRESENCE_SETTLE_POLLS;
//! assert_eq!(settle, Duration::from_millis(300));
//! ```

// ============================================================================
// Hardware identification
// ============================================================================

/// Hardware family reported in the handshake (`HWType`).
pub const HARDWARE_TYPE: &str = "Core";

/// Default hardware edition string reported as `HWVersion`.
pub const DEFAULT_HARDWARE_VERSION: &str = "ACS 2.4.1 Core";

/// Hardware edition string for boards without the sounder module.
pub const LITE_HARDWARE_VERSION: &str = "ACS 2.4.1 Core Lite";

// ============================================================================
// Queues and locks
// ============================================================================

/// Capacity of the state-machine event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// Capacity of the network request queue.
pub const NETWORK_QUEUE_CAPACITY: usize = 8;

/// How long a producer waits on a full queue before dropping the event.
pub const QUEUE_SEND_TIMEOUT_MS: u64 = 100;

/// How long any reader or writer waits for the shared status lock.
pub const LOCK_TIMEOUT_MS: u64 = 100;

// ============================================================================
// Button
// ============================================================================

/// Button sampling period.
pub const BUTTON_SAMPLE_INTERVAL_MS: u64 = 50;

/// Consecutive pressed samples that make a press a hold (3 s at 50 ms).
pub const BUTTON_HOLD_SAMPLES: u32 = 60;

// ============================================================================
// Card presence
// ============================================================================

/// Poll period while a card is tracked or a tamper switch is closed.
pub const PRESENCE_FAST_POLL_MS: u64 = 50;

/// Poll period while nothing is near the reader.
pub const PRESENCE_SLOW_POLL_MS: u64 = 200;

/// Identical consecutive reads required before a new card is reported.
pub const PRESENCE_SETTLE_POLLS: u32 = 6;

/// Consecutive tamper-switch disagreements tolerated before faulting.
///
/// The fault is raised on the poll that exceeds this count.
pub const SWITCH_MISMATCH_LIMIT: u32 = 10;

// ============================================================================
// Access state machine timers
// ============================================================================

/// Inactivity window of the click cascade before reverting.
pub const WAITING_TIMEOUT_MS: u64 = 5_000;

/// How long the denial indicator is shown.
pub const DENIED_DISPLAY_MS: u64 = 1_500;

/// Length of the identify animation before the state indicator is redrawn.
pub const IDENTIFY_DISPLAY_MS: u64 = 9_630;

// ============================================================================
// Protocol coordinator timers
// ============================================================================

/// Authorization round-trip timeout (also the first-contact window at boot).
pub const AUTH_TIMEOUT_MS: u64 = 3_000;

/// Keepalive status period while online.
pub const KEEPALIVE_INTERVAL_MS: u64 = 10_000;

/// Inbound silence after which the session is considered dead.
pub const WATCHDOG_TIMEOUT_MS: u64 = 30_000;

/// Reconnect attempt period while not online.
pub const RECONNECT_INTERVAL_MS: u64 = 3_000;

/// Delay between a restart request and the reboot.
pub const RESTART_GRACE_MS: u64 = 1_000;

/// Button sampling period while confirming a remote restart.
pub const RESTART_POLL_INTERVAL_MS: u64 = 10;

/// Samples taken while confirming a remote restart (5 s at 10 ms).
pub const RESTART_POLL_SAMPLES: u32 = 500;

/// Timeout for connect and send operations on the transport.
pub const TRANSPORT_TIMEOUT_MS: u64 = 3_000;

// ============================================================================
// Temperature
// ============================================================================

/// Temperature sampling period.
pub const TEMPERATURE_POLL_MS: u64 = 1_000;

/// Default over-temperature limit in degrees Celsius.
pub const DEFAULT_MAX_TEMPERATURE_C: f32 = 40.0;

// ============================================================================
// Wire format
// ============================================================================

/// Maximum size of one newline-delimited JSON record.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
