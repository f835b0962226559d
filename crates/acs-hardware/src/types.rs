//! Values exchanged with peripheral collaborators.

use acs_core::AccessState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Animation the indicator should loop.
///
/// One pattern per displayable state, plus the one-off identify sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorPattern {
    Startup,
    Idle,
    Unlocked,
    AlwaysOn,
    Lockout,
    NextCard,
    Welcoming,
    Welcomed,
    AlwaysOnWaiting,
    LockoutWaiting,
    IdleWaiting,
    AwaitAuth,
    Denied,
    Fault,
    Restart,
    Identify,
}

impl From<AccessState> for IndicatorPattern {
    fn from(state: AccessState) -> Self {
        match state {
            AccessState::Startup => Self::Startup,
            AccessState::Idle => Self::Idle,
            AccessState::Unlocked => Self::Unlocked,
            AccessState::AlwaysOn => Self::AlwaysOn,
            AccessState::Lockout => Self::Lockout,
            AccessState::NextCard => Self::NextCard,
            AccessState::Welcoming => Self::Welcoming,
            AccessState::Welcomed => Self::Welcomed,
            AccessState::AlwaysOnWaiting => Self::AlwaysOnWaiting,
            AccessState::LockoutWaiting => Self::LockoutWaiting,
            AccessState::IdleWaiting => Self::IdleWaiting,
            AccessState::AwaitAuth => Self::AwaitAuth,
            AccessState::Denied => Self::Denied,
            AccessState::Fault => Self::Fault,
            AccessState::Restart => Self::Restart,
        }
    }
}

impl fmt::Display for IndicatorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Built-in sound effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundEffect {
    Accepted,
    Denied,
    Lockout,
    Fault,
    Identify,
}

impl fmt::Display for SoundEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One reading of the two tamper-detect switches behind the credential slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchReading {
    pub first: bool,
    pub second: bool,
}

impl SwitchReading {
    pub const OPEN: Self = Self {
        first: false,
        second: false,
    };

    pub const CLOSED: Self = Self {
        first: true,
        second: true,
    };

    pub fn new(first: bool, second: bool) -> Self {
        Self { first, second }
    }

    /// Both switches agree.
    pub fn agree(&self) -> bool {
        self.first == self.second
    }

    /// At least one switch reports something in the slot.
    pub fn any(&self) -> bool {
        self.first || self.second
    }

    /// Both switches report something in the slot.
    pub fn both(&self) -> bool {
        self.first && self.second
    }
}
