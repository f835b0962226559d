//! Credential presence tracking with swap detection.
//!
//! [`CardPresenceMonitor`] is fed one [`PollSample`] per poll (tamper switch
//! levels plus the reader's answer) and turns the stream into presence
//! events. The polling task owns the I/O and asks
//! [`CardPresenceMonitor::next_interval`] how long to sleep.

use std::time::Duration;

use acs_core::CredentialId;
use acs_core::constants::{
    PRESENCE_FAST_POLL_MS, PRESENCE_SETTLE_POLLS, PRESENCE_SLOW_POLL_MS, SWITCH_MISMATCH_LIMIT,
};
use acs_hardware::SwitchReading;
use tracing::{debug, info, warn};

/// What the reader answered on one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Credential(CredentialId),
    NoAnswer,
    /// Something was in the field but could not be read.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSample {
    pub switches: SwitchReading,
    pub read: ReadOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Detected(CredentialId),
    Removed(CredentialId),
    ReadError,
    /// The tamper switches disagreed for longer than allowed.
    SwitchFault,
}

#[derive(Debug, Clone)]
pub struct CardPresenceMonitor {
    tracked: Option<CredentialId>,
    candidate: Option<CredentialId>,
    settle: u32,
    mismatches: u32,
    switch_fault_raised: bool,
    read_error_reported: bool,
    require_both: bool,
    last_switches: SwitchReading,
}

impl Default for CardPresenceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CardPresenceMonitor {
    pub fn new() -> Self {
        Self {
            tracked: None,
            candidate: None,
            settle: 0,
            mismatches: 0,
            switch_fault_raised: false,
            read_error_reported: false,
            require_both: true,
            last_switches: SwitchReading::OPEN,
        }
    }

    /// Credential currently considered present.
    pub fn tracked(&self) -> Option<CredentialId> {
        self.tracked
    }

    pub fn require_both(&self) -> bool {
        self.require_both
    }

    /// Whether presence needs both switches closed (and agreeing) or just one.
    pub fn set_require_both(&mut self, require_both: bool) {
        if self.require_both != require_both {
            debug!(require_both, "switch requirement changed");
            self.require_both = require_both;
            self.mismatches = 0;
        }
    }

    /// Delay until the next poll: fast while something is in or near the
    /// slot, slow otherwise.
    pub fn next_interval(&self) -> Duration {
        if self.last_switches.any() || self.tracked.is_some() || self.candidate.is_some() {
            Duration::from_millis(PRESENCE_FAST_POLL_MS)
        } else {
            Duration::from_millis(PRESENCE_SLOW_POLL_MS)
        }
    }

    pub fn observe(&mut self, sample: PollSample) -> Vec<PresenceEvent> {
        let mut events = Vec::new();
        self.last_switches = sample.switches;
        self.check_switches(sample.switches, &mut events);

        let confirmed = if self.require_both {
            sample.switches.both()
        } else {
            sample.switches.any()
        };

        match sample.read {
            ReadOutcome::Credential(credential) => {
                self.read_error_reported = false;
                self.observe_credential(credential, confirmed, &mut events);
            }
            ReadOutcome::NoAnswer => {
                self.read_error_reported = false;
                self.reset_candidate();
                if let Some(previous) = self.tracked.take() {
                    info!(credential = %previous, "credential removed");
                    events.push(PresenceEvent::Removed(previous));
                }
            }
            ReadOutcome::Error => {
                self.reset_candidate();
                if !self.read_error_reported {
                    self.read_error_reported = true;
                    debug!("credential read error");
                    events.push(PresenceEvent::ReadError);
                }
            }
        }
        events
    }

    fn observe_credential(
        &mut self,
        credential: CredentialId,
        confirmed: bool,
        events: &mut Vec<PresenceEvent>,
    ) {
        match self.tracked {
            Some(current) if current == credential => self.reset_candidate(),
            Some(current) => {
                warn!(old = %current, new = %credential, "credential swapped without removal");
                self.reset_candidate();
                self.tracked = Some(credential);
                events.push(PresenceEvent::Removed(current));
                events.push(PresenceEvent::Detected(credential));
            }
            None if !confirmed => {
                debug!(%credential, "presence not confirmed by switches");
                self.reset_candidate();
            }
            None => {
                if self.candidate == Some(credential) {
                    self.settle += 1;
                } else {
                    self.candidate = Some(credential);
                    self.settle = 1;
                }
                if self.settle >= PRESENCE_SETTLE_POLLS {
                    info!(%credential, "credential detected");
                    self.reset_candidate();
                    self.tracked = Some(credential);
                    events.push(PresenceEvent::Detected(credential));
                }
            }
        }
    }

    fn check_switches(&mut self, switches: SwitchReading, events: &mut Vec<PresenceEvent>) {
        if !self.require_both || switches.agree() {
            self.mismatches = 0;
            self.switch_fault_raised = false;
            return;
        }

        self.mismatches = self.mismatches.saturating_add(1);
        if self.mismatches > SWITCH_MISMATCH_LIMIT && !self.switch_fault_raised {
            warn!(
                polls = self.mismatches,
                ?switches,
                "tamper switches disagree"
            );
            self.switch_fault_raised = true;
            events.push(PresenceEvent::SwitchFault);
        }
    }

    fn reset_candidate(&mut self) {
        self.candidate = None;
        self.settle = 0;
    }
}
