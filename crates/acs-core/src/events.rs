//! Messages exchanged between the state machine and the protocol coordinator.
//!
//! Each payload is owned and moved through a bounded queue; nothing is shared.

use crate::types::{AccessState, AuthorizationRequest, StateChangeReport};

/// Command from the coordinator to the access state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Move to `target`. `requested` is true when this answers our own
    /// authorization request, false for unsolicited operator commands.
    CommandState { target: AccessState, requested: bool },
    /// Play the identify sequence.
    Identify,
    /// The outstanding authorization was refused or timed out.
    Deny,
}

impl TerminalCommand {
    /// Unsolicited state command.
    #[must_use]
    pub fn commanded(target: AccessState) -> Self {
        TerminalCommand::CommandState {
            target,
            requested: false,
        }
    }

    /// Whether this command may pass the fault gate.
    #[must_use]
    pub fn is_restart(&self) -> bool {
        matches!(
            self,
            TerminalCommand::CommandState {
                target: AccessState::Restart,
                ..
            }
        )
    }
}

/// Request from the state machine to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalRequest {
    Authorize(AuthorizationRequest),
    Report(StateChangeReport),
    /// The operator released a held button; reboot after the grace delay.
    PleaseRestart,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_command_detection() {
        assert!(TerminalCommand::commanded(AccessState::Restart).is_restart());
        assert!(
            TerminalCommand::CommandState {
                target: AccessState::Restart,
                requested: true
            }
            .is_restart()
        );
        assert!(!TerminalCommand::commanded(AccessState::Idle).is_restart());
        assert!(!TerminalCommand::Deny.is_restart());
    }
}
