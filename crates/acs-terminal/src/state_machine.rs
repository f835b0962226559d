//! Access state machine.
//!
//! [`AccessStateMachine`] owns the authoritative [`AccessState`] and
//! reconciles local input (button, credential presence), commands from the
//! backend and its own timers. It performs no I/O: [`AccessStateMachine::handle`]
//! returns the [`SideEffect`]s the dispatcher must carry out, in order.
//!
//! # Transitions
//!
//! Every state change goes through one transition function:
//!
//! - `Restart` is display only. The restart indicator is shown but the stored
//!   state does not change, even while faulted.
//! - While in `Fault` every other transition is rejected.
//! - Otherwise the target state's fixed profile (actuator, switch
//!   requirement, sound, indicator) is applied and the state is committed.
//!
//! # Click cascade
//!
//! ```text
//!            click                 click                  click
//! (other) ──────────> LockoutWaiting ─────> IdleWaiting ─────> AlwaysOnWaiting
//!                          ↑                                          │
//!                          └──────────────────────────────────────────┘
//!                                             click
//! ```
//!
//! Each click restarts the waiting timer. Its expiry, or a credential
//! presented while waiting, ends the cascade.
//!
//! # Timers
//!
//! The waiting, denial and identify timers are owned by the dispatcher and
//! come back as [`MachineEvent::TimerExpired`]. Expiry handlers re-check the
//! current state, so a firing that races a transition is harmless.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use acs_core::config::TimingConfig;
use acs_core::constants::{DENIED_DISPLAY_MS, IDENTIFY_DISPLAY_MS, WAITING_TIMEOUT_MS};
use acs_core::{
    AccessState, AuthorizationRequest, CredentialId, FaultReason, StateChangeReason,
    StateChangeReport, TerminalCommand, TerminalRequest,
};
use acs_hardware::{IndicatorPattern, SoundEffect};
use tracing::{debug, info, warn};

/// Maximum number of state transitions to keep in history.
const MAX_HISTORY_SIZE: usize = 100;

/// Classified button gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEvent {
    /// Press and release below the hold threshold.
    Click,
    /// Continuous press reached the hold threshold.
    Held,
    /// Release after a hold.
    Released,
}

/// Timers owned on behalf of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateTimer {
    /// Inactivity timeout of the click cascade.
    Waiting,
    /// How long `Denied` is displayed.
    Denied,
    /// Length of the identify sequence.
    Identify,
}

/// Input to [`AccessStateMachine::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    Button(ButtonEvent),
    CredentialPresented(CredentialId),
    CredentialRemoved(CredentialId),
    /// A credential was in the field but could not be read.
    ReadError,
    Command(TerminalCommand),
    TimerExpired(StateTimer),
}

impl MachineEvent {
    /// Events still dispatched while faulted.
    #[must_use]
    pub fn allowed_in_fault(&self) -> bool {
        match self {
            MachineEvent::Button(_) => true,
            MachineEvent::Command(command) => command.is_restart(),
            _ => false,
        }
    }
}

/// Work for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    SetActuator(bool),
    /// Whether presence needs both tamper switches to agree.
    RequireBothSwitches(bool),
    PlaySound(SoundEffect),
    ShowIndicator(IndicatorPattern),
    StartTimer(StateTimer, Duration),
    StopTimer(StateTimer),
    /// Hand a request to the protocol coordinator.
    Request(TerminalRequest),
}

/// A committed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: AccessState,
    pub to: AccessState,
    pub at: Instant,
}

/// Durations of the state machine's own timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineTimings {
    pub waiting_timeout: Duration,
    pub denied_display: Duration,
    pub identify_display: Duration,
}

impl Default for MachineTimings {
    fn default() -> Self {
        Self {
            waiting_timeout: Duration::from_millis(WAITING_TIMEOUT_MS),
            denied_display: Duration::from_millis(DENIED_DISPLAY_MS),
            identify_display: Duration::from_millis(IDENTIFY_DISPLAY_MS),
        }
    }
}

impl From<&TimingConfig> for MachineTimings {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            waiting_timeout: timing.waiting_timeout(),
            denied_display: timing.denied_display(),
            identify_display: timing.identify_display(),
        }
    }
}

/// Fixed outputs applied on entering a state. `None` leaves the output as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StateProfile {
    actuator: Option<bool>,
    require_both: Option<bool>,
    sound: Option<SoundEffect>,
}

impl StateProfile {
    const fn new(
        actuator: Option<bool>,
        require_both: Option<bool>,
        sound: Option<SoundEffect>,
    ) -> Self {
        Self {
            actuator,
            require_both,
            sound,
        }
    }

    fn of(state: AccessState) -> Self {
        use AccessState::*;
        match state {
            Idle | NextCard => Self::new(Some(false), Some(true), None),
            Unlocked | AlwaysOn => Self::new(Some(true), Some(true), Some(SoundEffect::Accepted)),
            Lockout => Self::new(Some(false), Some(true), Some(SoundEffect::Lockout)),
            Welcoming => Self::new(Some(false), Some(false), None),
            Welcomed => Self::new(Some(false), Some(false), Some(SoundEffect::Accepted)),
            AlwaysOnWaiting | LockoutWaiting | IdleWaiting => Self::new(None, Some(true), None),
            AwaitAuth | Startup | Restart => Self::new(None, None, None),
            Denied => Self::new(None, None, Some(SoundEffect::Denied)),
            Fault => Self::new(Some(false), None, Some(SoundEffect::Fault)),
        }
    }

    fn apply(&self, state: AccessState, effects: &mut Vec<SideEffect>) {
        if let Some(engaged) = self.actuator {
            effects.push(SideEffect::SetActuator(engaged));
        }
        if let Some(both) = self.require_both {
            effects.push(SideEffect::RequireBothSwitches(both));
        }
        if let Some(sound) = self.sound {
            effects.push(SideEffect::PlaySound(sound));
        }
        effects.push(SideEffect::ShowIndicator(IndicatorPattern::from(state)));
    }
}

/// The terminal's finite-state controller.
#[derive(Debug, Clone)]
pub struct AccessStateMachine {
    state: AccessState,
    /// Where a cascade, denial or abandoned request returns to.
    prior_request_state: AccessState,
    /// Credential of the outstanding authorization, for report attribution.
    requester: Option<CredentialId>,
    timings: MachineTimings,
    history: VecDeque<StateTransition>,
}

impl AccessStateMachine {
    /// Machine in `Startup`.
    pub fn new(timings: MachineTimings) -> Self {
        Self::builder().with_timings(timings).build()
    }

    pub fn builder() -> AccessStateMachineBuilder {
        AccessStateMachineBuilder::default()
    }

    #[must_use]
    pub fn current(&self) -> AccessState {
        self.state
    }

    #[must_use]
    pub fn prior_request_state(&self) -> AccessState {
        self.prior_request_state
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Outputs for the boot display, before any event is handled.
    pub fn startup_effects(&self) -> Vec<SideEffect> {
        vec![
            SideEffect::SetActuator(false),
            SideEffect::ShowIndicator(IndicatorPattern::from(self.state)),
        ]
    }

    pub fn handle(&mut self, event: MachineEvent) -> Vec<SideEffect> {
        let mut effects = Vec::new();

        if self.state == AccessState::Fault && !event.allowed_in_fault() {
            debug!(?event, "faulted, dropping event");
            return effects;
        }

        match event {
            MachineEvent::Button(ButtonEvent::Click) => self.handle_click(&mut effects),
            MachineEvent::Button(ButtonEvent::Held) => {
                self.go_to(AccessState::Restart, &mut effects)
            }
            MachineEvent::Button(ButtonEvent::Released) => {
                info!("button released after hold, requesting restart");
                effects.push(SideEffect::Request(TerminalRequest::PleaseRestart));
            }
            MachineEvent::CredentialPresented(credential) => {
                self.handle_presented(credential, &mut effects)
            }
            MachineEvent::CredentialRemoved(credential) => {
                self.handle_removed(credential, &mut effects)
            }
            MachineEvent::ReadError => {
                debug!(state = %self.state, "credential read error");
                effects.push(SideEffect::PlaySound(SoundEffect::Denied));
            }
            MachineEvent::Command(command) => self.handle_command(command, &mut effects),
            MachineEvent::TimerExpired(timer) => self.handle_timer(timer, &mut effects),
        }
        effects
    }

    /// Enter `Fault` and report it.
    ///
    /// `StartupFailure` is accepted but does nothing yet, and an already
    /// faulted machine is left alone.
    pub fn force_fault(&mut self, reason: FaultReason) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if reason == FaultReason::StartupFailure {
            // TODO: define startup-failure recovery; until then this is a no-op.
            warn!(?reason, "startup failure fault is not handled");
            return effects;
        }
        if self.state == AccessState::Fault {
            debug!(?reason, "already faulted");
            return effects;
        }

        warn!(?reason, from = %self.state, "forcing fault");
        self.report(AccessState::Fault, reason.report_reason(), None, &mut effects);
        self.go_to(AccessState::Fault, &mut effects);
        effects
    }

    fn handle_click(&mut self, effects: &mut Vec<SideEffect>) {
        use AccessState::*;
        if matches!(
            self.state,
            Unlocked | AwaitAuth | Denied | Restart | Startup | Fault | Welcomed | Welcoming
        ) {
            info!(state = %self.state, "click ignored in this state");
            return;
        }

        effects.push(SideEffect::StartTimer(
            StateTimer::Waiting,
            self.timings.waiting_timeout,
        ));
        match self.state {
            IdleWaiting => self.go_to(AlwaysOnWaiting, effects),
            AlwaysOnWaiting => self.go_to(LockoutWaiting, effects),
            LockoutWaiting => self.go_to(IdleWaiting, effects),
            current => {
                self.prior_request_state = current;
                self.go_to(LockoutWaiting, effects);
            }
        }
    }

    fn handle_presented(&mut self, credential: CredentialId, effects: &mut Vec<SideEffect>) {
        use AccessState::*;
        let target = match self.state {
            Idle => {
                self.prior_request_state = Idle;
                Unlocked
            }
            LockoutWaiting | IdleWaiting | AlwaysOnWaiting => {
                effects.push(SideEffect::StopTimer(StateTimer::Waiting));
                match self.state {
                    LockoutWaiting => Lockout,
                    IdleWaiting => Idle,
                    _ => AlwaysOn,
                }
            }
            Welcoming => Welcomed,
            Lockout => {
                debug!(%credential, "locked out, refusing credential");
                effects.push(SideEffect::PlaySound(SoundEffect::Lockout));
                return;
            }
            NextCard => {
                info!(%credential, "next card admitted");
                self.report(
                    Unlocked,
                    StateChangeReason::CredentialActivated,
                    Some(credential),
                    effects,
                );
                self.go_to(Unlocked, effects);
                return;
            }
            state => {
                debug!(%credential, %state, "credential ignored in this state");
                return;
            }
        };

        info!(%credential, %target, "requesting authorization");
        self.go_to(AwaitAuth, effects);
        self.requester = Some(credential);
        effects.push(SideEffect::Request(TerminalRequest::Authorize(
            AuthorizationRequest {
                requester: credential,
                target,
            },
        )));
    }

    fn handle_removed(&mut self, credential: CredentialId, effects: &mut Vec<SideEffect>) {
        match self.state {
            AccessState::Unlocked => {
                self.report(
                    AccessState::Idle,
                    StateChangeReason::CredentialRemoved,
                    Some(credential),
                    effects,
                );
                self.go_to(AccessState::Idle, effects);
            }
            AccessState::AwaitAuth => {
                debug!(%credential, prior = %self.prior_request_state, "credential withdrawn before reply");
                self.requester = None;
                self.go_to(self.prior_request_state, effects);
            }
            AccessState::Welcomed => self.go_to(AccessState::Welcoming, effects),
            _ => {}
        }
    }

    fn handle_command(&mut self, command: TerminalCommand, effects: &mut Vec<SideEffect>) {
        match command {
            TerminalCommand::CommandState {
                target,
                requested: true,
            } => {
                if self.state != AccessState::AwaitAuth {
                    debug!(%target, state = %self.state, "late authorization result ignored");
                    return;
                }
                let reason = match target {
                    AccessState::AlwaysOn | AccessState::Lockout | AccessState::Idle => {
                        StateChangeReason::ButtonPress
                    }
                    AccessState::Unlocked => StateChangeReason::CredentialActivated,
                    _ => {
                        warn!(%target, "authorization granted into an unexpected state, rejecting");
                        return;
                    }
                };
                let who = self.requester.take();
                self.report(target, reason, who, effects);
                self.go_to(target, effects);
            }
            TerminalCommand::CommandState {
                target,
                requested: false,
            } => {
                self.report(target, StateChangeReason::ServerCommanded, None, effects);
                if target != AccessState::Restart {
                    self.requester = None;
                }
                self.go_to(target, effects);
            }
            TerminalCommand::Identify => {
                info!("identify");
                effects.push(SideEffect::ShowIndicator(IndicatorPattern::Identify));
                effects.push(SideEffect::PlaySound(SoundEffect::Identify));
                effects.push(SideEffect::StartTimer(
                    StateTimer::Identify,
                    self.timings.identify_display,
                ));
            }
            TerminalCommand::Deny => {
                self.requester = None;
                self.go_to(AccessState::Denied, effects);
                effects.push(SideEffect::StartTimer(
                    StateTimer::Denied,
                    self.timings.denied_display,
                ));
            }
        }
    }

    fn handle_timer(&mut self, timer: StateTimer, effects: &mut Vec<SideEffect>) {
        match timer {
            StateTimer::Waiting if self.state.is_waiting() => {
                debug!(prior = %self.prior_request_state, "waiting timed out");
                self.go_to(self.prior_request_state, effects);
            }
            StateTimer::Denied if self.state == AccessState::Denied => {
                self.go_to(self.prior_request_state, effects);
            }
            StateTimer::Identify => {
                effects.push(SideEffect::ShowIndicator(IndicatorPattern::from(self.state)));
            }
            _ => debug!(?timer, state = %self.state, "stale timer ignored"),
        }
    }

    fn report(
        &self,
        to: AccessState,
        reason: StateChangeReason,
        who: Option<CredentialId>,
        effects: &mut Vec<SideEffect>,
    ) {
        let report = StateChangeReport::new(self.state, to, reason).with_who(who);
        effects.push(SideEffect::Request(TerminalRequest::Report(report)));
    }

    fn go_to(&mut self, next: AccessState, effects: &mut Vec<SideEffect>) {
        if next == AccessState::Restart {
            info!(state = %self.state, "showing restart");
            effects.push(SideEffect::ShowIndicator(IndicatorPattern::Restart));
            return;
        }
        if self.state == AccessState::Fault {
            warn!(to = %next, "faulted, transition rejected");
            return;
        }

        StateProfile::of(next).apply(next, effects);
        info!(from = %self.state, to = %next, "state change");
        self.history.push_back(StateTransition {
            from: self.state,
            to: next,
            at: Instant::now(),
        });
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.state = next;
    }
}

impl Default for AccessStateMachine {
    fn default() -> Self {
        Self::new(MachineTimings::default())
    }
}

/// Builder for [`AccessStateMachine`], mainly for starting in a given state.
#[derive(Debug, Default)]
pub struct AccessStateMachineBuilder {
    initial_state: Option<AccessState>,
    prior_request_state: Option<AccessState>,
    timings: MachineTimings,
}

impl AccessStateMachineBuilder {
    pub fn with_initial_state(mut self, state: AccessState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_prior_request_state(mut self, state: AccessState) -> Self {
        self.prior_request_state = Some(state);
        self
    }

    pub fn with_timings(mut self, timings: MachineTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn build(self) -> AccessStateMachine {
        AccessStateMachine {
            state: self.initial_state.unwrap_or(AccessState::Startup),
            prior_request_state: self.prior_request_state.unwrap_or(AccessState::Idle),
            requester: None,
            timings: self.timings,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }
}
