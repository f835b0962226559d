//! Authorization protocol coordinator.
//!
//! # Architecture: Action-Based State Machine
//!
//! [`AuthCoordinator`] performs no I/O and owns no timers. The session driver
//! feeds it [`CoordinatorEvent`]s (transport results, decoded directives,
//! timer firings, requests from the access state machine) and executes the
//! returned [`CoordinatorAction`]s: connecting, sending records, starting and
//! stopping [`NetTimer`]s, delivering commands to the terminal.
//!
//! # Session lifecycle
//!
//! ```text
//! ┌─────────┐ TransportUp ┌─────────────────────┐ SessionOpened ┌───────────────────┐
//! │ Offline │────────────>│ ConnectingTransport │──────────────>│ AwaitingHandshake │
//! └─────────┘             └─────────────────────┘               └───────────────────┘
//!      ↑                                                                 │ first inbound
//!      │                    SessionDown / WatchdogExpired          ┌────────┐
//!      └───────────────────────────────────────────────────────────│ Online │
//!                                                                  └────────┘
//! ```
//!
//! While not online a periodic reconnect timer keeps producing
//! [`CoordinatorEvent::TryConnect`]. Failures are counted for diagnostics and
//! never suppress retries.
//!
//! # Authorization round-trip
//!
//! One [`PendingAuthorization`] slot. A new request replaces whatever is
//! outstanding. A matching reply resolves it; the round-trip timeout resolves
//! it as a deny, except while the first post-boot contact is still pending,
//! when the stored default state is commanded instead.

use std::time::{Duration, Instant};

use acs_core::constants::{RESTART_POLL_INTERVAL_MS, RESTART_POLL_SAMPLES};
use acs_core::{
    AccessState, AuthorizationRequest, ConnectivityState, CredentialId, TerminalCommand,
    TerminalConfig, TerminalRequest, Tone,
};
use acs_protocol::{Directive, Handshake, Outbound, OutboundBody, StatusReport};
use tracing::{debug, info, warn};

/// Timers owned by the session on behalf of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetTimer {
    /// Authorization round-trip, also armed at boot for the first contact.
    AuthTimeout,
    Keepalive,
    /// Silence detector, reset by every inbound record.
    Watchdog,
    Reconnect,
    /// Delay between a local restart request and the reboot.
    RestartGrace,
    /// Button sampling after a remote restart command.
    RestartPoll,
}

impl NetTimer {
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        matches!(
            self,
            NetTimer::Keepalive | NetTimer::Reconnect | NetTimer::RestartPoll
        )
    }
}

/// Events processed by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    TransportUp,
    TransportDown,
    TryConnect,
    ConnectFailed(String),
    /// Connection established, handshake not yet answered.
    SessionOpened,
    SessionDown(String),
    /// Directives of one decoded inbound record.
    Inbound(Vec<Directive>),
    AuthTimeout,
    /// Keepalive period elapsed; carries a snapshot of the terminal.
    KeepaliveTick {
        state: AccessState,
        temperature: f32,
    },
    WatchdogExpired,
    RestartPoll {
        button_held: bool,
    },
    RestartGraceElapsed,
    Request(TerminalRequest),
}

/// Work for the session driver.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorAction {
    Connect,
    Disconnect,
    Send(Outbound),
    StartTimer(NetTimer, Duration),
    StopTimer(NetTimer),
    /// Hand a command to the access state machine.
    Deliver(TerminalCommand),
    StoreTone(Tone),
    PlayTone,
    BeginFirmwareUpdate(String),
    Reboot,
    /// Publish the online flag.
    SetOnline(bool),
}

/// The single outstanding authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub requester: CredentialId,
    pub target: AccessState,
    pub issued_at: Instant,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub serial_number: String,
    pub key: String,
    pub hardware_version: String,
    pub firmware_version: String,
    /// State commanded when the first contact of a boot times out.
    pub default_state: AccessState,
    pub boot_count: u64,
    pub auth_timeout: Duration,
    pub keepalive_interval: Duration,
    pub watchdog_timeout: Duration,
    pub reconnect_interval: Duration,
    pub restart_grace: Duration,
    pub restart_poll_interval: Duration,
    pub restart_poll_samples: u32,
}

impl CoordinatorConfig {
    pub fn from_terminal_config(
        config: &TerminalConfig,
        key: String,
        default_state: AccessState,
        boot_count: u64,
    ) -> Self {
        Self {
            serial_number: config.device.serial_number.clone(),
            key,
            hardware_version: config.device.hardware_version.clone(),
            firmware_version: config.device.firmware_version.clone(),
            default_state,
            boot_count,
            auth_timeout: config.timing.auth_timeout(),
            keepalive_interval: config.timing.keepalive_interval(),
            watchdog_timeout: config.timing.watchdog_timeout(),
            reconnect_interval: config.timing.reconnect_interval(),
            restart_grace: config.timing.restart_grace(),
            restart_poll_interval: Duration::from_millis(RESTART_POLL_INTERVAL_MS),
            restart_poll_samples: RESTART_POLL_SAMPLES,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_terminal_config(&TerminalConfig::default(), String::new(), AccessState::Idle, 0)
    }
}

/// Connection and authorization state of one terminal.
#[derive(Debug)]
pub struct AuthCoordinator {
    config: CoordinatorConfig,
    state: ConnectivityState,
    pending: Option<PendingAuthorization>,
    /// Still waiting on the first backend contact since boot.
    awaiting_first_contact: bool,
    boot_reported: bool,
    successive_failures: u32,
    next_seq: u64,
    last_reportable: Option<AccessState>,
    pending_update: Option<String>,
    restart_samples_left: u32,
    last_inbound: Option<Instant>,
}

impl AuthCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            state: ConnectivityState::Offline,
            pending: None,
            awaiting_first_contact: true,
            boot_reported: false,
            successive_failures: 0,
            next_seq: 0,
            last_reportable: None,
            pending_update: None,
            restart_samples_left: 0,
            last_inbound: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingAuthorization> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn successive_failures(&self) -> u32 {
        self.successive_failures
    }

    #[must_use]
    pub fn awaiting_first_contact(&self) -> bool {
        self.awaiting_first_contact
    }

    #[must_use]
    pub fn pending_update(&self) -> Option<&str> {
        self.pending_update.as_deref()
    }

    #[must_use]
    pub fn last_inbound(&self) -> Option<Instant> {
        self.last_inbound
    }

    /// Arm the first-contact timeout. Call once at boot.
    pub fn boot(&mut self) -> Vec<CoordinatorAction> {
        debug!(timeout = ?self.config.auth_timeout, "waiting for first backend contact");
        vec![CoordinatorAction::StartTimer(
            NetTimer::AuthTimeout,
            self.config.auth_timeout,
        )]
    }

    pub fn handle(&mut self, event: CoordinatorEvent, now: Instant) -> Vec<CoordinatorAction> {
        match event {
            CoordinatorEvent::TransportUp => self.on_transport_up(),
            CoordinatorEvent::TransportDown => self.on_transport_down(),
            CoordinatorEvent::TryConnect => self.on_try_connect(),
            CoordinatorEvent::ConnectFailed(reason) => {
                self.successive_failures += 1;
                warn!(
                    failures = self.successive_failures,
                    %reason,
                    "could not connect to backend"
                );
                Vec::new()
            }
            CoordinatorEvent::SessionOpened => self.on_session_opened(),
            CoordinatorEvent::SessionDown(reason) => self.go_offline("session down", &reason),
            CoordinatorEvent::WatchdogExpired => self.go_offline("watchdog expired", "silence"),
            CoordinatorEvent::Inbound(directives) => self.on_inbound(directives, now),
            CoordinatorEvent::AuthTimeout => self.on_auth_timeout(),
            CoordinatorEvent::KeepaliveTick { state, temperature } => {
                self.on_keepalive(state, temperature)
            }
            CoordinatorEvent::RestartPoll { button_held } => self.on_restart_poll(button_held),
            CoordinatorEvent::RestartGraceElapsed => {
                info!("restart grace elapsed, rebooting");
                vec![CoordinatorAction::Reboot]
            }
            CoordinatorEvent::Request(request) => self.on_request(request, now),
        }
    }

    fn on_transport_up(&mut self) -> Vec<CoordinatorAction> {
        info!("transport up");
        self.state = ConnectivityState::ConnectingTransport;
        vec![
            CoordinatorAction::StartTimer(NetTimer::Reconnect, self.config.reconnect_interval),
            CoordinatorAction::Connect,
        ]
    }

    fn on_transport_down(&mut self) -> Vec<CoordinatorAction> {
        warn!("transport down");
        let was_online = self.is_online();
        self.state = ConnectivityState::Offline;
        let mut actions = vec![
            CoordinatorAction::StopTimer(NetTimer::Reconnect),
            CoordinatorAction::StopTimer(NetTimer::Keepalive),
            CoordinatorAction::StopTimer(NetTimer::Watchdog),
            CoordinatorAction::Disconnect,
        ];
        if was_online {
            actions.push(CoordinatorAction::SetOnline(false));
        }
        actions
    }

    fn on_try_connect(&mut self) -> Vec<CoordinatorAction> {
        match self.state {
            ConnectivityState::Offline | ConnectivityState::ConnectingTransport => {
                debug!(failures = self.successive_failures, "trying to connect");
                self.state = ConnectivityState::ConnectingTransport;
                vec![CoordinatorAction::Connect]
            }
            _ => Vec::new(),
        }
    }

    fn on_session_opened(&mut self) -> Vec<CoordinatorAction> {
        self.state = ConnectivityState::AwaitingHandshake;
        self.next_seq = 0;

        let mut request = vec!["Time".to_string()];
        if self.awaiting_first_contact {
            request.push("State".to_string());
            request.push("OTATag".to_string());
        }
        let handshake = Handshake {
            serial_number: self.config.serial_number.clone(),
            key: self.config.key.clone(),
            hardware_type: acs_core::constants::HARDWARE_TYPE.to_string(),
            hardware_version: self.config.hardware_version.clone(),
            software_version: acs_core::VERSION.to_string(),
            firmware_version: self.config.firmware_version.clone(),
            request,
        };
        info!(serial = %self.config.serial_number, "session opened, sending handshake");

        vec![
            self.send(OutboundBody::Handshake(handshake)),
            CoordinatorAction::StartTimer(NetTimer::Watchdog, self.config.watchdog_timeout),
        ]
    }

    fn go_offline(&mut self, what: &str, reason: &str) -> Vec<CoordinatorAction> {
        let was_online = self.is_online();
        self.successive_failures += 1;
        self.state = ConnectivityState::Offline;
        warn!(failures = self.successive_failures, %reason, "{what}, going offline");

        let mut actions = vec![
            CoordinatorAction::StopTimer(NetTimer::Keepalive),
            CoordinatorAction::StopTimer(NetTimer::Watchdog),
            CoordinatorAction::Disconnect,
            CoordinatorAction::StartTimer(NetTimer::Reconnect, self.config.reconnect_interval),
        ];
        if was_online {
            actions.push(CoordinatorAction::SetOnline(false));
        }
        actions
    }

    fn on_inbound(&mut self, directives: Vec<Directive>, now: Instant) -> Vec<CoordinatorAction> {
        self.last_inbound = Some(now);
        let mut actions = vec![CoordinatorAction::StartTimer(
            NetTimer::Watchdog,
            self.config.watchdog_timeout,
        )];

        if !self.is_online() {
            actions.extend(self.on_session_ready());
        }
        for directive in directives {
            actions.extend(self.on_directive(directive));
        }
        actions
    }

    fn on_session_ready(&mut self) -> Vec<CoordinatorAction> {
        info!(failures = self.successive_failures, "backend answered, online");
        self.state = ConnectivityState::Online;
        self.successive_failures = 0;
        self.awaiting_first_contact = false;

        let mut actions = vec![
            CoordinatorAction::StopTimer(NetTimer::Reconnect),
            CoordinatorAction::SetOnline(true),
            CoordinatorAction::StartTimer(NetTimer::Keepalive, self.config.keepalive_interval),
        ];
        if !self.boot_reported {
            self.boot_reported = true;
            let report = format!("Booted (boot #{})", self.config.boot_count);
            actions.push(self.send(OutboundBody::message(report)));
        }
        actions
    }

    fn on_directive(&mut self, directive: Directive) -> Vec<CoordinatorAction> {
        match directive {
            Directive::SetState(target) => {
                info!(state = %target, "backend commanded state");
                let mut actions = vec![CoordinatorAction::Deliver(TerminalCommand::commanded(
                    target,
                ))];
                if target == AccessState::Restart {
                    self.restart_samples_left = self.config.restart_poll_samples;
                    actions.push(CoordinatorAction::StartTimer(
                        NetTimer::RestartPoll,
                        self.config.restart_poll_interval,
                    ));
                }
                actions
            }
            Directive::AuthReply {
                credential,
                verified,
                error,
            } => self.on_auth_reply(credential, verified, error),
            Directive::Identify => vec![CoordinatorAction::Deliver(TerminalCommand::Identify)],
            Directive::StoreTone(tone) => {
                debug!(notes = tone.notes.len(), "storing custom tone");
                vec![CoordinatorAction::StoreTone(tone)]
            }
            Directive::PlayTone => vec![CoordinatorAction::PlayTone],
            Directive::FirmwareUpdate(tag) => {
                if tag == self.config.firmware_version {
                    debug!(%tag, "already running requested firmware");
                    return Vec::new();
                }
                if self.pending_update.as_deref() == Some(tag.as_str()) {
                    debug!(%tag, "firmware update already in progress");
                    return Vec::new();
                }
                info!(%tag, running = %self.config.firmware_version, "firmware update requested");
                self.pending_update = Some(tag.clone());
                vec![CoordinatorAction::BeginFirmwareUpdate(tag)]
            }
        }
    }

    fn on_auth_reply(
        &mut self,
        credential: Option<CredentialId>,
        verified: bool,
        error: Option<String>,
    ) -> Vec<CoordinatorAction> {
        let Some(pending) = self.pending.take() else {
            warn!(?credential, "authorization reply with nothing outstanding, denying");
            return vec![CoordinatorAction::Deliver(TerminalCommand::Deny)];
        };

        let mut actions = vec![CoordinatorAction::StopTimer(NetTimer::AuthTimeout)];
        if credential != Some(pending.requester) {
            warn!(
                expected = %pending.requester,
                ?credential,
                "authorization reply for another credential, denying"
            );
            actions.push(CoordinatorAction::Deliver(TerminalCommand::Deny));
            return actions;
        }

        if verified {
            info!(credential = %pending.requester, target = %pending.target, "authorization granted");
            actions.push(CoordinatorAction::Deliver(TerminalCommand::CommandState {
                target: pending.target,
                requested: true,
            }));
        } else {
            info!(
                credential = %pending.requester,
                error = error.as_deref().unwrap_or(""),
                "authorization refused"
            );
            actions.push(CoordinatorAction::Deliver(TerminalCommand::Deny));
        }
        actions
    }

    fn on_auth_timeout(&mut self) -> Vec<CoordinatorAction> {
        if self.awaiting_first_contact {
            self.awaiting_first_contact = false;
            self.pending = None;
            warn!(state = %self.config.default_state, "no backend contact since boot, using default state");
            return vec![CoordinatorAction::Deliver(TerminalCommand::commanded(
                self.config.default_state,
            ))];
        }
        match self.pending.take() {
            Some(pending) => {
                warn!(credential = %pending.requester, "authorization timed out, denying");
                vec![CoordinatorAction::Deliver(TerminalCommand::Deny)]
            }
            None => Vec::new(),
        }
    }

    fn on_keepalive(&mut self, state: AccessState, temperature: f32) -> Vec<CoordinatorAction> {
        if state.is_reportable() {
            self.last_reportable = Some(state);
        }
        if !self.is_online() {
            return Vec::new();
        }
        let Some(reported) = self.last_reportable else {
            debug!(%state, "no reportable state yet, skipping keepalive");
            return Vec::new();
        };
        vec![self.send(OutboundBody::Status(StatusReport {
            state: reported,
            temperature,
            pending_update: self.pending_update.clone(),
        }))]
    }

    fn on_restart_poll(&mut self, button_held: bool) -> Vec<CoordinatorAction> {
        if self.restart_samples_left == 0 {
            return vec![CoordinatorAction::StopTimer(NetTimer::RestartPoll)];
        }
        if !button_held {
            self.restart_samples_left = 0;
            info!("button free, rebooting on backend command");
            return vec![
                CoordinatorAction::StopTimer(NetTimer::RestartPoll),
                CoordinatorAction::Reboot,
            ];
        }
        self.restart_samples_left -= 1;
        if self.restart_samples_left > 0 {
            return Vec::new();
        }
        warn!("button held through restart window, faulting");
        vec![
            CoordinatorAction::StopTimer(NetTimer::RestartPoll),
            CoordinatorAction::Deliver(TerminalCommand::commanded(AccessState::Fault)),
        ]
    }

    fn on_request(&mut self, request: TerminalRequest, now: Instant) -> Vec<CoordinatorAction> {
        match request {
            TerminalRequest::Authorize(AuthorizationRequest { requester, target }) => {
                if let Some(previous) = self.pending.replace(PendingAuthorization {
                    requester,
                    target,
                    issued_at: now,
                }) {
                    debug!(replaced = %previous.requester, "replacing outstanding authorization");
                }
                let mut actions = vec![CoordinatorAction::StartTimer(
                    NetTimer::AuthTimeout,
                    self.config.auth_timeout,
                )];
                if self.is_online() {
                    actions.push(self.send(OutboundBody::auth(requester, target)));
                } else {
                    debug!(credential = %requester, "offline, authorization will time out");
                }
                actions
            }
            TerminalRequest::Report(report) => {
                if report.to.is_reportable() {
                    self.last_reportable = Some(report.to);
                }
                if !self.is_online() {
                    debug!(%report, "offline, dropping state report");
                    return Vec::new();
                }
                vec![self.send(OutboundBody::message(report.to_string()))]
            }
            TerminalRequest::PleaseRestart => {
                info!(grace = ?self.config.restart_grace, "restart requested");
                vec![CoordinatorAction::StartTimer(
                    NetTimer::RestartGrace,
                    self.config.restart_grace,
                )]
            }
        }
    }

    fn send(&mut self, body: OutboundBody) -> CoordinatorAction {
        let seq = self.next_seq;
        self.next_seq += 1;
        CoordinatorAction::Send(Outbound::new(seq, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_core::{StateChangeReason, StateChangeReport};
    use rstest::rstest;

    fn card(byte: u8) -> CredentialId {
        CredentialId::new(&[byte, 0x22, 0x33, 0x44]).unwrap()
    }

    fn coordinator() -> AuthCoordinator {
        AuthCoordinator::new(CoordinatorConfig {
            serial_number: "serial".to_string(),
            key: "key".to_string(),
            firmware_version: "2.4.1".to_string(),
            boot_count: 7,
            default_state: AccessState::Lockout,
            ..CoordinatorConfig::default()
        })
    }

    fn online() -> (AuthCoordinator, Instant) {
        let now = Instant::now();
        let mut c = coordinator();
        c.boot();
        c.handle(CoordinatorEvent::TransportUp, now);
        c.handle(CoordinatorEvent::SessionOpened, now);
        c.handle(CoordinatorEvent::Inbound(vec![]), now);
        assert!(c.is_online());
        (c, now)
    }

    fn sent(actions: &[CoordinatorAction]) -> Vec<&Outbound> {
        actions
            .iter()
            .filter_map(|a| match a {
                CoordinatorAction::Send(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    fn delivered(actions: &[CoordinatorAction]) -> Vec<&TerminalCommand> {
        actions
            .iter()
            .filter_map(|a| match a {
                CoordinatorAction::Deliver(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    fn authorize(
        c: &mut AuthCoordinator,
        requester: CredentialId,
        target: AccessState,
    ) -> Vec<CoordinatorAction> {
        c.handle(
            CoordinatorEvent::Request(TerminalRequest::Authorize(AuthorizationRequest {
                requester,
                target,
            })),
            Instant::now(),
        )
    }

    fn reply(credential: Option<CredentialId>, verified: bool) -> CoordinatorEvent {
        CoordinatorEvent::Inbound(vec![Directive::AuthReply {
            credential,
            verified,
            error: None,
        }])
    }

    #[test]
    fn test_boot_arms_first_contact_timeout() {
        let mut c = coordinator();
        let actions = c.boot();
        assert!(matches!(
            actions[..],
            [CoordinatorAction::StartTimer(NetTimer::AuthTimeout, _)]
        ));
        assert!(c.awaiting_first_contact());
        assert_eq!(c.state(), ConnectivityState::Offline);
    }

    #[test]
    fn test_transport_up_connects_and_arms_reconnect() {
        let mut c = coordinator();
        let actions = c.handle(CoordinatorEvent::TransportUp, Instant::now());
        assert_eq!(c.state(), ConnectivityState::ConnectingTransport);
        assert!(actions.contains(&CoordinatorAction::Connect));
        assert!(matches!(
            actions[0],
            CoordinatorAction::StartTimer(NetTimer::Reconnect, _)
        ));
    }

    #[test]
    fn test_handshake_requests_state_on_first_contact() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(CoordinatorEvent::TransportUp, now);
        let actions = c.handle(CoordinatorEvent::SessionOpened, now);

        assert_eq!(c.state(), ConnectivityState::AwaitingHandshake);
        let records = sent(&actions);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seq, 0);
        let OutboundBody::Handshake(handshake) = &records[0].body else {
            panic!("expected handshake, got {:?}", records[0].body);
        };
        assert_eq!(handshake.serial_number, "serial");
        assert_eq!(handshake.hardware_type, "Core");
        assert_eq!(handshake.firmware_version, "2.4.1");
        assert_eq!(handshake.request, vec!["Time", "State", "OTATag"]);
        assert!(actions.contains(&CoordinatorAction::StartTimer(
            NetTimer::Watchdog,
            c.config.watchdog_timeout
        )));
    }

    #[test]
    fn test_later_handshake_requests_only_time() {
        let (mut c, now) = online();
        c.handle(CoordinatorEvent::SessionDown("reset".into()), now);
        let actions = c.handle(CoordinatorEvent::SessionOpened, now);

        let OutboundBody::Handshake(handshake) = &sent(&actions)[0].body else {
            panic!("expected handshake");
        };
        assert_eq!(handshake.request, vec!["Time"]);
    }

    #[test]
    fn test_first_inbound_goes_online_and_reports_boot_once() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(CoordinatorEvent::TransportUp, now);
        c.handle(CoordinatorEvent::ConnectFailed("refused".into()), now);
        assert_eq!(c.successive_failures(), 1);
        c.handle(CoordinatorEvent::SessionOpened, now);

        let actions = c.handle(CoordinatorEvent::Inbound(vec![]), now);
        assert!(c.is_online());
        assert_eq!(c.successive_failures(), 0);
        assert!(!c.awaiting_first_contact());
        assert_eq!(c.last_inbound(), Some(now));
        assert!(actions.contains(&CoordinatorAction::SetOnline(true)));
        assert!(actions.contains(&CoordinatorAction::StopTimer(NetTimer::Reconnect)));
        assert!(actions.contains(&CoordinatorAction::StartTimer(
            NetTimer::Keepalive,
            c.config.keepalive_interval
        )));
        let records = sent(&actions);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[0].body, OutboundBody::message("Booted (boot #7)"));

        // A reconnect does not repeat the boot report.
        c.handle(CoordinatorEvent::SessionDown("reset".into()), now);
        c.handle(CoordinatorEvent::SessionOpened, now);
        let actions = c.handle(CoordinatorEvent::Inbound(vec![]), now);
        assert!(sent(&actions).is_empty());
    }

    #[test]
    fn test_every_inbound_resets_watchdog() {
        let (mut c, now) = online();
        let actions = c.handle(CoordinatorEvent::Inbound(vec![]), now);
        assert_eq!(
            actions,
            vec![CoordinatorAction::StartTimer(
                NetTimer::Watchdog,
                c.config.watchdog_timeout
            )]
        );
    }

    #[rstest]
    #[case(CoordinatorEvent::WatchdogExpired)]
    #[case(CoordinatorEvent::SessionDown("reset by peer".into()))]
    fn test_session_loss_goes_offline(#[case] event: CoordinatorEvent) {
        let (mut c, now) = online();
        let actions = c.handle(event, now);

        assert_eq!(c.state(), ConnectivityState::Offline);
        assert_eq!(c.successive_failures(), 1);
        assert!(actions.contains(&CoordinatorAction::Disconnect));
        assert!(actions.contains(&CoordinatorAction::SetOnline(false)));
        assert!(actions.contains(&CoordinatorAction::StopTimer(NetTimer::Keepalive)));
        assert!(actions.contains(&CoordinatorAction::StartTimer(
            NetTimer::Reconnect,
            c.config.reconnect_interval
        )));

        let retry = c.handle(CoordinatorEvent::TryConnect, now);
        assert_eq!(retry, vec![CoordinatorAction::Connect]);
        assert_eq!(c.state(), ConnectivityState::ConnectingTransport);
    }

    #[test]
    fn test_try_connect_ignored_while_session_open() {
        let (mut c, now) = online();
        assert!(c.handle(CoordinatorEvent::TryConnect, now).is_empty());
    }

    #[test]
    fn test_transport_down_stops_everything() {
        let (mut c, now) = online();
        let actions = c.handle(CoordinatorEvent::TransportDown, now);
        assert_eq!(c.state(), ConnectivityState::Offline);
        assert!(actions.contains(&CoordinatorAction::StopTimer(NetTimer::Reconnect)));
        assert!(actions.contains(&CoordinatorAction::Disconnect));
        assert!(actions.contains(&CoordinatorAction::SetOnline(false)));
    }

    #[test]
    fn test_auth_round_trip_granted() {
        let (mut c, now) = online();
        let actions = authorize(&mut c, card(1), AccessState::Unlocked);

        assert!(actions.contains(&CoordinatorAction::StartTimer(
            NetTimer::AuthTimeout,
            c.config.auth_timeout
        )));
        let records = sent(&actions);
        assert_eq!(records[0].body, OutboundBody::auth(card(1), AccessState::Unlocked));
        assert_eq!(c.pending().unwrap().target, AccessState::Unlocked);

        let actions = c.handle(reply(Some(card(1)), true), now);
        assert!(actions.contains(&CoordinatorAction::StopTimer(NetTimer::AuthTimeout)));
        assert_eq!(
            delivered(&actions),
            vec![&TerminalCommand::CommandState {
                target: AccessState::Unlocked,
                requested: true
            }]
        );
        assert!(c.pending().is_none());
    }

    #[test]
    fn test_auth_round_trip_refused() {
        let (mut c, now) = online();
        authorize(&mut c, card(1), AccessState::Unlocked);
        let actions = c.handle(reply(Some(card(1)), false), now);
        assert_eq!(delivered(&actions), vec![&TerminalCommand::Deny]);
        assert!(c.pending().is_none());
    }

    #[rstest]
    #[case::other_credential(Some(card(9)))]
    #[case::unparseable(None)]
    fn test_mismatched_reply_denies(#[case] credential: Option<CredentialId>) {
        let (mut c, now) = online();
        authorize(&mut c, card(1), AccessState::Unlocked);
        let actions = c.handle(reply(credential, true), now);
        assert_eq!(delivered(&actions), vec![&TerminalCommand::Deny]);
        assert!(c.pending().is_none());
    }

    #[test]
    fn test_reply_with_nothing_outstanding_denies() {
        let (mut c, now) = online();
        let actions = c.handle(reply(Some(card(1)), true), now);
        assert_eq!(delivered(&actions), vec![&TerminalCommand::Deny]);
    }

    #[test]
    fn test_second_request_replaces_first() {
        let (mut c, now) = online();
        authorize(&mut c, card(1), AccessState::Unlocked);
        authorize(&mut c, card(2), AccessState::Lockout);

        let pending = c.pending().unwrap();
        assert_eq!(pending.requester, card(2));
        assert_eq!(pending.target, AccessState::Lockout);

        let actions = c.handle(reply(Some(card(2)), true), now);
        assert_eq!(
            delivered(&actions),
            vec![&TerminalCommand::CommandState {
                target: AccessState::Lockout,
                requested: true
            }]
        );
    }

    #[test]
    fn test_first_contact_timeout_commands_default_state() {
        let mut c = coordinator();
        c.boot();
        authorize(&mut c, card(1), AccessState::Unlocked);
        let actions = c.handle(CoordinatorEvent::AuthTimeout, Instant::now());
        assert_eq!(
            delivered(&actions),
            vec![&TerminalCommand::commanded(AccessState::Lockout)]
        );
        assert!(!c.awaiting_first_contact());
        assert!(c.pending().is_none());

        // Only the first timeout falls back.
        assert!(c.handle(CoordinatorEvent::AuthTimeout, Instant::now()).is_empty());
    }

    #[test]
    fn test_later_timeout_denies() {
        let (mut c, now) = online();
        authorize(&mut c, card(1), AccessState::Unlocked);
        let actions = c.handle(CoordinatorEvent::AuthTimeout, now);
        assert_eq!(delivered(&actions), vec![&TerminalCommand::Deny]);
        assert!(c.pending().is_none());
    }

    #[test]
    fn test_offline_authorization_is_not_sent_and_times_out() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(CoordinatorEvent::AuthTimeout, now);

        let actions = authorize(&mut c, card(1), AccessState::Unlocked);
        assert!(sent(&actions).is_empty());
        let actions = c.handle(CoordinatorEvent::AuthTimeout, now);
        assert_eq!(delivered(&actions), vec![&TerminalCommand::Deny]);
    }

    #[test]
    fn test_keepalive_reports_last_reportable_state() {
        let (mut c, now) = online();

        let actions = c.handle(
            CoordinatorEvent::KeepaliveTick {
                state: AccessState::Idle,
                temperature: 21.5,
            },
            now,
        );
        assert_eq!(
            sent(&actions)[0].body,
            OutboundBody::Status(StatusReport {
                state: AccessState::Idle,
                temperature: 21.5,
                pending_update: None
            })
        );

        let actions = c.handle(
            CoordinatorEvent::KeepaliveTick {
                state: AccessState::AwaitAuth,
                temperature: 22.0,
            },
            now,
        );
        let OutboundBody::Status(status) = &sent(&actions)[0].body else {
            panic!("expected status");
        };
        assert_eq!(status.state, AccessState::Idle);
    }

    #[test]
    fn test_keepalive_skipped_without_reportable_state() {
        let (mut c, now) = online();
        let actions = c.handle(
            CoordinatorEvent::KeepaliveTick {
                state: AccessState::Startup,
                temperature: 20.0,
            },
            now,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_report_forwarded_as_message_and_remembered() {
        let (mut c, now) = online();
        let report = StateChangeReport::new(
            AccessState::AwaitAuth,
            AccessState::Unlocked,
            StateChangeReason::CredentialActivated,
        )
        .with_who(Some(card(1)));
        let actions = c.handle(CoordinatorEvent::Request(TerminalRequest::Report(report)), now);
        assert_eq!(
            sent(&actions)[0].body,
            OutboundBody::message(
                "Changed state from AwaitAuth -> Unlocked (credential activated) by 01223344"
            )
        );

        let actions = c.handle(
            CoordinatorEvent::KeepaliveTick {
                state: AccessState::IdleWaiting,
                temperature: 20.0,
            },
            now,
        );
        let OutboundBody::Status(status) = &sent(&actions)[0].body else {
            panic!("expected status");
        };
        assert_eq!(status.state, AccessState::Unlocked);
    }

    #[test]
    fn test_reports_dropped_while_offline() {
        let mut c = coordinator();
        let report = StateChangeReport::new(
            AccessState::Idle,
            AccessState::Fault,
            StateChangeReason::CardSwitch,
        );
        let actions = c.handle(
            CoordinatorEvent::Request(TerminalRequest::Report(report)),
            Instant::now(),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_seq_increments_and_resets_per_session() {
        let (mut c, now) = online();
        let report = |to| {
            TerminalRequest::Report(StateChangeReport::new(
                AccessState::Idle,
                to,
                StateChangeReason::ServerCommanded,
            ))
        };
        let a = c.handle(CoordinatorEvent::Request(report(AccessState::Lockout)), now);
        let b = c.handle(CoordinatorEvent::Request(report(AccessState::Idle)), now);
        assert_eq!(sent(&a)[0].seq + 1, sent(&b)[0].seq);

        c.handle(CoordinatorEvent::SessionDown("reset".into()), now);
        let actions = c.handle(CoordinatorEvent::SessionOpened, now);
        assert_eq!(sent(&actions)[0].seq, 0);
    }

    #[test]
    fn test_directives_are_handled_independently() {
        let (mut c, now) = online();
        let tone = Tone {
            notes: vec![(440, 100).into()],
        };
        let actions = c.handle(
            CoordinatorEvent::Inbound(vec![
                Directive::SetState(AccessState::AlwaysOn),
                Directive::Identify,
                Directive::StoreTone(tone.clone()),
                Directive::PlayTone,
            ]),
            now,
        );
        assert_eq!(
            delivered(&actions),
            vec![
                &TerminalCommand::commanded(AccessState::AlwaysOn),
                &TerminalCommand::Identify
            ]
        );
        assert!(actions.contains(&CoordinatorAction::StoreTone(tone)));
        assert!(actions.contains(&CoordinatorAction::PlayTone));
    }

    #[test]
    fn test_firmware_update_only_for_new_tag() {
        let (mut c, now) = online();
        let same = c.handle(
            CoordinatorEvent::Inbound(vec![Directive::FirmwareUpdate("2.4.1".into())]),
            now,
        );
        assert!(!same.iter().any(|a| matches!(a, CoordinatorAction::BeginFirmwareUpdate(_))));

        let new = c.handle(
            CoordinatorEvent::Inbound(vec![Directive::FirmwareUpdate("2.5.0".into())]),
            now,
        );
        assert!(new.contains(&CoordinatorAction::BeginFirmwareUpdate("2.5.0".into())));
        assert_eq!(c.pending_update(), Some("2.5.0"));

        let actions = c.handle(
            CoordinatorEvent::KeepaliveTick {
                state: AccessState::Idle,
                temperature: 20.0,
            },
            now,
        );
        let OutboundBody::Status(status) = &sent(&actions)[0].body else {
            panic!("expected status");
        };
        assert_eq!(status.pending_update.as_deref(), Some("2.5.0"));
    }

    #[test]
    fn test_remote_restart_reboots_when_button_free() {
        let (mut c, now) = online();
        let actions = c.handle(
            CoordinatorEvent::Inbound(vec![Directive::SetState(AccessState::Restart)]),
            now,
        );
        assert_eq!(
            delivered(&actions),
            vec![&TerminalCommand::commanded(AccessState::Restart)]
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::StartTimer(NetTimer::RestartPoll, _)
        )));

        assert!(c.handle(CoordinatorEvent::RestartPoll { button_held: true }, now).is_empty());
        let actions = c.handle(CoordinatorEvent::RestartPoll { button_held: false }, now);
        assert!(actions.contains(&CoordinatorAction::Reboot));
    }

    #[test]
    fn test_remote_restart_faults_when_button_held_throughout() {
        let mut c = AuthCoordinator::new(CoordinatorConfig {
            restart_poll_samples: 3,
            ..CoordinatorConfig::default()
        });
        let now = Instant::now();
        c.handle(
            CoordinatorEvent::Inbound(vec![Directive::SetState(AccessState::Restart)]),
            now,
        );

        assert!(c.handle(CoordinatorEvent::RestartPoll { button_held: true }, now).is_empty());
        assert!(c.handle(CoordinatorEvent::RestartPoll { button_held: true }, now).is_empty());
        let actions = c.handle(CoordinatorEvent::RestartPoll { button_held: true }, now);
        assert_eq!(
            delivered(&actions),
            vec![&TerminalCommand::commanded(AccessState::Fault)]
        );
        assert!(actions.contains(&CoordinatorAction::StopTimer(NetTimer::RestartPoll)));
        assert!(!actions.contains(&CoordinatorAction::Reboot));
    }

    #[test]
    fn test_local_restart_waits_for_grace() {
        let mut c = coordinator();
        let now = Instant::now();
        let actions = c.handle(CoordinatorEvent::Request(TerminalRequest::PleaseRestart), now);
        assert_eq!(
            actions,
            vec![CoordinatorAction::StartTimer(
                NetTimer::RestartGrace,
                c.config.restart_grace
            )]
        );
        assert_eq!(
            c.handle(CoordinatorEvent::RestartGraceElapsed, now),
            vec![CoordinatorAction::Reboot]
        );
    }

    #[test]
    fn test_timer_periodicity() {
        assert!(NetTimer::Keepalive.is_periodic());
        assert!(NetTimer::Reconnect.is_periodic());
        assert!(NetTimer::RestartPoll.is_periodic());
        assert!(!NetTimer::AuthTimeout.is_periodic());
        assert!(!NetTimer::Watchdog.is_periodic());
        assert!(!NetTimer::RestartGrace.is_periodic());
    }
}
