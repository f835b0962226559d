//! Async driver for the [`AuthCoordinator`].
//!
//! [`NetworkSession`] owns the transport, the coordinator and the
//! coordinator's timers. It waits on three sources at once (requests from the
//! access state machine, timer firings, inbound lines) and runs each event
//! through the coordinator, executing the returned actions in order. Actions
//! whose outcome is itself an event (a connect attempt, a failed send) feed a
//! local work queue that is drained before the next wait.
//!
//! Everything the session needs from the rest of the terminal goes through
//! [`DeviceServices`], so the session never touches the state machine's
//! thread or the hardware directly.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Instant;

use acs_core::constants::NETWORK_QUEUE_CAPACITY;
use acs_core::{AccessState, TerminalCommand, TerminalRequest, TimerFired, TimerService, Tone};
use acs_protocol::Inbound;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{TcpClient, TcpClientConfig, TcpClientError};
use crate::coordinator::{
    AuthCoordinator, CoordinatorAction, CoordinatorConfig, CoordinatorEvent, NetTimer,
};

/// Terminal state sampled for a keepalive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalSnapshot {
    pub state: AccessState,
    pub temperature: f32,
}

/// The terminal as seen from the network session.
///
/// Implementations log their own failures; the session treats every call as
/// fire-and-forget.
pub trait DeviceServices: Send + Sync + 'static {
    /// Current state and temperature, or `None` if they could not be read
    /// this cycle.
    fn snapshot(&self) -> impl Future<Output = Option<TerminalSnapshot>> + Send;

    fn button_held(&self) -> impl Future<Output = bool> + Send;

    /// Queue a command for the access state machine.
    fn deliver(&self, command: TerminalCommand) -> impl Future<Output = ()> + Send;

    fn store_tone(&self, tone: Tone) -> impl Future<Output = ()> + Send;

    fn play_tone(&self) -> impl Future<Output = ()> + Send;

    fn begin_firmware_update(&self, tag: String) -> impl Future<Output = ()> + Send;

    fn reboot(&self) -> impl Future<Output = ()> + Send;

    fn set_online(&self, online: bool) -> impl Future<Output = ()> + Send;
}

enum Wake {
    Request(Option<TerminalRequest>),
    Timer(TimerFired<NetTimer>),
    Inbound(Result<Inbound, TcpClientError>),
}

pub struct NetworkSession<S> {
    client: TcpClient,
    coordinator: AuthCoordinator,
    timers: TimerService<NetTimer, TimerFired<NetTimer>>,
    timer_rx: mpsc::Receiver<TimerFired<NetTimer>>,
    requests: mpsc::Receiver<TerminalRequest>,
    services: S,
}

impl<S: DeviceServices> NetworkSession<S> {
    pub fn new(
        client: TcpClientConfig,
        coordinator: CoordinatorConfig,
        requests: mpsc::Receiver<TerminalRequest>,
        services: S,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(NETWORK_QUEUE_CAPACITY);
        Self {
            client: TcpClient::new(client),
            coordinator: AuthCoordinator::new(coordinator),
            timers: TimerService::new(timer_tx),
            timer_rx,
            requests,
            services,
        }
    }

    /// Run until the request queue closes.
    pub async fn run(mut self) {
        info!(server = %self.client.server_addr(), "network session starting");
        let boot = self.coordinator.boot();
        for action in boot {
            self.execute(action).await;
        }
        self.process(CoordinatorEvent::TransportUp).await;

        loop {
            let wake = tokio::select! {
                request = self.requests.recv() => Wake::Request(request),
                Some(fired) = self.timer_rx.recv() => Wake::Timer(fired),
                inbound = self.client.recv(), if self.client.is_connected() => Wake::Inbound(inbound),
            };

            let event = match wake {
                Wake::Request(Some(request)) => CoordinatorEvent::Request(request),
                Wake::Request(None) => {
                    info!("request queue closed, stopping network session");
                    break;
                }
                Wake::Timer(fired) => {
                    if !self.timers.accept(&fired) {
                        continue;
                    }
                    match self.timer_event(fired.key).await {
                        Some(event) => event,
                        None => continue,
                    }
                }
                Wake::Inbound(Ok(Inbound::Record(directives))) => {
                    CoordinatorEvent::Inbound(directives)
                }
                Wake::Inbound(Ok(Inbound::Malformed(reason))) => {
                    warn!(%reason, "skipping malformed inbound line");
                    continue;
                }
                Wake::Inbound(Err(e)) => CoordinatorEvent::SessionDown(e.to_string()),
            };
            self.process(event).await;
        }

        if let Err(e) = self.client.close().await {
            warn!(error = %e, "error closing connection");
        }
    }

    async fn timer_event(&mut self, timer: NetTimer) -> Option<CoordinatorEvent> {
        let event = match timer {
            NetTimer::AuthTimeout => CoordinatorEvent::AuthTimeout,
            NetTimer::Keepalive => {
                let Some(snapshot) = self.services.snapshot().await else {
                    debug!("terminal snapshot unavailable, skipping keepalive");
                    return None;
                };
                CoordinatorEvent::KeepaliveTick {
                    state: snapshot.state,
                    temperature: snapshot.temperature,
                }
            }
            NetTimer::Watchdog => CoordinatorEvent::WatchdogExpired,
            NetTimer::Reconnect => CoordinatorEvent::TryConnect,
            NetTimer::RestartGrace => CoordinatorEvent::RestartGraceElapsed,
            NetTimer::RestartPoll => CoordinatorEvent::RestartPoll {
                button_held: self.services.button_held().await,
            },
        };
        Some(event)
    }

    async fn process(&mut self, event: CoordinatorEvent) {
        let mut work = VecDeque::from([event]);
        while let Some(event) = work.pop_front() {
            let actions = self.coordinator.handle(event, Instant::now());
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    work.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, action: CoordinatorAction) -> Option<CoordinatorEvent> {
        match action {
            CoordinatorAction::Connect => match self.client.connect().await {
                Ok(()) => return Some(CoordinatorEvent::SessionOpened),
                Err(e) => return Some(CoordinatorEvent::ConnectFailed(e.to_string())),
            },
            CoordinatorAction::Disconnect => {
                if let Err(e) = self.client.close().await {
                    warn!(error = %e, "error closing connection");
                }
            }
            CoordinatorAction::Send(record) => {
                if !self.client.is_connected() {
                    debug!(kind = record.body.kind(), "not connected, dropping record");
                    return None;
                }
                if let Err(e) = self.client.send(record).await {
                    return Some(CoordinatorEvent::SessionDown(e.to_string()));
                }
            }
            CoordinatorAction::StartTimer(timer, after) => {
                if timer.is_periodic() {
                    self.timers.start_periodic(timer, after);
                } else {
                    self.timers.start_once(timer, after);
                }
            }
            CoordinatorAction::StopTimer(timer) => self.timers.stop(timer),
            CoordinatorAction::Deliver(command) => self.services.deliver(command).await,
            CoordinatorAction::StoreTone(tone) => self.services.store_tone(tone).await,
            CoordinatorAction::PlayTone => self.services.play_tone().await,
            CoordinatorAction::BeginFirmwareUpdate(tag) => {
                self.services.begin_firmware_update(tag).await
            }
            CoordinatorAction::Reboot => self.services.reboot().await,
            CoordinatorAction::SetOnline(online) => self.services.set_online(online).await,
        }
        None
    }
}
