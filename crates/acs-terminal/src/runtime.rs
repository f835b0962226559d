//! Task wiring for a running terminal.
//!
//! [`Terminal::start`] spawns one task per component into a [`JoinSet`]:
//!
//! - presence polling (reader and tamper switches)
//! - button sampling
//! - temperature polling
//! - the state-machine dispatcher
//! - the network session
//!
//! The input tasks and the dispatcher's own timers feed one bounded
//! dispatch queue, so the state machine sees every event in a single FIFO
//! order. Requests for the backend leave through a second bounded queue.
//! Producers drop on a full queue after a short timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use acs_core::constants::{
    BUTTON_SAMPLE_INTERVAL_MS, EVENT_QUEUE_CAPACITY, NETWORK_QUEUE_CAPACITY, TEMPERATURE_POLL_MS,
};
use acs_core::queue::send_or_drop;
use acs_core::{
    AccessState, FaultReason, Result, TerminalCommand, TerminalConfig, TerminalRequest,
    TimerFired, TimerService, Tone,
};
use acs_hardware::{
    Actuator, Board, Button, CredentialReader, FirmwareUpdater, Indicator, Peripherals, Sounder,
    SystemControl, TamperSwitches, TemperatureSensor,
};
use acs_network::{
    CoordinatorConfig, DeviceServices, NetworkSession, TcpClientConfig, TerminalSnapshot,
};
use acs_storage::{DeviceSettings, SqliteSettingsRepository};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::button::ButtonClassifier;
use crate::presence::{CardPresenceMonitor, PollSample, PresenceEvent, ReadOutcome};
use crate::shared::SharedStatus;
use crate::state_machine::{
    AccessStateMachine, MachineEvent, MachineTimings, SideEffect, StateTimer,
};
use crate::temperature::TemperatureGuard;

const DISPATCH_QUEUE: &str = "dispatch";
const NETWORK_QUEUE: &str = "network";

/// Entry in the dispatcher's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Machine(MachineEvent),
    ForceFault(FaultReason),
    Timer(TimerFired<StateTimer>),
}

impl From<TimerFired<StateTimer>> for DispatchEvent {
    fn from(fired: TimerFired<StateTimer>) -> Self {
        DispatchEvent::Timer(fired)
    }
}

/// Settings resolved at boot from the config file and the settings store.
#[derive(Debug, Clone, PartialEq)]
struct BootSettings {
    boot_count: u32,
    default_state: AccessState,
    max_temperature: f32,
    server_addr: SocketAddr,
    server_key: String,
}

impl BootSettings {
    /// Storage failures fall back to the configured or built-in defaults.
    async fn load(
        config: &TerminalConfig,
        settings: &DeviceSettings<SqliteSettingsRepository>,
    ) -> Result<Self> {
        let boot_count = settings.increment_boot_count().await.unwrap_or_else(|e| {
            warn!(error = %e, "boot counter unavailable");
            0
        });
        let default_state = settings.default_state().await.unwrap_or_else(|e| {
            warn!(error = %e, "stored default state unusable, using Idle");
            AccessState::Idle
        });
        let max_temperature = match settings.max_temperature().await {
            Ok(celsius) => celsius,
            Err(e) => {
                warn!(error = %e, "stored max temperature unusable, using default");
                acs_core::constants::DEFAULT_MAX_TEMPERATURE_C
            }
        };

        let mut server_addr = config.server.socket_addr()?;
        match settings.server_address().await {
            Ok(Some(stored)) => match stored.parse() {
                Ok(addr) => server_addr = addr,
                Err(e) => warn!(address = %stored, error = %e, "stored server address ignored"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "stored server address unavailable"),
        }
        let server_key = match settings.server_key().await {
            Ok(Some(key)) => key,
            Ok(None) => config.server.key.clone(),
            Err(e) => {
                warn!(error = %e, "stored server key unavailable");
                config.server.key.clone()
            }
        };

        Ok(Self {
            boot_count,
            default_state,
            max_temperature,
            server_addr,
            server_key,
        })
    }
}

/// A terminal ready to be started on one board.
pub struct Terminal<B: Board> {
    config: TerminalConfig,
    peripherals: Peripherals<B>,
    settings: DeviceSettings<SqliteSettingsRepository>,
}

impl<B: Board> Terminal<B> {
    pub fn new(
        config: TerminalConfig,
        peripherals: Peripherals<B>,
        settings: DeviceSettings<SqliteSettingsRepository>,
    ) -> Self {
        Self {
            config,
            peripherals,
            settings,
        }
    }

    /// Count the boot, resolve settings and spawn every task.
    ///
    /// # Errors
    /// Returns `Error::Config` if no usable server address is configured.
    pub async fn start(self) -> Result<TerminalHandle> {
        let Self {
            config,
            peripherals,
            settings,
        } = self;
        let boot = BootSettings::load(&config, &settings).await?;
        info!(
            boot = boot.boot_count,
            default_state = %boot.default_state,
            server = %boot.server_addr,
            "terminal starting"
        );

        let status = Arc::new(SharedStatus::new());
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (requests_tx, requests_rx) = mpsc::channel(NETWORK_QUEUE_CAPACITY);
        let (require_both_tx, require_both_rx) = watch::channel(true);
        let sounder = Arc::new(peripherals.sounder);

        let dispatcher = Dispatcher {
            machine: AccessStateMachine::new(MachineTimings::from(&config.timing)),
            timers: TimerService::new(events_tx.clone()),
            events: events_rx,
            actuator: peripherals.actuator,
            indicator: peripherals.indicator,
            sounder: sounder.clone(),
            require_both: require_both_tx,
            requests: requests_tx,
            status: status.clone(),
        };

        let services = TerminalServices {
            events: events_tx.clone(),
            status: status.clone(),
            settings,
            sounder,
            updater: peripherals.updater,
            system: peripherals.system,
        };
        let session = NetworkSession::new(
            TcpClientConfig {
                server_addr: boot.server_addr,
                timeout: config.timing.transport_timeout(),
            },
            CoordinatorConfig::from_terminal_config(
                &config,
                boot.server_key,
                boot.default_state,
                u64::from(boot.boot_count),
            ),
            requests_rx,
            services,
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(dispatcher.run());
        tasks.spawn(session.run());
        tasks.spawn(presence_task(
            peripherals.reader,
            peripherals.switches,
            require_both_rx,
            events_tx.clone(),
            status.clone(),
        ));
        tasks.spawn(button_task(
            peripherals.button,
            events_tx.clone(),
            status.clone(),
        ));
        tasks.spawn(temperature_task(
            peripherals.thermometer,
            TemperatureGuard::new(boot.max_temperature),
            events_tx.clone(),
            status.clone(),
        ));

        Ok(TerminalHandle {
            status,
            events: events_tx,
            tasks,
        })
    }
}

/// Handle to the running terminal's tasks.
pub struct TerminalHandle {
    status: Arc<SharedStatus>,
    events: mpsc::Sender<DispatchEvent>,
    tasks: JoinSet<()>,
}

impl TerminalHandle {
    pub fn status(&self) -> &Arc<SharedStatus> {
        &self.status
    }

    /// Queue an event for the state machine.
    ///
    /// # Errors
    /// Returns `Error::QueueFull` if the event was dropped.
    pub async fn dispatch(&self, event: MachineEvent) -> Result<()> {
        send_or_drop(&self.events, DispatchEvent::Machine(event), DISPATCH_QUEUE).await
    }

    /// # Errors
    /// Returns `Error::QueueFull` if the request was dropped.
    pub async fn force_fault(&self, reason: FaultReason) -> Result<()> {
        send_or_drop(&self.events, DispatchEvent::ForceFault(reason), DISPATCH_QUEUE).await
    }

    /// Abort every task and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!(error = %e, "terminal task panicked"),
            }
        }
        info!("terminal stopped");
    }
}

struct Dispatcher<A, I, S> {
    machine: AccessStateMachine,
    timers: TimerService<StateTimer, DispatchEvent>,
    events: mpsc::Receiver<DispatchEvent>,
    actuator: A,
    indicator: I,
    sounder: Arc<S>,
    require_both: watch::Sender<bool>,
    requests: mpsc::Sender<TerminalRequest>,
    status: Arc<SharedStatus>,
}

impl<A: Actuator, I: Indicator, S: Sounder> Dispatcher<A, I, S> {
    async fn run(mut self) {
        let effects = self.machine.startup_effects();
        self.apply(effects).await;
        self.publish_state().await;

        while let Some(event) = self.events.recv().await {
            let effects = match event {
                DispatchEvent::Machine(event) => self.machine.handle(event),
                DispatchEvent::ForceFault(reason) => self.machine.force_fault(reason),
                DispatchEvent::Timer(fired) => {
                    if !self.timers.accept(&fired) {
                        continue;
                    }
                    self.machine.handle(MachineEvent::TimerExpired(fired.key))
                }
            };
            self.apply(effects).await;
            self.publish_state().await;
        }
        debug!("dispatch queue closed");
    }

    async fn apply(&mut self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::SetActuator(engaged) => {
                    if let Err(e) = self.actuator.set_engaged(engaged).await {
                        error!(error = %e, engaged, "actuator failed");
                    }
                }
                SideEffect::RequireBothSwitches(both) => {
                    self.require_both.send_replace(both);
                }
                SideEffect::PlaySound(sound) => {
                    if let Err(e) = self.sounder.play_effect(sound).await {
                        warn!(error = %e, %sound, "sound effect failed");
                    }
                }
                SideEffect::ShowIndicator(pattern) => {
                    if let Err(e) = self.indicator.show(pattern).await {
                        warn!(error = %e, %pattern, "indicator failed");
                    }
                }
                SideEffect::StartTimer(timer, after) => self.timers.start_once(timer, after),
                SideEffect::StopTimer(timer) => self.timers.stop(timer),
                SideEffect::Request(request) => {
                    if let Err(e) = send_or_drop(&self.requests, request, NETWORK_QUEUE).await {
                        debug!(error = %e, "request for backend dropped");
                    }
                }
            }
        }
    }

    async fn publish_state(&self) {
        if let Err(e) = self.status.set_state(self.machine.current()).await {
            warn!(error = %e, "state not published this cycle");
        }
    }
}

async fn forward(events: &mpsc::Sender<DispatchEvent>, event: DispatchEvent) {
    if let Err(e) = send_or_drop(events, event, DISPATCH_QUEUE).await {
        debug!(error = %e, "event for state machine dropped");
    }
}

async fn presence_task<R: CredentialReader, T: TamperSwitches>(
    mut reader: R,
    mut switches: T,
    mut require_both: watch::Receiver<bool>,
    events: mpsc::Sender<DispatchEvent>,
    status: Arc<SharedStatus>,
) {
    let mut monitor = CardPresenceMonitor::new();
    let mut published = None;

    loop {
        monitor.set_require_both(*require_both.borrow_and_update());

        let levels = match switches.read().await {
            Ok(levels) => Some(levels),
            Err(e) => {
                warn!(error = %e, "tamper switches unreadable");
                None
            }
        };
        let read = match reader.poll().await {
            Ok(Some(credential)) => Some(ReadOutcome::Credential(credential)),
            Ok(None) => Some(ReadOutcome::NoAnswer),
            Err(e) if e.is_card_read() => Some(ReadOutcome::Error),
            Err(e) => {
                warn!(error = %e, "credential reader unavailable");
                None
            }
        };

        if let (Some(switches), Some(read)) = (levels, read) {
            for event in monitor.observe(PollSample { switches, read }) {
                let event = match event {
                    PresenceEvent::Detected(id) => {
                        DispatchEvent::Machine(MachineEvent::CredentialPresented(id))
                    }
                    PresenceEvent::Removed(id) => {
                        DispatchEvent::Machine(MachineEvent::CredentialRemoved(id))
                    }
                    PresenceEvent::ReadError => DispatchEvent::Machine(MachineEvent::ReadError),
                    PresenceEvent::SwitchFault => DispatchEvent::ForceFault(FaultReason::CardSwitch),
                };
                forward(&events, event).await;
            }
        }

        let tracked = monitor.tracked();
        if published != Some(tracked) {
            match status.set_credential(tracked).await {
                Ok(()) => published = Some(tracked),
                Err(e) => warn!(error = %e, "credential not published this cycle"),
            }
        }

        tokio::time::sleep(monitor.next_interval()).await;
    }
}

async fn button_task<P: Button>(
    mut button: P,
    events: mpsc::Sender<DispatchEvent>,
    status: Arc<SharedStatus>,
) {
    let mut classifier = ButtonClassifier::default();
    let mut ticker = tokio::time::interval(Duration::from_millis(BUTTON_SAMPLE_INTERVAL_MS));
    let mut published = None;

    loop {
        ticker.tick().await;
        let pressed = match button.is_pressed().await {
            Ok(pressed) => pressed,
            Err(e) => {
                warn!(error = %e, "button unreadable");
                continue;
            }
        };

        if let Some(gesture) = classifier.sample(pressed) {
            debug!(?gesture, "button");
            forward(&events, DispatchEvent::Machine(MachineEvent::Button(gesture))).await;
        }

        if published != Some(pressed) {
            match status.set_button_held(pressed).await {
                Ok(()) => published = Some(pressed),
                Err(e) => warn!(error = %e, "button state not published this cycle"),
            }
        }
    }
}

async fn temperature_task<T: TemperatureSensor>(
    mut sensor: T,
    mut guard: TemperatureGuard,
    events: mpsc::Sender<DispatchEvent>,
    status: Arc<SharedStatus>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(TEMPERATURE_POLL_MS));

    loop {
        ticker.tick().await;
        let celsius = match sensor.read_celsius().await {
            Ok(celsius) => celsius,
            Err(e) => {
                warn!(error = %e, "temperature sensor unreadable");
                continue;
            }
        };

        if let Err(e) = status.set_temperature(celsius).await {
            warn!(error = %e, "temperature not published this cycle");
        }
        if let Some(reason) = guard.observe(celsius) {
            forward(&events, DispatchEvent::ForceFault(reason)).await;
        }
    }
}

/// What the network session may do to the rest of the terminal.
struct TerminalServices<S, U, Y> {
    events: mpsc::Sender<DispatchEvent>,
    status: Arc<SharedStatus>,
    settings: DeviceSettings<SqliteSettingsRepository>,
    sounder: Arc<S>,
    updater: U,
    system: Y,
}

impl<S, U, Y> DeviceServices for TerminalServices<S, U, Y>
where
    S: Sounder + 'static,
    U: FirmwareUpdater + 'static,
    Y: SystemControl + 'static,
{
    async fn snapshot(&self) -> Option<TerminalSnapshot> {
        match self.status.snapshot().await {
            Ok(status) => Some(TerminalSnapshot {
                state: status.state,
                temperature: status.temperature,
            }),
            Err(e) => {
                warn!(error = %e, "status unavailable for keepalive");
                None
            }
        }
    }

    async fn button_held(&self) -> bool {
        // An unreadable sample counts as still held so the poll keeps going.
        self.status.button_held().await.unwrap_or_else(|e| {
            warn!(error = %e, "button state unavailable");
            true
        })
    }

    async fn deliver(&self, command: TerminalCommand) {
        forward(&self.events, DispatchEvent::Machine(MachineEvent::Command(command))).await;
    }

    async fn store_tone(&self, tone: Tone) {
        if let Err(e) = self.settings.set_custom_tone(&tone).await {
            error!(error = %e, "custom tone not stored");
        }
    }

    async fn play_tone(&self) {
        match self.settings.custom_tone().await {
            Ok(Some(tone)) => {
                if let Err(e) = self.sounder.play_tone(&tone).await {
                    warn!(error = %e, "custom tone playback failed");
                }
            }
            Ok(None) => info!("no custom tone stored, ignoring play request"),
            Err(e) => warn!(error = %e, "custom tone unavailable"),
        }
    }

    async fn begin_firmware_update(&self, tag: String) {
        if let Err(e) = self.updater.begin(&tag).await {
            error!(error = %e, %tag, "firmware update failed to start");
        }
    }

    async fn reboot(&self) {
        info!("rebooting");
        if let Err(e) = self.system.reboot().await {
            error!(error = %e, "reboot failed");
        }
    }

    async fn set_online(&self, online: bool) {
        if let Err(e) = self.status.set_online(online).await {
            warn!(error = %e, online, "online flag not published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_hardware::IndicatorPattern;
    use acs_hardware::mock::{OutputEvent, mock_peripherals};
    use acs_storage::Database;

    async fn settings() -> DeviceSettings<SqliteSettingsRepository> {
        let db = Database::in_memory().await.unwrap();
        DeviceSettings::new(SqliteSettingsRepository::new(db.pool().clone()))
    }

    #[tokio::test]
    async fn test_boot_settings_use_stored_overrides() {
        let settings = settings().await;
        settings.set_server_address("10.1.2.3:5000").await.unwrap();
        settings.set_server_key("stored").await.unwrap();
        settings.set_default_state(AccessState::Lockout).await.unwrap();
        settings.set_max_temperature(55.0).await.unwrap();

        let boot = BootSettings::load(&TerminalConfig::default(), &settings)
            .await
            .unwrap();
        assert_eq!(boot.boot_count, 1);
        assert_eq!(boot.default_state, AccessState::Lockout);
        assert_eq!(boot.max_temperature, 55.0);
        assert_eq!(boot.server_addr, "10.1.2.3:5000".parse().unwrap());
        assert_eq!(boot.server_key, "stored");

        let again = BootSettings::load(&TerminalConfig::default(), &settings)
            .await
            .unwrap();
        assert_eq!(again.boot_count, 2);
    }

    #[tokio::test]
    async fn test_boot_settings_fall_back_to_config() {
        let settings = settings().await;
        settings.set_server_address("not an address").await.unwrap();
        let mut config = TerminalConfig::default();
        config.server.key = "from-file".to_string();

        let boot = BootSettings::load(&config, &settings).await.unwrap();
        assert_eq!(boot.server_addr, config.server.socket_addr().unwrap());
        assert_eq!(boot.server_key, "from-file");
        assert_eq!(boot.default_state, AccessState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_configured_address_fails_start() {
        let (peripherals, _controls) = mock_peripherals();
        let mut config = TerminalConfig::default();
        config.server.address = "nowhere".to_string();

        let result = Terminal::new(config, peripherals, settings().await).start().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_shows_startup_and_shuts_down() {
        let (peripherals, mut controls) = mock_peripherals();
        let mut config = TerminalConfig::default();
        // Nothing listens here; the session keeps retrying in the background.
        config.server.address = "127.0.0.1:9".to_string();

        let handle = Terminal::new(config, peripherals, settings().await)
            .start()
            .await
            .unwrap();

        let shown = controls
            .outputs
            .wait_for(Duration::from_secs(2), |e| {
                *e == OutputEvent::Indicator(IndicatorPattern::Startup)
            })
            .await;
        assert!(shown.is_some());
        assert_eq!(
            handle.status().state().await.unwrap(),
            AccessState::Startup
        );

        handle.shutdown().await;
    }
}
