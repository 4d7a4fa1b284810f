//! Main control loop.
//!
//! Everything the gateway does besides relaying runs here, one signal at
//! a time: heap watch, firmware-update scheduling, configuration mode,
//! remote configuration, network up/down reactions and the history-poll
//! LED indication.
//!
//! | Timer             | Kind      | Signal                    |
//! |-------------------|-----------|---------------------------|
//! | `heap_usage`      | periodic  | `LogHeapUsage`            |
//! | `fw_updates`      | one-shot  | `CheckForFwUpdates`       |
//! | `remote_cfg`      | periodic  | `CheckForRemoteCfg`       |
//! | `history_timeout` | one-shot  | `OnGetHistoryTimeout`     |
//! | `task_wdt`        | periodic  | `TaskWatchdogFeed`        |

pub mod fw_update;
pub mod heap;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::app::ports::{
    ConfigPort, GatewayServices, StatusIndicator, SystemPort, TaskWatchdogPort, TimePort,
};
use crate::config::{AutoUpdateCycle, GatewayConfig};
use crate::error::Result;
use crate::net_status::{NetworkStatus, RELAYING_SUSPENDED};
use crate::os::{SignalId, SignalSet, SignalTimer, TaskSignal};
use crate::relay::RelayHandle;

use self::heap::{HeapMonitor, HeapVerdict};

/// Without a local client polling history for this long the LED shows
/// "no poll".
pub const HISTORY_POLL_TIMEOUT: Duration = Duration::from_secs(70);
pub const TASK_WATCHDOG_FEED_PERIOD: Duration = Duration::from_secs(1);
const REMOTE_CFG_DEFAULT_PERIOD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorSig {
    LogHeapUsage = 0,
    CheckForFwUpdates = 1,
    ScheduleNextCheckForFwUpdates = 2,
    ScheduleRetryCheckForFwUpdates = 3,
    ActivateCfgMode = 4,
    DeactivateCfgMode = 5,
    RestartServices = 6,
    CheckForRemoteCfg = 7,
    NetworkConnected = 8,
    NetworkDisconnected = 9,
    ReconnectNetwork = 10,
    SetDefaultConfig = 11,
    OnGetHistory = 12,
    OnGetHistoryTimeout = 13,
    RelayingModeChanged = 14,
    TaskWatchdogFeed = 15,
    Stop = 16,
}

impl SignalId for SupervisorSig {
    const ALL: &'static [Self] = &[
        Self::LogHeapUsage,
        Self::CheckForFwUpdates,
        Self::ScheduleNextCheckForFwUpdates,
        Self::ScheduleRetryCheckForFwUpdates,
        Self::ActivateCfgMode,
        Self::DeactivateCfgMode,
        Self::RestartServices,
        Self::CheckForRemoteCfg,
        Self::NetworkConnected,
        Self::NetworkDisconnected,
        Self::ReconnectNetwork,
        Self::SetDefaultConfig,
        Self::OnGetHistory,
        Self::OnGetHistoryTimeout,
        Self::RelayingModeChanged,
        Self::TaskWatchdogFeed,
        Self::Stop,
    ];

    fn index(self) -> u8 {
        self as u8
    }
}

/// Cloneable sender into the supervisor, for event handlers and the
/// local HTTP server.
#[derive(Clone)]
pub struct SupervisorHandle {
    signal: Arc<TaskSignal<SupervisorSig>>,
}

impl SupervisorHandle {
    pub fn send(&self, sig: SupervisorSig) -> bool {
        self.signal.send(sig)
    }

    pub fn on_get_history(&self) -> bool {
        self.send(SupervisorSig::OnGetHistory)
    }

    pub fn network_connected(&self) -> bool {
        self.send(SupervisorSig::NetworkConnected)
    }

    pub fn network_disconnected(&self) -> bool {
        self.send(SupervisorSig::NetworkDisconnected)
    }

    pub fn stop(&self) -> bool {
        self.send(SupervisorSig::Stop)
    }
}

impl core::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("registered", &self.signal.is_registered())
            .finish()
    }
}

/// Collaborators owned by the supervisor.
pub struct SupervisorPorts<V, C, W, S, T, L> {
    pub services: V,
    pub config_store: C,
    pub watchdog: W,
    pub system: S,
    pub time: T,
    pub indicator: L,
}

struct SupervisorTimers {
    heap_usage: SignalTimer<SupervisorSig>,
    fw_updates: SignalTimer<SupervisorSig>,
    remote_cfg: SignalTimer<SupervisorSig>,
    history_timeout: SignalTimer<SupervisorSig>,
    task_wdt: SignalTimer<SupervisorSig>,
}

impl SupervisorTimers {
    fn new(signal: &Arc<TaskSignal<SupervisorSig>>) -> Result<Self> {
        let s = || Arc::clone(signal);
        Ok(Self {
            heap_usage: SignalTimer::periodic(
                "heap_usage",
                Duration::from_millis(u64::from(heap::SAMPLE_PERIOD_MS)),
                s(),
                SupervisorSig::LogHeapUsage,
            )?,
            fw_updates: SignalTimer::one_shot(
                "fw_updates",
                fw_update::DELAY_AFTER_BOOT,
                s(),
                SupervisorSig::CheckForFwUpdates,
            )?,
            remote_cfg: SignalTimer::periodic(
                "remote_cfg",
                REMOTE_CFG_DEFAULT_PERIOD,
                s(),
                SupervisorSig::CheckForRemoteCfg,
            )?,
            history_timeout: SignalTimer::one_shot(
                "history_timeout",
                HISTORY_POLL_TIMEOUT,
                s(),
                SupervisorSig::OnGetHistoryTimeout,
            )?,
            task_wdt: SignalTimer::periodic(
                "main_task_wdt",
                TASK_WATCHDOG_FEED_PERIOD,
                s(),
                SupervisorSig::TaskWatchdogFeed,
            )?,
        })
    }

    fn stop_all(&self) {
        self.heap_usage.stop();
        self.fw_updates.stop();
        self.remote_cfg.stop();
        self.history_timeout.stop();
        self.task_wdt.stop();
    }
}

pub struct Supervisor<V, C, W, S, T, L>
where
    V: GatewayServices,
    C: ConfigPort,
    W: TaskWatchdogPort,
    S: SystemPort,
    T: TimePort,
    L: StatusIndicator,
{
    config: GatewayConfig,
    net: Arc<NetworkStatus>,
    relay: RelayHandle,
    ports: SupervisorPorts<V, C, W, S, T, L>,
    signal: Arc<TaskSignal<SupervisorSig>>,
    timers: SupervisorTimers,
    heap: HeapMonitor,
    cfg_mode: bool,
    initial_remote_cfg_done: bool,
    stop_requested: bool,
}

impl<V, C, W, S, T, L> Supervisor<V, C, W, S, T, L>
where
    V: GatewayServices,
    C: ConfigPort,
    W: TaskWatchdogPort,
    S: SystemPort,
    T: TimePort,
    L: StatusIndicator,
{
    pub fn new(
        config: GatewayConfig,
        net: Arc<NetworkStatus>,
        relay: RelayHandle,
        ports: SupervisorPorts<V, C, W, S, T, L>,
    ) -> Result<(Self, SupervisorHandle)> {
        let signal = Arc::new(TaskSignal::new());
        let timers = SupervisorTimers::new(&signal)?;
        signal.register();
        let handle = SupervisorHandle {
            signal: Arc::clone(&signal),
        };
        Ok((
            Self {
                config,
                net,
                relay,
                ports,
                signal,
                timers,
                heap: HeapMonitor::new(),
                cfg_mode: false,
                initial_remote_cfg_done: false,
                stop_requested: false,
            },
            handle,
        ))
    }

    /// Loop body of the main task.  Returns only after [`SupervisorSig::Stop`].
    pub fn run(mut self) {
        info!("Main loop started");
        self.start();
        while !self.stop_requested {
            let events = self.signal.wait();
            self.handle_events(events);
        }
        self.ports.watchdog.unregister();
        self.timers.stop_all();
        self.signal.unregister();
        info!("Main loop stopped");
    }

    /// Register with the watchdog, start services and arm timers.
    pub fn start(&mut self) {
        info!("TaskWatchdog: Register current thread");
        if !self.ports.watchdog.register() {
            error!("TaskWatchdog: registration failed");
        }
        self.timers.task_wdt.start();

        if self.config.mqtt.use_mqtt {
            self.ports.services.start_mqtt(&self.config);
        }
        self.timers.heap_usage.start();
        self.timers.history_timeout.start();
        self.configure_remote_cfg_check();

        if self.config.auto_update.cycle == AutoUpdateCycle::Manual {
            info!("Firmware auto-updating is not active");
        } else {
            info!(
                "Firmware auto-updating is active, run next check after {} seconds",
                fw_update::DELAY_AFTER_BOOT.as_secs()
            );
            self.timers.fw_updates.restart_with_period(fw_update::DELAY_AFTER_BOOT);
        }
    }

    /// Handle one wake-up's worth of signals in ascending order.
    /// Returns `true` once a stop was requested.
    pub fn handle_events(&mut self, events: SignalSet<SupervisorSig>) -> bool {
        for sig in events.iter() {
            self.handle(sig);
        }
        self.stop_requested
    }

    fn handle(&mut self, sig: SupervisorSig) {
        match sig {
            SupervisorSig::LogHeapUsage => self.on_log_heap_usage(),
            SupervisorSig::CheckForFwUpdates => self.on_check_for_fw_updates(),
            SupervisorSig::ScheduleNextCheckForFwUpdates => {
                info!(
                    "Schedule next check for fw updates after {} seconds",
                    fw_update::DELAY_AFTER_SUCCESS.as_secs()
                );
                self.timers.fw_updates.restart_with_period(fw_update::DELAY_AFTER_SUCCESS);
            }
            SupervisorSig::ScheduleRetryCheckForFwUpdates => {
                info!(
                    "Schedule a recheck for fw updates after {} seconds",
                    fw_update::DELAY_BEFORE_RETRY.as_secs()
                );
                self.timers.fw_updates.restart_with_period(fw_update::DELAY_BEFORE_RETRY);
            }
            SupervisorSig::ActivateCfgMode => self.on_activate_cfg_mode(),
            SupervisorSig::DeactivateCfgMode => self.on_deactivate_cfg_mode(),
            SupervisorSig::RestartServices => self.on_restart_services(),
            SupervisorSig::CheckForRemoteCfg => {
                if self.config.remote_cfg.use_remote_cfg {
                    info!("Check for remote_cfg: activate");
                    self.ports.services.request_remote_cfg(&self.config);
                }
            }
            SupervisorSig::NetworkConnected => self.on_network_connected(),
            SupervisorSig::NetworkDisconnected => {
                info!("Handle event: NETWORK_DISCONNECTED");
                self.ports.services.stop_mdns();
            }
            SupervisorSig::ReconnectNetwork => {
                info!("Perform network reconnect");
                self.ports.services.reconnect_network();
            }
            SupervisorSig::SetDefaultConfig => self.on_set_default_config(),
            SupervisorSig::OnGetHistory => {
                debug!("History served to a local client");
                self.timers.history_timeout.start();
                self.ports.indicator.http_poll_ok();
            }
            SupervisorSig::OnGetHistoryTimeout => {
                info!("No history poll within {} s", HISTORY_POLL_TIMEOUT.as_secs());
                self.ports.indicator.http_poll_timeout();
            }
            SupervisorSig::RelayingModeChanged => self.on_relaying_mode_changed(),
            SupervisorSig::TaskWatchdogFeed => self.ports.watchdog.feed(),
            SupervisorSig::Stop => {
                info!("Main loop: stop requested");
                self.stop_requested = true;
            }
        }
    }

    fn on_log_heap_usage(&mut self) {
        match self.heap.sample(self.ports.system.free_heap()) {
            HeapVerdict::Sampling => {}
            HeapVerdict::WindowOk { min, max } => info!("free heap: {} .. {}", min, max),
            HeapVerdict::WindowLow { min, max, consecutive } => {
                warn!("free heap: {} .. {} (low, {} in a row)", min, max, consecutive);
            }
            HeapVerdict::Reboot { min } => {
                error!(
                    "Only {}KiB of free memory left - probably due to a memory leak. Reboot the Gateway.",
                    min / 1024
                );
                self.ports.system.restart("Low memory");
            }
        }
    }

    fn on_check_for_fw_updates(&mut self) {
        let allowed = fw_update::check_allowed(
            &self.config.auto_update,
            self.net.is_network_connected(),
            self.ports.time.unix_time(),
        );
        let next = match allowed {
            Ok(()) => {
                info!("Check for fw updates: activate");
                if self.ports.services.check_for_fw_updates() {
                    SupervisorSig::ScheduleNextCheckForFwUpdates
                } else {
                    warn!("Check for fw updates failed");
                    SupervisorSig::ScheduleRetryCheckForFwUpdates
                }
            }
            Err(reason) => {
                info!("Check for fw updates - skip ({})", reason);
                SupervisorSig::ScheduleRetryCheckForFwUpdates
            }
        };
        self.handle(next);
    }

    fn on_activate_cfg_mode(&mut self) {
        if self.cfg_mode {
            info!("Configuration mode is already active");
            return;
        }
        info!("Activate configuration mode");
        self.cfg_mode = true;
        self.timers.remote_cfg.stop();
        self.timers.fw_updates.stop();
        self.net.set(RELAYING_SUSPENDED);
        self.relay.disable_retransmission();
        self.ports.services.start_cfg_access_point();
        self.ports.indicator.cfg_mode(true);
    }

    fn on_deactivate_cfg_mode(&mut self) {
        if !self.cfg_mode {
            warn!("Configuration mode is not active");
            return;
        }
        info!("Deactivate configuration mode");
        self.cfg_mode = false;
        self.ports.services.stop_cfg_access_point();
        self.ports.indicator.cfg_mode(false);
        // Behave as if a client just polled, so the LED leaves the
        // configuration pattern immediately.
        self.handle(SupervisorSig::OnGetHistory);
        self.on_restart_services();
        self.net.clear(RELAYING_SUSPENDED);
        self.relay.enable_retransmission();
    }

    fn on_restart_services(&mut self) {
        info!("Restart services");
        self.ports.services.stop_mqtt();
        if self.config.mqtt.use_mqtt && !self.net.is_relaying_suspended() {
            self.ports.services.start_mqtt(&self.config);
        }
        self.ports.services.send_scan_settings(&self.config);
        self.configure_remote_cfg_check();
        if self.config.auto_update.cycle == AutoUpdateCycle::Manual {
            info!("Restarting services: Stop firmware auto-updating");
            self.timers.fw_updates.stop();
        } else {
            info!(
                "Restarting services: Restart firmware auto-updating, run next check after {} seconds",
                fw_update::DELAY_AFTER_BOOT.as_secs()
            );
            self.timers.fw_updates.restart_with_period(fw_update::DELAY_AFTER_BOOT);
        }
    }

    fn configure_remote_cfg_check(&mut self) {
        let remote = &self.config.remote_cfg;
        if !remote.use_remote_cfg {
            info!("Reading of the configuration from the remote server is not active");
            self.timers.remote_cfg.stop();
            return;
        }
        if remote.refresh_interval_minutes == 0 {
            warn!("Reading of the configuration from the remote server is active, but period is not set");
            self.timers.remote_cfg.stop();
            return;
        }
        let minutes = remote.refresh_interval_minutes;
        info!(
            "Reading of the configuration from the remote server is active, period: {} minutes",
            minutes
        );
        self.timers
            .remote_cfg
            .restart_with_period(Duration::from_secs(u64::from(minutes) * 60));
    }

    fn on_network_connected(&mut self) {
        info!("Handle event: NETWORK_CONNECTED");
        self.ports.services.start_mdns();
        if self.config.remote_cfg.use_remote_cfg && !self.initial_remote_cfg_done && !self.cfg_mode {
            self.initial_remote_cfg_done = true;
            info!("Activate checking for remote cfg");
            self.signal.send(SupervisorSig::CheckForRemoteCfg);
        }
    }

    fn on_set_default_config(&mut self) {
        info!("Set default config");
        self.config = GatewayConfig::default();
        if let Err(e) = self.ports.config_store.save(&self.config) {
            error!("Saving default config failed: {}", e);
        }
        self.signal.send(SupervisorSig::DeactivateCfgMode);
    }

    fn on_relaying_mode_changed(&mut self) {
        info!("Relaying mode changed");
        if self.net.is_relaying_suspended() {
            self.ports.services.stop_mqtt();
            self.relay.disable_retransmission();
        } else {
            if self.config.mqtt.use_mqtt {
                self.ports.services.start_mqtt(&self.config);
            } else {
                self.ports.services.stop_mqtt();
            }
            self.relay.enable_retransmission();
        }
    }

    // ── Introspection ─────────────────────────────────────────

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn is_cfg_mode(&self) -> bool {
        self.cfg_mode
    }

    pub fn ports(&self) -> &SupervisorPorts<V, C, W, S, T, L> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut SupervisorPorts<V, C, W, S, T, L> {
        &mut self.ports
    }

    /// Whether a firmware check is scheduled, and after how long.
    pub fn fw_check_schedule(&self) -> Option<Duration> {
        self.timers
            .fw_updates
            .is_active()
            .then(|| self.timers.fw_updates.period())
    }

    pub fn remote_cfg_period(&self) -> Option<Duration> {
        self.timers
            .remote_cfg
            .is_active()
            .then(|| self.timers.remote_cfg.period())
    }

    pub fn history_timeout_armed(&self) -> bool {
        self.timers.history_timeout.is_active()
    }

    /// Take pending signals without blocking (tests, single-step runs).
    pub fn take_pending(&self) -> SignalSet<SupervisorSig> {
        self.signal.try_take()
    }
}
