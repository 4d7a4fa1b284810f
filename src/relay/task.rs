//! Signal-driven relay loop.
//!
//! All state lives in [`RelayTask`] and changes only inside
//! [`RelayTask::handle_events`], so the task can be stepped
//! deterministically in tests without starting any timer.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::{RelayHandle, RelaySig};
use crate::adv::{AdvBatch, GatewayAdvTable, MacAddr};
use crate::app::ports::{
    HttpSender, MIN_SYNCED_UNIX_TIME, MqttPublisher, SystemPort, TaskWatchdogPort, TimePort,
};
use crate::config::{GatewayConfig, ShortString};
use crate::error::Result;
use crate::json::{StatusInfo, status_json};
use crate::net_status::NetworkStatus;
use crate::os::task::{self, TaskSpec};
use crate::os::{SignalSet, SignalTimer, TaskSignal};
use crate::serial::ScannerAddr;

/// Collaborators owned by the relay task.
pub struct RelayPorts<H, Q, W, S, T> {
    pub http: H,
    pub mqtt: Q,
    pub watchdog: W,
    pub system: S,
    pub time: T,
}

/// What the gateway reports about itself in status documents.
#[derive(Debug, Clone, Default)]
pub struct RelayIdentity {
    pub gw_mac: MacAddr,
    /// Address of the BLE co-processor, filled in by the UART reader.
    pub device_addr: Arc<ScannerAddr>,
    pub esp_fw: ShortString,
    pub nrf_fw: ShortString,
}

struct RelayTimers {
    retransmit: SignalTimer<RelaySig>,
    network_watchdog: SignalTimer<RelaySig>,
    task_watchdog: SignalTimer<RelaySig>,
    statistics: SignalTimer<RelaySig>,
}

impl RelayTimers {
    fn new(config: &GatewayConfig, signal: &Arc<TaskSignal<RelaySig>>) -> Result<Self> {
        let relay = &config.relay;
        let ms = |v: u32| Duration::from_millis(u64::from(v));
        Ok(Self {
            retransmit: SignalTimer::periodic(
                "relay_retransmit",
                ms(relay.retransmit_period_ms),
                Arc::clone(signal),
                RelaySig::Retransmit,
            )?,
            network_watchdog: SignalTimer::periodic(
                "relay_net_wdt",
                ms(relay.network_watchdog_check_ms),
                Arc::clone(signal),
                RelaySig::NetworkWatchdog,
            )?,
            task_watchdog: SignalTimer::periodic(
                "relay_task_wdt",
                ms(relay.task_watchdog_feed_ms),
                Arc::clone(signal),
                RelaySig::TaskWatchdogFeed,
            )?,
            statistics: SignalTimer::periodic(
                "relay_stat",
                Duration::from_secs(u64::from(relay.statistics_period_secs)),
                Arc::clone(signal),
                RelaySig::SendStatistics,
            )?,
        })
    }

    fn stop_all(&self) {
        self.retransmit.stop();
        self.network_watchdog.stop();
        self.task_watchdog.stop();
        self.statistics.stop();
    }

    fn any_active(&self) -> bool {
        self.retransmit.is_active()
            || self.network_watchdog.is_active()
            || self.task_watchdog.is_active()
            || self.statistics.is_active()
    }
}

pub struct RelayTask<H, Q, W, S, T>
where
    H: HttpSender,
    Q: MqttPublisher,
    W: TaskWatchdogPort,
    S: SystemPort,
    T: TimePort,
{
    table: Arc<GatewayAdvTable>,
    net: Arc<NetworkStatus>,
    config: GatewayConfig,
    identity: RelayIdentity,
    ports: RelayPorts<H, Q, W, S, T>,
    signal: Arc<TaskSignal<RelaySig>>,
    history_served: Arc<AtomicBool>,
    timers: RelayTimers,
    batch: Box<AdvBatch>,
    connected: bool,
    retransmit_enabled: bool,
    stop_requested: bool,
    nonce: u32,
    last_comm_ms: u32,
}

impl<H, Q, W, S, T> RelayTask<H, Q, W, S, T>
where
    H: HttpSender,
    Q: MqttPublisher,
    W: TaskWatchdogPort,
    S: SystemPort,
    T: TimePort,
{
    /// Create the task and its timers.  The signal set is registered
    /// immediately, so the returned handle works before [`run`](Self::run).
    pub fn new(
        table: Arc<GatewayAdvTable>,
        net: Arc<NetworkStatus>,
        config: GatewayConfig,
        identity: RelayIdentity,
        ports: RelayPorts<H, Q, W, S, T>,
    ) -> Result<(Self, RelayHandle)> {
        let signal = Arc::new(TaskSignal::new());
        let history_served = Arc::new(AtomicBool::new(false));
        let timers = RelayTimers::new(&config, &signal)?;
        signal.register();
        let handle = RelayHandle::new(Arc::clone(&signal), Arc::clone(&history_served));
        let last_comm_ms = ports.time.uptime_ms();
        Ok((
            Self {
                table,
                net,
                config,
                identity,
                ports,
                signal,
                history_served,
                timers,
                batch: Box::new(AdvBatch::new()),
                connected: false,
                retransmit_enabled: true,
                stop_requested: false,
                nonce: 0,
                last_comm_ms,
            },
            handle,
        ))
    }

    /// Run on a dedicated task until [`RelayHandle::stop`].
    pub fn spawn(self, spec: TaskSpec) -> Result<JoinHandle<()>>
    where
        H: Send + 'static,
        Q: Send + 'static,
        W: Send + 'static,
        S: Send + 'static,
        T: Send + 'static,
    {
        task::spawn(spec, move || self.run())
    }

    /// Task body.  Returns after a stop signal, with timers stopped and
    /// the watchdog subscription removed.
    pub fn run(mut self) {
        info!("Relay task started");
        self.start();
        while !self.stop_requested {
            let events = self.signal.wait();
            self.handle_events(events);
        }
        self.teardown();
        info!("Relay task stopped");
    }

    fn start(&mut self) {
        if !self.ports.watchdog.register() {
            warn!("Relay task: task watchdog registration failed");
        }
        self.last_comm_ms = self.ports.time.uptime_ms();
        self.timers.retransmit.start();
        self.timers.network_watchdog.start();
        self.timers.task_watchdog.start();
        if self.config.http_stat.use_http_stat {
            self.timers.statistics.start();
        }
    }

    fn teardown(&mut self) {
        self.ports.watchdog.unregister();
        self.timers.stop_all();
        self.signal.unregister();
    }

    /// Handle one wake-up's worth of signals, each kind once, in
    /// ascending order.  Returns `true` once a stop was requested.
    pub fn handle_events(&mut self, events: SignalSet<RelaySig>) -> bool {
        for sig in events.iter() {
            match sig {
                RelaySig::Stop => {
                    info!("Relay task: stop requested");
                    self.stop_requested = true;
                }
                RelaySig::Retransmit => self.on_retransmit(),
                RelaySig::DisableRetransmission => {
                    info!("Relay task: retransmission disabled");
                    self.retransmit_enabled = false;
                }
                RelaySig::EnableRetransmission => {
                    info!("Relay task: retransmission enabled");
                    self.retransmit_enabled = true;
                }
                RelaySig::NetworkWatchdog => self.on_network_watchdog(),
                RelaySig::TaskWatchdogFeed => self.ports.watchdog.feed(),
                RelaySig::SendStatistics => self.on_send_statistics(),
            }
        }
        self.stop_requested
    }

    fn next_nonce(&mut self) -> u32 {
        self.nonce = self.nonce.wrapping_add(1);
        self.nonce
    }

    fn mark_comm(&mut self) {
        self.last_comm_ms = self.ports.time.uptime_ms();
    }

    fn update_connectivity(&mut self) {
        let link_up = self.net.is_network_connected();
        if self.connected {
            if !link_up {
                info!("Relay task: network disconnected");
                self.connected = false;
            }
            return;
        }
        if !link_up {
            return;
        }
        if self.config.http.use_http {
            self.connected = true;
            let nonce = self.next_nonce();
            info!("Relay task: network connected, sending online status (nonce {})", nonce);
            if self.ports.http.send_online_status(nonce) {
                self.mark_comm();
            } else {
                warn!("Online status was not delivered");
            }
        } else if self.config.mqtt.use_mqtt {
            info!("Relay task: network connected");
            self.connected = true;
        }
    }

    fn relaying_allowed(&self) -> bool {
        self.config.relaying_configured() && self.retransmit_enabled && !self.net.is_relaying_suspended()
    }

    fn batch_time_is_synced(&self) -> bool {
        !self.config.ntp.use_timestamps
            || self
                .batch
                .first()
                .is_some_and(|r| r.timestamp >= MIN_SYNCED_UNIX_TIME)
    }

    fn on_retransmit(&mut self) {
        self.update_connectivity();
        if !self.relaying_allowed() {
            return;
        }

        let drained = self.table.drain_retransmission_queue(&mut *self.batch);
        if drained == 0 {
            return;
        }
        debug!("Advs to relay: {}", drained);
        for r in self.batch.iter() {
            debug!(
                "  {} rssi={} ts={} len={}",
                r.tag_mac,
                r.rssi,
                r.timestamp,
                r.data.len()
            );
        }

        if !self.connected {
            warn!("Can't send, no network connection");
            return;
        }

        if self.config.http.use_http {
            if self.batch_time_is_synced() {
                let nonce = self.next_nonce();
                if self.ports.http.send_batch(&self.batch, nonce) {
                    self.mark_comm();
                } else {
                    warn!("HTTP batch (nonce {}) was not delivered", nonce);
                }
            } else {
                warn!("Time is not synchronized, skip sending {} advs over HTTP", drained);
            }
        }

        if self.config.mqtt.use_mqtt && self.net.is_mqtt_connected() {
            if self.ports.mqtt.publish_batch(&self.batch) {
                self.mark_comm();
            } else {
                warn!("MQTT publish of {} advs failed", drained);
            }
        }
    }

    fn on_network_watchdog(&mut self) {
        if self.history_served.swap(false, Ordering::AcqRel) {
            self.mark_comm();
        }
        let timeout_secs = self.config.relay.network_watchdog_timeout_secs;
        if timeout_secs == 0 || !self.relaying_allowed() {
            // Nothing is expected to reach the network right now.
            self.mark_comm();
            return;
        }
        let elapsed_ms = self.ports.time.uptime_ms().wrapping_sub(self.last_comm_ms);
        if u64::from(elapsed_ms) > u64::from(timeout_secs) * 1000 {
            error!(
                "No successful network communication for {} s (limit {} s), restarting",
                elapsed_ms / 1000,
                timeout_secs
            );
            self.ports.system.restart("network watchdog");
        }
    }

    fn on_send_statistics(&mut self) {
        if !self.config.http_stat.use_http_stat {
            return;
        }
        if !self.net.is_network_connected() {
            debug!("Statistics skipped, no network connection");
            return;
        }
        self.table.read_history(0, 0, false, &mut *self.batch);
        let device_addr = self.identity.device_addr.get().unwrap_or_default().to_hstring();
        let info = StatusInfo {
            device_addr: &device_addr,
            esp_fw: &self.identity.esp_fw,
            nrf_fw: &self.identity.nrf_fw,
            uptime_secs: self.ports.time.uptime_ms() / 1000,
            nonce: self.nonce,
            connection: self.net.connection_kind(),
            num_conn_lost: self.net.connection_lost_count(),
        };
        let json = match status_json(&info, self.batch.as_slice()) {
            Ok(json) => json,
            Err(e) => {
                error!("Status JSON failed: {}", e);
                return;
            }
        };
        info!("Send statistics: {} sensors", self.batch.len());
        if self.ports.http.send_statistics(&json) {
            self.mark_comm();
        } else {
            warn!("Statistics were not delivered");
        }
    }

    // ── Introspection ─────────────────────────────────────────

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_retransmit_enabled(&self) -> bool {
        self.retransmit_enabled
    }

    pub fn last_comm_ms(&self) -> u32 {
        self.last_comm_ms
    }

    pub fn timers_active(&self) -> bool {
        self.timers.any_active()
    }

    pub fn ports(&self) -> &RelayPorts<H, Q, W, S, T> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut RelayPorts<H, Q, W, S, T> {
        &mut self.ports
    }

    /// Take pending signals without blocking (tests, single-step runs).
    pub fn take_pending(&self) -> SignalSet<RelaySig> {
        self.signal.try_take()
    }
}
