//! Mock port adapters for integration tests.
//!
//! Every mock records the calls it receives so tests can assert on the
//! full history without touching the network, NVS or the task watchdog.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use blegw::adv::{AdvReport, MacAddr};
use blegw::app::ports::{
    ConfigError, ConfigPort, GatewayServices, HttpSender, MqttPublisher, StatusIndicator,
    SystemPort, TaskWatchdogPort, TimePort,
};
use blegw::config::GatewayConfig;

// ── Clock ─────────────────────────────────────────────────────

/// Clock whose uptime and wall time are shared between clones, so a test
/// can move time forward after the clock was handed to a task.
#[derive(Clone, Default)]
pub struct MockClock {
    uptime: Arc<AtomicU32>,
    /// 0 means "not synchronised".
    unix: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synced(unix_time: u32) -> Self {
        let clock = Self::new();
        clock.set_unix(unix_time);
        clock
    }

    pub fn advance_ms(&self, ms: u32) {
        self.uptime.fetch_add(ms, Ordering::Relaxed);
        let unix = self.unix.load(Ordering::Relaxed);
        if unix != 0 {
            self.unix.store(unix + ms / 1000, Ordering::Relaxed);
        }
    }

    pub fn set_unix(&self, unix_time: u32) {
        self.unix.store(unix_time, Ordering::Relaxed);
    }
}

impl TimePort for MockClock {
    fn uptime_ms(&self) -> u32 {
        self.uptime.load(Ordering::Relaxed)
    }

    fn unix_time(&self) -> Option<u32> {
        match self.unix.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t),
        }
    }
}

// ── HTTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HttpCall {
    Batch { macs: Vec<MacAddr>, nonce: u32 },
    OnlineStatus { nonce: u32 },
    Statistics { json: String },
}

pub struct MockHttp {
    pub calls: Vec<HttpCall>,
    pub succeed: bool,
}

#[allow(dead_code)]
impl MockHttp {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            succeed: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Vec::new(),
            succeed: false,
        }
    }

    pub fn batches(&self) -> Vec<(Vec<MacAddr>, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HttpCall::Batch { macs, nonce } => Some((macs.clone(), *nonce)),
                _ => None,
            })
            .collect()
    }

    pub fn online_nonces(&self) -> Vec<u32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HttpCall::OnlineStatus { nonce } => Some(*nonce),
                _ => None,
            })
            .collect()
    }

    pub fn statistics(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HttpCall::Statistics { json } => Some(json.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSender for MockHttp {
    fn send_batch(&mut self, records: &[AdvReport], nonce: u32) -> bool {
        self.calls.push(HttpCall::Batch {
            macs: records.iter().map(|r| r.tag_mac).collect(),
            nonce,
        });
        self.succeed
    }

    fn send_online_status(&mut self, nonce: u32) -> bool {
        self.calls.push(HttpCall::OnlineStatus { nonce });
        self.succeed
    }

    fn send_statistics(&mut self, status_json: &str) -> bool {
        self.calls.push(HttpCall::Statistics {
            json: status_json.to_owned(),
        });
        self.succeed
    }
}

// ── MQTT ──────────────────────────────────────────────────────

pub struct MockMqtt {
    pub batches: Vec<Vec<MacAddr>>,
    pub succeed: bool,
}

#[allow(dead_code)]
impl MockMqtt {
    pub fn new() -> Self {
        Self {
            batches: Vec::new(),
            succeed: true,
        }
    }
}

impl Default for MockMqtt {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttPublisher for MockMqtt {
    fn publish_batch(&mut self, records: &[AdvReport]) -> bool {
        self.batches.push(records.iter().map(|r| r.tag_mac).collect());
        self.succeed
    }
}

// ── Task watchdog ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockWatchdog {
    pub registered: bool,
    pub feeds: u32,
    pub unregistered: bool,
}

impl TaskWatchdogPort for MockWatchdog {
    fn register(&mut self) -> bool {
        self.registered = true;
        true
    }

    fn feed(&mut self) {
        self.feeds += 1;
    }

    fn unregister(&mut self) {
        self.unregistered = true;
    }
}

// ── System ────────────────────────────────────────────────────

pub struct MockSystem {
    pub restarts: RefCell<Vec<&'static str>>,
    pub free_heap: Cell<u32>,
}

#[allow(dead_code)]
impl MockSystem {
    pub fn new() -> Self {
        Self {
            restarts: RefCell::new(Vec::new()),
            free_heap: Cell::new(200 * 1024),
        }
    }

    pub fn restarted(&self) -> bool {
        !self.restarts.borrow().is_empty()
    }
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPort for MockSystem {
    fn restart(&self, reason: &'static str) {
        self.restarts.borrow_mut().push(reason);
    }

    fn free_heap(&self) -> u32 {
        self.free_heap.get()
    }
}

// ── Services ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    StartMqtt,
    StopMqtt,
    StartMdns,
    StopMdns,
    RequestRemoteCfg,
    CheckForFwUpdates,
    ReconnectNetwork,
    StartCfgAccessPoint,
    StopCfgAccessPoint,
    SendScanSettings,
}

pub struct MockServices {
    pub calls: Vec<ServiceCall>,
    pub fw_check_result: bool,
}

#[allow(dead_code)]
impl MockServices {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            fw_check_result: true,
        }
    }

    pub fn count(&self, call: ServiceCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn last(&self) -> Option<ServiceCall> {
        self.calls.last().copied()
    }
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayServices for MockServices {
    fn start_mqtt(&mut self, _config: &GatewayConfig) {
        self.calls.push(ServiceCall::StartMqtt);
    }

    fn stop_mqtt(&mut self) {
        self.calls.push(ServiceCall::StopMqtt);
    }

    fn start_mdns(&mut self) {
        self.calls.push(ServiceCall::StartMdns);
    }

    fn stop_mdns(&mut self) {
        self.calls.push(ServiceCall::StopMdns);
    }

    fn request_remote_cfg(&mut self, _config: &GatewayConfig) {
        self.calls.push(ServiceCall::RequestRemoteCfg);
    }

    fn check_for_fw_updates(&mut self) -> bool {
        self.calls.push(ServiceCall::CheckForFwUpdates);
        self.fw_check_result
    }

    fn reconnect_network(&mut self) {
        self.calls.push(ServiceCall::ReconnectNetwork);
    }

    fn start_cfg_access_point(&mut self) {
        self.calls.push(ServiceCall::StartCfgAccessPoint);
    }

    fn stop_cfg_access_point(&mut self) {
        self.calls.push(ServiceCall::StopCfgAccessPoint);
    }

    fn send_scan_settings(&mut self, _config: &GatewayConfig) {
        self.calls.push(ServiceCall::SendScanSettings);
    }
}

// ── Config store ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockConfigStore {
    pub stored: RefCell<Option<GatewayConfig>>,
    pub saves: Cell<u32>,
}

#[allow(dead_code)]
impl MockConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigPort for MockConfigStore {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        self.stored.borrow().clone().ok_or(ConfigError::NotFound)
    }

    fn save(&self, config: &GatewayConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.stored.borrow_mut() = Some(config.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// ── Indicator ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorCall {
    PollOk,
    PollTimeout,
    CfgMode(bool),
}

#[derive(Default)]
pub struct MockIndicator {
    pub calls: Vec<IndicatorCall>,
}

#[allow(dead_code)]
impl MockIndicator {
    pub fn last(&self) -> Option<IndicatorCall> {
        self.calls.last().copied()
    }
}

impl StatusIndicator for MockIndicator {
    fn http_poll_ok(&mut self) {
        self.calls.push(IndicatorCall::PollOk);
    }

    fn http_poll_timeout(&mut self) {
        self.calls.push(IndicatorCall::PollTimeout);
    }

    fn cfg_mode(&mut self, active: bool) {
        self.calls.push(IndicatorCall::CfgMode(active));
    }
}

// ── Fixtures ──────────────────────────────────────────────────

#[allow(dead_code)]
pub fn tag(n: u8) -> MacAddr {
    MacAddr::new([0xC0, 0xFF, 0xEE, 0x00, 0x00, n])
}

/// Record from `tag(n)` stamped with `timestamp`.
#[allow(dead_code)]
pub fn report(n: u8, timestamp: u32) -> AdvReport {
    AdvReport {
        tag_mac: tag(n),
        timestamp,
        samples_counter: 1,
        rssi: -60,
        data: heapless::Vec::from_slice(&[0x02, 0x01, 0x06]).unwrap_or_default(),
    }
}
