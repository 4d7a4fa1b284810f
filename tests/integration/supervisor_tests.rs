//! Main loop stepped signal by signal against mock services.

use std::sync::Arc;

use blegw::adapters::network::{Link, LinkEvent, LinkMonitor};
use blegw::adv::GatewayAdvTable;
use blegw::config::{GatewayConfig, bounded};
use blegw::net_status::{NetworkStatus, RELAYING_SUSPENDED, WIFI_CONNECTED};
use blegw::os::SignalSet;
use blegw::relay::{RelayIdentity, RelayPorts, RelaySig, RelayTask};
use blegw::supervisor::fw_update::{DELAY_AFTER_BOOT, DELAY_AFTER_SUCCESS, DELAY_BEFORE_RETRY};
use blegw::supervisor::heap::{MAX_LOW_WINDOWS, SAMPLES_PER_WINDOW};
use blegw::supervisor::{Supervisor, SupervisorHandle, SupervisorPorts, SupervisorSig};

use crate::mock_ports::{
    IndicatorCall, MockClock, MockConfigStore, MockHttp, MockIndicator, MockMqtt, MockServices,
    MockSystem, MockWatchdog, ServiceCall,
};

const SYNCED: u32 = 1_700_000_000;

type TestRelay = RelayTask<MockHttp, MockMqtt, MockWatchdog, MockSystem, MockClock>;
type TestSupervisor =
    Supervisor<MockServices, MockConfigStore, MockWatchdog, MockSystem, MockClock, MockIndicator>;

struct Rig {
    net: Arc<NetworkStatus>,
    clock: MockClock,
    /// Only used to observe what the supervisor sends to the relay.
    relay: TestRelay,
    sup: TestSupervisor,
    handle: SupervisorHandle,
}

impl Rig {
    fn new(config: GatewayConfig) -> Self {
        let table = Arc::new(GatewayAdvTable::new());
        let net = Arc::new(NetworkStatus::new());
        let clock = MockClock::new();
        let (relay, relay_handle) = RelayTask::new(
            table,
            Arc::clone(&net),
            config.clone(),
            RelayIdentity::default(),
            RelayPorts {
                http: MockHttp::new(),
                mqtt: MockMqtt::new(),
                watchdog: MockWatchdog::default(),
                system: MockSystem::new(),
                time: clock.clone(),
            },
        )
        .unwrap();
        let (sup, handle) = Supervisor::new(
            config,
            Arc::clone(&net),
            relay_handle,
            SupervisorPorts {
                services: MockServices::new(),
                config_store: MockConfigStore::new(),
                watchdog: MockWatchdog::default(),
                system: MockSystem::new(),
                time: clock.clone(),
                indicator: MockIndicator::default(),
            },
        )
        .unwrap();
        Self {
            net,
            clock,
            relay,
            sup,
            handle,
        }
    }

    fn step(&mut self, sig: SupervisorSig) -> bool {
        self.sup.handle_events(SignalSet::of(&[sig]))
    }

    fn step_pending(&mut self) -> bool {
        let pending = self.sup.take_pending();
        self.sup.handle_events(pending)
    }

    fn relay_pending(&self) -> SignalSet<RelaySig> {
        self.relay.take_pending()
    }

    fn services(&self) -> &MockServices {
        &self.sup.ports().services
    }

    fn indicator(&self) -> &[IndicatorCall] {
        &self.sup.ports().indicator.calls
    }
}

fn remote_cfg_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.remote_cfg.use_remote_cfg = true;
    config.remote_cfg.url = bounded("https://cfg.example.com/gw_cfg.json");
    config.remote_cfg.refresh_interval_minutes = 15;
    config
}

// ── Start-up ──────────────────────────────────────────────────

#[test]
fn start_registers_watchdog_and_arms_timers() {
    let mut config = remote_cfg_config();
    config.mqtt.use_mqtt = true;
    let mut rig = Rig::new(config);

    rig.sup.start();

    assert!(rig.sup.ports().watchdog.registered);
    assert_eq!(rig.services().count(ServiceCall::StartMqtt), 1);
    assert!(rig.sup.history_timeout_armed());
    assert_eq!(rig.sup.fw_check_schedule(), Some(DELAY_AFTER_BOOT));
    assert_eq!(rig.sup.remote_cfg_period().map(|d| d.as_secs()), Some(15 * 60));
}

#[test]
fn manual_update_cycle_schedules_no_fw_check() {
    let mut config = GatewayConfig::default();
    config.auto_update.cycle = blegw::config::AutoUpdateCycle::Manual;
    let mut rig = Rig::new(config);

    rig.sup.start();

    assert_eq!(rig.sup.fw_check_schedule(), None);
    assert_eq!(rig.sup.remote_cfg_period(), None);
}

// ── Configuration mode ────────────────────────────────────────

#[test]
fn cfg_mode_suspends_relaying() {
    let mut rig = Rig::new(GatewayConfig::default());

    rig.step(SupervisorSig::ActivateCfgMode);

    assert!(rig.sup.is_cfg_mode());
    assert!(rig.net.is_set(RELAYING_SUSPENDED));
    assert!(rig.relay_pending().contains(RelaySig::DisableRetransmission));
    assert_eq!(rig.services().calls, vec![ServiceCall::StartCfgAccessPoint]);
    assert_eq!(rig.indicator(), &[IndicatorCall::CfgMode(true)]);
}

#[test]
fn second_activation_is_ignored() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.step(SupervisorSig::ActivateCfgMode);
    rig.relay_pending();

    rig.step(SupervisorSig::ActivateCfgMode);

    assert_eq!(rig.services().count(ServiceCall::StartCfgAccessPoint), 1);
    assert!(rig.relay_pending().is_empty());
}

#[test]
fn leaving_cfg_mode_restarts_services_and_relaying() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.step(SupervisorSig::ActivateCfgMode);
    rig.relay_pending();

    rig.step(SupervisorSig::DeactivateCfgMode);

    assert!(!rig.sup.is_cfg_mode());
    assert!(!rig.net.is_set(RELAYING_SUSPENDED));
    assert!(rig.relay_pending().contains(RelaySig::EnableRetransmission));
    assert_eq!(
        rig.services().calls,
        vec![
            ServiceCall::StartCfgAccessPoint,
            ServiceCall::StopCfgAccessPoint,
            ServiceCall::StopMqtt,
            ServiceCall::SendScanSettings,
        ]
    );
    assert_eq!(
        rig.indicator(),
        &[
            IndicatorCall::CfgMode(true),
            IndicatorCall::CfgMode(false),
            IndicatorCall::PollOk,
        ]
    );
    assert!(rig.sup.history_timeout_armed());
    assert_eq!(rig.sup.fw_check_schedule(), Some(DELAY_AFTER_BOOT));
}

#[test]
fn deactivation_outside_cfg_mode_is_ignored() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.step(SupervisorSig::DeactivateCfgMode);
    assert!(rig.services().calls.is_empty());
    assert!(rig.relay_pending().is_empty());
}

#[test]
fn set_default_config_saves_and_leaves_cfg_mode() {
    let mut config = GatewayConfig::default();
    config.coordinates = bounded("60.1699,24.9384");
    let mut rig = Rig::new(config);
    rig.step(SupervisorSig::ActivateCfgMode);

    rig.step(SupervisorSig::SetDefaultConfig);

    assert!(rig.sup.config().coordinates.is_empty());
    let store = &rig.sup.ports().config_store;
    assert_eq!(store.saves.get(), 1);
    assert_eq!(store.stored.borrow().as_ref(), Some(&GatewayConfig::default()));
    assert!(rig.sup.is_cfg_mode());

    rig.step_pending();
    assert!(!rig.sup.is_cfg_mode());
}

// ── Firmware update checks ────────────────────────────────────

#[test]
fn fw_check_offline_schedules_retry() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.clock.set_unix(SYNCED);

    rig.step(SupervisorSig::CheckForFwUpdates);

    assert_eq!(rig.services().count(ServiceCall::CheckForFwUpdates), 0);
    assert_eq!(rig.sup.fw_check_schedule(), Some(DELAY_BEFORE_RETRY));
}

#[test]
fn fw_check_without_time_schedules_retry() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.net.set(WIFI_CONNECTED);

    rig.step(SupervisorSig::CheckForFwUpdates);

    assert_eq!(rig.services().count(ServiceCall::CheckForFwUpdates), 0);
    assert_eq!(rig.sup.fw_check_schedule(), Some(DELAY_BEFORE_RETRY));
}

#[test]
fn successful_fw_check_schedules_next_cycle() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.net.set(WIFI_CONNECTED);
    rig.clock.set_unix(SYNCED);

    rig.step(SupervisorSig::CheckForFwUpdates);

    assert_eq!(rig.services().count(ServiceCall::CheckForFwUpdates), 1);
    assert_eq!(rig.sup.fw_check_schedule(), Some(DELAY_AFTER_SUCCESS));
}

#[test]
fn failed_fw_check_schedules_retry() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.sup.ports_mut().services.fw_check_result = false;
    rig.net.set(WIFI_CONNECTED);
    rig.clock.set_unix(SYNCED);

    rig.step(SupervisorSig::CheckForFwUpdates);

    assert_eq!(rig.services().count(ServiceCall::CheckForFwUpdates), 1);
    assert_eq!(rig.sup.fw_check_schedule(), Some(DELAY_BEFORE_RETRY));
}

// ── Heap watch ────────────────────────────────────────────────

#[test]
fn low_heap_for_three_windows_restarts() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.sup.ports().system.free_heap.set(10 * 1024);

    for _ in 0..SAMPLES_PER_WINDOW * MAX_LOW_WINDOWS - 1 {
        rig.step(SupervisorSig::LogHeapUsage);
    }
    assert!(!rig.sup.ports().system.restarted());

    rig.step(SupervisorSig::LogHeapUsage);
    assert_eq!(*rig.sup.ports().system.restarts.borrow(), vec!["Low memory"]);
}

#[test]
fn healthy_window_resets_low_heap_count() {
    let mut rig = Rig::new(GatewayConfig::default());
    let windows = [10 * 1024, 10 * 1024, 100 * 1024, 10 * 1024, 10 * 1024];
    for free in windows {
        rig.sup.ports().system.free_heap.set(free);
        for _ in 0..SAMPLES_PER_WINDOW {
            rig.step(SupervisorSig::LogHeapUsage);
        }
    }
    assert!(!rig.sup.ports().system.restarted());
}

// ── Network events and remote configuration ───────────────────

#[test]
fn first_network_connection_requests_remote_cfg_once() {
    let mut rig = Rig::new(remote_cfg_config());

    rig.step(SupervisorSig::NetworkConnected);
    assert_eq!(rig.services().count(ServiceCall::StartMdns), 1);
    rig.step_pending();
    assert_eq!(rig.services().count(ServiceCall::RequestRemoteCfg), 1);

    rig.step(SupervisorSig::NetworkDisconnected);
    rig.step(SupervisorSig::NetworkConnected);
    assert!(!rig.sup.take_pending().contains(SupervisorSig::CheckForRemoteCfg));
    assert_eq!(rig.services().count(ServiceCall::StartMdns), 2);
    assert_eq!(rig.services().count(ServiceCall::StopMdns), 1);
}

#[test]
fn no_remote_cfg_request_in_cfg_mode() {
    let mut rig = Rig::new(remote_cfg_config());
    rig.step(SupervisorSig::ActivateCfgMode);

    rig.step(SupervisorSig::NetworkConnected);

    assert!(!rig.sup.take_pending().contains(SupervisorSig::CheckForRemoteCfg));
}

#[test]
fn remote_cfg_disabled_ignores_check() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.step(SupervisorSig::CheckForRemoteCfg);
    assert_eq!(rig.services().count(ServiceCall::RequestRemoteCfg), 0);
}

#[test]
fn link_events_drive_status_bits_and_supervisor() {
    let mut rig = Rig::new(GatewayConfig::default());
    let links = LinkMonitor::new(Arc::clone(&rig.net), rig.handle.clone());

    links.on_event(LinkEvent::Up(Link::Wifi));
    assert!(rig.net.is_set(WIFI_CONNECTED));
    let pending = rig.sup.take_pending();
    assert!(pending.contains(SupervisorSig::NetworkConnected));
    rig.sup.handle_events(pending);
    assert_eq!(rig.services().count(ServiceCall::StartMdns), 1);

    // A second link is not a new connection.
    links.on_event(LinkEvent::Up(Link::Ethernet));
    assert!(!rig.sup.take_pending().contains(SupervisorSig::NetworkConnected));

    // Wi-Fi drops while Ethernet stays up: reconnect, but still online.
    links.on_event(LinkEvent::Down(Link::Wifi));
    let pending = rig.sup.take_pending();
    assert!(pending.contains(SupervisorSig::ReconnectNetwork));
    assert!(!pending.contains(SupervisorSig::NetworkDisconnected));
    assert!(rig.net.is_network_connected());

    links.on_event(LinkEvent::Down(Link::Ethernet));
    let pending = rig.sup.take_pending();
    assert!(pending.contains(SupervisorSig::NetworkDisconnected));
    assert!(!pending.contains(SupervisorSig::ReconnectNetwork));
    rig.sup.handle_events(pending);
    assert_eq!(rig.services().count(ServiceCall::StopMdns), 1);
    assert!(!rig.net.is_network_connected());
    assert_eq!(rig.net.connection_lost_count(), 1);
}

#[test]
fn link_up_lets_the_relay_deliver() {
    let mut rig = Rig::new(GatewayConfig::default());
    let links = LinkMonitor::new(Arc::clone(&rig.net), rig.handle.clone());
    rig.relay.handle_events(SignalSet::of(&[RelaySig::Retransmit]));
    assert!(!rig.relay.is_connected());

    links.on_event(LinkEvent::Up(Link::Wifi));
    rig.relay.handle_events(SignalSet::of(&[RelaySig::Retransmit]));

    assert!(rig.relay.is_connected());
    assert_eq!(rig.relay.ports().http.online_nonces(), vec![1]);
}

#[test]
fn reconnect_network_is_forwarded() {
    let mut rig = Rig::new(GatewayConfig::default());
    rig.step(SupervisorSig::ReconnectNetwork);
    assert_eq!(rig.services().last(), Some(ServiceCall::ReconnectNetwork));
}

// ── History polling and relaying mode ─────────────────────────

#[test]
fn history_poll_indication() {
    let mut rig = Rig::new(GatewayConfig::default());
    assert!(rig.handle.on_get_history());
    rig.step_pending();
    assert!(rig.sup.history_timeout_armed());

    rig.step(SupervisorSig::OnGetHistoryTimeout);
    assert_eq!(
        rig.indicator(),
        &[IndicatorCall::PollOk, IndicatorCall::PollTimeout]
    );
}

#[test]
fn relaying_mode_change_follows_suspend_bit() {
    let mut config = GatewayConfig::default();
    config.mqtt.use_mqtt = true;
    let mut rig = Rig::new(config);

    rig.net.set(RELAYING_SUSPENDED);
    rig.step(SupervisorSig::RelayingModeChanged);
    assert_eq!(rig.services().last(), Some(ServiceCall::StopMqtt));
    assert!(rig.relay_pending().contains(RelaySig::DisableRetransmission));

    rig.net.clear(RELAYING_SUSPENDED);
    rig.step(SupervisorSig::RelayingModeChanged);
    assert_eq!(rig.services().last(), Some(ServiceCall::StartMqtt));
    assert!(rig.relay_pending().contains(RelaySig::EnableRetransmission));
}

#[test]
fn watchdog_feed_and_stop() {
    let mut rig = Rig::new(GatewayConfig::default());
    assert!(!rig.step(SupervisorSig::TaskWatchdogFeed));
    assert_eq!(rig.sup.ports().watchdog.feeds, 1);

    assert!(rig.handle.stop());
    assert!(rig.step_pending());
}
