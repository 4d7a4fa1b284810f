//! History queries against a populated table, with the relay task and
//! the main loop on the receiving end of the notifications.

use std::sync::Arc;

use blegw::adv::{GatewayAdvTable, MacAddr};
use blegw::config::GatewayConfig;
use blegw::history::{HistoryFilter, HistoryQuery, HistoryRequest};
use blegw::net_status::NetworkStatus;
use blegw::os::SignalSet;
use blegw::relay::{RelayIdentity, RelayPorts, RelaySig, RelayTask};
use blegw::supervisor::{Supervisor, SupervisorPorts, SupervisorSig};

use crate::mock_ports::{
    MockClock, MockConfigStore, MockHttp, MockIndicator, MockMqtt, MockServices, MockSystem,
    MockWatchdog, report,
};

const NOW: u32 = 1_700_000_000;
const GW_MAC: MacAddr = MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

type TestRelay = RelayTask<MockHttp, MockMqtt, MockWatchdog, MockSystem, MockClock>;
type TestSupervisor =
    Supervisor<MockServices, MockConfigStore, MockWatchdog, MockSystem, MockClock, MockIndicator>;

struct Rig {
    table: Arc<GatewayAdvTable>,
    clock: MockClock,
    relay: TestRelay,
    sup: TestSupervisor,
    query: HistoryQuery,
}

fn rig() -> Rig {
    let mut config = GatewayConfig::default();
    config.relay.network_watchdog_timeout_secs = 60;
    let table = Arc::new(GatewayAdvTable::new());
    let net = Arc::new(NetworkStatus::new());
    let clock = MockClock::new();
    let (relay, relay_handle) = RelayTask::new(
        Arc::clone(&table),
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
    let (sup, sup_handle) = Supervisor::new(
        config,
        net,
        relay_handle.clone(),
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
    let query = HistoryQuery::new(Arc::clone(&table), relay_handle, sup_handle, GW_MAC);
    Rig {
        table,
        clock,
        relay,
        sup,
        query,
    }
}

fn timestamps(params: Option<&str>, unix_time: Option<u32>) -> HistoryRequest<'_> {
    HistoryRequest {
        params,
        use_timestamps: true,
        unix_time,
        coordinates: "",
    }
}

fn counters(params: Option<&str>) -> HistoryRequest<'_> {
    HistoryRequest {
        params,
        use_timestamps: false,
        unix_time: None,
        coordinates: "",
    }
}

fn tag_keys(json: &str) -> Vec<String> {
    let v: serde_json::Value = serde_json::from_str(json).unwrap();
    v["data"]["tags"]
        .as_object()
        .map(|tags| tags.keys().cloned().collect())
        .unwrap_or_default()
}

#[test]
fn time_parameter_limits_age() {
    let mut rig = rig();
    rig.table.put(&report(2, NOW - 5_000)).unwrap();
    rig.table.put(&report(1, NOW - 10)).unwrap();

    let resp = rig.query.run(&timestamps(Some("time=60"), Some(NOW))).unwrap();

    assert_eq!(resp.filter, HistoryFilter::MaxAge(60));
    assert_eq!(resp.num_records, 1);
    assert_eq!(tag_keys(&resp.json), vec!["C0:FF:EE:00:00:01"]);
    let v: serde_json::Value = serde_json::from_str(&resp.json).unwrap();
    assert_eq!(v["data"]["timestamp"], NOW);
    assert_eq!(v["data"]["gw_mac"], "AA:BB:CC:DD:EE:FF");
    assert!(v["data"].get("nonce").is_none());
}

#[test]
fn default_interval_is_one_hour() {
    let mut rig = rig();
    rig.table.put(&report(2, NOW - 3_601)).unwrap();
    rig.table.put(&report(1, NOW - 3_600)).unwrap();

    let resp = rig.query.run(&timestamps(None, Some(NOW))).unwrap();

    assert_eq!(resp.filter, HistoryFilter::MaxAge(3600));
    assert_eq!(resp.num_records, 1);
}

#[test]
fn unsynced_clock_returns_everything() {
    let mut rig = rig();
    rig.table.put(&report(2, 7)).unwrap();
    rig.table.put(&report(1, 8)).unwrap();

    let resp = rig.query.run(&timestamps(Some("time=60"), None)).unwrap();

    assert_eq!(resp.filter, HistoryFilter::All);
    assert_eq!(resp.num_records, 2);
}

#[test]
fn counter_parameter_returns_newer_records() {
    let mut rig = rig();
    for (n, counter) in [(1, 10), (2, 11), (3, 12), (4, 13)] {
        rig.table.put(&report(n, counter)).unwrap();
    }

    let resp = rig.query.run(&counters(Some("counter=11"))).unwrap();

    assert_eq!(resp.filter, HistoryFilter::SinceCounter(11));
    assert_eq!(resp.num_records, 2);
    assert_eq!(tag_keys(&resp.json), vec!["C0:FF:EE:00:00:03", "C0:FF:EE:00:00:04"]);
    // Most recently seen first.
    let first = resp.json.find("C0:FF:EE:00:00:04").unwrap();
    let second = resp.json.find("C0:FF:EE:00:00:03").unwrap();
    assert!(first < second);
    let v: serde_json::Value = serde_json::from_str(&resp.json).unwrap();
    assert_eq!(v["data"]["tags"]["C0:FF:EE:00:00:04"]["counter"], 13);
    assert!(v["data"].get("timestamp").is_none());
}

#[test]
fn history_does_not_drain_retransmission_queue() {
    let mut rig = rig();
    rig.table.put(&report(1, NOW)).unwrap();

    rig.query.run(&timestamps(None, Some(NOW))).unwrap();

    assert_eq!(rig.table.num_pending(), 1);
}

#[test]
fn every_query_resets_poll_timeout() {
    let mut rig = rig();

    let resp = rig.query.run(&timestamps(None, Some(NOW))).unwrap();
    assert_eq!(resp.num_records, 0);
    assert!(tag_keys(&resp.json).is_empty());

    let pending = rig.sup.take_pending();
    assert!(pending.contains(SupervisorSig::OnGetHistory));
    rig.sup.handle_events(pending);
    assert!(rig.sup.history_timeout_armed());
}

#[test]
fn non_empty_history_feeds_network_watchdog() {
    let mut rig = rig();
    rig.table.put(&report(1, NOW)).unwrap();

    rig.clock.advance_ms(61_000);
    rig.query.run(&timestamps(None, Some(NOW))).unwrap();
    rig.relay.handle_events(SignalSet::of(&[RelaySig::NetworkWatchdog]));

    assert!(!rig.relay.ports().system.restarted());
    assert_eq!(rig.relay.last_comm_ms(), 61_000);
}

#[test]
fn empty_history_does_not_feed_network_watchdog() {
    let mut rig = rig();

    rig.clock.advance_ms(61_000);
    rig.query.run(&timestamps(None, Some(NOW))).unwrap();
    rig.relay.handle_events(SignalSet::of(&[RelaySig::NetworkWatchdog]));

    assert!(rig.relay.ports().system.restarted());
}
