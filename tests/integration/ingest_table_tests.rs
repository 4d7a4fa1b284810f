//! UART bytes through framing and ingestion into the table, and on to
//! the relay task.

use std::collections::VecDeque;
use std::sync::Arc;

use blegw::adv::{GatewayAdvTable, MAX_ADVS_TABLE, MacAddr, PutOutcome};
use blegw::config::GatewayConfig;
use blegw::error::Result;
use blegw::ingest::{AdvIngest, adv_report_body};
use blegw::metrics::GatewayMetrics;
use blegw::net_status::{NetworkStatus, WIFI_CONNECTED};
use blegw::os::SignalSet;
use blegw::relay::{RelayIdentity, RelayPorts, RelaySig, RelayTask};
use blegw::serial::codec::{FRAME_OVERHEAD, MAX_BODY_LEN, encode_frame};
use blegw::serial::uart::{SerialRead, SerialReader};

use crate::mock_ports::{MockClock, MockHttp, MockMqtt, MockSystem, MockWatchdog, tag};

const RUUVI: u16 = 0x0499;
const NOW: u32 = 1_700_000_000;

/// Replays queued chunks, then times out forever.
struct ScriptedLink {
    chunks: VecDeque<Vec<u8>>,
}

impl ScriptedLink {
    fn new(bytes: &[u8], chunk: usize) -> Self {
        Self {
            chunks: bytes.chunks(chunk).map(<[u8]>::to_vec).collect(),
        }
    }
}

impl SerialRead for ScriptedLink {
    fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
        let Some(chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

fn frame(mac: MacAddr, rssi: i8, adv: &[u8]) -> Vec<u8> {
    let body = adv_report_body(mac.octets(), rssi, adv);
    let mut out = vec![0u8; MAX_BODY_LEN + FRAME_OVERHEAD];
    let n = encode_frame(body[0], &body[1..], &mut out).unwrap();
    out.truncate(n);
    out
}

/// Ruuvi RAWv2-style payload: flags + manufacturer data.
fn ruuvi_adv() -> Vec<u8> {
    vec![0x02, 0x01, 0x06, 0x05, 0xFF, 0x99, 0x04, 0x05, 0x12]
}

fn mac_of(n: usize) -> MacAddr {
    MacAddr::new([0xC0, 0xFF, 0xEE, 0x00, (n >> 8) as u8, n as u8])
}

struct Pipeline {
    table: Arc<GatewayAdvTable>,
    metrics: Arc<GatewayMetrics>,
    clock: MockClock,
}

impl Pipeline {
    fn new(clock: MockClock) -> Self {
        Self {
            table: Arc::new(GatewayAdvTable::new()),
            metrics: Arc::new(GatewayMetrics::new()),
            clock,
        }
    }

    fn ingest(&self, use_timestamps: bool) -> AdvIngest<MockClock, GatewayMetrics> {
        AdvIngest::new(
            Arc::clone(&self.table),
            Arc::clone(&self.metrics),
            self.clock.clone(),
            RUUVI,
            use_timestamps,
        )
    }

    fn reader(&self, bytes: &[u8], chunk: usize) -> SerialReader<ScriptedLink, MockClock, GatewayMetrics> {
        SerialReader::new(ScriptedLink::new(bytes, chunk), self.ingest(true))
    }

    fn history(&self) -> Vec<blegw::adv::AdvReport> {
        let mut out = blegw::adv::AdvBatch::<MAX_ADVS_TABLE>::new();
        self.table.read_history(0, 0, false, &mut out);
        out.to_vec()
    }
}

#[test]
fn frames_split_across_reads_reach_the_table() {
    let pipe = Pipeline::new(MockClock::synced(NOW));
    let mut bytes = frame(tag(1), -70, &ruuvi_adv());
    bytes.extend(frame(tag(2), -80, &[0x02, 0x01, 0x06]));
    let mut reader = pipe.reader(&bytes, 3);

    let mut routed = 0;
    for _ in 0..bytes.len().div_ceil(3) + 1 {
        routed += reader.poll().unwrap();
    }

    assert_eq!(routed, 2);
    assert_eq!(pipe.table.num_tracked(), 2);
    let history = pipe.history();
    assert_eq!(history[0].tag_mac, tag(2));
    assert_eq!(history[0].samples_counter, 0);
    assert_eq!(history[1].tag_mac, tag(1));
    assert_eq!(history[1].rssi, -70);
    assert_eq!(history[1].samples_counter, 1);
    assert_eq!(history[1].timestamp, NOW);
    assert_eq!(pipe.metrics.snapshot().received_advertisements, 2);
}

#[test]
fn corrupted_frame_is_skipped_and_next_frame_ingested() {
    let pipe = Pipeline::new(MockClock::synced(NOW));
    let mut bad = frame(tag(1), -70, &ruuvi_adv());
    let crc_at = bad.len() - 3;
    bad[crc_at] ^= 0xFF;
    let mut bytes = bad;
    bytes.extend(frame(tag(2), -71, &ruuvi_adv()));
    let mut reader = pipe.reader(&bytes, bytes.len());

    assert_eq!(reader.feed(&bytes), 1);

    assert_eq!(pipe.table.num_tracked(), 1);
    assert_eq!(pipe.history()[0].tag_mac, tag(2));
    assert_eq!(pipe.metrics.snapshot().malformed_frames, 0);
}

#[test]
fn oversize_advertisement_counted_as_malformed() {
    let pipe = Pipeline::new(MockClock::synced(NOW));
    let mut reader = pipe.reader(&[], 1);

    assert_eq!(reader.feed(&frame(tag(1), -70, &[0xAB; 63])), 1);
    assert_eq!(reader.feed(&frame(tag(2), -70, &[0xAB; 62])), 1);

    let snap = pipe.metrics.snapshot();
    assert_eq!(snap.received_advertisements, 2);
    assert_eq!(snap.malformed_frames, 1);
    assert_eq!(pipe.table.num_tracked(), 1);
    assert_eq!(pipe.history()[0].data.len(), 62);
}

#[test]
fn full_table_drops_until_drained() {
    let pipe = Pipeline::new(MockClock::synced(NOW));
    let mut ingest = pipe.ingest(true);
    let body = |n: usize| adv_report_body(mac_of(n).octets(), -60, &ruuvi_adv());

    let failures = (0..MAX_ADVS_TABLE + 2)
        .filter(|&n| ingest.on_frame(Some(&body(n))).is_err())
        .count();
    assert_eq!(failures, 2);
    assert_eq!(pipe.metrics.snapshot().dropped_advertisements, 2);

    // The refused devices left every stored record intact, newest first.
    let expected: Vec<MacAddr> = (0..MAX_ADVS_TABLE).rev().map(mac_of).collect();
    let history = pipe.history();
    assert_eq!(history.iter().map(|r| r.tag_mac).collect::<Vec<_>>(), expected);
    for r in &history {
        assert_eq!(r.timestamp, NOW);
        assert_eq!(r.rssi, -60);
        assert_eq!(r.samples_counter, 1);
        assert_eq!(&r.data[..], &ruuvi_adv()[..]);
    }

    let mut drained = blegw::adv::AdvBatch::<MAX_ADVS_TABLE>::new();
    assert_eq!(pipe.table.drain_retransmission_queue(&mut drained), MAX_ADVS_TABLE);
    let queued: Vec<MacAddr> = (0..MAX_ADVS_TABLE).map(mac_of).collect();
    assert_eq!(drained.iter().map(|r| r.tag_mac).collect::<Vec<_>>(), queued);
    assert_eq!(pipe.history().len(), MAX_ADVS_TABLE);

    // The least recently seen device gives up its slot.
    let outcome = ingest.on_frame(Some(&body(MAX_ADVS_TABLE))).unwrap();
    assert_eq!(outcome, PutOutcome::Evicted(mac_of(0)));
    assert_eq!(pipe.table.num_tracked(), MAX_ADVS_TABLE);
}

#[test]
fn counters_stamp_records_while_clock_unsynced() {
    let clock = MockClock::new();
    let pipe = Pipeline::new(clock.clone());
    let mut ingest = pipe.ingest(true);

    ingest.on_frame(Some(&adv_report_body(tag(1).octets(), -60, &ruuvi_adv()))).unwrap();
    ingest.on_frame(Some(&adv_report_body(tag(2).octets(), -60, &ruuvi_adv()))).unwrap();
    clock.set_unix(NOW);
    ingest.on_frame(Some(&adv_report_body(tag(3).octets(), -60, &ruuvi_adv()))).unwrap();

    let stamps: Vec<u32> = pipe.history().iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps, vec![NOW, 2, 1]);
}

#[test]
fn uart_to_backend() {
    let clock = MockClock::synced(NOW);
    let pipe = Pipeline::new(clock.clone());
    let net = Arc::new(NetworkStatus::new());
    net.set(WIFI_CONNECTED);
    let (mut relay, _handle) = RelayTask::new(
        Arc::clone(&pipe.table),
        Arc::clone(&net),
        GatewayConfig::default(),
        RelayIdentity::default(),
        RelayPorts {
            http: MockHttp::new(),
            mqtt: MockMqtt::new(),
            watchdog: MockWatchdog::default(),
            system: MockSystem::new(),
            time: clock,
        },
    )
    .unwrap();

    let mut bytes = frame(tag(1), -70, &ruuvi_adv());
    bytes.extend(frame(tag(2), -71, &ruuvi_adv()));
    bytes.extend(frame(tag(1), -72, &ruuvi_adv()));
    let mut reader = pipe.reader(&[], 1);
    assert_eq!(reader.feed(&bytes), 3);

    relay.handle_events(SignalSet::of(&[RelaySig::Retransmit]));

    // A device seen again while queued keeps its place in the queue.
    let batches = relay.ports().http.batches();
    assert_eq!(batches, vec![(vec![tag(1), tag(2)], 2)]);
    assert_eq!(pipe.table.num_pending(), 0);
    assert_eq!(pipe.table.num_tracked(), 2);
}
