//! JSON bodies sent to the backend and served to local clients.
//!
//! Records:
//! ```json
//! {"data":{"coordinates":"","timestamp":1700000000,"nonce":7,
//!          "gw_mac":"AA:BB:CC:DD:EE:FF",
//!          "tags":{"C0:FF:EE:00:00:01":{"rssi":-60,"timestamp":1700000000,"data":"0201061BFF9904"}}}}
//! ```
//! With timestamps disabled the header has no `timestamp` and each tag
//! carries `counter` instead.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::adv::{ADV_DATA_MAX_LEN, AdvReport, MacAddr};

/// Upper-case hex of the advertisement bytes.
pub type HexData = heapless::String<{ ADV_DATA_MAX_LEN * 2 }>;

pub fn hex_upper(bytes: &[u8]) -> HexData {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = HexData::new();
    for &b in bytes.iter().take(ADV_DATA_MAX_LEN) {
        let _ = out.push(char::from(DIGITS[usize::from(b >> 4)]));
        let _ = out.push(char::from(DIGITS[usize::from(b & 0x0F)]));
    }
    out
}

// ── Records ───────────────────────────────────────────────────

/// Gateway-level fields of a records document.
#[derive(Debug, Clone, Copy)]
pub struct RecordsHeader<'a> {
    pub coordinates: &'a str,
    pub gw_mac: &'a str,
    /// `Some` only when timestamps are in use.
    pub timestamp: Option<u32>,
    /// Batch nonce; history responses carry none.
    pub nonce: Option<u32>,
    pub use_timestamps: bool,
}

#[derive(Serialize)]
struct Tag<'a> {
    rssi: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counter: Option<u32>,
    data: &'a str,
}

/// `tags` object in record order.
struct Tags<'a> {
    records: &'a [AdvReport],
    use_timestamps: bool,
}

impl Serialize for Tags<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for r in self.records {
            let hex = hex_upper(&r.data);
            let (timestamp, counter) = if self.use_timestamps {
                (Some(r.timestamp), None)
            } else {
                (None, Some(r.timestamp))
            };
            map.serialize_entry(
                r.tag_mac.to_hstring().as_str(),
                &Tag {
                    rssi: r.rssi,
                    timestamp,
                    counter,
                    data: &hex,
                },
            )?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct RecordsData<'a> {
    coordinates: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u32>,
    gw_mac: &'a str,
    tags: Tags<'a>,
}

#[derive(Serialize)]
struct Records<'a> {
    data: RecordsData<'a>,
}

pub fn records_json(records: &[AdvReport], header: &RecordsHeader<'_>) -> serde_json::Result<String> {
    serde_json::to_string(&Records {
        data: RecordsData {
            coordinates: header.coordinates,
            timestamp: header.timestamp.filter(|_| header.use_timestamps),
            nonce: header.nonce,
            gw_mac: header.gw_mac,
            tags: Tags {
                records,
                use_timestamps: header.use_timestamps,
            },
        },
    })
}

// ── Status ────────────────────────────────────────────────────

/// Gateway state reported alongside the sensor lists.
#[derive(Debug, Clone, Copy)]
pub struct StatusInfo<'a> {
    pub device_addr: &'a str,
    pub esp_fw: &'a str,
    pub nrf_fw: &'a str,
    pub uptime_secs: u32,
    pub nonce: u32,
    pub connection: &'a str,
    pub num_conn_lost: u32,
}

#[derive(Serialize)]
struct ActiveSensor {
    #[serde(rename = "MAC")]
    mac: heapless::String<17>,
    #[serde(rename = "COUNTER")]
    counter: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct Status<'a> {
    device_addr: &'a str,
    esp_fw: &'a str,
    nrf_fw: &'a str,
    uptime: u32,
    nonce: u32,
    connection: &'a str,
    num_conn_lost: u32,
    sensors_seen: usize,
    active_sensors: Vec<ActiveSensor>,
    inactive_sensors: Vec<heapless::String<17>>,
}

/// Status report.  A record with a non-zero sample counter is an active
/// sensor; anything else is listed as inactive.
pub fn status_json(info: &StatusInfo<'_>, records: &[AdvReport]) -> serde_json::Result<String> {
    let (active, inactive): (Vec<&AdvReport>, Vec<&AdvReport>) =
        records.iter().partition(|r| r.samples_counter != 0);
    serde_json::to_string(&Status {
        device_addr: info.device_addr,
        esp_fw: info.esp_fw,
        nrf_fw: info.nrf_fw,
        uptime: info.uptime_secs,
        nonce: info.nonce,
        connection: info.connection,
        num_conn_lost: info.num_conn_lost,
        sensors_seen: active.len(),
        active_sensors: active
            .iter()
            .map(|r| ActiveSensor {
                mac: r.tag_mac.to_hstring(),
                counter: r.samples_counter,
            })
            .collect(),
        inactive_sensors: inactive.iter().map(|r| r.tag_mac.to_hstring()).collect(),
    })
}

// ── Online status ─────────────────────────────────────────────

#[derive(Serialize)]
struct Online<'a> {
    status: &'static str,
    gw_mac: &'a str,
}

/// Sent once per connection before the first batch.
pub fn online_status_json(gw_mac: &MacAddr) -> serde_json::Result<String> {
    serde_json::to_string(&Online {
        status: "online",
        gw_mac: gw_mac.to_hstring().as_str(),
    })
}

// ── MQTT record ─────────────────────────────────────────────

#[derive(Serialize)]
struct MqttRecord<'a> {
    gw_mac: &'a str,
    rssi: i8,
    /// Gateway time when the message was built.
    #[serde(skip_serializing_if = "Option::is_none")]
    gwts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cnt: Option<u32>,
    data: &'a str,
    coords: &'a str,
}

/// One record, published on its own topic.
pub fn mqtt_record_json(record: &AdvReport, header: &RecordsHeader<'_>) -> serde_json::Result<String> {
    let hex = hex_upper(&record.data);
    let (ts, cnt) = if header.use_timestamps {
        (Some(record.timestamp), None)
    } else {
        (None, Some(record.timestamp))
    };
    serde_json::to_string(&MqttRecord {
        gw_mac: header.gw_mac,
        rssi: record.rssi,
        gwts: header.timestamp.filter(|_| header.use_timestamps),
        ts,
        cnt,
        data: &hex,
        coords: header.coordinates,
    })
}
