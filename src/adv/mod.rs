//! Advertisement records and the fixed-capacity table that buffers them.
//!
//! ```text
//!              records: [AdvReport; N]   (one pool, never reallocated)
//!                 ▲          ▲          ▲
//!   ┌─────────────┘          │          └──────────────┐
//!   │                        │                         │
//! HashIndex              HistoryList             RetransmitQueue
//! 101 buckets of         every slot, most        slots with data not
//! singly linked slots    recently touched first  yet drained (FIFO)
//! ```
//!
//! All three structures link slots by `u16` index, so membership changes
//! are O(1) and nothing is allocated after construction.

pub mod hash_index;
pub mod history;
pub mod retransmit;
pub mod table;

use core::fmt;

pub use table::{AdvTable, PutOutcome};

/// Largest BLE advertisement payload a record can hold (extended advertising).
pub const ADV_DATA_MAX_LEN: usize = 62;

/// Number of slots in the gateway's table.
pub const MAX_ADVS_TABLE: usize = 128;

/// Table sized for the gateway.
pub type GatewayAdvTable = AdvTable<MAX_ADVS_TABLE>;

/// Raw advertisement bytes, stored with explicit length.
pub type AdvData = heapless::Vec<u8, ADV_DATA_MAX_LEN>;

/// Fixed-capacity output buffer for drains and history reads.
pub type AdvBatch<const N: usize = MAX_ADVS_TABLE> = heapless::Vec<AdvReport, N>;

// ── MAC address ───────────────────────────────────────────────

/// 6-byte BLE device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// `AA:BB:CC:DD:EE:FF` as a stack string, for JSON keys.
    pub fn to_hstring(&self) -> heapless::String<17> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        let _ = write!(s, "{self}");
        s
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

// ── Advertisement record ──────────────────────────────────────

/// One BLE sighting.
///
/// `timestamp == 0` marks a free table slot, so ingestion never stamps
/// a record with zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvReport {
    pub tag_mac: MacAddr,
    /// Unix seconds when the clock is synchronised, otherwise a counter.
    pub timestamp: u32,
    /// Recognised sensor samples in `data`; 0 for unknown payloads.
    pub samples_counter: u16,
    pub rssi: i8,
    pub data: AdvData,
}

impl AdvReport {
    pub fn is_free(&self) -> bool {
        self.timestamp == 0
    }
}
