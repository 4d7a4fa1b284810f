//! Scan settings frame for the BLE co-processor.
//!
//! Payload of [`SerialCmd::AllFilters`]:
//! ```text
//! ┌──────────────────┬────────────┐
//! │ company id (LE)  │ flags (1B) │
//! └──────────────────┴────────────┘
//! ```

use super::SerialCmd;
use super::codec::{FRAME_OVERHEAD, encode_frame};
use crate::config::{FilterConfig, ScanConfig};

pub const FLAG_USE_FILTER: u8 = 1 << 0;
pub const FLAG_CODED_PHY: u8 = 1 << 1;
pub const FLAG_1MBIT_PHY: u8 = 1 << 2;
pub const FLAG_EXTENDED_PAYLOAD: u8 = 1 << 3;
pub const FLAG_CH_37: u8 = 1 << 4;
pub const FLAG_CH_38: u8 = 1 << 5;
pub const FLAG_CH_39: u8 = 1 << 6;

const PAYLOAD_LEN: usize = 3;

/// Encoded settings frame.
pub const SETTINGS_FRAME_LEN: usize = PAYLOAD_LEN + 1 + FRAME_OVERHEAD;

pub fn settings_flags(filter: &FilterConfig, scan: &ScanConfig) -> u8 {
    [
        (filter.company_use_filtering, FLAG_USE_FILTER),
        (scan.use_coded_phy, FLAG_CODED_PHY),
        (scan.use_1mbit_phy, FLAG_1MBIT_PHY),
        (scan.use_extended_payload, FLAG_EXTENDED_PAYLOAD),
        (scan.use_channel_37, FLAG_CH_37),
        (scan.use_channel_38, FLAG_CH_38),
        (scan.use_channel_39, FLAG_CH_39),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .fold(0, |acc, (_, flag)| acc | flag)
}

/// Build the frame carrying filter and scan settings.
pub fn settings_frame(filter: &FilterConfig, scan: &ScanConfig) -> [u8; SETTINGS_FRAME_LEN] {
    let [lo, hi] = filter.company_id.to_le_bytes();
    let payload = [lo, hi, settings_flags(filter, scan)];
    let mut frame = [0u8; SETTINGS_FRAME_LEN];
    // Fixed-size payload always fits.
    let _ = encode_frame(SerialCmd::AllFilters as u8, &payload, &mut frame);
    frame
}
