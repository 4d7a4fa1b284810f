//! UART link to the BLE co-processor.
//!
//! | Module     | Role                                              |
//! |------------|---------------------------------------------------|
//! | `codec`    | STX/LEN/CRC/ETX framing, streaming decoder        |
//! | `settings` | filter + scan settings frame sent to the scanner  |
//! | `uart`     | reader task feeding decoded frames to ingestion   |

pub mod codec;
pub mod settings;
pub mod uart;

use std::sync::{Mutex, PoisonError};

use crate::adv::MacAddr;

/// Command byte, the first byte of every frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SerialCmd {
    /// Host → scanner: set company-id filter.
    SetFilter = 0x01,
    /// Host → scanner: remove the filter.
    ClearFilter = 0x02,
    /// Host → scanner: filter and scan settings in one frame.
    AllFilters = 0x03,
    /// Scanner → host: one advertisement report.
    AdvReport = 0x10,
    /// Scanner → host: scanner's device id and address.
    DeviceId = 0x11,
    /// Scanner → host: acknowledgement of a settings frame.
    Ack = 0x12,
    /// Host → scanner: request `DeviceId`.
    GetDeviceId = 0x13,
}

impl SerialCmd {
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::SetFilter,
            0x02 => Self::ClearFilter,
            0x03 => Self::AllFilters,
            0x10 => Self::AdvReport,
            0x11 => Self::DeviceId,
            0x12 => Self::Ack,
            0x13 => Self::GetDeviceId,
            _ => return None,
        })
    }
}

/// `DeviceId` payload: 8-byte device id, then the 6-byte BLE address.
pub const DEVICE_ID_PAYLOAD_LEN: usize = 14;

/// BLE address from a `DeviceId` frame body (command byte included).
pub fn parse_device_addr(body: &[u8]) -> Option<MacAddr> {
    let payload = body.get(1..)?;
    if payload.len() < DEVICE_ID_PAYLOAD_LEN {
        return None;
    }
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&payload[8..DEVICE_ID_PAYLOAD_LEN]);
    Some(MacAddr::new(addr))
}

/// Scanner address as last reported over the link.  Written by the UART
/// reader, read when the status document is built.
#[derive(Debug, Default)]
pub struct ScannerAddr(Mutex<Option<MacAddr>>);

impl ScannerAddr {
    pub fn set(&self, addr: MacAddr) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);
    }

    pub fn get(&self) -> Option<MacAddr> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
