//! Shared connectivity bitmask.
//!
//! Written by the Wi-Fi/Ethernet/MQTT event handlers, read by the relay
//! and supervisor tasks.  A value stale by one tick is harmless, so a
//! single atomic word is enough.

use core::sync::atomic::{AtomicU32, Ordering};

pub const WIFI_CONNECTED: u32 = 1 << 0;
pub const MQTT_CONNECTED: u32 = 1 << 1;
pub const ETH_CONNECTED: u32 = 1 << 2;
/// Relaying paused (configuration mode, firmware update in progress).
pub const RELAYING_SUSPENDED: u32 = 1 << 3;

#[derive(Debug, Default)]
pub struct NetworkStatus {
    bits: AtomicU32,
    /// Times the network link went down since boot.
    conn_lost: AtomicU32,
}

impl NetworkStatus {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            conn_lost: AtomicU32::new(0),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    pub fn set(&self, mask: u32) {
        self.bits.fetch_or(mask, Ordering::AcqRel);
    }

    pub fn clear(&self, mask: u32) {
        let prev = self.bits.fetch_and(!mask, Ordering::AcqRel);
        let link = WIFI_CONNECTED | ETH_CONNECTED;
        if mask & link != 0 && prev & link != 0 && prev & !mask & link == 0 {
            self.conn_lost.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn is_set(&self, mask: u32) -> bool {
        self.bits() & mask != 0
    }

    /// Wi-Fi or Ethernet has an IP link.
    pub fn is_network_connected(&self) -> bool {
        self.is_set(WIFI_CONNECTED | ETH_CONNECTED)
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.is_set(MQTT_CONNECTED)
    }

    pub fn is_relaying_suspended(&self) -> bool {
        self.is_set(RELAYING_SUSPENDED)
    }

    pub fn connection_lost_count(&self) -> u32 {
        self.conn_lost.load(Ordering::Relaxed)
    }

    /// `"WIFI"`, `"ETHERNET"` or `"NONE"` for status reports.
    pub fn connection_kind(&self) -> &'static str {
        let bits = self.bits();
        if bits & ETH_CONNECTED != 0 {
            "ETHERNET"
        } else if bits & WIFI_CONNECTED != 0 {
            "WIFI"
        } else {
            "NONE"
        }
    }
}
