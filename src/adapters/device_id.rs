//! Gateway identity derived from the ESP32 factory MAC address.
//!
//! The MAC is reported as `gw_mac` in every JSON document the gateway
//! sends and names the configuration access point (`Gateway XXYY`).

use crate::adv::MacAddr;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddr {
    let mut mac = [0u8; 6];
    // SAFETY: `mac` is the 6-byte buffer the call expects.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    MacAddr::new(mac)
}

/// Simulation: a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddr {
    MacAddr::new([0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE])
}

/// Access point SSID: `Gateway XXYY` from the last two MAC bytes.
pub fn ap_ssid(mac: &MacAddr) -> heapless::String<32> {
    use core::fmt::Write;
    let m = mac.octets();
    let mut name = heapless::String::new();
    let _ = write!(name, "Gateway {:02X}{:02X}", m[4], m[5]);
    name
}

/// mDNS host name: `gateway-xxyyzz`.
pub fn hostname(mac: &MacAddr) -> heapless::String<24> {
    use core::fmt::Write;
    let m = mac.octets();
    let mut name = heapless::String::new();
    let _ = write!(name, "gateway-{:02x}{:02x}{:02x}", m[3], m[4], m[5]);
    name
}
