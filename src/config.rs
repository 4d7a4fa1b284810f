//! Gateway configuration.
//!
//! All tunable parameters of the gateway.  Persisted in NVS as a postcard
//! blob (see [`crate::adapters::nvs`]) and replaced at runtime by remote
//! configuration or the local configuration page.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// URL field (HTTP targets, remote config source).
pub type UrlString = heapless::String<256>;
/// User name / password field.
pub type CredString = heapless::String<64>;
/// Host name field.
pub type HostString = heapless::String<128>;
/// Short free text (MQTT prefix, client id, coordinates).
pub type ShortString = heapless::String<64>;

/// Company identifier carried by the sensor tags this gateway relays.
pub const RUUVI_COMPANY_ID: u16 = 0x0499;

/// Build a bounded string from a literal, truncating on overflow.
pub fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

// ── Sections ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub use_http: bool,
    pub url: UrlString,
    pub user: CredString,
    pub pass: CredString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpStatConfig {
    pub use_http_stat: bool,
    pub url: UrlString,
    pub user: CredString,
    pub pass: CredString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MqttTransport {
    Tcp,
    Ssl,
    Ws,
    Wss,
}

impl MqttTransport {
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Tcp => "mqtt",
            Self::Ssl => "mqtts",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub use_mqtt: bool,
    pub transport: MqttTransport,
    pub server: HostString,
    pub port: u16,
    /// Topic prefix; records go to `<prefix><tag MAC>`.
    pub prefix: ShortString,
    pub client_id: ShortString,
    pub user: CredString,
    pub pass: CredString,
}

/// Periods of the relay task's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub retransmit_period_ms: u32,
    /// Reboot if nothing was delivered for this long.  0 disables.
    pub network_watchdog_timeout_secs: u32,
    pub network_watchdog_check_ms: u32,
    pub task_watchdog_feed_ms: u32,
    pub statistics_period_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoUpdateCycle {
    Regular,
    Beta,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoUpdateConfig {
    pub cycle: AutoUpdateCycle,
    /// Bit 0 = Sunday … bit 6 = Saturday.
    pub weekdays_bitmask: u8,
    /// Allowed local hours, `[from, to)`.
    pub interval_from: u8,
    pub interval_to: u8,
    pub tz_offset_hours: i8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCfgConfig {
    pub use_remote_cfg: bool,
    pub url: UrlString,
    pub refresh_interval_minutes: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub company_id: u16,
    pub company_use_filtering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub use_coded_phy: bool,
    pub use_1mbit_phy: bool,
    pub use_extended_payload: bool,
    pub use_channel_37: bool,
    pub use_channel_38: bool,
    pub use_channel_39: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtpConfig {
    pub use_ntp: bool,
    /// Stamp records with wall-clock time instead of a counter.
    pub use_timestamps: bool,
}

// ── Top level ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub http: HttpConfig,
    pub http_stat: HttpStatConfig,
    pub mqtt: MqttConfig,
    pub relay: RelayConfig,
    pub auto_update: AutoUpdateConfig,
    pub remote_cfg: RemoteCfgConfig,
    pub filter: FilterConfig,
    pub scan: ScanConfig,
    pub ntp: NtpConfig,
    pub coordinates: ShortString,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                use_http: true,
                url: bounded("https://network.ruuvi.com/record"),
                user: CredString::new(),
                pass: CredString::new(),
            },
            http_stat: HttpStatConfig {
                use_http_stat: true,
                url: bounded("https://network.ruuvi.com/status"),
                user: CredString::new(),
                pass: CredString::new(),
            },
            mqtt: MqttConfig {
                use_mqtt: false,
                transport: MqttTransport::Tcp,
                server: bounded("test.mosquitto.org"),
                port: 1883,
                prefix: bounded("ruuvi/"),
                client_id: ShortString::new(),
                user: CredString::new(),
                pass: CredString::new(),
            },
            relay: RelayConfig {
                retransmit_period_ms: 10_000,
                network_watchdog_timeout_secs: 60 * 60,
                network_watchdog_check_ms: 1_000,
                task_watchdog_feed_ms: 1_000,
                statistics_period_secs: 60 * 60,
            },
            auto_update: AutoUpdateConfig {
                cycle: AutoUpdateCycle::Regular,
                weekdays_bitmask: 0x7F,
                interval_from: 0,
                interval_to: 24,
                tz_offset_hours: 3,
            },
            remote_cfg: RemoteCfgConfig {
                use_remote_cfg: false,
                url: UrlString::new(),
                refresh_interval_minutes: 60,
            },
            filter: FilterConfig {
                company_id: RUUVI_COMPANY_ID,
                company_use_filtering: true,
            },
            scan: ScanConfig {
                use_coded_phy: false,
                use_1mbit_phy: true,
                use_extended_payload: true,
                use_channel_37: true,
                use_channel_38: true,
                use_channel_39: true,
            },
            ntp: NtpConfig {
                use_ntp: true,
                use_timestamps: true,
            },
            coordinates: ShortString::new(),
        }
    }
}

impl GatewayConfig {
    /// Whether any transport is configured to relay records.
    pub fn relaying_configured(&self) -> bool {
        self.http.use_http || self.mqtt.use_mqtt
    }

    /// Range-check every field that would break the tasks if wrong.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.use_http && self.http.url.is_empty() {
            return Err(ConfigError::ValidationFailed("http.url must be set when HTTP is used"));
        }
        if self.http_stat.use_http_stat && self.http_stat.url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "http_stat.url must be set when statistics are used",
            ));
        }
        if self.mqtt.use_mqtt {
            if self.mqtt.server.is_empty() {
                return Err(ConfigError::ValidationFailed("mqtt.server must be set when MQTT is used"));
            }
            if self.mqtt.port == 0 {
                return Err(ConfigError::ValidationFailed("mqtt.port must be 1–65535"));
            }
        }
        if !(1_000..=3_600_000).contains(&self.relay.retransmit_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "relay.retransmit_period_ms must be 1000–3600000",
            ));
        }
        if self.relay.network_watchdog_check_ms == 0 || self.relay.task_watchdog_feed_ms == 0 {
            return Err(ConfigError::ValidationFailed("relay watchdog periods must be non-zero"));
        }
        if self.relay.statistics_period_secs == 0 {
            return Err(ConfigError::ValidationFailed("relay.statistics_period_secs must be non-zero"));
        }
        let au = &self.auto_update;
        if au.interval_to > 24 || au.interval_from >= au.interval_to {
            return Err(ConfigError::ValidationFailed(
                "auto_update interval must satisfy from < to <= 24",
            ));
        }
        if !(-12..=14).contains(&au.tz_offset_hours) {
            return Err(ConfigError::ValidationFailed("auto_update.tz_offset_hours must be -12–14"));
        }
        if self.remote_cfg.use_remote_cfg {
            if self.remote_cfg.url.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "remote_cfg.url must be set when remote config is used",
                ));
            }
            if self.remote_cfg.refresh_interval_minutes == 0 {
                return Err(ConfigError::ValidationFailed(
                    "remote_cfg.refresh_interval_minutes must be non-zero",
                ));
            }
        }
        Ok(())
    }
}
