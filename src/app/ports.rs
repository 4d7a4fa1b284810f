//! Port traits: the hexagonal boundary between the gateway core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AdvIngest / RelayTask / Supervisor
//! ```
//!
//! Transports, clocks, watchdogs and storage implement these traits.  The
//! tasks take them as generics, so the core never touches ESP-IDF directly
//! and every collaborator can be replaced by a recording mock in tests.
//!
//! ## Contracts
//!
//! - Senders return `bool`: `false` means "not delivered", never "retry
//!   now".  The next periodic tick relays whatever is new.
//! - **ConfigPort** implementations MUST validate before persisting.

use crate::adv::AdvReport;
use crate::config::GatewayConfig;

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// 2020-01-01T00:00:00Z.  Anything earlier means SNTP has not run yet.
pub const MIN_SYNCED_UNIX_TIME: u32 = 1_577_836_800;

pub trait TimePort {
    /// Milliseconds since boot.  Wraps after ~49 days; compare with
    /// `wrapping_sub`.
    fn uptime_ms(&self) -> u32;

    /// Unix seconds, or `None` while the clock is not synchronised.
    fn unix_time(&self) -> Option<u32>;

    fn is_time_synced(&self) -> bool {
        self.unix_time().is_some()
    }
}

// ───────────────────────────────────────────────────────────────
// Metrics
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget counters.
pub trait MetricsPort {
    /// Once per advertisement frame, whatever happens to it afterwards.
    fn increment_received_advertisements(&self);

    /// The table refused the record.
    fn increment_dropped_advertisements(&self);

    /// The frame failed validation.
    fn increment_malformed_frames(&self);
}

// ───────────────────────────────────────────────────────────────
// Outbound transports
// ───────────────────────────────────────────────────────────────

/// HTTP(S) POST of records and status reports.
pub trait HttpSender {
    /// Send one drained batch.  `nonce` identifies the batch to the
    /// backend.
    fn send_batch(&mut self, records: &[AdvReport], nonce: u32) -> bool;

    /// Tell the backend the gateway came online.
    fn send_online_status(&mut self, nonce: u32) -> bool;

    /// POST a status report (already rendered JSON) to the statistics URL.
    fn send_statistics(&mut self, status_json: &str) -> bool;
}

/// MQTT publication of records.
pub trait MqttPublisher {
    /// Publish every record of a batch.  Only called while the MQTT
    /// connected bit is set.
    fn publish_batch(&mut self, records: &[AdvReport]) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Liveness
// ───────────────────────────────────────────────────────────────

/// OS task watchdog subscription of the calling task.
pub trait TaskWatchdogPort {
    fn register(&mut self) -> bool;
    fn feed(&mut self);
    fn unregister(&mut self);
}

/// Whole-system controls.
pub trait SystemPort {
    /// Reboot.  Does not return on hardware; mocks record the call.
    fn restart(&self, reason: &'static str);

    /// Currently free heap in bytes.
    fn free_heap(&self) -> u32;
}

/// LED indication of what the gateway is doing.
pub trait StatusIndicator {
    /// A local client fetched history.
    fn http_poll_ok(&mut self);

    /// No history fetch within the polling timeout.
    fn http_poll_timeout(&mut self);

    fn cfg_mode(&mut self, active: bool);
}

// ───────────────────────────────────────────────────────────────
// Services managed by the supervisor
// ───────────────────────────────────────────────────────────────

/// Network-side services the supervisor starts, stops and triggers.
/// Each call is best effort; failures are logged by the adapter.
pub trait GatewayServices {
    fn start_mqtt(&mut self, config: &GatewayConfig);
    fn stop_mqtt(&mut self);
    fn start_mdns(&mut self);
    fn stop_mdns(&mut self);
    /// Fetch configuration from the remote configuration URL.
    fn request_remote_cfg(&mut self, config: &GatewayConfig);
    /// Ask the release server whether newer firmware exists.
    /// `false` means the check could not be made.
    fn check_for_fw_updates(&mut self) -> bool;
    fn reconnect_network(&mut self);
    fn start_cfg_access_point(&mut self);
    fn stop_cfg_access_point(&mut self);
    /// Re-send filter and scan settings to the BLE co-processor.
    fn send_scan_settings(&mut self, config: &GatewayConfig);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (gateway ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists gateway configuration.
///
/// Implementations MUST call [`GatewayConfig::validate`] before
/// persisting and reject with [`ConfigError::ValidationFailed`] instead
/// of clamping.
pub trait ConfigPort {
    /// Load configuration.  [`ConfigError::NotFound`] on first boot.
    fn load(&self) -> Result<GatewayConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &GatewayConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (gateway ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.  Keys are namespaced; writes are atomic
/// (ESP-IDF NVS commits guarantee it natively).
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config in storage (first boot or after factory reset).
    NotFound,
    /// Stored blob failed to deserialise.
    Corrupted,
    /// A field failed range validation; the text names it.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::NotFound => Self::Config("not found"),
            ConfigError::Corrupted => Self::Config("corrupted"),
            ConfigError::StorageFull | ConfigError::IoError => Self::Config("storage failure"),
        }
    }
}
