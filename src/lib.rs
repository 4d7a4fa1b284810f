//! BLE gateway firmware library.
//!
//! Exposes the gateway core for integration testing and the firmware
//! binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adv;
pub mod app;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod json;
pub mod metrics;
pub mod net_status;
pub mod os;
pub mod relay;
pub mod serial;
pub mod supervisor;

pub mod adapters;
pub mod drivers;

mod esp_link_shims;
