//! Reboot and heap queries.
//!
//! On the host the adapter records the restart request instead of
//! rebooting and reports a configurable free-heap figure.

use log::{error, info};

use crate::app::ports::SystemPort;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;

pub struct EspSystem {
    #[cfg(not(target_os = "espidf"))]
    free_heap: AtomicU32,
    #[cfg(not(target_os = "espidf"))]
    restart_reason: Mutex<Option<&'static str>>,
}

impl Default for EspSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EspSystem {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            free_heap: AtomicU32::new(160 * 1024),
            #[cfg(not(target_os = "espidf"))]
            restart_reason: Mutex::new(None),
        }
    }

    /// Minimum free heap since boot.
    #[cfg(target_os = "espidf")]
    pub fn min_free_heap(&self) -> u32 {
        // SAFETY: reads heap statistics, no preconditions.
        unsafe { esp_idf_svc::sys::esp_get_minimum_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn set_free_heap(&self, bytes: u32) {
        self.free_heap.store(bytes, Ordering::Relaxed);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn restart_reason(&self) -> Option<&'static str> {
        *self
            .restart_reason
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SystemPort for EspSystem {
    fn restart(&self, reason: &'static str) {
        error!("Restarting system: {}", reason);
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
        #[cfg(not(target_os = "espidf"))]
        {
            info!("System(sim): restart suppressed");
            *self
                .restart_reason
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(reason);
        }
    }

    fn free_heap(&self) -> u32 {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: reads heap statistics, no preconditions.
            unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.free_heap.load(Ordering::Relaxed)
        }
    }
}

/// Log the reset reason of the previous boot.
pub fn log_reset_reason() {
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: reads the reset cause latched by the ROM.
        let reason = unsafe { esp_idf_svc::sys::esp_reset_reason() };
        info!("Reset reason: {}", reason);
    }
    #[cfg(not(target_os = "espidf"))]
    info!("Reset reason: power-on (sim)");
}
