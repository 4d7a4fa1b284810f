//! Task Watchdog Timer (TWDT) driver.
//!
//! Each long-running task owns one [`TaskWatchdog`] and subscribes from
//! inside its own thread; `esp_task_wdt_add(NULL)` registers the calling
//! task.  A subscribed task that stops feeding for longer than
//! [`TWDT_TIMEOUT_MS`] panics the system.

use crate::app::ports::TaskWatchdogPort;

use log::info;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::warn;

pub const TWDT_TIMEOUT_MS: u32 = 10_000;

/// Apply the gateway's TWDT settings.  Call once at boot.
pub fn configure() {
    #[cfg(target_os = "espidf")]
    {
        let cfg = esp_task_wdt_config_t {
            timeout_ms: TWDT_TIMEOUT_MS,
            idle_core_mask: 0,
            trigger_panic: true,
        };
        // SAFETY: `cfg` outlives the call.
        let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
        if ret != ESP_OK {
            warn!("TWDT reconfigure returned {} (may already be configured)", ret);
        }
    }

    info!("Watchdog: {} ms timeout, panic on trigger", TWDT_TIMEOUT_MS);
}

pub struct TaskWatchdog {
    task: &'static str,
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: u32,
}

impl TaskWatchdog {
    pub fn new(task: &'static str) -> Self {
        Self {
            task,
            subscribed: false,
            #[cfg(not(target_os = "espidf"))]
            feeds: 0,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Feeds since creation (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn feeds(&self) -> u32 {
        self.feeds
    }
}

impl TaskWatchdogPort for TaskWatchdog {
    fn register(&mut self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: NULL subscribes the calling task.
            let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            if ret != ESP_OK {
                warn!("Watchdog({}): failed to subscribe ({})", self.task, ret);
                return false;
            }
        }
        self.subscribed = true;
        info!("Watchdog({}): subscribed", self.task);
        true
    }

    fn feed(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_task_wdt_reset();
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.feeds = self.feeds.wrapping_add(1);
        }
    }

    fn unregister(&mut self) {
        if !self.subscribed {
            return;
        }
        #[cfg(target_os = "espidf")]
        {
            let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
            if ret != ESP_OK {
                warn!("Watchdog({}): failed to unsubscribe ({})", self.task, ret);
            }
        }
        self.subscribed = false;
        info!("Watchdog({}): unsubscribed", self.task);
    }
}
