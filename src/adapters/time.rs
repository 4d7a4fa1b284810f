//! Clock adapter.
//!
//! - **`target_os = "espidf"`**: uptime from `esp_timer_get_time()`,
//!   wall-clock from `gettimeofday()` (set by SNTP).
//! - **`not(target_os = "espidf")`**: `Instant` for uptime and
//!   `SystemTime` for the wall clock; the simulated clock can be held
//!   unsynchronised to exercise counter stamping.

use crate::app::ports::{MIN_SYNCED_UNIX_TIME, TimePort};

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    synced: bool,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            synced: true,
        }
    }

    /// Simulated clock that reports no wall-clock time.
    #[cfg(not(target_os = "espidf"))]
    pub fn unsynced() -> Self {
        Self {
            synced: false,
            ..Self::new()
        }
    }
}

fn accept_wall_clock(secs: i64) -> Option<u32> {
    u32::try_from(secs).ok().filter(|&s| s >= MIN_SYNCED_UNIX_TIME)
}

#[cfg(target_os = "espidf")]
impl TimePort for SystemClock {
    fn uptime_ms(&self) -> u32 {
        // SAFETY: reads the high-resolution timer, no preconditions.
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        (us / 1000) as u32
    }

    fn unix_time(&self) -> Option<u32> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-pointer; the timezone argument may be null.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        accept_wall_clock(i64::from(tv.tv_sec))
    }
}

#[cfg(not(target_os = "espidf"))]
impl TimePort for SystemClock {
    fn uptime_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn unix_time(&self) -> Option<u32> {
        if !self.synced {
            return None;
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?;
        accept_wall_clock(now.as_secs() as i64)
    }
}
