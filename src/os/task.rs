//! Task spawning with core affinity, priority, and stack size.
//!
//! ESP-IDF implements `std::thread` on top of pthreads, which are FreeRTOS
//! tasks.  `esp_pthread_set_cfg()` configures the *next* `pthread_create()`
//! from the calling thread, so the config→spawn pair must not interleave
//! with other thread creation on the same thread.

use crate::error::{Error, Result};

/// CPU core for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0: Wi-Fi, lwIP, and the BLE co-processor UART reader.
    Pro = 0,
    /// Core 1: relay and supervisor tasks.
    App = 1,
}

/// Scheduling parameters of a gateway task.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    /// NUL-terminated, e.g. `"adv_post\0"`.
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

#[cfg(target_os = "espidf")]
pub fn spawn(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> Result<std::thread::JoinHandle<()>> {
    use esp_idf_svc::sys;

    // SAFETY: the config is copied by esp_pthread_set_cfg and `spec.name`
    // is a NUL-terminated 'static string.
    let ret = unsafe {
        let mut cfg = sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as _;
        cfg.thread_name = spec.name.as_ptr().cast();
        sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != sys::ESP_OK {
        log::error!("{}: esp_pthread_set_cfg failed ({})", spec.display_name(), ret);
        return Err(Error::Init("pthread config"));
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
        .map_err(|_| Error::Init("task spawn"))
}

/// Host fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> Result<std::thread::JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
        .map_err(|_| Error::Init("task spawn"))
}
