//! Free-heap watch.
//!
//! Sampled every [`SAMPLE_PERIOD_MS`]; every [`WINDOW_SECS`] the window's
//! range is logged and judged.  A window whose *largest* sample stays
//! under [`FREE_HEAP_LIMIT`] is a low window; [`MAX_LOW_WINDOWS`] of them
//! in a row mean a leak and the gateway reboots.

pub const SAMPLE_PERIOD_MS: u32 = 100;
pub const WINDOW_SECS: u32 = 10;
pub const SAMPLES_PER_WINDOW: u32 = WINDOW_SECS * 1000 / SAMPLE_PERIOD_MS;

pub const FREE_HEAP_LIMIT: u32 = 50 * 1024;
pub const MAX_LOW_WINDOWS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapVerdict {
    /// Window still filling.
    Sampling,
    WindowOk { min: u32, max: u32 },
    WindowLow { min: u32, max: u32, consecutive: u32 },
    /// Too many low windows; `min` is the lowest sample of the last one.
    Reboot { min: u32 },
}

#[derive(Debug, Clone)]
pub struct HeapMonitor {
    samples: u32,
    min: u32,
    max: u32,
    low_windows: u32,
    limit: u32,
}

impl HeapMonitor {
    pub const fn new() -> Self {
        Self::with_limit(FREE_HEAP_LIMIT)
    }

    pub const fn with_limit(limit: u32) -> Self {
        Self {
            samples: 0,
            min: u32::MAX,
            max: 0,
            low_windows: 0,
            limit,
        }
    }

    pub fn sample(&mut self, free_heap: u32) -> HeapVerdict {
        self.min = self.min.min(free_heap);
        self.max = self.max.max(free_heap);
        self.samples += 1;
        if self.samples < SAMPLES_PER_WINDOW {
            return HeapVerdict::Sampling;
        }

        let (min, max) = (self.min, self.max);
        self.samples = 0;
        self.min = u32::MAX;
        self.max = 0;

        if max >= self.limit {
            self.low_windows = 0;
            return HeapVerdict::WindowOk { min, max };
        }
        self.low_windows += 1;
        if self.low_windows >= MAX_LOW_WINDOWS {
            HeapVerdict::Reboot { min }
        } else {
            HeapVerdict::WindowLow {
                min,
                max,
                consecutive: self.low_windows,
            }
        }
    }
}

impl Default for HeapMonitor {
    fn default() -> Self {
        Self::new()
    }
}
