//! Task plumbing: signal sets, signal-posting timers, task spawning.

pub mod signal;
pub mod task;
pub mod timer;

pub use signal::{SignalId, SignalSet, TaskSignal};
pub use timer::SignalTimer;
