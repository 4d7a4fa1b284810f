//! Relay task: drains the advertisement table and posts it upstream.
//!
//! ```text
//!  retransmit timer ──┐
//!  net watchdog     ──┤
//!  task wdt feed    ──┼──▶ TaskSignal<RelaySig> ──▶ RelayTask::handle_events
//!  statistics timer ──┤                               │
//!  RelayHandle      ──┘                               ├─▶ HttpSender
//!                                                     ├─▶ MqttPublisher
//!                                                     └─▶ SystemPort::restart (watchdog)
//! ```

pub mod task;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::os::{SignalId, TaskSignal};

pub use task::{RelayIdentity, RelayPorts, RelayTask};

/// Events the relay task reacts to.  Lower values are handled first
/// within one wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelaySig {
    Stop = 0,
    Retransmit = 1,
    DisableRetransmission = 2,
    EnableRetransmission = 3,
    NetworkWatchdog = 4,
    TaskWatchdogFeed = 5,
    SendStatistics = 6,
}

impl SignalId for RelaySig {
    const ALL: &'static [Self] = &[
        Self::Stop,
        Self::Retransmit,
        Self::DisableRetransmission,
        Self::EnableRetransmission,
        Self::NetworkWatchdog,
        Self::TaskWatchdogFeed,
        Self::SendStatistics,
    ];

    fn index(self) -> u8 {
        self as u8
    }
}

/// Cloneable control surface of a running relay task.
#[derive(Clone)]
pub struct RelayHandle {
    signal: Arc<TaskSignal<RelaySig>>,
    history_served: Arc<AtomicBool>,
}

impl RelayHandle {
    pub(crate) fn new(signal: Arc<TaskSignal<RelaySig>>, history_served: Arc<AtomicBool>) -> Self {
        Self {
            signal,
            history_served,
        }
    }

    /// Ask the task to tear down and return.
    pub fn stop(&self) -> bool {
        self.signal.send(RelaySig::Stop)
    }

    pub fn disable_retransmission(&self) -> bool {
        self.signal.send(RelaySig::DisableRetransmission)
    }

    pub fn enable_retransmission(&self) -> bool {
        self.signal.send(RelaySig::EnableRetransmission)
    }

    /// A local client fetched a non-empty history.  Counts as network
    /// communication for the network watchdog from its next tick on.
    pub fn notify_history_served(&self) {
        self.history_served.store(true, Ordering::Release);
    }

    /// Post an arbitrary relay signal (timer simulation, tests).
    pub fn send(&self, sig: RelaySig) -> bool {
        self.signal.send(sig)
    }
}

impl core::fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RelayHandle")
            .field("registered", &self.signal.is_registered())
            .finish()
    }
}
