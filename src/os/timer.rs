//! Timers that post a task signal when they expire.
//!
//! Timers are the only source of time-based signals.  `stop` is
//! synchronous and idempotent: once it returns, the timer posts nothing
//! until it is started again.
//!
//! - **`target_os = "espidf"`**: `EspTimer` from the ESP-IDF timer task
//!   service; callbacks run in the `esp_timer` task and only call
//!   [`TaskSignal::send`].
//! - **`not(target_os = "espidf")`**: one helper thread per armed timer,
//!   parked on a condvar so `stop` wakes it immediately.

use std::sync::Arc;
use std::time::Duration;

use super::signal::{SignalId, TaskSignal};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Periodic,
    OneShot,
}

pub struct SignalTimer<S: SignalId + Send + Sync> {
    name: &'static str,
    kind: TimerKind,
    period: Duration,
    signal: Arc<TaskSignal<S>>,
    sig: S,
    backend: backend::Backend,
}

impl<S: SignalId + Send + Sync> SignalTimer<S> {
    pub fn periodic(
        name: &'static str,
        period: Duration,
        signal: Arc<TaskSignal<S>>,
        sig: S,
    ) -> Result<Self> {
        Self::create(name, TimerKind::Periodic, period, signal, sig)
    }

    pub fn one_shot(
        name: &'static str,
        period: Duration,
        signal: Arc<TaskSignal<S>>,
        sig: S,
    ) -> Result<Self> {
        Self::create(name, TimerKind::OneShot, period, signal, sig)
    }

    fn create(
        name: &'static str,
        kind: TimerKind,
        period: Duration,
        signal: Arc<TaskSignal<S>>,
        sig: S,
    ) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::Init("timer period must be non-zero"));
        }
        let target = Arc::clone(&signal);
        let backend = backend::Backend::new(name, move || {
            target.send(sig);
        })?;
        Ok(Self {
            name,
            kind,
            period,
            signal,
            sig,
            backend,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the timer.  Restarts the countdown if it was already armed.
    pub fn start(&self) {
        self.backend.stop();
        if let Err(e) = self.backend.start(self.kind, self.period) {
            log::error!("timer '{}': start failed: {}", self.name, e);
        }
    }

    /// Disarm the timer.  Safe to call on a stopped timer.
    pub fn stop(&self) {
        self.backend.stop();
    }

    /// Change the period and re-arm.
    pub fn restart_with_period(&mut self, period: Duration) {
        if period.is_zero() {
            log::warn!("timer '{}': ignoring zero period", self.name);
            return;
        }
        self.period = period;
        self.start();
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_active()
    }

    /// Post the timer's signal now, as if it had expired.
    pub fn simulate(&self) {
        self.signal.send(self.sig);
    }
}

// ── ESP-IDF backend ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod backend {
    use std::time::Duration;

    use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};

    use super::TimerKind;
    use crate::error::{Error, Result};

    pub struct Backend {
        timer: EspTimer<'static>,
    }

    impl Backend {
        pub fn new(name: &'static str, callback: impl FnMut() + Send + 'static) -> Result<Self> {
            let service = EspTaskTimerService::new().map_err(|e| {
                log::error!("timer '{}': service unavailable ({})", name, e);
                Error::Init("esp timer service")
            })?;
            let timer = service.timer(callback).map_err(|e| {
                log::error!("timer '{}': create failed ({})", name, e);
                Error::Init("esp timer create")
            })?;
            Ok(Self { timer })
        }

        pub fn start(&self, kind: TimerKind, period: Duration) -> Result<()> {
            let res = match kind {
                TimerKind::Periodic => self.timer.every(period),
                TimerKind::OneShot => self.timer.after(period),
            };
            res.map_err(|_| Error::Init("esp timer start"))
        }

        pub fn stop(&self) {
            let _ = self.timer.cancel();
        }

        pub fn is_active(&self) -> bool {
            self.timer.is_scheduled().unwrap_or(false)
        }
    }
}

// ── Host backend ──────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod backend {
    use std::sync::{Arc, Condvar, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use super::TimerKind;
    use crate::error::{Error, Result};

    type Callback = Box<dyn FnMut() + Send>;

    struct Armed {
        /// Bumped on every start/stop; a helper thread exits once it no
        /// longer matches the generation it was started with.
        generation: u64,
        active: bool,
    }

    struct Shared {
        state: Mutex<Armed>,
        cond: Condvar,
        callback: Mutex<Callback>,
    }

    pub struct Backend {
        name: &'static str,
        shared: Arc<Shared>,
    }

    impl Backend {
        pub fn new(name: &'static str, callback: impl FnMut() + Send + 'static) -> Result<Self> {
            Ok(Self {
                name,
                shared: Arc::new(Shared {
                    state: Mutex::new(Armed {
                        generation: 0,
                        active: false,
                    }),
                    cond: Condvar::new(),
                    callback: Mutex::new(Box::new(callback)),
                }),
            })
        }

        pub fn start(&self, kind: TimerKind, period: Duration) -> Result<()> {
            let generation = {
                let mut st = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                st.generation += 1;
                st.active = true;
                st.generation
            };
            let shared = Arc::clone(&self.shared);
            std::thread::Builder::new()
                .name(format!("tmr-{}", self.name))
                .spawn(move || run(&shared, generation, kind, period))
                .map(|_| ())
                .map_err(|_| Error::Init("timer thread spawn"))
        }

        pub fn stop(&self) {
            let mut st = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            st.generation += 1;
            st.active = false;
            self.shared.cond.notify_all();
        }

        pub fn is_active(&self) -> bool {
            self.shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .active
        }
    }

    impl Drop for Backend {
        fn drop(&mut self) {
            self.stop();
        }
    }

    fn run(shared: &Shared, generation: u64, kind: TimerKind, period: Duration) {
        let mut deadline = Instant::now() + period;
        let mut st = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if st.generation != generation {
                return;
            }
            let now = Instant::now();
            if now < deadline {
                st = shared
                    .cond
                    .wait_timeout(st, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }
            // Fire while holding the state lock so `stop` cannot return
            // between the generation check and the callback.
            let mut callback = shared.callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)();
            drop(callback);
            match kind {
                TimerKind::Periodic => deadline += period,
                TimerKind::OneShot => {
                    st.active = false;
                    return;
                }
            }
        }
    }
}
