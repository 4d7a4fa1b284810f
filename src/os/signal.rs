//! Level-triggered signal sets for the gateway's tasks.
//!
//! Each task owns one [`TaskSignal`].  Senders set a bit in the pending
//! word and wake the task; the task takes every pending bit at once and
//! handles each kind once.  Sending the same signal twice before the task
//! runs is the same as sending it once.
//!
//! ```text
//!  timer cb ─┐
//!  handle  ──┼──▶ pending |= 1 << sig ──▶ wake.signal(())
//!  ISR/evt ─┘                                  │
//!                                              ▼
//!  task: loop { bits = pending.swap(0); if bits == 0 { block_on(wake.wait()) } }
//! ```

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// A task's signal vocabulary.  At most 32 kinds, numbered from 0.
pub trait SignalId: Copy + core::fmt::Debug + 'static {
    /// Every signal, in ascending numeric order.
    const ALL: &'static [Self];

    fn index(self) -> u8;

    fn mask(self) -> u32 {
        1u32 << self.index()
    }
}

// ── Pending set ───────────────────────────────────────────────

/// Signals taken in one wake-up.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignalSet<S: SignalId> {
    bits: u32,
    _kind: PhantomData<S>,
}

impl<S: SignalId> SignalSet<S> {
    pub const fn empty() -> Self {
        Self::from_bits(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            _kind: PhantomData,
        }
    }

    pub fn of(signals: &[S]) -> Self {
        Self::from_bits(signals.iter().fold(0, |acc, s| acc | s.mask()))
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn contains(&self, sig: S) -> bool {
        self.bits & sig.mask() != 0
    }

    /// Pending signals in ascending numeric order.
    pub fn iter(&self) -> impl Iterator<Item = S> + '_ {
        S::ALL.iter().copied().filter(|s| self.contains(*s))
    }
}

impl<S: SignalId> core::fmt::Debug for SignalSet<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ── Task signal ───────────────────────────────────────────────

pub struct TaskSignal<S: SignalId> {
    pending: AtomicU32,
    wake: Signal<CriticalSectionRawMutex, ()>,
    registered: AtomicBool,
    _kind: PhantomData<fn() -> S>,
}

impl<S: SignalId> TaskSignal<S> {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            wake: Signal::new(),
            registered: AtomicBool::new(false),
            _kind: PhantomData,
        }
    }

    /// Start accepting signals.  Anything sent earlier was discarded.
    pub fn register(&self) {
        self.pending.store(0, Ordering::Release);
        self.wake.reset();
        self.registered.store(true, Ordering::Release);
    }

    /// Stop accepting signals and drop whatever is pending.
    pub fn unregister(&self) {
        self.registered.store(false, Ordering::Release);
        self.pending.store(0, Ordering::Release);
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Mark `sig` pending and wake the owning task.
    ///
    /// Returns `false` when no task is registered to receive it.
    pub fn send(&self, sig: S) -> bool {
        if !self.is_registered() {
            return false;
        }
        self.pending.fetch_or(sig.mask(), Ordering::AcqRel);
        self.wake.signal(());
        true
    }

    pub fn is_pending(&self, sig: S) -> bool {
        self.pending.load(Ordering::Acquire) & sig.mask() != 0
    }

    /// Take every pending signal without blocking.
    pub fn try_take(&self) -> SignalSet<S> {
        SignalSet::from_bits(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Block until at least one signal is pending, then take them all.
    pub fn wait(&self) -> SignalSet<S> {
        loop {
            let taken = self.try_take();
            if !taken.is_empty() {
                return taken;
            }
            futures_lite::future::block_on(self.wake.wait());
        }
    }
}

impl<S: SignalId> Default for TaskSignal<S> {
    fn default() -> Self {
        Self::new()
    }
}
