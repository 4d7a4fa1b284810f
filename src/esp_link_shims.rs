//! `critical-section` 1.x implementation for ESP-IDF builds.
//!
//! `embassy-sync`'s `CriticalSectionRawMutex` guards the advertisement
//! table and task wake signals.  On the host the `std` feature of
//! `critical-section` provides the implementation; here a process-wide
//! std mutex (a FreeRTOS mutex underneath) does, re-entrant per thread.

#[cfg(target_os = "espidf")]
use core::cell::{Cell, RefCell};
#[cfg(target_os = "espidf")]
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(target_os = "espidf")]
static SECTION: Mutex<()> = Mutex::new(());

#[cfg(target_os = "espidf")]
thread_local! {
    static NESTING: Cell<u8> = const { Cell::new(0) };
    static HELD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    let outer = NESTING.with(Cell::get);
    if outer == 0 {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        let guard = SECTION.lock().unwrap_or_else(PoisonError::into_inner);
        HELD.with(|held| *held.borrow_mut() = Some(guard));
    }
    NESTING.with(|n| n.set(outer.saturating_add(1)));
    outer
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(outer: u8) {
    NESTING.with(|n| n.set(outer));
    if outer == 0 {
        HELD.with(|held| held.borrow_mut().take());
    }
}
