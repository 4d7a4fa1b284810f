//! The advertisement table.
//!
//! Deduplicates reports by device address, remembers the last report of up
//! to `N` devices, and tracks which of them still have to be relayed.
//!
//! | Operation                      | Hash index      | History        | Retransmit queue |
//! |--------------------------------|-----------------|----------------|------------------|
//! | `put` (known address)          | -               | move to head   | append if absent |
//! | `put` (new address)            | relink LRU slot | move to head   | append if absent |
//! | `put` (LRU slot still queued)  | -               | -              | - (`Full`)       |
//! | `drain_retransmission_queue`   | -               | -              | emptied          |
//! | `read_history`                 | -               | walked         | -                |
//!
//! Every operation takes one blocking mutex for its whole duration, so a
//! drain is a consistent snapshot and no two puts interleave.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::hash_index::{HashIndex, NIL};
use super::history::HistoryList;
use super::retransmit::RetransmitQueue;
use super::{AdvBatch, AdvReport, MacAddr};
use crate::error::{Result, TableError};

/// What `put` did with the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Address was already tracked; its slot was overwritten.
    Updated,
    /// Address took a slot that had never been used.
    Inserted,
    /// Address took the slot of a previously tracked device.
    Evicted(MacAddr),
}

struct TableState<const N: usize> {
    records: [AdvReport; N],
    index: HashIndex<N>,
    history: HistoryList<N>,
    queue: RetransmitQueue<N>,
}

impl<const N: usize> TableState<N> {
    fn new() -> Self {
        Self {
            records: core::array::from_fn(|_| AdvReport::default()),
            index: HashIndex::new(),
            history: HistoryList::new(),
            queue: RetransmitQueue::new(),
        }
    }

    fn put(&mut self, report: &AdvReport) -> Result<PutOutcome> {
        let (slot, outcome) = if let Some(slot) = self.index.find(&report.tag_mac) {
            (slot, PutOutcome::Updated)
        } else {
            let victim = self.history.back().ok_or(TableError::Full)?;
            if self.queue.contains(victim) {
                return Err(TableError::Full.into());
            }
            let outcome = if self.index.remove(victim) {
                PutOutcome::Evicted(self.records[victim].tag_mac)
            } else {
                PutOutcome::Inserted
            };
            self.index.insert(victim, report.tag_mac);
            (victim, outcome)
        };

        self.records[slot].clone_from(report);
        self.history.move_to_front(slot);
        self.queue.push_back(slot);
        Ok(outcome)
    }

    fn drain<const M: usize>(&mut self, out: &mut AdvBatch<M>) -> usize {
        out.clear();
        let mut drained = 0;
        while let Some(slot) = self.queue.pop_front() {
            drained += 1;
            // Slots beyond the capacity of `out` are dropped.
            let _ = out.push(self.records[slot].clone());
        }
        drained
    }

    fn read_history<const M: usize>(
        &self,
        cur_time: u32,
        max_age_secs: u32,
        use_filter: bool,
        out: &mut AdvBatch<M>,
    ) {
        out.clear();
        for slot in self.history.iter() {
            if out.is_full() {
                break;
            }
            let record = &self.records[slot];
            if record.is_free() {
                break;
            }
            if use_filter && cur_time.saturating_sub(record.timestamp) > max_age_secs {
                break;
            }
            let _ = out.push(record.clone());
        }
    }
}

/// Fixed-capacity, lock-protected advertisement store.
///
/// Shared between the ingestion path and the relay task via `Arc`.
pub struct AdvTable<const N: usize> {
    state: Mutex<CriticalSectionRawMutex, RefCell<TableState<N>>>,
}

impl<const N: usize> AdvTable<N> {
    /// All slots free, all in history order, nothing queued.
    pub fn new() -> Self {
        const {
            assert!(N > 0 && N < NIL as usize, "slot indices must fit in u16 links");
        }
        Self {
            state: Mutex::new(RefCell::new(TableState::new())),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TableState<N>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Insert or update the record for `report.tag_mac`.
    ///
    /// Fails with [`TableError::Full`] when the least recently touched slot
    /// still waits for retransmission; the report is then dropped and the
    /// table is unchanged.
    pub fn put(&self, report: &AdvReport) -> Result<PutOutcome> {
        self.with_state(|s| s.put(report))
    }

    /// Move every pending record into `out`, oldest queued first.
    ///
    /// Drained records stay tracked for history reads and deduplication.
    /// Returns the number of slots taken off the queue, which equals
    /// `out.len()` unless `out` is smaller than the queue.
    pub fn drain_retransmission_queue<const M: usize>(&self, out: &mut AdvBatch<M>) -> usize {
        self.with_state(|s| s.drain(out))
    }

    /// Copy tracked records into `out`, most recently touched first.
    ///
    /// Stops at the first free slot, when `out` is full, or (with
    /// `use_filter`) at the first record older than `max_age_secs`
    /// relative to `cur_time`.
    pub fn read_history<const M: usize>(
        &self,
        cur_time: u32,
        max_age_secs: u32,
        use_filter: bool,
        out: &mut AdvBatch<M>,
    ) {
        self.with_state(|s| s.read_history(cur_time, max_age_secs, use_filter, out));
    }

    /// Number of distinct addresses currently tracked.
    pub fn num_tracked(&self) -> usize {
        self.with_state(|s| s.index.len())
    }

    /// Number of records waiting for the next drain.
    pub fn num_pending(&self) -> usize {
        self.with_state(|s| s.queue.len())
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for AdvTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
