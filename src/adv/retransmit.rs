//! FIFO of slots whose latest data has not been drained yet.
//!
//! Singly linked by index with a `queued` flag per slot, so re-queuing a
//! slot that is already waiting keeps its original position.

use super::hash_index::NIL;

pub struct RetransmitQueue<const N: usize> {
    next: [u16; N],
    queued: [bool; N],
    head: u16,
    tail: u16,
    len: usize,
}

impl<const N: usize> RetransmitQueue<N> {
    pub fn new() -> Self {
        Self {
            next: [NIL; N],
            queued: [false; N],
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Append `slot`.  Returns `false` if it was already queued.
    pub fn push_back(&mut self, slot: usize) -> bool {
        if self.queued[slot] {
            return false;
        }
        let link = slot as u16;
        self.next[slot] = NIL;
        match self.tail {
            NIL => self.head = link,
            tail => self.next[usize::from(tail)] = link,
        }
        self.tail = link;
        self.queued[slot] = true;
        self.len += 1;
        true
    }

    pub fn pop_front(&mut self) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let slot = usize::from(self.head);
        self.head = self.next[slot];
        if self.head == NIL {
            self.tail = NIL;
        }
        self.next[slot] = NIL;
        self.queued[slot] = false;
        self.len -= 1;
        Some(slot)
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.queued[slot]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for RetransmitQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
