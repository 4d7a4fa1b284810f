//! Recency ordering of every slot in the pool.
//!
//! Doubly linked by index.  Every slot is always a member: the head is the
//! most recently touched slot and the tail is the next eviction victim.
//! Never-used slots start at the tail end in index order.

use super::hash_index::NIL;

pub struct HistoryList<const N: usize> {
    prev: [u16; N],
    next: [u16; N],
    head: u16,
    tail: u16,
}

impl<const N: usize> HistoryList<N> {
    /// Link slots `0..N` in order, slot 0 at the head.
    pub fn new() -> Self {
        let mut list = Self {
            prev: [NIL; N],
            next: [NIL; N],
            head: NIL,
            tail: NIL,
        };
        for slot in 0..N {
            list.push_back(slot);
        }
        list
    }

    fn push_back(&mut self, slot: usize) {
        let link = slot as u16;
        self.prev[slot] = self.tail;
        self.next[slot] = NIL;
        match self.tail {
            NIL => self.head = link,
            tail => self.next[usize::from(tail)] = link,
        }
        self.tail = link;
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.prev[slot], self.next[slot]);
        match prev {
            NIL => self.head = next,
            p => self.next[usize::from(p)] = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.prev[usize::from(n)] = prev,
        }
    }

    /// Mark `slot` as the most recently touched.
    pub fn move_to_front(&mut self, slot: usize) {
        let link = slot as u16;
        if self.head == link {
            return;
        }
        self.unlink(slot);
        self.prev[slot] = NIL;
        self.next[slot] = self.head;
        if self.head != NIL {
            self.prev[usize::from(self.head)] = link;
        }
        self.head = link;
        if self.tail == NIL {
            self.tail = link;
        }
    }

    /// Least recently touched slot.
    pub fn back(&self) -> Option<usize> {
        (self.tail != NIL).then_some(usize::from(self.tail))
    }

    pub fn front(&self) -> Option<usize> {
        (self.head != NIL).then_some(usize::from(self.head))
    }

    /// Slots from most to least recently touched.
    pub fn iter(&self) -> Iter<'_, N> {
        Iter {
            list: self,
            cur: self.head,
        }
    }
}

impl<const N: usize> Default for HistoryList<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, const N: usize> {
    list: &'a HistoryList<N>,
    cur: u16,
}

impl<const N: usize> Iterator for Iter<'_, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cur == NIL {
            return None;
        }
        let slot = usize::from(self.cur);
        self.cur = self.list.next[slot];
        Some(slot)
    }
}
