//! MAC-keyed hash index over the slot pool.
//!
//! 101 buckets, each a singly linked chain of slot indices.  New slots go to
//! the chain tail.  The index keeps its own copy of each linked slot's key,
//! so it can be tested without the record pool.

use super::MacAddr;

/// Bucket count.  128 slots over 101 buckets gives a load factor near 1.27.
pub const ADV_TABLE_HASH_SIZE: usize = 101;

/// Link terminator.
pub(crate) const NIL: u16 = u16::MAX;

/// XOR the high three address bytes into the low three, byte by byte,
/// and reduce into the bucket range.
pub fn bucket_of(mac: &MacAddr) -> usize {
    let b = &mac.0;
    let hash = b[..3]
        .iter()
        .zip(&b[3..])
        .enumerate()
        .fold(0u32, |acc, (i, (lo, hi))| acc | (u32::from(lo ^ hi) << (8 * i)));
    (hash % ADV_TABLE_HASH_SIZE as u32) as usize
}

pub struct HashIndex<const N: usize> {
    heads: [u16; ADV_TABLE_HASH_SIZE],
    tails: [u16; ADV_TABLE_HASH_SIZE],
    next: [u16; N],
    linked: [bool; N],
    keys: [MacAddr; N],
    len: usize,
}

impl<const N: usize> HashIndex<N> {
    pub fn new() -> Self {
        Self {
            heads: [NIL; ADV_TABLE_HASH_SIZE],
            tails: [NIL; ADV_TABLE_HASH_SIZE],
            next: [NIL; N],
            linked: [false; N],
            keys: [MacAddr::default(); N],
            len: 0,
        }
    }

    /// Slot currently holding `mac`, if any.
    pub fn find(&self, mac: &MacAddr) -> Option<usize> {
        let mut cur = self.heads[bucket_of(mac)];
        while cur != NIL {
            let slot = usize::from(cur);
            if self.keys[slot] == *mac {
                return Some(slot);
            }
            cur = self.next[slot];
        }
        None
    }

    /// Link `slot` under `mac`.  The slot must not already be linked.
    pub fn insert(&mut self, slot: usize, mac: MacAddr) {
        debug_assert!(!self.linked[slot], "slot {slot} already indexed");
        let bucket = bucket_of(&mac);
        self.keys[slot] = mac;
        self.next[slot] = NIL;
        let link = slot as u16;
        match self.tails[bucket] {
            NIL => self.heads[bucket] = link,
            tail => self.next[usize::from(tail)] = link,
        }
        self.tails[bucket] = link;
        self.linked[slot] = true;
        self.len += 1;
    }

    /// Unlink `slot`.  Returns `false` if it was not linked.
    pub fn remove(&mut self, slot: usize) -> bool {
        if !self.linked[slot] {
            return false;
        }
        let bucket = bucket_of(&self.keys[slot]);
        let link = slot as u16;

        let mut prev = NIL;
        let mut cur = self.heads[bucket];
        while cur != NIL && cur != link {
            prev = cur;
            cur = self.next[usize::from(cur)];
        }
        if cur == NIL {
            // Flag set but chain does not hold the slot.
            self.linked[slot] = false;
            return false;
        }

        let after = self.next[slot];
        if prev == NIL {
            self.heads[bucket] = after;
        } else {
            self.next[usize::from(prev)] = after;
        }
        if self.tails[bucket] == link {
            self.tails[bucket] = prev;
        }
        self.next[slot] = NIL;
        self.linked[slot] = false;
        self.len -= 1;
        true
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.linked[slot]
    }

    /// Number of linked slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for HashIndex<N> {
    fn default() -> Self {
        Self::new()
    }
}
