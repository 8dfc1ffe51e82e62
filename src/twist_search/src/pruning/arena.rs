//! Interned fixed-length state keys with an open-addressing index.

const EMPTY_SLOT: u32 = u32::MAX;
const INITIAL_SLOTS: usize = 16;

/// Every key lives back to back in one byte buffer. `slots` maps hashes to
/// entry indices with linear probing and is kept at most three quarters full.
pub(crate) struct StateArena {
    key_len: usize,
    keys: Vec<u8>,
    slots: Vec<u32>,
    len: usize,
}

impl StateArena {
    pub(crate) fn new(key_len: usize) -> Self {
        Self {
            key_len,
            keys: vec![],
            slots: vec![EMPTY_SLOT; INITIAL_SLOTS],
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn key_len(&self) -> usize {
        self.key_len
    }

    pub(crate) fn key(&self, index: usize) -> &[u8] {
        &self.keys[index * self.key_len..(index + 1) * self.key_len]
    }

    // Truncation only drops high bits, which is fine for a hash
    #[allow(clippy::cast_possible_truncation)]
    fn home_slot(&self, key: &[u8]) -> usize {
        fxhash::hash64(key) as usize & (self.slots.len() - 1)
    }

    pub(crate) fn find(&self, key: &[u8]) -> Option<usize> {
        debug_assert_eq!(key.len(), self.key_len);
        let mask = self.slots.len() - 1;
        let mut slot = self.home_slot(key);
        loop {
            match self.slots[slot] {
                EMPTY_SLOT => return None,
                entry if self.key(entry as usize) == key => return Some(entry as usize),
                _ => slot = (slot + 1) & mask,
            }
        }
    }

    fn needs_growth(&self) -> bool {
        (self.len + 1) * 4 > self.slots.len() * 3
    }

    /// Whether the index can address another entry.
    pub(crate) fn is_full(&self) -> bool {
        self.len >= EMPTY_SLOT as usize
    }

    /// Insert `key` unless it is already present. Returns its entry index and
    /// whether it was inserted.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn insert(&mut self, key: &[u8]) -> (usize, bool) {
        debug_assert_eq!(key.len(), self.key_len);
        if self.needs_growth() {
            self.grow();
        }
        let mask = self.slots.len() - 1;
        let mut slot = self.home_slot(key);
        loop {
            match self.slots[slot] {
                EMPTY_SLOT => break,
                entry if self.key(entry as usize) == key => return (entry as usize, false),
                _ => slot = (slot + 1) & mask,
            }
        }
        debug_assert!(!self.is_full());
        // `is_full` is checked by callers before inserting
        self.slots[slot] = self.len as u32;
        self.keys.extend_from_slice(key);
        self.len += 1;
        (self.len - 1, true)
    }

    fn grow(&mut self) {
        let mut slots = vec![EMPTY_SLOT; self.slots.len() * 2];
        let mask = slots.len() - 1;
        for entry in 0..self.len {
            #[allow(clippy::cast_possible_truncation)]
            let mut slot = fxhash::hash64(self.key(entry)) as usize & mask;
            while slots[slot] != EMPTY_SLOT {
                slot = (slot + 1) & mask;
            }
            #[allow(clippy::cast_possible_truncation)]
            {
                slots[slot] = entry as u32;
            }
        }
        self.slots = slots;
    }

    /// Bytes used by the keys and the index.
    pub(crate) fn memory_bytes(&self) -> usize {
        self.keys.len() + self.slots.len() * size_of::<u32>()
    }

    /// Bytes used by the keys and the index after one more insert.
    pub(crate) fn memory_bytes_after_insert(&self) -> usize {
        let slots = if self.needs_growth() {
            self.slots.len() * 2
        } else {
            self.slots.len()
        };
        (self.len + 1) * self.key_len + slots * size_of::<u32>()
    }
}
