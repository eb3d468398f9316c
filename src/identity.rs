//! Peer identity table.
//!
//! Script engine instances outlive the connections that create them: a peer returning with a new
//! connection finds the interpreter state its earlier requests left behind.  The table maps a peer
//! key (the remote address, for the server) to a slot holding that peer's engine instance.
//!
//! Keys are compared for exact equality and nothing else.  Two connections open at the same time
//! from the same address therefore share one engine instance, and when the table is full a peer
//! that has been quiet can lose its slot to unrelated traffic without being told.  Both are
//! accepted limitations of keying by address; a different key type (a session cookie, say) can be
//! used by instantiating the table with it.

/// Result of [`IdentityTable::lookup_or_assign`].
#[derive(Debug, PartialEq)]
pub struct Assignment<I> {
    /// Slot now keyed by the requested peer
    pub slot: usize,
    /// Engine instance of the peer that was evicted to make room.  The caller owns it now and is
    /// expected to destroy it.
    pub evicted: Option<I>,
}

struct Slot<K, I> {
    key: Option<K>,
    instance: Option<I>,
}

/// Fixed capacity map from peer key to engine instance with round robin eviction.
pub struct IdentityTable<K, I, const N: usize> {
    slots: [Slot<K, I>; N],
    next_victim: usize,
}

impl<K, I, const N: usize> Default for IdentityTable<K, I, N>
where
    K: PartialEq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, I, const N: usize> IdentityTable<K, I, N>
where
    K: PartialEq + Clone,
{
    /// An empty table
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                key: None,
                instance: None,
            }),
            next_victim: 0,
        }
    }

    /// Find the slot keyed by `key`, claiming a free one or evicting an occupied one when there
    /// is none.  Evictions walk the slots round robin, one step per eviction.  A zero capacity
    /// table reports slot 0 and holds nothing.
    pub fn lookup_or_assign(&mut self, key: &K) -> Assignment<I> {
        if let Some(slot) = self.find(key) {
            return Assignment {
                slot,
                evicted: None,
            };
        }

        if N == 0 {
            return Assignment {
                slot: 0,
                evicted: None,
            };
        }

        if let Some(slot) = self.slots.iter().position(|s| s.key.is_none()) {
            self.slots[slot].key = Some(key.clone());
            self.slots[slot].instance = None;
            return Assignment {
                slot,
                evicted: None,
            };
        }

        let slot = self.next_victim;
        self.next_victim = (self.next_victim + 1) % N;

        let victim = &mut self.slots[slot];
        victim.key = Some(key.clone());
        Assignment {
            slot,
            evicted: victim.instance.take(),
        }
    }

    /// Slot keyed by `key`, if any
    pub fn find(&self, key: &K) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.key.as_ref() == Some(key))
    }

    /// Key of `slot`, `None` if the slot is free or out of range
    pub fn key(&self, slot: usize) -> Option<&K> {
        self.slots.get(slot)?.key.as_ref()
    }

    /// Engine instance held by `slot`
    pub fn instance_mut(&mut self, slot: usize) -> Option<&mut I> {
        self.slots.get_mut(slot)?.instance.as_mut()
    }

    /// Remove and return the engine instance held by `slot`, leaving the slot keyed
    pub fn take_instance(&mut self, slot: usize) -> Option<I> {
        self.slots.get_mut(slot)?.instance.take()
    }

    /// Store `instance` in `slot`, returning the instance it replaces.  An out of range slot hands
    /// `instance` straight back.
    pub fn set_instance(&mut self, slot: usize, instance: I) -> Option<I> {
        match self.slots.get_mut(slot) {
            Some(s) => s.instance.replace(instance),
            None => Some(instance),
        }
    }

    /// Number of keyed slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.key.is_some()).count()
    }

    /// True when no slot is keyed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        N
    }

    /// Free every slot, handing each engine instance to `release`
    pub fn clear(&mut self, mut release: impl FnMut(I)) {
        for slot in self.slots.iter_mut() {
            slot.key = None;
            if let Some(instance) = slot.instance.take() {
                release(instance);
            }
        }
        self.next_victim = 0;
    }
}
