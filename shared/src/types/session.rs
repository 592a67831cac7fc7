//! Session slot and mask types

use serde::{Deserialize, Serialize};

/// Bitmask over session slots; bit `i` stands for slot `i`
pub type SessionMask = u64;

/// Hard ceiling on concurrently active sessions, baked into the mask width
pub const MAX_SESSIONS: usize = SessionMask::BITS as usize;

/// Index of a slot in the session table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotIndex(u8);

impl SlotIndex {
    /// Build a slot index, rejecting values at or above [`MAX_SESSIONS`]
    pub fn new(index: usize) -> Option<Self> {
        if index < MAX_SESSIONS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// The single mask bit owned by this slot
    pub fn mask(self) -> SessionMask {
        1 << self.0
    }
}

/// Iterate the slot indices whose bits are set in `mask`, lowest first
pub fn mask_slots(mask: SessionMask) -> impl Iterator<Item = SlotIndex> {
    let mut remaining = mask;
    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let bit = remaining.trailing_zeros() as usize;
        remaining &= remaining - 1;
        SlotIndex::new(bit)
    })
}
