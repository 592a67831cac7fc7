//! Session table
//!
//! A fixed-capacity arena of session slots. Slot `i` owns mask bit `1 << i`.
//! The table is only reachable through a [`ConfigGuard`](crate::ConfigGuard),
//! so every lookup and mutation happens under the configuration lock.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tracemux_shared::{EventLevel, Keywords, SessionMask, SlotIndex, MAX_SESSIONS};

/// Identity of a session, assigned by the external session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// A session's filter for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProvider {
    provider_name: String,
    keywords: Keywords,
    level: EventLevel,
    filter_data: Option<String>,
}

impl SessionProvider {
    pub fn new(provider_name: impl Into<String>, keywords: Keywords, level: EventLevel) -> Self {
        Self {
            provider_name: provider_name.into(),
            keywords,
            level,
            filter_data: None,
        }
    }

    pub fn with_filter_data(mut self, filter_data: impl Into<String>) -> Self {
        self.filter_data = Some(filter_data.into());
        self
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn keywords(&self) -> Keywords {
        self.keywords
    }

    pub fn level(&self) -> EventLevel {
        self.level
    }

    pub fn filter_data(&self) -> Option<&str> {
        self.filter_data.as_deref()
    }

    /// Edit in place; follow with `Provider::refresh_all_events`
    pub fn set_keywords(&mut self, keywords: Keywords) {
        self.keywords = keywords;
    }

    /// Edit in place; follow with `Provider::refresh_all_events`
    pub fn set_level(&mut self, level: EventLevel) {
        self.level = level;
    }

    pub fn set_filter_data(&mut self, filter_data: Option<String>) {
        self.filter_data = filter_data;
    }
}

/// An active trace-collection consumer occupying one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    providers: Vec<SessionProvider>,
}

impl Session {
    pub fn new(id: SessionId, providers: Vec<SessionProvider>) -> Self {
        Self { id, providers }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session's filter for `provider_name`, if it subscribes to it
    pub fn provider(&self, provider_name: &str) -> Option<&SessionProvider> {
        self.providers
            .iter()
            .find(|p| p.provider_name == provider_name)
    }

    pub fn provider_mut(&mut self, provider_name: &str) -> Option<&mut SessionProvider> {
        self.providers
            .iter_mut()
            .find(|p| p.provider_name == provider_name)
    }

    pub fn subscribes_to(&self, provider_name: &str) -> bool {
        self.provider(provider_name).is_some()
    }
}

/// Fixed array of optionally occupied session slots
#[derive(Debug)]
pub struct SessionTable {
    slots: Vec<Option<Session>>,
}

impl SessionTable {
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!((1..=MAX_SESSIONS).contains(&capacity));
        Self {
            slots: (0..capacity.min(MAX_SESSIONS)).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&Session> {
        self.slots.get(slot.get()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: SlotIndex) -> Option<&mut Session> {
        self.slots.get_mut(slot.get()).and_then(Option::as_mut)
    }

    /// Lowest free slot
    pub fn reserve_slot(&self) -> Result<SlotIndex> {
        self.slots
            .iter()
            .position(Option::is_none)
            .and_then(SlotIndex::new)
            .ok_or(EngineError::SessionTableFull {
                capacity: self.capacity(),
            })
    }

    /// Place `session` in an empty slot.
    ///
    /// Panics if the slot is out of range or already occupied.
    pub fn occupy(&mut self, slot: SlotIndex, session: Session) {
        let capacity = self.capacity();
        let entry = self
            .slots
            .get_mut(slot.get())
            .unwrap_or_else(|| panic!("slot {} out of range (capacity {})", slot.get(), capacity));
        assert!(entry.is_none(), "slot {} is already occupied", slot.get());
        *entry = Some(session);
    }

    pub(crate) fn vacate(&mut self, slot: SlotIndex) -> Session {
        self.slots
            .get_mut(slot.get())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("slot {} is not occupied", slot.get()))
    }

    /// Occupied slots in index order
    pub fn occupied(&self) -> impl Iterator<Item = (SlotIndex, &Session)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            let session = s.as_ref()?;
            Some((SlotIndex::new(i)?, session))
        })
    }

    pub fn occupied_mask(&self) -> SessionMask {
        self.occupied().fold(0, |mask, (slot, _)| mask | slot.mask())
    }

    pub fn find(&self, id: SessionId) -> Option<SlotIndex> {
        self.occupied()
            .find(|(_, s)| s.id == id)
            .map(|(slot, _)| slot)
    }
}
