//! Lock-guarded configuration state
//!
//! [`ConfigGuard`] is the only way to reach the session table and provider
//! state. Holding one proves the configuration lock is held, so operations
//! that require the lock take `&mut ConfigGuard` instead of asserting at
//! runtime.

use crate::error::Result;
use crate::event::Event;
use crate::lock::{LockGuard, LockId};
use crate::provider::{Provider, ProviderId, ProviderState, ProviderStatus};
use crate::session::{Session, SessionTable};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracemux_shared::SlotIndex;

pub(crate) struct ConfigState {
    sessions: SessionTable,
    providers: BTreeMap<ProviderId, ProviderState>,
    next_provider_id: u64,
    log_filter_data: bool,
}

impl ConfigState {
    pub(crate) fn new(max_sessions: usize, log_filter_data: bool) -> Self {
        Self {
            sessions: SessionTable::new(max_sessions),
            providers: BTreeMap::new(),
            next_provider_id: 1,
            log_filter_data,
        }
    }
}

/// Exclusive access to the engine configuration
pub struct ConfigGuard<'a> {
    inner: LockGuard<'a, ConfigState>,
}

impl<'a> ConfigGuard<'a> {
    pub(crate) fn new(inner: LockGuard<'a, ConfigState>) -> Self {
        Self { inner }
    }

    pub fn lock_id(&self) -> LockId {
        self.inner.id()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionTable {
        &mut self.inner.sessions
    }

    /// Remove the session in `slot`.
    ///
    /// Panics if the slot is empty or any provider still has the slot's bit
    /// attached.
    pub fn vacate_session(&mut self, slot: SlotIndex) -> Session {
        if let Some(state) = self
            .inner
            .providers
            .values()
            .find(|p| p.sessions() & slot.mask() != 0)
        {
            panic!(
                "slot {} is still attached to provider '{}'",
                slot.get(),
                state.name()
            );
        }
        self.inner.sessions.vacate(slot)
    }

    pub fn provider_status(&self, provider: &Provider) -> Result<ProviderStatus> {
        let (_, state) = self.provider_ref(provider)?;
        Ok(state.status())
    }

    /// Snapshot of the provider's events in registration order
    pub fn provider_events(&self, provider: &Provider) -> Result<Vec<Arc<Event>>> {
        let (_, state) = self.provider_ref(provider)?;
        Ok(state.events().to_vec())
    }

    /// Status of every registered provider, in creation order
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.inner.providers.values().map(ProviderState::status).collect()
    }

    pub(crate) fn log_filter_data(&self) -> bool {
        self.inner.log_filter_data
    }

    pub(crate) fn insert_provider(&mut self, build: impl FnOnce(ProviderId) -> ProviderState) -> ProviderId {
        let id = ProviderId(self.inner.next_provider_id);
        self.inner.next_provider_id += 1;
        let state = build(id);
        debug_assert_eq!(state.id(), id);
        self.inner.providers.insert(id, state);
        id
    }

    pub(crate) fn remove_provider(&mut self, provider: &Provider) -> Result<ProviderState> {
        self.check_owner(provider);
        self.inner
            .providers
            .remove(&provider.id())
            .ok_or_else(|| provider.invalid())
    }

    pub(crate) fn provider_ref(&self, provider: &Provider) -> Result<(&SessionTable, &ProviderState)> {
        self.check_owner(provider);
        let state = &*self.inner;
        let provider_state = state
            .providers
            .get(&provider.id())
            .ok_or_else(|| provider.invalid())?;
        Ok((&state.sessions, provider_state))
    }

    pub(crate) fn provider_parts(
        &mut self,
        provider: &Provider,
    ) -> Result<(&SessionTable, &mut ProviderState)> {
        self.check_owner(provider);
        let state = &mut *self.inner;
        let provider_state = state
            .providers
            .get_mut(&provider.id())
            .ok_or_else(|| provider.invalid())?;
        Ok((&state.sessions, provider_state))
    }

    fn check_owner(&self, provider: &Provider) {
        assert_eq!(
            provider.lock_id(),
            self.lock_id(),
            "provider '{}' belongs to a different trace engine",
            provider.name()
        );
    }
}
