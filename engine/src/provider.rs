//! Providers: named sources of events with an aggregate enable state
//!
//! A [`Provider`] is a cheap handle held by the registration layer and by
//! callbacks. The provider's mutable state ([`ProviderState`]) lives inside
//! the engine's locked configuration and is only reachable through a
//! [`ConfigGuard`].

use crate::callback::{CallbackSnapshot, ProviderCallback};
use crate::engine::EngineShared;
use crate::error::{EngineError, Result};
use crate::event::Event;
use crate::lock::LockId;
use crate::mask;
use crate::metrics;
use crate::state::ConfigGuard;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracemux_shared::{EventId, EventLevel, EventVersion, Keywords, SessionMask};
use tracing::{debug, info};

/// Engine-unique provider identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub(crate) u64);

impl ProviderId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Lock-guarded provider aggregate
pub(crate) struct ProviderState {
    id: ProviderId,
    name: Arc<str>,
    sessions: SessionMask,
    keywords: Keywords,
    level: EventLevel,
    events: Vec<Arc<Event>>,
    callback: Option<Arc<dyn ProviderCallback>>,
}

impl ProviderState {
    pub(crate) fn new(
        id: ProviderId,
        name: Arc<str>,
        callback: Option<Arc<dyn ProviderCallback>>,
    ) -> Self {
        Self {
            id,
            name,
            sessions: 0,
            keywords: 0,
            level: EventLevel::LogAlways,
            events: Vec::new(),
            callback,
        }
    }

    pub(crate) fn id(&self) -> ProviderId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Any session attached
    pub(crate) fn enabled(&self) -> bool {
        self.sessions != 0
    }

    pub(crate) fn sessions(&self) -> SessionMask {
        self.sessions
    }

    pub(crate) fn set_sessions(&mut self, sessions: SessionMask) {
        self.sessions = sessions;
    }

    pub(crate) fn keywords(&self) -> Keywords {
        self.keywords
    }

    pub(crate) fn level(&self) -> EventLevel {
        self.level
    }

    pub(crate) fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    pub(crate) fn callback(&self) -> Option<&Arc<dyn ProviderCallback>> {
        self.callback.as_ref()
    }

    fn set_aggregate(&mut self, keywords: Keywords, level: EventLevel) {
        self.keywords = keywords;
        self.level = level;
    }

    pub(crate) fn status(&self) -> ProviderStatus {
        ProviderStatus {
            id: self.id,
            name: self.name.to_string(),
            enabled: self.enabled(),
            sessions: self.sessions,
            keywords: self.keywords,
            level: self.level,
            event_count: self.events.len(),
        }
    }

    /// Zero every event's mask ahead of removal
    pub(crate) fn disable_all_events(&self) {
        for event in &self.events {
            event.set_enabled_mask(0);
        }
    }
}

/// Point-in-time view of a provider's aggregate state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub name: String,
    pub enabled: bool,
    pub sessions: SessionMask,
    pub keywords: Keywords,
    pub level: EventLevel,
    pub event_count: usize,
}

/// Handle to a provider registered with a [`TraceEngine`](crate::TraceEngine)
#[derive(Debug, Clone)]
pub struct Provider {
    id: ProviderId,
    name: Arc<str>,
    lock_id: LockId,
    engine: Weak<EngineShared>,
}

impl Provider {
    pub(crate) fn new(
        id: ProviderId,
        name: Arc<str>,
        lock_id: LockId,
        engine: Weak<EngineShared>,
    ) -> Self {
        Self {
            id,
            name,
            lock_id,
            engine,
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock_id(&self) -> LockId {
        self.lock_id
    }

    pub(crate) fn invalid(&self) -> EngineError {
        EngineError::InvalidProvider {
            name: self.name.to_string(),
        }
    }

    /// Register a new event and compute its enable mask.
    ///
    /// Takes the configuration lock internally, so the caller must not hold
    /// it. This is the path a provider callback uses to register more events
    /// while it is being notified.
    pub fn add_event(
        &self,
        keywords: Keywords,
        id: EventId,
        version: EventVersion,
        level: EventLevel,
        needs_stack: bool,
        metadata: &[u8],
    ) -> Result<Arc<Event>> {
        self.lock_id.requires_not_held();

        let engine = self.engine.upgrade().ok_or_else(|| self.invalid())?;
        let event = Arc::new(Event::new(
            self.id,
            keywords,
            id,
            version,
            level,
            needs_stack,
            metadata,
        )?);

        {
            let mut guard = engine.lock();
            let (sessions, state) = guard.provider_parts(self)?;
            state.events.push(Arc::clone(&event));
            mask::refresh_event(sessions, state, &event);
        }

        metrics::EVENTS_REGISTERED.inc();
        debug!(
            "Registered event {} (v{}) on provider '{}' with keywords {:#x}, level {}, mask {:#x}",
            id,
            version,
            self.name,
            keywords,
            level,
            event.enabled_mask()
        );
        Ok(event)
    }

    /// Attach the sessions in `session_mask` and refresh every event.
    ///
    /// `keywords`/`level` are the combined filter of all sessions attached
    /// after this call, as computed by the session manager. The returned
    /// snapshot must be handed to
    /// [`TraceEngine::invoke_callback`](crate::TraceEngine::invoke_callback)
    /// once the guard is dropped.
    ///
    /// Panics if any bit of `session_mask` is already attached.
    pub fn attach_session(
        &self,
        guard: &mut ConfigGuard<'_>,
        session_mask: SessionMask,
        keywords: Keywords,
        level: EventLevel,
        filter_data: Option<&str>,
    ) -> Result<CallbackSnapshot> {
        let lock_id = guard.lock_id();
        let log_filter_data = guard.log_filter_data();
        let (sessions, state) = guard.provider_parts(self)?;

        assert!(
            state.sessions & session_mask == 0,
            "session mask {:#x} is already attached to provider '{}' (attached: {:#x})",
            session_mask,
            self.name,
            state.sessions
        );

        state.sessions |= session_mask;
        state.set_aggregate(keywords, level);
        let refreshed = mask::refresh_all_events(sessions, state);

        metrics::CONFIG_CHANGES.with_label_values(&["attach"]).inc();
        info!(
            "Attached sessions {:#x} to provider '{}' (attached: {:#x}, keywords {:#x}, level {}, {} events refreshed)",
            session_mask, self.name, state.sessions, keywords, level, refreshed
        );
        if log_filter_data {
            debug!("Provider '{}' filter data: {:?}", self.name, filter_data);
        }

        Ok(CallbackSnapshot::prepare(lock_id, state, filter_data))
    }

    /// Detach the sessions in `session_mask` and refresh every event.
    ///
    /// `keywords`/`level` describe the sessions that remain attached.
    ///
    /// Panics if any bit of `session_mask` is not currently attached.
    pub fn detach_session(
        &self,
        guard: &mut ConfigGuard<'_>,
        session_mask: SessionMask,
        keywords: Keywords,
        level: EventLevel,
        filter_data: Option<&str>,
    ) -> Result<CallbackSnapshot> {
        let lock_id = guard.lock_id();
        let (sessions, state) = guard.provider_parts(self)?;

        assert!(
            state.sessions & session_mask == session_mask,
            "session mask {:#x} is not attached to provider '{}' (attached: {:#x})",
            session_mask,
            self.name,
            state.sessions
        );

        state.sessions &= !session_mask;
        state.set_aggregate(keywords, level);
        let refreshed = mask::refresh_all_events(sessions, state);

        metrics::CONFIG_CHANGES.with_label_values(&["detach"]).inc();
        info!(
            "Detached sessions {:#x} from provider '{}' (attached: {:#x}, keywords {:#x}, level {}, {} events refreshed)",
            session_mask, self.name, state.sessions, keywords, level, refreshed
        );

        Ok(CallbackSnapshot::prepare(lock_id, state, filter_data))
    }

    /// Recompute every owned event from current session state, e.g. after a
    /// session filter was edited in place.
    pub fn refresh_all_events(&self, guard: &mut ConfigGuard<'_>) -> Result<()> {
        let (sessions, state) = guard.provider_parts(self)?;
        let refreshed = mask::refresh_all_events(sessions, state);
        metrics::CONFIG_CHANGES.with_label_values(&["refresh"]).inc();
        debug!("Refreshed {} events on provider '{}'", refreshed, self.name);
        Ok(())
    }

    /// Mask a hypothetical event with `keywords`/`level` would get right now
    pub fn compute_enable_mask(
        &self,
        guard: &ConfigGuard<'_>,
        keywords: Keywords,
        level: EventLevel,
    ) -> Result<SessionMask> {
        let (sessions, state) = guard.provider_ref(self)?;
        Ok(mask::compute_enable_mask(sessions, state, keywords, level))
    }
}
