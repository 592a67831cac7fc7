//! Session manager driving the enable-state engine
//!
//! The engine only knows about session masks and aggregate filters. This
//! manager plays the tracing client's side: it owns the mapping from session
//! names to slots, computes each provider's combined keywords and level over
//! the sessions attached to it, and dispatches callbacks once the
//! configuration lock is released.

use crate::scenario::{EventSpec, ProviderSpec, SessionSpec};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracemux_engine::{
    CallbackQueue, CallbackSnapshot, ConfigGuard, EngineConfig, Provider, ProviderStatus,
    ProviderUpdate, Session, SessionId, SessionProvider, SessionTable, TraceEngine,
};
use tracemux_shared::{mask_slots, EventId, EventLevel, Keywords, SessionMask, SlotIndex};
use tracing::{debug, info};

/// One observed provider callback invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackRecord {
    pub provider: String,
    pub enabled: bool,
    pub keywords: Keywords,
    pub level: EventLevel,
    pub filter: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub id: EventId,
    pub keywords: Keywords,
    pub level: EventLevel,
    pub enabled_mask: SessionMask,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    #[serde(flatten)]
    pub status: ProviderStatus,
    pub events: Vec<EventReport>,
}

pub struct SessionManager {
    engine: TraceEngine,
    providers: Vec<Provider>,
    active: HashMap<String, SlotIndex>,
    next_session_id: u64,
    callbacks: Arc<Mutex<Vec<CallbackRecord>>>,
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let engine = TraceEngine::new(config).context("Failed to create trace engine")?;
        Ok(Self {
            engine,
            providers: Vec::new(),
            active: HashMap::new(),
            next_session_id: 1,
            callbacks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Drain the callback invocations recorded since the last call
    pub fn take_callbacks(&self) -> Vec<CallbackRecord> {
        std::mem::take(&mut *self.callbacks.lock())
    }

    fn provider(&self, name: &str) -> Result<&Provider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .with_context(|| format!("Unknown provider '{}'", name))
    }

    /// Session mask currently attached to each provider selected by `select`
    fn attached_masks(
        &self,
        guard: &ConfigGuard<'_>,
        select: impl Fn(&Provider) -> bool,
    ) -> Result<Vec<(&Provider, SessionMask)>> {
        self.providers
            .iter()
            .filter(|p| select(p))
            .map(|p| Ok((p, guard.provider_status(p)?.sessions)))
            .collect()
    }

    /// Create a provider, register its events, and attach any running
    /// sessions that already subscribe to it.
    pub fn register_provider(&mut self, spec: &ProviderSpec) -> Result<()> {
        let callback = spec.callback.then(|| {
            let sink = Arc::clone(&self.callbacks);
            let name = spec.name.clone();
            let record = move |update: &ProviderUpdate<'_>| {
                let filter = update
                    .filter
                    .map(|desc| {
                        desc.pairs()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                sink.lock().push(CallbackRecord {
                    provider: name.clone(),
                    enabled: update.enabled,
                    keywords: update.keywords,
                    level: update.level,
                    filter,
                });
            };
            Arc::new(record) as Arc<dyn tracemux_engine::ProviderCallback>
        });

        let provider = self.engine.create_provider(&spec.name, callback);
        for event in &spec.events {
            register_event(&provider, event)?;
        }

        let mut queue = CallbackQueue::new();
        {
            let mut guard = self.engine.lock();
            let slots: Vec<SlotIndex> = guard
                .sessions()
                .occupied()
                .filter(|(_, session)| session.subscribes_to(&spec.name))
                .map(|(slot, _)| slot)
                .collect();

            let mut attached = 0;
            for slot in slots {
                queue.push(attach_slot(&mut guard, &provider, attached, slot)?);
                attached |= slot.mask();
            }
        }
        self.engine.dispatch(queue);

        self.providers.push(provider);
        Ok(())
    }

    /// Occupy a slot for `spec` and attach it to every subscribed provider
    pub fn start_session(&mut self, spec: &SessionSpec) -> Result<SlotIndex> {
        if self.active.contains_key(&spec.name) {
            anyhow::bail!("Session '{}' is already running", spec.name);
        }

        let providers = spec
            .providers
            .iter()
            .map(|p| {
                let sp = SessionProvider::new(p.name.clone(), p.keywords, p.level);
                match &p.filter {
                    Some(filter) => sp.with_filter_data(filter.clone()),
                    None => sp,
                }
            })
            .collect();

        let id = SessionId(self.next_session_id);
        let mut queue = CallbackQueue::new();
        let slot = {
            let mut guard = self.engine.lock();

            // Every fallible lookup happens before the table is touched
            let targets = self.attached_masks(&guard, |p| {
                spec.providers.iter().any(|sp| sp.name == p.name())
            })?;
            let slot = guard
                .sessions_mut()
                .reserve_slot()
                .with_context(|| format!("Cannot start session '{}'", spec.name))?;
            guard.sessions_mut().occupy(slot, Session::new(id, providers));

            for (provider, attached) in targets {
                queue.push(attach_slot(&mut guard, provider, attached, slot)?);
            }
            slot
        };
        self.engine.dispatch(queue);

        self.next_session_id += 1;
        self.active.insert(spec.name.clone(), slot);
        info!("Started session '{}' in slot {}", spec.name, slot.get());
        Ok(slot)
    }

    /// Detach a running session from its providers and free its slot
    pub fn stop_session(&mut self, name: &str) -> Result<()> {
        let slot = *self
            .active
            .get(name)
            .with_context(|| format!("Session '{}' is not running", name))?;

        let mut queue = CallbackQueue::new();
        {
            let mut guard = self.engine.lock();
            let targets = self.attached_masks(&guard, |_| true)?;
            for (provider, attached) in targets {
                if attached & slot.mask() != 0 {
                    queue.push(detach_slot(&mut guard, provider, attached, slot)?);
                }
            }
            guard.vacate_session(slot);
        }
        self.active.remove(name);
        self.engine.dispatch(queue);

        info!("Stopped session '{}' (slot {})", name, slot.get());
        Ok(())
    }

    /// Edit a running session's filter for one provider.
    ///
    /// The slot is detached and re-attached so the provider's aggregate is
    /// recomputed and its callback sees the new filter.
    pub fn retune(
        &mut self,
        session: &str,
        provider: &str,
        keywords: Keywords,
        level: EventLevel,
        filter: Option<String>,
    ) -> Result<()> {
        let slot = *self
            .active
            .get(session)
            .with_context(|| format!("Session '{}' is not running", session))?;
        let handle = self.provider(provider)?;

        let mut queue = CallbackQueue::new();
        {
            let mut guard = self.engine.lock();
            let attached = guard.provider_status(handle)?.sessions;
            let entry = guard
                .sessions_mut()
                .get_mut(slot)
                .and_then(|s| s.provider_mut(provider))
                .with_context(|| {
                    format!("Session '{}' does not subscribe to '{}'", session, provider)
                })?;
            entry.set_keywords(keywords);
            entry.set_level(level);
            entry.set_filter_data(filter);

            if attached & slot.mask() != 0 {
                queue.push(detach_slot(&mut guard, handle, attached, slot)?);
                queue.push(attach_slot(&mut guard, handle, attached & !slot.mask(), slot)?);
            } else {
                handle.refresh_all_events(&mut guard)?;
            }
        }
        self.engine.dispatch(queue);

        debug!(
            "Retuned session '{}' on provider '{}' to keywords {:#x}, level {}",
            session, provider, keywords, level
        );
        Ok(())
    }

    pub fn register_event(&self, provider: &str, event: &EventSpec) -> Result<()> {
        register_event(self.provider(provider)?, event)
    }

    /// Current state of every provider and its events
    pub fn report(&self) -> Result<Vec<ProviderReport>> {
        let guard = self.engine.lock();
        self.providers
            .iter()
            .map(|provider| {
                let status = guard.provider_status(provider)?;
                let events = guard
                    .provider_events(provider)?
                    .iter()
                    .map(|e| EventReport {
                        id: e.id(),
                        keywords: e.keywords(),
                        level: e.level(),
                        enabled_mask: e.enabled_mask(),
                    })
                    .collect();
                Ok(ProviderReport { status, events })
            })
            .collect()
    }

    pub fn session_slots(&self) -> Vec<(String, SlotIndex)> {
        let mut slots: Vec<_> = self
            .active
            .iter()
            .map(|(name, slot)| (name.clone(), *slot))
            .collect();
        slots.sort_by_key(|(_, slot)| slot.get());
        slots
    }
}

fn register_event(provider: &Provider, event: &EventSpec) -> Result<()> {
    provider
        .add_event(
            event.keywords,
            event.id,
            event.version,
            event.level,
            event.needs_stack,
            &[],
        )
        .with_context(|| format!("Failed to register event {} on '{}'", event.id, provider.name()))?;
    Ok(())
}

/// Attach `slot` to `provider`. `attached` is the provider's session mask
/// before the call; the aggregate covers it plus `slot`.
fn attach_slot(
    guard: &mut ConfigGuard<'_>,
    provider: &Provider,
    attached: SessionMask,
    slot: SlotIndex,
) -> Result<CallbackSnapshot> {
    let (keywords, level) = aggregate(guard.sessions(), provider.name(), attached | slot.mask());
    let filter = session_filter(guard.sessions(), slot, provider.name());
    Ok(provider.attach_session(guard, slot.mask(), keywords, level, filter.as_deref())?)
}

/// Detach `slot` from `provider`, leaving the aggregate of the sessions that
/// stay attached
fn detach_slot(
    guard: &mut ConfigGuard<'_>,
    provider: &Provider,
    attached: SessionMask,
    slot: SlotIndex,
) -> Result<CallbackSnapshot> {
    let (keywords, level) = aggregate(guard.sessions(), provider.name(), attached & !slot.mask());
    let filter = session_filter(guard.sessions(), slot, provider.name());
    Ok(provider.detach_session(guard, slot.mask(), keywords, level, filter.as_deref())?)
}

/// Union of keywords and most verbose level requested by the sessions in
/// `mask` for `provider_name`
fn aggregate(sessions: &SessionTable, provider_name: &str, mask: SessionMask) -> (Keywords, EventLevel) {
    mask_slots(mask)
        .filter_map(|slot| sessions.get(slot))
        .filter_map(|session| session.provider(provider_name))
        .fold((0, EventLevel::LogAlways), |(keywords, level), sp| {
            (keywords | sp.keywords(), level.max(sp.level()))
        })
}

fn session_filter(sessions: &SessionTable, slot: SlotIndex, provider_name: &str) -> Option<String> {
    sessions
        .get(slot)
        .and_then(|s| s.provider(provider_name))
        .and_then(|sp| sp.filter_data())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::SessionProviderSpec;

    fn provider_spec(name: &str, events: &[(EventId, Keywords, EventLevel)]) -> ProviderSpec {
        ProviderSpec {
            name: name.to_string(),
            callback: true,
            events: events
                .iter()
                .map(|&(id, keywords, level)| EventSpec {
                    id,
                    keywords,
                    level,
                    version: 0,
                    needs_stack: false,
                })
                .collect(),
        }
    }

    fn session_spec(name: &str, providers: &[(&str, Keywords, EventLevel, Option<&str>)]) -> SessionSpec {
        SessionSpec {
            name: name.to_string(),
            providers: providers
                .iter()
                .map(|&(name, keywords, level, filter)| SessionProviderSpec {
                    name: name.to_string(),
                    keywords,
                    level,
                    filter: filter.map(str::to_string),
                })
                .collect(),
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(EngineConfig {
            max_sessions: 4,
            log_filter_data: false,
        })
        .unwrap()
    }

    fn masks(manager: &SessionManager) -> Vec<SessionMask> {
        manager
            .report()
            .unwrap()
            .iter()
            .flat_map(|p| p.events.iter().map(|e| e.enabled_mask))
            .collect()
    }

    #[test]
    fn test_aggregate_over_attached_sessions() {
        let mut manager = manager();
        manager
            .register_provider(&provider_spec(
                "P",
                &[(1, 0x1, EventLevel::Informational), (2, 0x2, EventLevel::Verbose)],
            ))
            .unwrap();

        manager
            .start_session(&session_spec("a", &[("P", 0x1, EventLevel::Warning, Some("k=v"))]))
            .unwrap();
        let b = manager
            .start_session(&session_spec("b", &[("P", 0x2, EventLevel::Verbose, None)]))
            .unwrap();

        // Event 1 is Informational, above session a's Warning
        assert_eq!(masks(&manager), vec![0, b.mask()]);

        let records = manager.take_callbacks();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filter, vec![("k".to_string(), "v".to_string())]);
        assert_eq!(records[0].level, EventLevel::Warning);
        assert_eq!(records[1].keywords, 0x3);
        assert_eq!(records[1].level, EventLevel::Verbose);

        manager.stop_session("b").unwrap();
        let records = manager.take_callbacks();
        assert_eq!(records.len(), 1);
        assert!(records[0].enabled);
        assert_eq!(records[0].keywords, 0x1);
        assert_eq!(records[0].level, EventLevel::Warning);

        manager.stop_session("a").unwrap();
        assert!(!manager.take_callbacks()[0].enabled);
        assert_eq!(masks(&manager), vec![0, 0]);
        assert!(manager.session_slots().is_empty());
    }

    #[test]
    fn test_late_provider_picks_up_running_sessions() {
        let mut manager = manager();
        manager
            .start_session(&session_spec("s", &[("Late", 0x8, EventLevel::Verbose, None)]))
            .unwrap();
        manager
            .register_provider(&provider_spec("Late", &[(1, 0x8, EventLevel::Verbose)]))
            .unwrap();

        assert_eq!(masks(&manager), vec![0b1]);
        let records = manager.take_callbacks();
        assert_eq!(records.len(), 1);
        assert!(records[0].enabled);
    }

    #[test]
    fn test_retune_recomputes_aggregate_and_notifies() {
        let mut manager = manager();
        manager
            .register_provider(&provider_spec("P", &[(1, 0x4, EventLevel::Verbose)]))
            .unwrap();
        manager
            .start_session(&session_spec("s", &[("P", 0x1, EventLevel::Error, None)]))
            .unwrap();
        manager
            .start_session(&session_spec("t", &[("P", 0x8, EventLevel::Warning, None)]))
            .unwrap();
        assert_eq!(masks(&manager), vec![0]);
        manager.take_callbacks();

        manager
            .retune("s", "P", 0x4, EventLevel::Verbose, Some("k=v".to_string()))
            .unwrap();
        assert_eq!(masks(&manager), vec![0b01]);

        let status = &manager.report().unwrap()[0].status;
        assert_eq!(status.sessions, 0b11);
        assert_eq!(status.keywords, 0xc);
        assert_eq!(status.level, EventLevel::Verbose);

        let records = manager.take_callbacks();
        assert_eq!(records.len(), 2);
        // Detach leaves only session t in the aggregate
        assert_eq!(records[0].keywords, 0x8);
        assert_eq!(records[0].level, EventLevel::Warning);
        let last = &records[1];
        assert!(last.enabled);
        assert_eq!(last.keywords, 0xc);
        assert_eq!(last.level, EventLevel::Verbose);
        assert_eq!(last.filter, vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_failed_start_leaves_no_session() {
        let mut manager = manager();
        manager.register_provider(&provider_spec("P", &[])).unwrap();
        manager.engine.delete_provider(&manager.providers[0]).unwrap();

        let spec = session_spec("s", &[("P", 0x1, EventLevel::Verbose, None)]);
        assert!(manager.start_session(&spec).is_err());
        assert!(manager.session_slots().is_empty());
        assert!(manager.engine.lock().sessions().is_empty());
        assert!(manager.take_callbacks().is_empty());
    }

    #[test]
    fn test_failed_stop_keeps_session_running() {
        let mut manager = manager();
        manager.register_provider(&provider_spec("P", &[])).unwrap();
        manager
            .start_session(&session_spec("s", &[("P", 0x1, EventLevel::Verbose, None)]))
            .unwrap();
        manager.engine.delete_provider(&manager.providers[0]).unwrap();

        assert!(manager.stop_session("s").is_err());
        assert_eq!(manager.session_slots().len(), 1);
        assert_eq!(manager.engine.lock().sessions().len(), 1);
    }

    #[test]
    fn test_session_errors() {
        let mut manager = SessionManager::new(EngineConfig {
            max_sessions: 1,
            log_filter_data: false,
        })
        .unwrap();
        let spec = session_spec("s", &[]);
        manager.start_session(&spec).unwrap();
        assert!(manager.start_session(&spec).is_err());
        assert!(manager.start_session(&session_spec("t", &[])).is_err());
        assert!(manager.stop_session("missing").is_err());
        assert!(manager.retune("s", "nope", 0, EventLevel::Verbose, None).is_err());
    }
}
