//! Enable mask computation
//!
//! Callers reach these functions with borrows taken from a held
//! [`ConfigGuard`](crate::ConfigGuard); there is no other way to obtain a
//! `&SessionTable` or a `&ProviderState`.

use crate::event::Event;
use crate::metrics;
use crate::provider::ProviderState;
use crate::session::SessionTable;
use tracemux_shared::{keywords_match, EventLevel, Keywords, SessionMask};

/// Bitmask of the sessions that accept an event with `keywords`/`level`
/// from `provider`.
///
/// A slot contributes its bit when the provider is enabled, the slot is
/// occupied, its bit is attached to the provider, the session subscribes to
/// the provider, and the session's keyword and level filters both pass.
pub(crate) fn compute_enable_mask(
    sessions: &SessionTable,
    provider: &ProviderState,
    keywords: Keywords,
    level: EventLevel,
) -> SessionMask {
    if !provider.enabled() {
        return 0;
    }

    sessions
        .occupied()
        .filter(|(slot, _)| provider.sessions() & slot.mask() != 0)
        .filter_map(|(slot, session)| Some((slot, session.provider(provider.name())?)))
        .filter(|(_, filter)| {
            keywords_match(filter.keywords(), keywords) && filter.level().accepts(level)
        })
        .fold(0, |mask, (slot, _)| mask | slot.mask())
}

pub(crate) fn refresh_event(sessions: &SessionTable, provider: &ProviderState, event: &Event) {
    let mask = compute_enable_mask(sessions, provider, event.keywords(), event.level());
    event.set_enabled_mask(mask);
}

/// Recompute every event owned by `provider`; returns how many were touched
pub(crate) fn refresh_all_events(sessions: &SessionTable, provider: &ProviderState) -> usize {
    for event in provider.events() {
        refresh_event(sessions, provider, event);
    }
    let count = provider.events().len();
    metrics::EVENT_REFRESHES.inc_by(count as f64);
    count
}
