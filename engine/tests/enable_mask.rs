use proptest::prelude::*;
use std::sync::Arc;
use tracemux_engine::{
    ConfigGuard, EngineConfig, EngineError, Event, Provider, Session, SessionId, SessionProvider,
    TraceEngine,
};
use tracemux_shared::{EventLevel, Keywords, SessionMask, SlotIndex};

const PROVIDER: &str = "Test-Provider";

fn engine(max_sessions: usize) -> TraceEngine {
    TraceEngine::new(EngineConfig {
        max_sessions,
        log_filter_data: true,
    })
    .unwrap()
}

fn slot(i: usize) -> SlotIndex {
    SlotIndex::new(i).unwrap()
}

fn occupy(guard: &mut ConfigGuard<'_>, i: usize, filters: Vec<SessionProvider>) {
    guard
        .sessions_mut()
        .occupy(slot(i), Session::new(SessionId(i as u64 + 100), filters));
}

fn attach(engine: &TraceEngine, provider: &Provider, mask: SessionMask) {
    let snapshot = {
        let mut guard = engine.lock();
        provider
            .attach_session(&mut guard, mask, u64::MAX, EventLevel::Verbose, None)
            .unwrap()
    };
    engine.invoke_callback(snapshot);
}

fn detach(engine: &TraceEngine, provider: &Provider, mask: SessionMask) {
    let snapshot = {
        let mut guard = engine.lock();
        provider
            .detach_session(&mut guard, mask, 0, EventLevel::LogAlways, None)
            .unwrap()
    };
    engine.invoke_callback(snapshot);
}

fn masks(events: &[Arc<Event>]) -> Vec<SessionMask> {
    events.iter().map(|e| e.enabled_mask()).collect()
}

#[test]
fn test_events_follow_session_filters() {
    let engine = engine(4);
    let provider = engine.create_provider(PROVIDER, None);

    let gc = provider
        .add_event(0x1, 1, 0, EventLevel::Informational, false, &[])
        .unwrap();
    let jit = provider
        .add_event(0x2, 2, 0, EventLevel::Verbose, false, &[])
        .unwrap();
    let always = provider
        .add_event(0, 3, 0, EventLevel::LogAlways, true, &[])
        .unwrap();

    assert!(!gc.is_enabled() && !jit.is_enabled() && !always.is_enabled());

    {
        let mut guard = engine.lock();
        occupy(
            &mut guard,
            0,
            vec![SessionProvider::new(PROVIDER, 0x1, EventLevel::Verbose)],
        );
        occupy(
            &mut guard,
            1,
            vec![SessionProvider::new(PROVIDER, 0x2, EventLevel::Warning)],
        );
    }
    attach(&engine, &provider, 0b11);

    assert_eq!(gc.enabled_mask(), 0b01);
    // Slot 1 wants keyword 0x2 but only up to Warning
    assert_eq!(jit.enabled_mask(), 0);
    assert_eq!(always.enabled_mask(), 0b11);
}

#[test]
fn test_event_registered_after_attach_gets_current_mask() {
    let engine = engine(2);
    let provider = engine.create_provider(PROVIDER, None);
    {
        let mut guard = engine.lock();
        occupy(
            &mut guard,
            1,
            vec![SessionProvider::new(PROVIDER, 0x4, EventLevel::Error)],
        );
    }
    attach(&engine, &provider, 0b10);

    let late = provider
        .add_event(0x4, 9, 1, EventLevel::Critical, false, b"late")
        .unwrap();
    assert_eq!(late.enabled_mask(), 0b10);
    assert!(late.is_enabled_for(slot(1)));

    let guard = engine.lock();
    assert_eq!(
        provider
            .compute_enable_mask(&guard, 0x4, EventLevel::Verbose)
            .unwrap(),
        0
    );
    let status = guard.provider_status(&provider).unwrap();
    assert!(status.enabled);
    assert_eq!(status.sessions, 0b10);
    assert_eq!(status.event_count, 1);
}

#[test]
fn test_zero_keywords_and_log_always_match_every_session() {
    let engine = engine(3);
    let provider = engine.create_provider(PROVIDER, None);
    {
        let mut guard = engine.lock();
        occupy(
            &mut guard,
            0,
            vec![SessionProvider::new(PROVIDER, 0, EventLevel::LogAlways)],
        );
        occupy(
            &mut guard,
            1,
            vec![SessionProvider::new(PROVIDER, 0x80, EventLevel::Critical)],
        );
        occupy(
            &mut guard,
            2,
            vec![SessionProvider::new(PROVIDER, u64::MAX, EventLevel::Verbose)],
        );
    }
    attach(&engine, &provider, 0b111);

    let unconditional = provider
        .add_event(0, 1, 0, EventLevel::LogAlways, false, &[])
        .unwrap();
    assert_eq!(unconditional.enabled_mask(), 0b111);

    // Zero keywords alone still go through the level test
    let verbose = provider
        .add_event(0, 2, 0, EventLevel::Verbose, false, &[])
        .unwrap();
    assert_eq!(verbose.enabled_mask(), 0b100);

    // LogAlways alone still goes through the keyword test
    let keyed = provider
        .add_event(0x80, 3, 0, EventLevel::LogAlways, false, &[])
        .unwrap();
    assert_eq!(keyed.enabled_mask(), 0b110);
}

#[test]
fn test_in_place_filter_edit_needs_refresh() {
    let engine = engine(2);
    let provider = engine.create_provider(PROVIDER, None);
    let event = provider
        .add_event(0x2, 1, 0, EventLevel::Informational, false, &[])
        .unwrap();
    {
        let mut guard = engine.lock();
        occupy(
            &mut guard,
            0,
            vec![SessionProvider::new(PROVIDER, 0x1, EventLevel::Verbose)],
        );
    }
    attach(&engine, &provider, 0b1);
    assert_eq!(event.enabled_mask(), 0);

    let mut guard = engine.lock();
    guard
        .sessions_mut()
        .get_mut(slot(0))
        .and_then(|s| s.provider_mut(PROVIDER))
        .unwrap()
        .set_keywords(0x3);
    assert_eq!(event.enabled_mask(), 0);

    provider.refresh_all_events(&mut guard).unwrap();
    assert_eq!(event.enabled_mask(), 0b1);
}

#[test]
fn test_detaching_last_session_disables_provider() {
    let engine = engine(2);
    let provider = engine.create_provider(PROVIDER, None);
    let event = provider
        .add_event(0, 1, 0, EventLevel::LogAlways, false, &[])
        .unwrap();
    {
        let mut guard = engine.lock();
        occupy(
            &mut guard,
            0,
            vec![SessionProvider::new(PROVIDER, 0, EventLevel::Verbose)],
        );
    }
    attach(&engine, &provider, 0b1);
    assert!(event.is_enabled());

    detach(&engine, &provider, 0b1);
    assert!(!event.is_enabled());

    let mut guard = engine.lock();
    assert!(!guard.provider_status(&provider).unwrap().enabled);
    let session = guard.vacate_session(slot(0));
    assert_eq!(session.id(), SessionId(100));
    assert!(guard.sessions().is_empty());
}

#[test]
fn test_deleted_provider_is_invalid() {
    let engine = engine(2);
    let provider = engine.create_provider(PROVIDER, None);
    let event = provider
        .add_event(0, 1, 0, EventLevel::LogAlways, false, &[])
        .unwrap();
    {
        let mut guard = engine.lock();
        occupy(
            &mut guard,
            0,
            vec![SessionProvider::new(PROVIDER, 0, EventLevel::Verbose)],
        );
    }
    attach(&engine, &provider, 0b1);
    assert!(event.is_enabled());

    engine.delete_provider(&provider).unwrap();
    assert!(!event.is_enabled());

    match provider.add_event(0, 2, 0, EventLevel::LogAlways, false, &[]) {
        Err(EngineError::InvalidProvider { name }) => assert_eq!(name, PROVIDER),
        other => panic!("unexpected {:?}", other),
    }
    assert!(engine.delete_provider(&provider).is_err());

    let mut guard = engine.lock();
    assert!(guard.provider_status(&provider).is_err());
    assert!(provider.refresh_all_events(&mut guard).is_err());
    assert!(guard.providers().is_empty());
}

#[test]
fn test_provider_outliving_engine_is_invalid() {
    let provider = {
        let engine = engine(1);
        engine.create_provider(PROVIDER, None)
    };
    assert!(matches!(
        provider.add_event(0, 1, 0, EventLevel::LogAlways, false, &[]),
        Err(EngineError::InvalidProvider { .. })
    ));
}

#[test]
fn test_session_table_capacity_follows_config() {
    let engine = engine(2);
    let mut guard = engine.lock();
    assert_eq!(guard.sessions().capacity(), 2);
    occupy(&mut guard, 0, vec![]);
    occupy(&mut guard, 1, vec![]);
    assert!(matches!(
        guard.sessions().reserve_slot(),
        Err(EngineError::SessionTableFull { capacity: 2 })
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = TraceEngine::new(EngineConfig {
        max_sessions: 0,
        log_filter_data: false,
    });
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

// ── Properties ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SlotSetup {
    occupied: bool,
    subscribes: bool,
    attached: bool,
    keywords: Keywords,
    level: EventLevel,
}

fn arb_level() -> impl Strategy<Value = EventLevel> {
    (0u8..=5).prop_map(|v| EventLevel::from_u8(v).unwrap())
}

fn arb_slot() -> impl Strategy<Value = SlotSetup> {
    (any::<bool>(), any::<bool>(), any::<bool>(), 0u64..16, arb_level()).prop_map(
        |(occupied, subscribes, attached, keywords, level)| SlotSetup {
            occupied,
            subscribes,
            attached,
            keywords,
            level,
        },
    )
}

fn arb_events() -> impl Strategy<Value = Vec<(Keywords, EventLevel)>> {
    prop::collection::vec((0u64..16, arb_level()), 1..8)
}

/// Reference predicate, evaluated independently of the engine
fn expected_mask(slots: &[SlotSetup], keywords: Keywords, level: EventLevel) -> SessionMask {
    let provider_enabled = slots.iter().any(|s| s.attached);
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            provider_enabled
                && s.occupied
                && s.attached
                && s.subscribes
                && (keywords == 0 || s.keywords & keywords != 0)
                && (level == EventLevel::LogAlways || s.level >= level)
        })
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

fn build(slots: &[SlotSetup]) -> (TraceEngine, Provider) {
    let engine = engine(slots.len());
    let provider = engine.create_provider(PROVIDER, None);
    {
        let mut guard = engine.lock();
        for (i, s) in slots.iter().enumerate().filter(|(_, s)| s.occupied) {
            let name = if s.subscribes { PROVIDER } else { "Other-Provider" };
            occupy(
                &mut guard,
                i,
                vec![SessionProvider::new(name, s.keywords, s.level)],
            );
        }
    }
    (engine, provider)
}

fn attached_mask(slots: &[SlotSetup]) -> SessionMask {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.attached)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

fn register(provider: &Provider, events: &[(Keywords, EventLevel)]) -> Vec<Arc<Event>> {
    events
        .iter()
        .enumerate()
        .map(|(id, (kw, lvl))| {
            provider
                .add_event(*kw, id as u32, 0, *lvl, false, &[])
                .unwrap()
        })
        .collect()
}

proptest! {
    #[test]
    fn test_enable_mask_matches_predicate(
        slots in prop::collection::vec(arb_slot(), 3),
        events in arb_events(),
        split in 0usize..8,
    ) {
        let (engine, provider) = build(&slots);
        let split = split.min(events.len());

        // Some events exist before the attach, the rest are registered after
        let mut registered = register(&provider, &events[..split]);
        let mask = attached_mask(&slots);
        if mask != 0 {
            attach(&engine, &provider, mask);
        }
        registered.extend(register(&provider, &events[split..]));

        for (event, (kw, lvl)) in registered.iter().zip(&events) {
            prop_assert_eq!(event.enabled_mask(), expected_mask(&slots, *kw, *lvl));
        }
    }

    #[test]
    fn test_detach_clears_only_its_bit(
        slots in prop::collection::vec(arb_slot(), 3),
        events in arb_events(),
        victim in 0usize..3,
    ) {
        let mut slots = slots;
        slots[victim].attached = true;
        let (engine, provider) = build(&slots);
        let registered = register(&provider, &events);
        attach(&engine, &provider, attached_mask(&slots));

        let before = masks(&registered);
        detach(&engine, &provider, 1 << victim);
        let after = masks(&registered);

        for (b, a) in before.iter().zip(&after) {
            prop_assert_eq!(*a, *b & !(1 << victim));
        }
    }

    #[test]
    fn test_attach_then_detach_restores_masks(
        slots in prop::collection::vec(arb_slot(), 3),
        events in arb_events(),
        extra in 0usize..3,
    ) {
        let mut slots = slots;
        slots[extra].attached = false;
        let (engine, provider) = build(&slots);
        let registered = register(&provider, &events);
        let mask = attached_mask(&slots);
        if mask != 0 {
            attach(&engine, &provider, mask);
        }

        let before = masks(&registered);
        attach(&engine, &provider, 1 << extra);
        detach(&engine, &provider, 1 << extra);
        prop_assert_eq!(masks(&registered), before);
    }
}
