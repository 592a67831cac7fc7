//! Registered instrumentation points

use crate::error::{EngineError, Result};
use crate::provider::ProviderId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracemux_shared::{EventId, EventLevel, EventVersion, Keywords, SessionMask, SlotIndex};

/// One instrumentation point.
///
/// Identity is fixed at registration. The enable mask is the only mutable
/// field: written under the configuration lock, read by instrumented code
/// without it. A read may be stale for a short window after a configuration
/// change but is never torn.
#[derive(Debug)]
pub struct Event {
    provider: ProviderId,
    id: EventId,
    keywords: Keywords,
    level: EventLevel,
    version: EventVersion,
    needs_stack: bool,
    metadata: Box<[u8]>,
    enabled_mask: AtomicU64,
}

impl Event {
    pub(crate) fn new(
        provider: ProviderId,
        keywords: Keywords,
        id: EventId,
        version: EventVersion,
        level: EventLevel,
        needs_stack: bool,
        metadata: &[u8],
    ) -> Result<Self> {
        let mut blob = Vec::new();
        blob.try_reserve_exact(metadata.len())
            .map_err(|source| EngineError::AllocationFailed {
                what: "event metadata",
                source,
            })?;
        blob.extend_from_slice(metadata);

        Ok(Self {
            provider,
            id,
            keywords,
            level,
            version,
            needs_stack,
            metadata: blob.into_boxed_slice(),
            enabled_mask: AtomicU64::new(0),
        })
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn keywords(&self) -> Keywords {
        self.keywords
    }

    pub fn level(&self) -> EventLevel {
        self.level
    }

    pub fn version(&self) -> EventVersion {
        self.version
    }

    pub fn needs_stack(&self) -> bool {
        self.needs_stack
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Sessions that currently want this event. Lock free.
    #[inline]
    pub fn enabled_mask(&self) -> SessionMask {
        self.enabled_mask.load(Ordering::Acquire)
    }

    /// Whether any session currently wants this event. Lock free.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled_mask() != 0
    }

    #[inline]
    pub fn is_enabled_for(&self, slot: SlotIndex) -> bool {
        self.enabled_mask() & slot.mask() != 0
    }

    pub(crate) fn set_enabled_mask(&self, mask: SessionMask) {
        self.enabled_mask.store(mask, Ordering::Release);
    }
}
