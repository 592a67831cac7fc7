//! Provider callback dispatch
//!
//! A configuration change produces a [`CallbackSnapshot`] while the lock is
//! held. The snapshot is dispatched after the lock is released, because the
//! callback is foreign code that may call back into the engine (for example
//! to register more events) and would otherwise deadlock.

use crate::lock::LockId;
use crate::metrics;
use crate::provider::ProviderState;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracemux_shared::{tokenize, EventLevel, FilterDescriptor, Keywords};
use tracing::{debug, warn};

/// Arguments delivered to a provider callback
#[derive(Debug, Clone, Copy)]
pub struct ProviderUpdate<'a> {
    /// Any session attached to the provider. This is coarser than an event's
    /// enable mask: it ignores keyword and level filters.
    pub enabled: bool,
    pub level: EventLevel,
    pub keywords: Keywords,
    /// Always 0: sessions never request all-keywords matching
    pub match_all_keywords: Keywords,
    pub filter: Option<&'a FilterDescriptor>,
}

/// Capability implemented by the registration layer to learn about
/// provider configuration changes
pub trait ProviderCallback: Send + Sync {
    fn on_update(&self, update: &ProviderUpdate<'_>);
}

impl<F> ProviderCallback for F
where
    F: Fn(&ProviderUpdate<'_>) + Send + Sync,
{
    fn on_update(&self, update: &ProviderUpdate<'_>) {
        self(update)
    }
}

/// Boundary to process teardown detection
pub trait ShutdownProbe: Send + Sync {
    fn is_shutting_down(&self) -> bool;
}

/// Default [`ShutdownProbe`]: a flag flipped once by the host
#[derive(Debug, Default)]
pub struct ShutdownFlag(AtomicBool);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ShutdownProbe for ShutdownFlag {
    fn is_shutting_down(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Provider state captured under the lock for one configuration change
#[must_use = "a callback snapshot must be dispatched once the configuration lock is released"]
pub struct CallbackSnapshot {
    lock_id: LockId,
    provider_name: Arc<str>,
    filter_data: Option<String>,
    callback: Option<Arc<dyn ProviderCallback>>,
    keywords: Keywords,
    level: EventLevel,
    enabled: bool,
}

impl CallbackSnapshot {
    pub(crate) fn prepare(
        lock_id: LockId,
        provider: &ProviderState,
        filter_data: Option<&str>,
    ) -> Self {
        lock_id.requires_held();
        Self {
            lock_id,
            provider_name: Arc::from(provider.name()),
            filter_data: filter_data.map(str::to_owned),
            callback: provider.callback().cloned(),
            keywords: provider.keywords(),
            level: provider.level(),
            enabled: provider.enabled(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn filter_data(&self) -> Option<&str> {
        self.filter_data.as_deref()
    }

    pub fn keywords(&self) -> Keywords {
        self.keywords
    }

    pub fn level(&self) -> EventLevel {
        self.level
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for CallbackSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSnapshot")
            .field("provider_name", &self.provider_name)
            .field("filter_data", &self.filter_data)
            .field("has_callback", &self.callback.is_some())
            .field("keywords", &format_args!("{:#x}", self.keywords))
            .field("level", &self.level)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// What happened to a dispatched snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Invoked,
    NoCallback,
    ShuttingDown,
    FilterAllocationFailed,
}

impl DispatchOutcome {
    fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Invoked => "invoked",
            DispatchOutcome::NoCallback => "no_callback",
            DispatchOutcome::ShuttingDown => "shutting_down",
            DispatchOutcome::FilterAllocationFailed => "filter_allocation_failed",
        }
    }
}

/// Snapshots collected under the lock, dispatched in order after release
#[derive(Debug, Default)]
#[must_use = "queued callbacks must be dispatched once the configuration lock is released"]
pub struct CallbackQueue {
    items: VecDeque<CallbackSnapshot>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: CallbackSnapshot) {
        self.items.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for CallbackQueue {
    type Item = CallbackSnapshot;
    type IntoIter = std::collections::vec_deque::IntoIter<CallbackSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Invoke the snapshot's callback at most once.
///
/// Panics if the configuration lock the snapshot came from is held by the
/// current thread.
pub(crate) fn invoke(
    snapshot: CallbackSnapshot,
    shutdown: &dyn ShutdownProbe,
    log_filter_data: bool,
) -> DispatchOutcome {
    snapshot.lock_id.requires_not_held();

    let outcome = deliver(&snapshot, shutdown, log_filter_data);
    metrics::CALLBACKS
        .with_label_values(&[outcome.label()])
        .inc();
    outcome
}

fn deliver(
    snapshot: &CallbackSnapshot,
    shutdown: &dyn ShutdownProbe,
    log_filter_data: bool,
) -> DispatchOutcome {
    if shutdown.is_shutting_down() {
        debug!(
            "Skipping callback for provider '{}': process is shutting down",
            snapshot.provider_name
        );
        return DispatchOutcome::ShuttingDown;
    }

    let Some(callback) = snapshot.callback.as_ref() else {
        return DispatchOutcome::NoCallback;
    };

    // Scratch buffer lives until the end of this function on every path
    let filter = match snapshot.filter_data.as_deref().map(tokenize).transpose() {
        Ok(filter) => filter.flatten(),
        Err(e) => {
            warn!(
                "Skipping callback for provider '{}': {}",
                snapshot.provider_name, e
            );
            return DispatchOutcome::FilterAllocationFailed;
        }
    };

    if log_filter_data {
        if let Some(desc) = &filter {
            debug!(
                "Provider '{}' callback filter: {:?} ({} bytes)",
                snapshot.provider_name,
                desc.pairs().collect::<Vec<_>>(),
                desc.len()
            );
        }
    }

    callback.on_update(&ProviderUpdate {
        enabled: snapshot.enabled,
        level: snapshot.level,
        keywords: snapshot.keywords,
        match_all_keywords: 0,
        filter: filter.as_ref(),
    });
    DispatchOutcome::Invoked
}
