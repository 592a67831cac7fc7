//! The trace engine: owner of the configuration lock

use crate::callback::{self, CallbackQueue, CallbackSnapshot, DispatchOutcome, ShutdownFlag, ShutdownProbe};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::lock::{ConfigLock, LockId};
use crate::metrics;
use crate::provider::{Provider, ProviderState};
use crate::state::{ConfigGuard, ConfigState};
use crate::ProviderCallback;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) struct EngineShared {
    state: ConfigLock<ConfigState>,
    shutdown: Arc<dyn ShutdownProbe>,
    config: EngineConfig,
}

impl EngineShared {
    pub(crate) fn lock(&self) -> ConfigGuard<'_> {
        ConfigGuard::new(self.state.lock())
    }
}

/// Shared handle to one enable-state configuration.
///
/// Clones refer to the same configuration. Provider handles hold only a weak
/// reference, so dropping every `TraceEngine` invalidates them.
#[derive(Clone)]
pub struct TraceEngine {
    shared: Arc<EngineShared>,
}

impl TraceEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_shutdown_probe(config, Arc::new(ShutdownFlag::new()))
    }

    /// Build an engine that consults `shutdown` before every callback
    pub fn with_shutdown_probe(
        config: EngineConfig,
        shutdown: Arc<dyn ShutdownProbe>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        info!(
            "Creating trace engine with {} session slots",
            config.max_sessions
        );
        let state = ConfigState::new(config.max_sessions, config.log_filter_data);
        Ok(Self {
            shared: Arc::new(EngineShared {
                state: ConfigLock::new(state),
                shutdown,
                config,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn lock_id(&self) -> LockId {
        self.shared.state.id()
    }

    /// Acquire the configuration lock.
    ///
    /// Panics if the current thread already holds it.
    pub fn lock(&self) -> ConfigGuard<'_> {
        self.shared.lock()
    }

    /// Register provider state and return its handle. The provider starts
    /// with no sessions attached.
    pub fn create_provider(
        &self,
        name: &str,
        callback: Option<Arc<dyn ProviderCallback>>,
    ) -> Provider {
        let name: Arc<str> = Arc::from(name);
        let id = {
            let mut guard = self.lock();
            let state_name = Arc::clone(&name);
            guard.insert_provider(move |id| ProviderState::new(id, state_name, callback))
        };

        metrics::CONFIG_CHANGES
            .with_label_values(&["create_provider"])
            .inc();
        info!("Created provider '{}' ({})", name, id.get());
        Provider::new(id, name, self.lock_id(), Arc::downgrade(&self.shared))
    }

    /// Remove a provider. Its events stop reporting as enabled and the handle
    /// becomes invalid for every later operation.
    pub fn delete_provider(&self, provider: &Provider) -> Result<()> {
        let state = {
            let mut guard = self.lock();
            let state = guard.remove_provider(provider)?;
            state.disable_all_events();
            state
        };

        if state.enabled() {
            warn!(
                "Deleted provider '{}' while sessions {:#x} were still attached",
                provider.name(),
                state.sessions()
            );
        }
        metrics::CONFIG_CHANGES
            .with_label_values(&["delete_provider"])
            .inc();
        info!(
            "Deleted provider '{}' ({} events)",
            provider.name(),
            state.events().len()
        );
        Ok(())
    }

    /// Invoke the callback captured in `snapshot`, at most once.
    ///
    /// Panics if the current thread holds the configuration lock. Skipped
    /// without error while the process is shutting down.
    pub fn invoke_callback(&self, snapshot: CallbackSnapshot) -> DispatchOutcome {
        callback::invoke(
            snapshot,
            self.shared.shutdown.as_ref(),
            self.shared.config.log_filter_data,
        )
    }

    /// Dispatch queued snapshots in order; returns how many callbacks ran
    pub fn dispatch(&self, queue: CallbackQueue) -> usize {
        queue
            .into_iter()
            .map(|snapshot| self.invoke_callback(snapshot))
            .filter(|outcome| *outcome == DispatchOutcome::Invoked)
            .count()
    }
}
