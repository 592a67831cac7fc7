//! Session enable-state engine
//!
//! Decides, for every registered event, which of the concurrently active
//! trace sessions should receive it, and keeps that decision current as
//! sessions attach, detach, or change their filters.
//!
//! All mutation goes through one configuration lock ([`TraceEngine::lock`]).
//! Instrumented code reads [`Event::enabled_mask`] without it. Provider
//! callbacks are never invoked under the lock: configuration operations return
//! a [`CallbackSnapshot`] that is dispatched after the guard is dropped.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracemux_engine::{EngineConfig, Session, SessionId, SessionProvider, TraceEngine};
//! use tracemux_shared::EventLevel;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = TraceEngine::new(EngineConfig::default())?;
//! let provider = engine.create_provider("Demo", None);
//! let event = provider.add_event(0x1, 1, 0, EventLevel::Informational, false, &[])?;
//!
//! let snapshot = {
//!     let mut guard = engine.lock();
//!     let slot = guard.sessions_mut().reserve_slot()?;
//!     let filter = SessionProvider::new("Demo", 0x1, EventLevel::Verbose);
//!     guard.sessions_mut().occupy(slot, Session::new(SessionId(1), vec![filter]));
//!     provider.attach_session(&mut guard, slot.mask(), 0x1, EventLevel::Verbose, None)?
//! };
//! engine.invoke_callback(snapshot);
//!
//! assert!(event.is_enabled());
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod lock;
mod mask;
pub mod metrics;
pub mod provider;
pub mod session;
pub mod state;

pub use callback::{
    CallbackQueue, CallbackSnapshot, DispatchOutcome, ProviderCallback, ProviderUpdate,
    ShutdownFlag, ShutdownProbe,
};
pub use config::EngineConfig;
pub use engine::TraceEngine;
pub use error::EngineError;
pub use event::Event;
pub use provider::{Provider, ProviderId, ProviderStatus};
pub use session::{Session, SessionId, SessionProvider, SessionTable};
pub use state::ConfigGuard;
