//! Shared types and utilities for tracemux
//!
//! This crate contains the vocabulary used across the enable-state engine and
//! its collaborators: event levels, keyword and session masks, and the filter
//! data parser that turns `key=value;...` strings into the flat token buffer
//! handed to provider callbacks.

pub mod filter;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use filter::{tokenize, FilterDescriptor, FilterError};
pub use types::{events::*, session::*};
