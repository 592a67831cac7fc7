//! Core vocabulary types

pub mod events;
pub mod session;
