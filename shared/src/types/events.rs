//! Event identity type definitions
//!
//! These types describe how an instrumentation point classifies itself
//! (keywords and verbosity level) and how sessions filter on that
//! classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword bitset categorizing an event or a session filter.
///
/// On the event side `0` means "unconditional": the event matches every
/// session keyword filter.
pub type Keywords = u64;

/// Event identifier, unique within a provider by convention only
pub type EventId = u32;

/// Event schema version
pub type EventVersion = u32;

/// Ordinal verbosity level.
///
/// Higher values are more verbose. `LogAlways` is the minimum ordinal and
/// always passes the level test, whatever the session asked for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventLevel {
    #[default]
    LogAlways = 0,
    Critical = 1,
    Error = 2,
    Warning = 3,
    Informational = 4,
    Verbose = 5,
}

impl EventLevel {
    /// All levels in ascending verbosity order
    pub const ALL: [EventLevel; 6] = [
        EventLevel::LogAlways,
        EventLevel::Critical,
        EventLevel::Error,
        EventLevel::Warning,
        EventLevel::Informational,
        EventLevel::Verbose,
    ];

    /// Build a level from its ordinal
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Whether a session configured at `self` accepts an event declared at
    /// `event_level`.
    pub fn accepts(self, event_level: EventLevel) -> bool {
        event_level == EventLevel::LogAlways || self >= event_level
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventLevel::LogAlways => "log_always",
            EventLevel::Critical => "critical",
            EventLevel::Error => "error",
            EventLevel::Warning => "warning",
            EventLevel::Informational => "informational",
            EventLevel::Verbose => "verbose",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for EventLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ordinal) = s.parse::<u8>() {
            return EventLevel::from_u8(ordinal)
                .ok_or_else(|| anyhow::anyhow!("Invalid event level ordinal: {}", ordinal));
        }

        match s.to_lowercase().replace('-', "_").as_str() {
            "log_always" | "logalways" | "always" => Ok(EventLevel::LogAlways),
            "critical" => Ok(EventLevel::Critical),
            "error" => Ok(EventLevel::Error),
            "warning" | "warn" => Ok(EventLevel::Warning),
            "informational" | "info" => Ok(EventLevel::Informational),
            "verbose" => Ok(EventLevel::Verbose),
            _ => anyhow::bail!("Invalid event level: {}", s),
        }
    }
}

/// Whether a session keyword filter accepts an event's keywords
pub fn keywords_match(session_keywords: Keywords, event_keywords: Keywords) -> bool {
    event_keywords == 0 || (session_keywords & event_keywords) != 0
}
