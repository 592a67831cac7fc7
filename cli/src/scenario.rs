//! Scenario files driving `tracemux simulate`
//!
//! A scenario declares the engine configuration, the providers and their
//! events, the sessions a tracing client would start, and an ordered list of
//! steps. Keyword masks may be written as integers or as strings in hex,
//! binary or decimal form.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;
use tracemux_engine::EngineConfig;
use tracemux_shared::utils::parse_keywords;
use tracemux_shared::{EventId, EventLevel, EventVersion, Keywords};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub providers: Vec<ProviderSpec>,

    #[serde(default)]
    pub sessions: Vec<SessionSpec>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSpec {
    pub name: String,

    /// Attach a recording callback to this provider
    #[serde(default = "default_true")]
    pub callback: bool,

    #[serde(default)]
    pub events: Vec<EventSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventSpec {
    pub id: EventId,

    #[serde(default, deserialize_with = "de_keywords")]
    pub keywords: Keywords,

    #[serde(default)]
    pub level: EventLevel,

    #[serde(default)]
    pub version: EventVersion,

    #[serde(default)]
    pub needs_stack: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSpec {
    pub name: String,
    pub providers: Vec<SessionProviderSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionProviderSpec {
    pub name: String,

    #[serde(default, deserialize_with = "de_keywords")]
    pub keywords: Keywords,

    #[serde(default)]
    pub level: EventLevel,

    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Start a declared session
    Attach { session: String },

    /// Stop a running session
    Detach { session: String },

    /// Edit a running session's filter for one provider in place
    Retune {
        session: String,
        provider: String,
        #[serde(default, deserialize_with = "de_keywords")]
        keywords: Keywords,
        #[serde(default)]
        level: EventLevel,
        filter: Option<String>,
    },

    /// Register an event on a provider after startup
    Register {
        provider: String,
        id: EventId,
        #[serde(default, deserialize_with = "de_keywords")]
        keywords: Keywords,
        #[serde(default)]
        level: EventLevel,
        #[serde(default)]
        version: EventVersion,
        #[serde(default)]
        needs_stack: bool,
    },
}

impl Step {
    /// Short human-readable description for reports
    pub fn describe(&self) -> String {
        match self {
            Step::Attach { session } => format!("attach session '{}'", session),
            Step::Detach { session } => format!("detach session '{}'", session),
            Step::Retune {
                session,
                provider,
                keywords,
                level,
                ..
            } => format!(
                "retune '{}' on '{}' to keywords {:#x}, level {}",
                session, provider, keywords, level
            ),
            Step::Register { provider, id, .. } => {
                format!("register event {} on '{}'", id, provider)
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn de_keywords<'de, D>(deserializer: D) -> std::result::Result<Keywords, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_keywords(&s).map_err(serde::de::Error::custom),
    }
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(text).context("Failed to parse scenario TOML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check cross references between steps, sessions and providers
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        let mut providers = HashSet::new();
        for provider in &self.providers {
            if !providers.insert(provider.name.as_str()) {
                anyhow::bail!("Duplicate provider '{}'", provider.name);
            }
        }

        let mut sessions = HashSet::new();
        for session in &self.sessions {
            if !sessions.insert(session.name.as_str()) {
                anyhow::bail!("Duplicate session '{}'", session.name);
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            let (session, provider) = match step {
                Step::Attach { session } | Step::Detach { session } => (Some(session), None),
                Step::Retune {
                    session, provider, ..
                } => (Some(session), Some(provider)),
                Step::Register { provider, .. } => (None, Some(provider)),
            };

            if let Some(session) = session {
                if !sessions.contains(session.as_str()) {
                    anyhow::bail!("Step {} refers to unknown session '{}'", i + 1, session);
                }
            }
            if let Some(provider) = provider {
                if !providers.contains(provider.as_str()) {
                    anyhow::bail!("Step {} refers to unknown provider '{}'", i + 1, provider);
                }
            }
        }

        Ok(())
    }

    pub fn session(&self, name: &str) -> Option<&SessionSpec> {
        self.sessions.iter().find(|s| s.name == name)
    }
}
