//! Persona and channel registries, and the typed configuration surface
//!
//! Mirrors the teacher's `voice-agent-config` crate: a small `ConfigError`
//! enum, `serde`-derived records with defaulted fields, and `From<config::
//! ConfigError>` at the boundary with the `config` crate.

pub mod channel;
pub mod persona;
pub mod settings;

pub use channel::{Channel, ChannelConstraints, ChannelRegistry, MessageCheck};
pub use persona::{Persona, PersonaRegistry, RejectedPersona};
pub use settings::{
    LlmSettings, LoggingSettings, MemorySettings, PathsSettings, ProviderConfig,
    SchedulerSettings, ServerSettings, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for shellwright_core::Error {
    fn from(err: ConfigError) -> Self {
        shellwright_core::Error::validation(err.to_string())
    }
}

/// Derive a url/filename-safe id from a display name, spec.md §6
/// `POST /api/personas/create`: "id auto-derived from name when absent
/// (lowercase, non-alnum -> '-', collapse runs)".
pub fn slugify(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_dash = false;

    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }

    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_runs_of_punctuation() {
        assert_eq!(slugify("Backup & Restore!!"), "backup-restore");
        assert_eq!(slugify("  Leading/Trailing  "), "leading-trailing");
        assert_eq!(slugify("ALLCAPS"), "allcaps");
    }
}
