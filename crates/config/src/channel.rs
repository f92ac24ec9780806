//! Channel Registry (spec.md §4.B)
//!
//! Symmetric in shape to the Persona Registry, plus `capabilities(id)` and
//! `validateMessage(id, text)`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::persona::{LoadReport, RejectedPersona};
use crate::ConfigError;

/// A named output-format profile, spec.md §3 "Channel".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub artifact_types: BTreeSet<String>,
    #[serde(default)]
    pub constraints: ChannelConstraints,
    #[serde(default)]
    pub custom: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConstraints {
    pub max_message_length: Option<usize>,
}

const ID_PATTERN_CHARS: fn(char) -> bool = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';

impl Channel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() || !self.id.chars().all(ID_PATTERN_CHARS) {
            return Err(ConfigError::InvalidValue {
                field: "id".to_string(),
                message: format!("'{}' must match [a-z0-9-]+", self.id),
            });
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".to_string()));
        }
        Ok(())
    }

    fn web_default() -> Self {
        Self {
            id: "web".to_string(),
            name: "Web UI".to_string(),
            description: "The bundled static web UI.".to_string(),
            capabilities: ["rich_text", "interactive"].into_iter().map(String::from).collect(),
            artifact_types: BTreeSet::new(),
            constraints: ChannelConstraints::default(),
            custom: false,
        }
    }
}

/// Outcome of validating a message against a channel's constraints,
/// spec.md §4.B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCheck {
    Ok,
    TooLong { limit: usize },
}

pub struct ChannelRegistry {
    channels: RwLock<BTreeMap<String, Channel>>,
    current: RwLock<String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        let web = Channel::web_default();
        let mut channels = BTreeMap::new();
        let current = web.id.clone();
        channels.insert(web.id.clone(), web);

        Self {
            channels: RwLock::new(channels),
            current: RwLock::new(current),
        }
    }

    pub fn load_all(&self, dir: &Path) -> Result<LoadReport, ConfigError> {
        let mut report = LoadReport::default();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => return Err(ConfigError::FileNotFound(format!("{}: {err}", dir.display()))),
        };

        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        files.sort();

        for path in files {
            let path_str = path.display().to_string();
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<Channel>(&text).map_err(|e| e.to_string()))
            {
                Ok(channel) => {
                    if let Err(err) = channel.validate() {
                        report.rejected.push(RejectedPersona {
                            path: path_str,
                            reason: err.to_string(),
                        });
                        continue;
                    }
                    let id = channel.id.clone();
                    self.channels.write().insert(id.clone(), channel);
                    report.loaded.push(id);
                }
                Err(reason) => report.rejected.push(RejectedPersona { path: path_str, reason }),
            }
        }

        if let Some(first) = self.channels.read().keys().next().cloned() {
            *self.current.write() = first;
        }
        Ok(report)
    }

    pub fn list(&self) -> Vec<Channel> {
        self.channels.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Channel> {
        self.channels.read().get(id).cloned()
    }

    pub fn current(&self) -> Channel {
        let current_id = self.current.read().clone();
        self.channels
            .read()
            .get(&current_id)
            .cloned()
            .unwrap_or_else(Channel::web_default)
    }

    pub fn switch(&self, id: &str) -> Result<(), ConfigError> {
        if !self.channels.read().contains_key(id) {
            return Err(ConfigError::InvalidValue {
                field: "id".to_string(),
                message: format!("channel '{id}' not found"),
            });
        }
        *self.current.write() = id.to_string();
        Ok(())
    }

    pub fn add_custom(&self, mut channel: Channel) -> Result<Channel, ConfigError> {
        if channel.id.is_empty() {
            channel.id = crate::slugify(&channel.name);
        }
        channel.custom = true;
        channel.validate()?;

        let id = channel.id.clone();
        self.channels.write().insert(id, channel.clone());
        Ok(channel)
    }

    pub fn capabilities(&self, id: &str) -> Option<BTreeSet<String>> {
        self.channels.read().get(id).map(|c| c.capabilities.clone())
    }

    /// `ok` or `tooLong(limit)` when the channel declares a
    /// `maxMessageLength` and `text` exceeds it (spec.md §4.B).
    pub fn validate_message(&self, id: &str, text: &str) -> Option<MessageCheck> {
        let channel = self.channels.read().get(id).cloned()?;
        match channel.constraints.max_message_length {
            Some(limit) if text.chars().count() > limit => Some(MessageCheck::TooLong { limit }),
            _ => Some(MessageCheck::Ok),
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_channel_is_present_by_default() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.current().id, "web");
        assert!(registry.get("web").is_some());
    }

    #[test]
    fn validate_message_flags_overlong_text() {
        let registry = ChannelRegistry::new();
        registry
            .add_custom(Channel {
                id: "sms".to_string(),
                name: "SMS".to_string(),
                description: String::new(),
                capabilities: BTreeSet::new(),
                artifact_types: BTreeSet::new(),
                constraints: ChannelConstraints {
                    max_message_length: Some(10),
                },
                custom: false,
            })
            .unwrap();

        assert_eq!(
            registry.validate_message("sms", "short"),
            Some(MessageCheck::Ok)
        );
        assert_eq!(
            registry.validate_message("sms", "this message is definitely too long"),
            Some(MessageCheck::TooLong { limit: 10 })
        );
    }
}
