//! Persona Registry (spec.md §4.A)
//!
//! Loaded, validated and switchable at runtime. Grounded on the teacher's
//! `PersonaConfig` consolidation in `crates/config/src/agent.rs` ("single
//! source of truth"), generalized from a fixed set of trait sliders into a
//! free-form system prompt plus capability/channel metadata.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{slugify, ConfigError};

/// A named prompt profile, spec.md §3 "Persona".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub greeting: String,
    pub system_prompt: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Channel ids this persona is compatible with; empty means all.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub custom: bool,
}

const ID_PATTERN_CHARS: fn(char) -> bool = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';

impl Persona {
    /// Validate the required-field and id-pattern invariants from spec.md
    /// §3 ("all required fields non-empty; id matches `[a-z0-9-]+`").
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
        if self.system_prompt.trim().is_empty() {
            return Err(ConfigError::MissingField("systemPrompt".to_string()));
        }
        Ok(())
    }

    /// Whether this persona may be used with the given channel id.
    pub fn supports_channel(&self, channel_id: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == channel_id)
    }

    fn synthetic_default() -> Self {
        Self {
            id: "default".to_string(),
            name: "Default Assistant".to_string(),
            description: "A minimal fallback persona installed when the registry is empty."
                .to_string(),
            greeting: "Hello, how can I help you automate something today?".to_string(),
            system_prompt: "You are a careful system-administration assistant. You write \
                short, correct scripts and explain risk before running anything destructive."
                .to_string(),
            capabilities: vec!["scripting".to_string()],
            channels: Vec::new(),
            examples: Vec::new(),
            custom: false,
        }
    }
}

/// A persona file that failed validation, reported by `loadAll`
/// (spec.md §4.A: "fails soft: a bad file does not abort the load").
#[derive(Debug, Clone)]
pub struct RejectedPersona {
    pub path: String,
    pub reason: String,
}

/// Outcome of `loadAll`.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<RejectedPersona>,
}

/// Runtime-switchable registry of personas.
pub struct PersonaRegistry {
    personas: RwLock<BTreeMap<String, Persona>>,
    current: RwLock<String>,
}

impl PersonaRegistry {
    /// An empty registry; no persona is seeded on disk's behalf. `current()`
    /// synthesizes the fallback persona on the fly while the registry has
    /// nothing loaded, rather than having one sitting in `personas` that
    /// `list()`/`GET /api/personas` would otherwise report as real.
    pub fn new() -> Self {
        Self {
            personas: RwLock::new(BTreeMap::new()),
            current: RwLock::new(String::new()),
        }
    }

    /// Read every `*.json` file in `path`, validate each, and register the
    /// valid ones. A malformed file is demoted to "rejected" rather than
    /// aborting the whole load (spec.md §4.A).
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
                .and_then(|text| serde_json::from_str::<Persona>(&text).map_err(|e| e.to_string()))
            {
                Ok(persona) => {
                    if let Err(err) = persona.validate() {
                        report.rejected.push(RejectedPersona {
                            path: path_str,
                            reason: err.to_string(),
                        });
                        continue;
                    }
                    let id = persona.id.clone();
                    self.personas.write().insert(id.clone(), persona);
                    report.loaded.push(id);
                }
                Err(reason) => report.rejected.push(RejectedPersona { path: path_str, reason }),
            }
        }

        self.select_default();
        Ok(report)
    }

    /// Default selection: `vanilla`/`default` if present, else first in
    /// lexical order, else leave `current` pointing at nothing so
    /// `current()` falls back to the synthetic persona (spec.md §4.A
    /// "Default selection").
    fn select_default(&self) {
        let personas = self.personas.read();
        if personas.is_empty() {
            return;
        }
        let chosen = personas
            .get("vanilla")
            .or_else(|| personas.get("default"))
            .map(|p| p.id.clone())
            .or_else(|| personas.keys().next().cloned());

        if let Some(id) = chosen {
            drop(personas);
            *self.current.write() = id;
        }
    }

    pub fn list(&self) -> Vec<Persona> {
        self.personas.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Persona> {
        self.personas.read().get(id).cloned()
    }

    /// Never returns `None`: the synthetic persona stands in when the
    /// registry is empty (spec.md §4.A invariant).
    pub fn current(&self) -> Persona {
        let current_id = self.current.read().clone();
        self.personas
            .read()
            .get(&current_id)
            .cloned()
            .unwrap_or_else(Persona::synthetic_default)
    }

    pub fn switch(&self, id: &str) -> Result<(), ConfigError> {
        if !self.personas.read().contains_key(id) {
            return Err(ConfigError::InvalidValue {
                field: "id".to_string(),
                message: format!("persona '{id}' not found"),
            });
        }
        *self.current.write() = id.to_string();
        Ok(())
    }

    /// Validate and install a runtime-created persona (`custom = true`).
    /// `id` is derived from `name` when absent (spec.md §6
    /// `POST /api/personas/create`).
    pub fn add_custom(&self, mut persona: Persona) -> Result<Persona, ConfigError> {
        if persona.id.is_empty() {
            persona.id = slugify(&persona.name);
        }
        persona.custom = true;
        persona.validate()?;

        let id = persona.id.clone();
        self.personas.write().insert(id, persona.clone());
        Ok(persona)
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_persona(dir: &Path, filename: &str, json: &str) {
        let mut file = std::fs::File::create(dir.join(filename)).unwrap();
        file.write_all(json.as_bytes()).unwrap();
    }

    #[test]
    fn empty_registry_has_synthetic_current() {
        let registry = PersonaRegistry::new();
        assert_eq!(registry.current().id, "default");
    }

    #[test]
    fn load_all_skips_bad_files_and_keeps_good_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_persona(
            dir.path(),
            "vanilla.json",
            r#"{"id":"vanilla","name":"Vanilla","systemPrompt":"Be helpful."}"#,
        );
        write_persona(dir.path(), "broken.json", "{not json");

        let registry = PersonaRegistry::new();
        let report = registry.load_all(dir.path()).unwrap();

        assert_eq!(report.loaded, vec!["vanilla".to_string()]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(registry.current().id, "vanilla");
    }

    #[test]
    fn switch_to_unknown_id_fails_and_leaves_current_unchanged() {
        let registry = PersonaRegistry::new();
        let before = registry.current().id;
        assert!(registry.switch("does-not-exist").is_err());
        assert_eq!(registry.current().id, before);
    }

    #[test]
    fn add_custom_derives_id_from_name() {
        let registry = PersonaRegistry::new();
        let created = registry
            .add_custom(Persona {
                id: String::new(),
                name: "Ops Buddy!".to_string(),
                description: String::new(),
                greeting: String::new(),
                system_prompt: "Be terse.".to_string(),
                capabilities: vec![],
                channels: vec![],
                examples: vec![],
                custom: false,
            })
            .unwrap();

        assert_eq!(created.id, "ops-buddy");
        assert!(created.custom);
        assert!(registry.get("ops-buddy").is_some());
    }
}
