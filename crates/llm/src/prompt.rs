//! Prompt Assembler (spec.md §4.D)
//!
//! Composes a system+context+user prompt for a task kind given persona,
//! channel and conversation history. Grounded on the teacher's
//! `PromptBuilder` in `crates/llm/src/prompt.rs` (fluent builder appending
//! system/context/history/user turns) — generalized from a single
//! gold-loan system prompt into one driven by an arbitrary [`Persona`] and
//! specialized per [`TaskKind`].

use serde::{Deserialize, Serialize};

use shellwright_config::{Channel, Persona};
use shellwright_core::Platform;
use shellwright_memory::Message;

/// Which of the four prompt shapes spec.md §4.D enumerates to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Chat,
    Generate,
    Improve,
    Validate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptParams {
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    pub timeout_ms: u64,
}

/// The assembled prompt package handed to a provider, spec.md §4.D.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptEnvelope {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub params: PromptParams,
    /// Provider to try first, spec.md §4.E selection step 1.
    #[serde(default)]
    pub preferred_provider: Option<String>,
}

/// A single finding in a [`ValidationReport`], spec.md §4.D "validate".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warn,
    Error,
}

/// Structured verdict a `validate` task kind requests, spec.md §4.D.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub score: u8,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

pub struct PromptAssembler {
    default_params: PromptParams,
}

impl PromptAssembler {
    pub fn new(default_params: PromptParams) -> Self {
        Self { default_params }
    }

    /// Assemble a [`PromptEnvelope`] for `kind`, spec.md §4.D.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        &self,
        kind: TaskKind,
        persona: &Persona,
        channel: &Channel,
        platform: Option<Platform>,
        history: &[Message],
        context_window: usize,
        user_turn: &str,
        prior_script: Option<&str>,
        feedback: Option<&str>,
    ) -> PromptEnvelope {
        let mut system = persona.system_prompt.clone();
        system.push_str("\n\n");
        system.push_str(&self.channel_directive(channel));

        match kind {
            TaskKind::Generate => {
                if let Some(platform) = platform {
                    system.push_str("\n\n");
                    system.push_str(&Self::platform_best_practices(platform));
                }
            }
            TaskKind::Improve => {
                system.push_str(
                    "\n\nYou are revising an existing script. Return a full replacement \
                     script, not a diff.",
                );
            }
            TaskKind::Validate => {
                system.push_str(
                    "\n\nRespond with a structured verdict: a score from 0 to 100, a list \
                     of issues each with a severity of info, warn or error, and a list of \
                     recommendations.",
                );
            }
            TaskKind::Chat => {}
        }

        let mut messages = Vec::new();

        let windowed = if history.len() > context_window {
            &history[history.len() - context_window..]
        } else {
            history
        };
        messages.extend(windowed.iter().cloned());

        let mut user_content = String::new();
        if let Some(script) = prior_script {
            user_content.push_str("## Current script\n```\n");
            user_content.push_str(script);
            user_content.push_str("\n```\n\n");
        }
        if let Some(feedback) = feedback {
            user_content.push_str("## Feedback\n");
            user_content.push_str(feedback);
            user_content.push_str("\n\n");
        }
        user_content.push_str(user_turn);

        messages.push(Message::user(user_content));

        PromptEnvelope {
            system_prompt: system,
            messages,
            params: self.default_params.clone(),
            preferred_provider: None,
        }
    }

    fn channel_directive(&self, channel: &Channel) -> String {
        if channel.id == "web" {
            return "Output must render cleanly as plain text in a web chat panel.".to_string();
        }

        let caps = channel
            .capabilities
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if caps.is_empty() {
            format!("Output must fit the capabilities of the '{}' channel.", channel.name)
        } else {
            format!(
                "Output must fit the '{}' channel's capabilities: {}.",
                channel.name, caps
            )
        }
    }

    /// Required constructs per platform, spec.md §4.D "generate": parameter
    /// parsing, error trap, logging, exit-code discipline.
    fn platform_best_practices(platform: Platform) -> String {
        match platform {
            Platform::Powershell => {
                "Write idiomatic PowerShell:\n\
                 - declare a `param(...)` block for inputs\n\
                 - wrap the body in `try { ... } catch { ... }`\n\
                 - write progress with `Write-Host` or `Write-Verbose`\n\
                 - set `$LASTEXITCODE` / call `exit` with a meaningful code"
                    .to_string()
            }
            Platform::Applescript => {
                "Write idiomatic AppleScript:\n\
                 - accept parameters via top-level `on run argv`\n\
                 - wrap risky calls in `try ... on error ... end try`\n\
                 - log progress with `log`\n\
                 - signal failure by raising an error with a clear message"
                    .to_string()
            }
            Platform::Bash => {
                "Write idiomatic Bash:\n\
                 - start with `#!/usr/bin/env bash` and `set -euo pipefail`\n\
                 - parse flags with `getopts` or positional args with usage help\n\
                 - trap errors (`trap ... ERR`) and log to stderr\n\
                 - exit with a non-zero code on failure"
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellwright_config::{Channel, ChannelConstraints, Persona};
    use std::collections::BTreeSet;

    fn persona() -> Persona {
        Persona {
            id: "vanilla".to_string(),
            name: "Vanilla".to_string(),
            description: String::new(),
            greeting: String::new(),
            system_prompt: "You are a careful automation assistant.".to_string(),
            capabilities: vec![],
            channels: vec![],
            examples: vec![],
            custom: false,
        }
    }

    fn channel() -> Channel {
        Channel {
            id: "web".to_string(),
            name: "Web".to_string(),
            description: String::new(),
            capabilities: BTreeSet::new(),
            artifact_types: BTreeSet::new(),
            constraints: ChannelConstraints::default(),
            custom: false,
        }
    }

    fn assembler() -> PromptAssembler {
        PromptAssembler::new(PromptParams {
            temperature: 0.3,
            max_tokens: 512,
            stop: None,
            timeout_ms: 10_000,
        })
    }

    #[test]
    fn generate_prompt_includes_platform_best_practices() {
        let envelope = assembler().assemble(
            TaskKind::Generate,
            &persona(),
            &channel(),
            Some(Platform::Bash),
            &[],
            20,
            "back up my documents folder",
            None,
            None,
        );

        assert!(envelope.system_prompt.contains("set -euo pipefail"));
        assert_eq!(envelope.messages.len(), 1);
    }

    #[test]
    fn improve_prompt_carries_prior_script_and_feedback_in_user_turn() {
        let envelope = assembler().assemble(
            TaskKind::Improve,
            &persona(),
            &channel(),
            Some(Platform::Bash),
            &[],
            20,
            "improve it",
            Some("echo hi"),
            Some("add error handling"),
        );

        let user = &envelope.messages[0];
        assert!(user.content.contains("echo hi"));
        assert!(user.content.contains("add error handling"));
    }

    #[test]
    fn history_is_windowed_to_context_window_and_user_turn_is_last() {
        let history: Vec<Message> = (0..5).map(|i| Message::user(format!("turn-{i}"))).collect();

        let envelope = assembler().assemble(
            TaskKind::Chat,
            &persona(),
            &channel(),
            None,
            &history,
            2,
            "final question",
            None,
            None,
        );

        assert_eq!(envelope.messages.len(), 3);
        assert_eq!(envelope.messages[0].content, "turn-3");
        assert_eq!(envelope.messages[1].content, "turn-4");
        assert_eq!(envelope.messages.last().unwrap().content, "final question");
    }
}
