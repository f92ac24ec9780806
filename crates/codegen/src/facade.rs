//! Code Generator Facade (spec.md §4.G).
//!
//! Orchestrates prompt assembly (4.D) and the provider gateway (4.E),
//! falling back to the template generator (4.F) on failure, then
//! attaches a dry-run safety report (4.H). Grounded on the teacher's
//! `Agent::respond` orchestration in `crates/agent/src/agent.rs`
//! (assemble context, call the backend, post-process the reply).

use chrono::Utc;
use serde::{Deserialize, Serialize};

use shellwright_config::{Channel, Persona};
use shellwright_core::Platform;
use shellwright_exec::{Decision, PolicyReport, SafetyValidator};
use shellwright_llm::{
    IssueSeverity as LlmIssueSeverity, PromptAssembler, PromptEnvelope, TaskKind, ValidationIssue,
    ValidationReport,
};
use shellwright_memory::Message;

use crate::template::TemplateGenerator;

/// Where a [`Script`]'s content ultimately came from, spec.md §8
/// "returned script ... `source` field is `template`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptSource {
    Llm,
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub platform: Platform,
    pub filename: String,
    pub content: String,
    pub documentation: String,
    pub safety_hint: String,
    #[serde(default)]
    pub estimated_runtime: Option<String>,
    pub source: ScriptSource,
    pub safety_report: PolicyReport,
}

/// Generates, revises and validates scripts end to end, spec.md §4.G.
pub struct CodeGeneratorFacade {
    assembler: PromptAssembler,
    templates: TemplateGenerator,
    validator: SafetyValidator,
}

impl CodeGeneratorFacade {
    pub fn new(assembler: PromptAssembler, templates: TemplateGenerator) -> Self {
        Self {
            assembler,
            templates,
            validator: SafetyValidator::new(),
        }
    }

    /// `generate(description, platform, persona?, channel?, history?) →
    /// Script`, spec.md §4.G.
    pub async fn generate(
        &self,
        description: &str,
        platform: Platform,
        persona: &Persona,
        channel: &Channel,
        history: &[Message],
        gateway: &dyn ProviderGatewayLike,
        context_window: usize,
    ) -> Script {
        let envelope = self.assembler.assemble(
            TaskKind::Generate,
            persona,
            channel,
            Some(platform),
            history,
            context_window,
            description,
            None,
            None,
        );

        match gateway.generate(&envelope).await {
            Some(completion) => match extract_fenced_block(&completion, platform) {
                Some(code) if !code.trim().is_empty() => self.finish_llm_script(description, platform, code),
                _ => self.finish_template_script(description, platform),
            },
            None => self.finish_template_script(description, platform),
        }
    }

    /// `improve(script, feedback, platform) → Script`, spec.md §4.G.
    /// There is no template fallback for improvement: if every provider
    /// fails, the original script is returned unchanged.
    pub async fn improve(
        &self,
        script: &str,
        feedback: &str,
        platform: Platform,
        persona: &Persona,
        channel: &Channel,
        gateway: &dyn ProviderGatewayLike,
    ) -> Script {
        let envelope = self.assembler.assemble(
            TaskKind::Improve,
            persona,
            channel,
            Some(platform),
            &[],
            0,
            "revise the script per the feedback above",
            Some(script),
            Some(feedback),
        );

        match gateway.generate(&envelope).await {
            Some(completion) => match extract_fenced_block(&completion, platform) {
                Some(code) if !code.trim().is_empty() => {
                    self.finish_llm_script(feedback, platform, code)
                }
                _ => self.finish_verbatim_script(script, platform),
            },
            None => self.finish_verbatim_script(script, platform),
        }
    }

    /// `validate(script, platform) → ValidationReport`, spec.md §4.G.
    /// If the LLM is unavailable, returns a syntactic-only report from
    /// the safety validator plus platform lint heuristics; there is no
    /// template fallback for validation.
    pub async fn validate(
        &self,
        script: &str,
        platform: Platform,
        persona: &Persona,
        channel: &Channel,
        gateway: &dyn ProviderGatewayLike,
    ) -> ValidationReport {
        let envelope = self.assembler.assemble(
            TaskKind::Validate,
            persona,
            channel,
            Some(platform),
            &[],
            0,
            script,
            None,
            None,
        );

        match gateway.generate(&envelope).await {
            Some(completion) => parse_validation_report(&completion).unwrap_or_else(|| self.lint_only(script, platform)),
            None => self.lint_only(script, platform),
        }
    }

    fn finish_llm_script(&self, description: &str, platform: Platform, content: String) -> Script {
        let normalized = normalize_script(&content, platform);
        let safety_report = self.validator.evaluate(&normalized, platform, shellwright_core::Policy::Standard);

        Script {
            platform,
            filename: format!("generated.{}", platform.file_extension()),
            content: normalized,
            documentation: format!("Generated from: {description}"),
            safety_hint: "Review before running; generated by an LLM provider.".to_string(),
            estimated_runtime: None,
            source: ScriptSource::Llm,
            safety_report,
        }
    }

    /// Real template-catalog generation, spec.md §4.F — used only by
    /// `generate`'s offline fallback.
    fn finish_template_script(&self, description: &str, platform: Platform) -> Script {
        let output = self.templates.generate(description, platform);
        let normalized = normalize_script(&output.content, platform);
        let safety_report = self.validator.evaluate(&normalized, platform, shellwright_core::Policy::Standard);

        Script {
            platform,
            filename: output.filename,
            content: normalized,
            documentation: output.documentation,
            safety_hint: output.safety_hint,
            estimated_runtime: output.estimated_runtime,
            source: ScriptSource::Template,
            safety_report,
        }
    }

    /// The original script, unchanged apart from normalization — used
    /// by `improve`'s no-LLM no-op fallback.
    fn finish_verbatim_script(&self, script: &str, platform: Platform) -> Script {
        let normalized = normalize_script(script, platform);
        let safety_report = self.validator.evaluate(&normalized, platform, shellwright_core::Policy::Standard);

        Script {
            platform,
            filename: format!("revised.{}", platform.file_extension()),
            content: normalized,
            documentation: "No provider was available; the script was returned unchanged.".to_string(),
            safety_hint: "Unreviewed: feedback was not applied.".to_string(),
            estimated_runtime: None,
            source: ScriptSource::Template,
            safety_report,
        }
    }

    fn lint_only(&self, script: &str, platform: Platform) -> ValidationReport {
        let safety = self.validator.evaluate(script, platform, shellwright_core::Policy::Standard);
        let mut issues: Vec<ValidationIssue> = safety
            .issues
            .iter()
            .map(|issue| ValidationIssue {
                severity: match issue.severity {
                    shellwright_exec::IssueSeverity::Warn => LlmIssueSeverity::Warn,
                    shellwright_exec::IssueSeverity::Error => LlmIssueSeverity::Error,
                },
                message: issue.message.clone(),
                line: None,
            })
            .collect();

        let mut recommendations = Vec::new();
        if !has_error_trap(script, platform) {
            issues.push(ValidationIssue {
                severity: LlmIssueSeverity::Warn,
                message: "no error trap detected".to_string(),
                line: None,
            });
            recommendations.push("add error handling around the script body".to_string());
        }

        ValidationReport {
            score: safety.score,
            issues,
            recommendations,
        }
    }
}

fn has_error_trap(script: &str, platform: Platform) -> bool {
    match platform {
        Platform::Powershell => script.contains("try") && script.contains("catch"),
        Platform::Applescript => script.contains("try") && script.contains("on error"),
        Platform::Bash => script.contains("set -e") || script.contains("trap"),
    }
}

/// Narrow interface the facade needs from a provider gateway; kept
/// separate from [`shellwright_llm::ProviderGateway`] so the facade can
/// be exercised with a stub in tests.
#[async_trait::async_trait]
pub trait ProviderGatewayLike: Send + Sync {
    async fn generate(&self, prompt: &PromptEnvelope) -> Option<shellwright_llm::Completion>;
}

#[async_trait::async_trait]
impl ProviderGatewayLike for shellwright_llm::ProviderGateway {
    async fn generate(&self, prompt: &PromptEnvelope) -> Option<shellwright_llm::Completion> {
        shellwright_llm::ProviderGateway::generate(self, prompt).await.ok()
    }
}

/// Extract the first fenced code block matching `platform`'s fence tag,
/// spec.md §4.G step 2.
fn extract_fenced_block(completion: &shellwright_llm::Completion, platform: Platform) -> Option<String> {
    let tag = platform.fence_tag();
    let fence = format!("```{tag}");
    let start = completion.text.find(&fence)? + fence.len();
    let rest = &completion.text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn parse_validation_report(completion: &shellwright_llm::Completion) -> Option<ValidationReport> {
    serde_json::from_str(completion.text.trim()).ok()
}

/// Normalize line endings, strip trailing whitespace, ensure a trailing
/// newline, prepend a generated-by header, spec.md §4.G step 4.
fn normalize_script(content: &str, platform: Platform) -> String {
    let unified = content.replace("\r\n", "\n");
    let trimmed_lines: Vec<&str> = unified.lines().map(|line| line.trim_end()).collect();
    let mut body = trimmed_lines.join("\n");
    if !body.ends_with('\n') {
        body.push('\n');
    }

    let header = header_comment(platform);
    format!("{header}\n{body}")
}

fn header_comment(platform: Platform) -> String {
    let generated_at = Utc::now().to_rfc3339();
    match platform {
        Platform::Powershell => format!("# Generated by shellwright at {generated_at}"),
        Platform::Applescript => format!("-- Generated by shellwright at {generated_at}"),
        Platform::Bash => format!("# Generated by shellwright at {generated_at}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellwright_config::{Channel, ChannelConstraints, Persona};
    use shellwright_llm::{PromptParams, TokenUsage};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubGateway {
        fail: AtomicBool,
        reply: String,
    }

    #[async_trait::async_trait]
    impl ProviderGatewayLike for StubGateway {
        async fn generate(&self, _prompt: &PromptEnvelope) -> Option<shellwright_llm::Completion> {
            if self.fail.load(Ordering::SeqCst) {
                None
            } else {
                Some(shellwright_llm::Completion {
                    text: self.reply.clone(),
                    provider_name: "stub".to_string(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    fn persona() -> Persona {
        Persona {
            id: "vanilla".to_string(),
            name: "Vanilla".to_string(),
            description: String::new(),
            greeting: String::new(),
            system_prompt: "Be careful.".to_string(),
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

    fn facade() -> CodeGeneratorFacade {
        CodeGeneratorFacade::new(
            PromptAssembler::new(PromptParams {
                temperature: 0.2,
                max_tokens: 256,
                stop: None,
                timeout_ms: 5_000,
            }),
            TemplateGenerator::new(0.15),
        )
    }

    #[tokio::test]
    async fn generate_extracts_fenced_block_from_llm_reply() {
        let gateway = StubGateway {
            fail: AtomicBool::new(false),
            reply: "Sure, here:\n```bash\necho hello\n```\nLet me know.".to_string(),
        };

        let script = facade()
            .generate("say hello", Platform::Bash, &persona(), &channel(), &[], &gateway, 10)
            .await;

        assert_eq!(script.source, ScriptSource::Llm);
        assert!(script.content.contains("echo hello"));
    }

    #[tokio::test]
    async fn generate_falls_back_to_template_when_llm_unavailable() {
        let gateway = StubGateway {
            fail: AtomicBool::new(true),
            reply: String::new(),
        };

        let script = facade()
            .generate("backup my files", Platform::Bash, &persona(), &channel(), &[], &gateway, 10)
            .await;

        assert_eq!(script.source, ScriptSource::Template);
        assert!(!script.content.trim().is_empty());
    }

    #[tokio::test]
    async fn validate_without_llm_produces_lint_only_report() {
        let gateway = StubGateway {
            fail: AtomicBool::new(true),
            reply: String::new(),
        };

        let report = facade()
            .validate("echo hi", Platform::Bash, &persona(), &channel(), &gateway)
            .await;

        assert!(report.issues.iter().any(|i| i.message.contains("error trap")));
    }

    #[test]
    fn normalize_script_ensures_trailing_newline_and_header() {
        let normalized = normalize_script("echo hi  ", Platform::Bash);
        assert!(normalized.starts_with("# Generated by shellwright"));
        assert!(normalized.ends_with('\n'));
        assert!(!normalized.contains("echo hi  \n"));
    }
}
