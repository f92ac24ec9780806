//! Safety Validator (spec.md §4.H).
//!
//! Grounded on the teacher's guarded-tool pattern in
//! `crates/tools/src/lib.rs` (named, ordered checks run against a
//! request before it is allowed through) — generalized into an ordered
//! regex rule catalog keyed by [`Policy`] and [`Platform`].
//!
//! The exact rule catalog beyond the representative examples in the
//! spec is an open question; this module grows the examples given
//! there into a small tiered catalog (documented in `DESIGN.md`) while
//! keeping the mechanism — ordered regex deny/warn rules evaluated
//! against a named policy — normative.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use shellwright_core::{Platform, Policy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyIssue {
    pub rule_id: String,
    pub severity: IssueSeverity,
    pub message: String,
    /// Whether this single match forced the overall decision to `deny`.
    pub denies: bool,
}

/// Output of `evaluate`, spec.md §4.H `{decision, issues[], score}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub decision: Decision,
    pub issues: Vec<PolicyIssue>,
    pub score: u8,
}

struct Rule {
    id: &'static str,
    pattern: Regex,
    severity: IssueSeverity,
    deny: bool,
    message: &'static str,
}

fn rule(id: &'static str, pattern: &str, severity: IssueSeverity, deny: bool, message: &'static str) -> Rule {
    Rule {
        id,
        pattern: Regex::new(pattern).expect("static safety pattern must compile"),
        severity,
        deny,
        message,
    }
}

/// Rules applying regardless of platform or policy: unconditionally
/// catastrophic operations, spec.md §4.H representative examples.
fn catastrophic_rules() -> Vec<Rule> {
    vec![
        rule(
            "bash-rm-rf-root",
            r"rm\s+-rf\s+/(\s|$)",
            IssueSeverity::Error,
            true,
            "recursive force-delete of the filesystem root",
        ),
        rule(
            "bash-mkfs",
            r"\bmkfs(\.\w+)?\b",
            IssueSeverity::Error,
            true,
            "formats a filesystem",
        ),
        rule(
            "bash-dd-if",
            r"\bdd\s+if=",
            IssueSeverity::Error,
            true,
            "raw disk write via dd",
        ),
        rule(
            "bash-fork-bomb",
            r":\(\)\s*\{\s*:\|\:&\s*\}\s*;\s*:",
            IssueSeverity::Error,
            true,
            "fork bomb",
        ),
        rule(
            "powershell-format-volume",
            r"Format-Volume",
            IssueSeverity::Error,
            true,
            "formats a volume",
        ),
        rule(
            "powershell-remove-item-system-root",
            r"Remove-Item\s+-Recurse\s+-Force\s+C:\\",
            IssueSeverity::Error,
            true,
            "recursive force-delete of the system drive",
        ),
    ]
}

/// Rules that deny under `safe`/`restricted`/`standard` but are
/// demoted to warnings under `elevated`, spec.md §4.H.
fn administrative_rules(policy: Policy) -> Vec<Rule> {
    let deny_under_non_elevated = !matches!(policy, Policy::Elevated);

    vec![
        rule(
            "shutdown",
            r"\b(shutdown|Restart-Computer|Stop-Computer)\b",
            IssueSeverity::Error,
            deny_under_non_elevated,
            "shuts down or restarts the host",
        ),
        rule(
            "powershell-invoke-expression-remote",
            r"Invoke-Expression.*(Invoke-WebRequest|iwr|New-Object\s+Net\.WebClient)",
            IssueSeverity::Error,
            deny_under_non_elevated,
            "executes remotely fetched content without review",
        ),
        rule(
            "applescript-administrator-privileges",
            r#"do shell script.*with administrator privileges"#,
            IssueSeverity::Error,
            !matches!(policy, Policy::Standard | Policy::Elevated),
            "requests administrator privileges",
        ),
        rule(
            "bash-sudo",
            r"\bsudo\b",
            IssueSeverity::Warn,
            false,
            "elevates privileges via sudo",
        ),
    ]
}

struct Catalog {
    rules: Vec<Rule>,
}

impl Catalog {
    fn build(policy: Policy) -> Self {
        let mut rules = catastrophic_rules();
        rules.extend(administrative_rules(policy));
        Self { rules }
    }
}

static SAFE: Lazy<Catalog> = Lazy::new(|| Catalog::build(Policy::Safe));
static RESTRICTED: Lazy<Catalog> = Lazy::new(|| Catalog::build(Policy::Restricted));
static STANDARD: Lazy<Catalog> = Lazy::new(|| Catalog::build(Policy::Standard));
static ELEVATED: Lazy<Catalog> = Lazy::new(|| Catalog::build(Policy::Elevated));

fn catalog_for(policy: Policy) -> &'static Catalog {
    match policy {
        Policy::Safe => &SAFE,
        Policy::Restricted => &RESTRICTED,
        Policy::Standard => &STANDARD,
        Policy::Elevated => &ELEVATED,
    }
}

/// Classifies a script against a named policy, spec.md §4.H. Stateless
/// and safe to share across tasks; `evaluate` never panics or blocks.
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `script` (the `platform` argument is accepted for
    /// forward compatibility with platform-specific rule subsets but
    /// every current rule is pattern-matched directly against script
    /// text regardless of platform).
    pub fn evaluate(&self, script: &str, _platform: Platform, policy: Policy) -> PolicyReport {
        let catalog = catalog_for(policy);

        let mut issues = Vec::new();
        let mut denied = false;
        let mut score: i16 = 100;

        for rule in &catalog.rules {
            if rule.pattern.is_match(script) {
                if rule.deny {
                    denied = true;
                }
                score -= match rule.severity {
                    IssueSeverity::Warn => 5,
                    IssueSeverity::Error => 15,
                };
                issues.push(PolicyIssue {
                    rule_id: rule.id.to_string(),
                    severity: rule.severity,
                    message: rule.message.to_string(),
                    denies: rule.deny,
                });
            }
        }

        PolicyReport {
            decision: if denied { Decision::Deny } else { Decision::Allow },
            issues,
            score: score.max(0) as u8,
        }
    }
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_recursive_root_delete_under_every_policy() {
        let validator = SafetyValidator::new();
        for policy in Policy::ALL {
            let report = validator.evaluate("rm -rf /", Platform::Bash, policy);
            assert_eq!(report.decision, Decision::Deny, "policy {policy:?}");
        }
    }

    #[test]
    fn shutdown_is_denied_under_standard_but_allowed_under_elevated() {
        let validator = SafetyValidator::new();

        let standard = validator.evaluate("shutdown -h now", Platform::Bash, Policy::Standard);
        assert_eq!(standard.decision, Decision::Deny);

        let elevated = validator.evaluate("shutdown -h now", Platform::Bash, Policy::Elevated);
        assert_eq!(elevated.decision, Decision::Allow);
        assert!(elevated.issues.iter().any(|i| i.rule_id == "shutdown"));
    }

    #[test]
    fn score_deducts_per_issue_and_floors_at_zero() {
        let validator = SafetyValidator::new();
        let script = "sudo rm -rf / && sudo mkfs.ext4 /dev/sda1 && sudo dd if=/dev/zero of=/dev/sda";
        let report = validator.evaluate(script, Platform::Bash, Policy::Standard);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn clean_script_allows_with_perfect_score() {
        let validator = SafetyValidator::new();
        let report = validator.evaluate("echo hello world", Platform::Bash, Policy::Safe);
        assert_eq!(report.decision, Decision::Allow);
        assert_eq!(report.score, 100);
        assert!(report.issues.is_empty());
    }
}
