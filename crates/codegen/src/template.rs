//! Template Generator — deterministic offline fallback (spec.md §4.F).
//!
//! Grounded on the teacher's tool-catalog pattern in
//! `crates/tools/src/lib.rs` (a static table of named, keyword-tagged
//! entries selected by lookup rather than by an LLM call), adapted here
//! to score-and-pick via Jaccard similarity instead of exact name match.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use shellwright_core::Platform;

/// Output of the template generator, spec.md §4.F. Never an error: on
/// internal trouble this degrades to the basic skeleton rather than
/// failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOutput {
    pub platform: Platform,
    pub filename: String,
    pub content: String,
    pub documentation: String,
    pub safety_hint: String,
    #[serde(default)]
    pub estimated_runtime: Option<String>,
}

struct Template {
    slug: &'static str,
    keywords: &'static [&'static str],
    documentation: &'static str,
    safety_hint: &'static str,
    estimated_runtime: Option<&'static str>,
    body: fn(Platform, &str) -> String,
}

fn sanitize_description(description: &str) -> String {
    description
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '_' | '.' | '/'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn tokenize(description: &str) -> HashSet<String> {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<&'static str>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let b_owned: HashSet<String> = b.iter().map(|s| s.to_string()).collect();
    let intersection = a.intersection(&b_owned).count();
    let union = a.union(&b_owned).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn backup_body(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [string]$Source = \".\\\",\n    [string]$Destination = \".\\backup\"\n)\n\n\
             # {description}\ntry {{\n    if (-not (Test-Path $Destination)) {{\n        New-Item -ItemType Directory -Path $Destination | Out-Null\n    }}\n    Copy-Item -Path $Source -Destination $Destination -Recurse -Force\n    Write-Host \"Backup complete: $Source -> $Destination\"\n    exit 0\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        set sourcePath to POSIX file \"~/Documents\"\n        set destPath to POSIX file \"~/Backups\"\n        do shell script \"cp -R \" & quoted form of POSIX path of sourcePath & \" \" & quoted form of POSIX path of destPath\n        log \"Backup complete\"\n    on error errMsg\n        error \"Backup failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\nSRC=\"${{1:-.}}\"\nDEST=\"${{2:-./backup}}\"\n\nmkdir -p \"$DEST\"\ncp -R \"$SRC\" \"$DEST\"\necho \"Backup complete: $SRC -> $DEST\"\n"
        ),
    }
}

fn monitor_body(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [int]$IntervalSeconds = 5\n)\n\n# {description}\ntry {{\n    while ($true) {{\n        Get-Process | Sort-Object CPU -Descending | Select-Object -First 5 | Format-Table\n        Start-Sleep -Seconds $IntervalSeconds\n    }}\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        set cpuInfo to do shell script \"top -l 1 | head -n 10\"\n        log cpuInfo\n    on error errMsg\n        error \"Monitoring failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\nINTERVAL=\"${{1:-5}}\"\n\nwhile true; do\n    ps -eo pid,pcpu,pmem,comm --sort=-pcpu | head -n 6\n    sleep \"$INTERVAL\"\ndone\n"
        ),
    }
}

fn user_body(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [Parameter(Mandatory)][string]$UserName\n)\n\n# {description}\ntry {{\n    New-LocalUser -Name $UserName -NoPassword\n    Write-Host \"Created user $UserName\"\n    exit 0\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        set userName to item 1 of argv\n        do shell script \"sysadminctl -addUser \" & quoted form of userName & \" with administrator privileges\"\n    on error errMsg\n        error \"User management failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\nUSERNAME=\"${{1:?usage: $0 USERNAME}}\"\n\nsudo useradd -m \"$USERNAME\"\necho \"Created user $USERNAME\"\n"
        ),
    }
}

fn file_process_body(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [Parameter(Mandatory)][string]$Path,\n    [string]$Pattern = \"*.*\"\n)\n\n# {description}\ntry {{\n    Get-ChildItem -Path $Path -Filter $Pattern -Recurse | ForEach-Object {{\n        Write-Host $_.FullName\n    }}\n    exit 0\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        set targetFolder to item 1 of argv\n        set fileList to do shell script \"find \" & quoted form of targetFolder & \" -type f\"\n        log fileList\n    on error errMsg\n        error \"File processing failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\nTARGET=\"${{1:?usage: $0 DIR}}\"\n\nfind \"$TARGET\" -type f -print\n"
        ),
    }
}

fn service_body(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [Parameter(Mandatory)][string]$ServiceName,\n    [ValidateSet(\"Start\",\"Stop\",\"Restart\")][string]$Action = \"Restart\"\n)\n\n# {description}\ntry {{\n    switch ($Action) {{\n        \"Start\"   {{ Start-Service -Name $ServiceName }}\n        \"Stop\"    {{ Stop-Service -Name $ServiceName }}\n        \"Restart\" {{ Restart-Service -Name $ServiceName }}\n    }}\n    Write-Host \"$Action on $ServiceName complete\"\n    exit 0\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        set serviceName to item 1 of argv\n        do shell script \"launchctl kickstart -k system/\" & serviceName\n    on error errMsg\n        error \"Service control failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\nSERVICE=\"${{1:?usage: $0 SERVICE_NAME}}\"\n\nsudo systemctl restart \"$SERVICE\"\necho \"Restarted $SERVICE\"\n"
        ),
    }
}

fn browser_body(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [Parameter(Mandatory)][string]$Url\n)\n\n# {description}\ntry {{\n    Start-Process $Url\n    exit 0\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        set targetUrl to item 1 of argv\n        tell application \"Safari\" to open location targetUrl\n    on error errMsg\n        error \"Browser automation failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\nURL=\"${{1:?usage: $0 URL}}\"\n\nxdg-open \"$URL\" 2>/dev/null || open \"$URL\"\n"
        ),
    }
}

fn basic_skeleton(platform: Platform, description: &str) -> String {
    match platform {
        Platform::Powershell => format!(
            "param(\n    [string[]]$Arguments\n)\n\n<#\n{description}\n#>\ntry {{\n    # TODO: implement the requested automation\n    Write-Host \"Not yet implemented: {description}\"\n    exit 0\n}} catch {{\n    Write-Error $_.Exception.Message\n    exit 1\n}}\n"
        ),
        Platform::Applescript => format!(
            "-- {description}\non run argv\n    try\n        -- TODO: implement the requested automation\n        log \"Not yet implemented: {description}\"\n    on error errMsg\n        error \"Script failed: \" & errMsg\n    end try\nend run\n"
        ),
        Platform::Bash => format!(
            "#!/usr/bin/env bash\nset -euo pipefail\n\n# {description}\n\n# TODO: implement the requested automation\necho \"Not yet implemented: {description}\"\n"
        ),
    }
}

const CATALOG: &[Template] = &[
    Template {
        slug: "backup",
        keywords: &["backup", "archive", "copy", "snapshot", "save"],
        documentation: "Copies files from a source location into a backup destination.",
        safety_hint: "Reads and writes files; verify the destination before running.",
        estimated_runtime: Some("seconds to minutes, depending on data size"),
        body: backup_body,
    },
    Template {
        slug: "monitor",
        keywords: &["monitor", "watch", "track", "cpu", "memory", "usage"],
        documentation: "Periodically reports system resource usage.",
        safety_hint: "Read-only; loops until interrupted.",
        estimated_runtime: Some("runs until cancelled"),
        body: monitor_body,
    },
    Template {
        slug: "user",
        keywords: &["user", "account", "create", "add", "delete", "remove"],
        documentation: "Creates or manages a local user account.",
        safety_hint: "Requires administrative privileges; modifies system accounts.",
        estimated_runtime: Some("seconds"),
        body: user_body,
    },
    Template {
        slug: "file-process",
        keywords: &["file", "files", "process", "find", "list", "folder", "directory"],
        documentation: "Lists or processes files under a target directory.",
        safety_hint: "Read-only traversal; safe to run against untrusted directories.",
        estimated_runtime: Some("seconds"),
        body: file_process_body,
    },
    Template {
        slug: "service",
        keywords: &["service", "restart", "start", "stop", "daemon", "process"],
        documentation: "Starts, stops or restarts a named system service.",
        safety_hint: "Requires administrative privileges; affects service availability.",
        estimated_runtime: Some("seconds"),
        body: service_body,
    },
    Template {
        slug: "browser",
        keywords: &["browser", "open", "url", "website", "navigate", "web"],
        documentation: "Opens a URL in the default or a named browser.",
        safety_hint: "Launches an application; no filesystem or account changes.",
        estimated_runtime: Some("instant"),
        body: browser_body,
    },
];

/// Generates a script deterministically, without calling any LLM
/// provider, spec.md §4.F. Never returns an error.
pub struct TemplateGenerator {
    match_threshold: f32,
}

impl TemplateGenerator {
    pub fn new(match_threshold: f32) -> Self {
        Self { match_threshold }
    }

    pub fn generate(&self, description: &str, platform: Platform) -> TemplateOutput {
        let sanitized = sanitize_description(description);
        let tokens = tokenize(&sanitized);

        let best = CATALOG
            .iter()
            .map(|template| {
                let score = jaccard(&tokens, &template.keywords.iter().copied().collect());
                (score, template)
            })
            .max_by(|(score_a, _), (score_b, _)| {
                score_a.partial_cmp(score_b).unwrap_or(std::cmp::Ordering::Equal)
            });

        let (content, documentation, safety_hint, estimated_runtime, slug) = match best {
            Some((score, template)) if score >= self.match_threshold => (
                (template.body)(platform, &sanitized),
                template.documentation.to_string(),
                template.safety_hint.to_string(),
                template.estimated_runtime.map(str::to_string),
                template.slug,
            ),
            _ => (
                basic_skeleton(platform, &sanitized),
                "No catalog template matched closely enough; a bare skeleton was produced."
                    .to_string(),
                "Unreviewed skeleton; the TODO body performs no action until implemented."
                    .to_string(),
                None,
                "skeleton",
            ),
        };

        TemplateOutput {
            platform,
            filename: format!("{slug}.{}", platform.file_extension()),
            content,
            documentation,
            safety_hint,
            estimated_runtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_backup_template_above_threshold() {
        let generator = TemplateGenerator::new(0.15);
        let output = generator.generate("backup my documents to an archive", Platform::Bash);
        assert!(output.content.contains("mkdir -p"));
        assert_eq!(output.filename, "backup.sh");
    }

    #[test]
    fn falls_back_to_skeleton_below_threshold() {
        let generator = TemplateGenerator::new(0.9);
        let output = generator.generate("do something extremely specific and unusual", Platform::Powershell);
        assert!(output.content.contains("TODO"));
        assert_eq!(output.filename, "skeleton.ps1");
    }

    #[test]
    fn never_panics_on_empty_description() {
        let generator = TemplateGenerator::new(0.15);
        let output = generator.generate("", Platform::Applescript);
        assert!(!output.content.is_empty());
    }

    #[test]
    fn jaccard_breaks_ties_by_catalog_order() {
        // "track service" scores identically against `monitor`'s and
        // `service`'s keyword sets; `monitor` is declared first.
        let generator = TemplateGenerator::new(0.01);
        let output = generator.generate("track service", Platform::Bash);
        assert_eq!(output.filename, "monitor.sh");
    }
}
