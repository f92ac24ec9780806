//! The target scripting platform
//!
//! Script text is opaque bytes plus this tag (spec.md §9 "Script text as
//! the cross-component currency"); only the prompt assembler, template
//! generator, safety validator and executor interpret it further.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Powershell,
    Applescript,
    Bash,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Powershell => "powershell",
            Platform::Applescript => "applescript",
            Platform::Bash => "bash",
        }
    }

    /// Fenced code-block language tag the LLM is asked to use, spec.md §4.G
    /// step 2 ("first fenced code block matching the platform's fence tag").
    pub fn fence_tag(&self) -> &'static str {
        match self {
            Platform::Powershell => "powershell",
            Platform::Applescript => "applescript",
            Platform::Bash => "bash",
        }
    }

    /// Conventional file extension for a generated script.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Platform::Powershell => "ps1",
            Platform::Applescript => "scpt",
            Platform::Bash => "sh",
        }
    }

    /// The interpreter binary and leading args used to execute a script
    /// file on this platform (spec.md §4.I).
    pub fn interpreter(&self) -> (&'static str, Vec<String>) {
        match self {
            Platform::Powershell => (
                "pwsh",
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-File".to_string(),
                ],
            ),
            Platform::Applescript => ("osascript", vec![]),
            Platform::Bash => ("bash", vec![]),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "powershell" | "ps1" | "pwsh" => Ok(Platform::Powershell),
            "applescript" | "scpt" | "osascript" => Ok(Platform::Applescript),
            "bash" | "sh" | "shell" => Ok(Platform::Bash),
            other => Err(crate::Error::validation(format!(
                "unsupported platform: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_known_aliases() {
        assert_eq!(Platform::from_str("bash").unwrap(), Platform::Bash);
        assert_eq!(Platform::from_str("PowerShell").unwrap(), Platform::Powershell);
        assert_eq!(Platform::from_str("osascript").unwrap(), Platform::Applescript);
    }

    #[test]
    fn rejects_unknown_platform() {
        assert!(Platform::from_str("cobol").is_err());
    }
}
