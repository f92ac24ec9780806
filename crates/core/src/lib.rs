//! Core types shared across the shellwright workspace
//!
//! This crate provides foundational types used by every other crate:
//! - Platform / policy / priority enums (tagged, exhaustively matched)
//! - The top-level error type and per-domain error kinds
//! - Id newtypes for conversations and tasks

pub mod error;
pub mod ids;
pub mod platform;

pub use error::{Error, ErrorKind, Result};
pub use ids::{ConversationId, TaskId};
pub use platform::Platform;

use serde::{Deserialize, Serialize};

/// Execution policy named in spec.md §3 "Execution Policy"
///
/// Each variant maps to an allow/deny rule set evaluated by the safety
/// validator (`shellwright-exec::policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Read-only, no FS mutation, no network, no privilege elevation.
    Safe,
    /// Adds benign writes to a scratch directory.
    Restricted,
    /// General automation; destructive patterns still denied.
    Standard,
    /// All not-explicitly-denied operations; records audit flag.
    Elevated,
}

impl Policy {
    /// All known policies, ordered least to most permissive.
    pub const ALL: [Policy; 4] = [
        Policy::Safe,
        Policy::Restricted,
        Policy::Standard,
        Policy::Elevated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Safe => "safe",
            Policy::Restricted => "restricted",
            Policy::Standard => "standard",
            Policy::Elevated => "elevated",
        }
    }
}

impl std::str::FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "safe" => Ok(Policy::Safe),
            "restricted" => Ok(Policy::Restricted),
            "standard" => Ok(Policy::Standard),
            "elevated" => Ok(Policy::Elevated),
            other => Err(Error::validation(format!("unknown policy: {other}"))),
        }
    }
}

/// Task scheduling priority, spec.md §3 "Execution Task".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// Bump the priority by one level, saturating at `High`. Used by the
    /// scheduler's aging rule (spec.md §4.J "Fairness").
    pub fn bump(self) -> Self {
        match self {
            Priority::Low => Priority::Normal,
            Priority::Normal => Priority::High,
            Priority::High => Priority::High,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn policy_round_trips_through_str() {
        for policy in Policy::ALL {
            let parsed = Policy::from_str(policy.as_str()).unwrap();
            assert_eq!(parsed, policy);
        }
    }

    #[test]
    fn priority_bump_saturates_at_high() {
        assert_eq!(Priority::Low.bump(), Priority::Normal);
        assert_eq!(Priority::Normal.bump(), Priority::High);
        assert_eq!(Priority::High.bump(), Priority::High);
    }
}
