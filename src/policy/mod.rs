//! Pod Security Standards levels and their evaluation.
//!
//! The ladder is fixed: `Privileged < Baseline < Restricted`. Each level is a
//! superset of the checks of the level below it, so an object passing a level
//! also passes every less restrictive level.

pub mod checks;
pub mod pod_spec;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::AttributesRecord;
use checks::CheckResult;
use pod_spec::ExtractError;

/// Error returned when a string does not name a known level
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown Pod Security level {0:?}, expected one of privileged, baseline, restricted")]
pub struct ParseLevelError(pub String);

/// Pod Security Standards level.
///
/// Variant order is the restrictiveness order; `Ord` is derived from it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Unrestricted policy
    #[default]
    Privileged,
    /// Minimally restrictive policy preventing known privilege escalations
    Baseline,
    /// Heavily restricted policy enforcing current pod hardening guidance
    Restricted,
}

impl Level {
    /// Every level, least restrictive first
    pub const ALL: [Level; 3] = [Level::Privileged, Level::Baseline, Level::Restricted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Privileged => "privileged",
            Level::Baseline => "baseline",
            Level::Restricted => "restricted",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "privileged" => Ok(Level::Privileged),
            "baseline" => Ok(Level::Baseline),
            "restricted" => Ok(Level::Restricted),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Outcome of evaluating one object against one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelVerdict {
    /// Whether the object satisfies the level
    pub allowed: bool,
    /// Violation reasons, in check order. Empty when allowed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl LevelVerdict {
    /// Create an allowed verdict
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }

    /// Create a denied verdict
    pub fn denied(reasons: Vec<String>) -> Self {
        Self {
            allowed: false,
            reasons,
        }
    }

    /// Fold individual check results into a verdict
    pub fn from_checks(results: impl IntoIterator<Item = CheckResult>) -> Self {
        let reasons: Vec<String> = results
            .into_iter()
            .filter(|r| !r.allowed)
            .map(|r| r.to_string())
            .collect();

        if reasons.is_empty() {
            Self::allowed()
        } else {
            Self::denied(reasons)
        }
    }
}

/// Evaluates an admission request against a single level.
///
/// Implementations must be pure: the same level and attributes always give
/// the same verdict, and nothing is shared between calls.
pub trait LevelEvaluator: Send + Sync {
    fn evaluate(&self, level: Level, attributes: &AttributesRecord) -> LevelVerdict;
}

/// Evaluator implementing the Pod Security Standards check table
#[derive(Debug, Clone, Copy, Default)]
pub struct PodSecurityEvaluator;

impl LevelEvaluator for PodSecurityEvaluator {
    fn evaluate(&self, level: Level, attributes: &AttributesRecord) -> LevelVerdict {
        if level == Level::Privileged {
            return LevelVerdict::allowed();
        }

        let pod = match pod_spec::extract(&attributes.kind.kind, &attributes.object) {
            Ok(pod) => pod,
            // Objects without a pod spec have nothing to restrict
            Err(ExtractError::Unsupported(_)) => return LevelVerdict::allowed(),
            Err(e) => {
                return LevelVerdict::denied(vec![format!(
                    "unable to evaluate {} {:?}: {}",
                    attributes.kind.kind, attributes.name, e
                )]);
            }
        };

        LevelVerdict::from_checks(checks::checks_for(level).iter().map(|c| c.run(&pod)))
    }
}
