//! Aggregate result of a multi-level evaluation.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::policy::{Level, LevelVerdict};

/// Why an object skipped evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "name", rename_all = "camelCase")]
pub enum Exemption {
    Namespace(String),
    RuntimeClass(String),
}

impl fmt::Display for Exemption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exemption::Namespace(name) => write!(f, "namespace {name:?}"),
            Exemption::RuntimeClass(name) => write!(f, "runtimeClass {name:?}"),
        }
    }
}

/// Reduced answer for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Outcome {
    /// Least restrictive level the object satisfies
    Allowed(Level),
    /// The object was not evaluated
    Exempt(Exemption),
    /// The object fails every level
    NoLevel,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Allowed(level) => write!(f, "{level}"),
            Outcome::Exempt(exemption) => write!(f, "exempt ({exemption})"),
            Outcome::NoLevel => f.write_str("no level satisfies this object"),
        }
    }
}

/// Result of evaluating one object against every level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelAdmissionResult {
    pub outcome: Outcome,
    /// One verdict per level; empty when exempt
    pub verdicts: BTreeMap<Level, LevelVerdict>,
    /// Level the object's namespace enforces, if labelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_version: Option<String>,
}

impl ParallelAdmissionResult {
    pub(crate) fn exempt(exemption: Exemption) -> Self {
        Self {
            outcome: Outcome::Exempt(exemption),
            verdicts: BTreeMap::new(),
            namespace_level: None,
            namespace_version: None,
        }
    }

    /// Reduce per-level verdicts, scanning levels least restrictive first
    pub fn reduce(verdicts: BTreeMap<Level, LevelVerdict>) -> Self {
        let outcome = Level::ALL
            .into_iter()
            .find(|level| verdicts.get(level).is_some_and(|v| v.allowed))
            .map_or(Outcome::NoLevel, Outcome::Allowed);

        Self {
            outcome,
            verdicts,
            namespace_level: None,
            namespace_version: None,
        }
    }

    pub(crate) fn with_namespace_labels(
        mut self,
        level: Option<Level>,
        version: Option<String>,
    ) -> Self {
        self.namespace_level = level;
        self.namespace_version = version;
        self
    }

    /// Least restrictive satisfied level, if any
    pub fn minimum_level(&self) -> Option<Level> {
        match self.outcome {
            Outcome::Allowed(level) => Some(level),
            _ => None,
        }
    }

    /// Most restrictive satisfied level, if any
    pub fn strictest_level(&self) -> Option<Level> {
        self.verdicts
            .iter()
            .rev()
            .find(|(_, v)| v.allowed)
            .map(|(level, _)| *level)
    }

    pub fn is_exempt(&self) -> bool {
        matches!(self.outcome, Outcome::Exempt(_))
    }

    /// Whether the object satisfies `level`. Exempt objects satisfy every level.
    pub fn passes(&self, level: Level) -> bool {
        self.is_exempt() || self.verdicts.get(&level).is_some_and(|v| v.allowed)
    }

    /// Whether the namespace's enforced level would admit the object.
    ///
    /// `None` when the namespace does not declare a level.
    pub fn admitted_by_namespace(&self) -> Option<bool> {
        self.namespace_level.map(|level| self.passes(level))
    }
}
