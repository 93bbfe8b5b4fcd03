use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Stages ───────────────────────────────────────────────────

/// A staging label attached to a secret version.
///
/// The wire labels follow the Secrets Manager convention (`AWSCURRENT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "AWSCURRENT")]
    Current,
    #[serde(rename = "AWSPENDING")]
    Pending,
    #[serde(rename = "AWSPREVIOUS")]
    Previous,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Current => "AWSCURRENT",
            Stage::Pending => "AWSPENDING",
            Stage::Previous => "AWSPREVIOUS",
        }
    }

    /// `None` for custom labels.
    pub fn from_label(label: &str) -> Option<Stage> {
        match label {
            "AWSCURRENT" => Some(Stage::Current),
            "AWSPENDING" => Some(Stage::Pending),
            "AWSPREVIOUS" => Some(Stage::Previous),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// VersionId → staging labels, as reported by the secret store.
///
/// Labels are kept as raw strings: stores allow custom labels next to the
/// three rotation stages, and those must not break decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStages(BTreeMap<String, Vec<String>>);

impl VersionStages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by fakes and tests.
    pub fn with_version(mut self, version: &str, stages: &[Stage]) -> Self {
        self.0.insert(
            version.to_string(),
            stages.iter().map(|s| s.label().to_string()).collect(),
        );
        self
    }

    pub fn contains_version(&self, version: &str) -> bool {
        self.0.contains_key(version)
    }

    pub fn holds(&self, version: &str, stage: Stage) -> bool {
        self.0
            .get(version)
            .is_some_and(|labels| labels.iter().any(|l| l == stage.label()))
    }

    /// The version currently carrying `stage`, if any.
    pub fn version_with(&self, stage: Stage) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| l == stage.label()))
            .map(|(version, _)| version.as_str())
    }
}

/// The subset of secret metadata rotation depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretMetadata {
    #[serde(default)]
    pub rotation_enabled: bool,
    #[serde(default)]
    pub version_ids_to_stages: VersionStages,
}

// ── Invocation ───────────────────────────────────────────────

/// One rotation phase request, as delivered by the scheduler.
///
/// `step` stays a raw string: a version that already holds `AWSCURRENT`
/// is a no-op whatever the step says, so the step is only parsed once the
/// version is known to be pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RotationEvent {
    pub secret_id: String,
    pub client_request_token: String,
    pub step: String,
}

impl RotationEvent {
    pub fn new(secret_id: &str, token: &str, step: &str) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            client_request_token: token.to_string(),
            step: step.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    #[serde(rename = "createSecret")]
    Create,
    #[serde(rename = "setSecret")]
    Set,
    #[serde(rename = "testSecret")]
    Test,
    #[serde(rename = "finishSecret")]
    Finish,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Create => "createSecret",
            Step::Set => "setSecret",
            Step::Test => "testSecret",
            Step::Finish => "finishSecret",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createSecret" => Ok(Step::Create),
            "setSecret" => Ok(Step::Set),
            "testSecret" => Ok(Step::Test),
            "finishSecret" => Ok(Step::Finish),
            other => Err(other.to_string()),
        }
    }
}
