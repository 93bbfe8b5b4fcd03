pub mod memory;
pub mod secrets_manager;
pub mod sigv4;

use async_trait::async_trait;

use crate::models::{SecretMetadata, Stage};

/// Abstraction over the versioned secret store holding the credential.
/// Implementations: Secrets Manager (HTTP), in-memory (tests, local runs).
///
/// Calls are not retried here; a failed phase is re-run by the scheduler.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Rotation flag and the VersionId → stages map.
    async fn describe_secret(&self, secret_id: &str) -> anyhow::Result<SecretMetadata>;

    /// Raw secret string stored under `stage` (and `version_id`, when given).
    /// Returns `None` when no such version/stage exists.
    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: Stage,
        version_id: Option<&str>,
    ) -> anyhow::Result<Option<String>>;

    /// Store `secret_string` as version `version_id` carrying `stages`.
    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &str,
        stages: &[Stage],
    ) -> anyhow::Result<()>;

    /// Move `stage` onto `move_to`, detaching it from `remove_from`.
    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: Stage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Random password generated by the store.
    async fn get_random_password(
        &self,
        length: u32,
        exclude_characters: &str,
    ) -> anyhow::Result<String>;
}
