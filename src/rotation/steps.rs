use async_trait::async_trait;

use crate::db::{self, Probe, Statement};
use crate::errors::RotationError;
use crate::models::{CredentialRecord, Stage};

use super::arbitrator::{self, Candidate, CredentialSource};
use super::{Outcome, Rotator};

/// Candidate records for setSecret, read from the store on demand. The
/// pending record is already loaded and validated by then.
struct StoredCredentials<'a> {
    rotator: &'a Rotator,
    secret_id: &'a str,
    pending: &'a CredentialRecord,
}

#[async_trait]
impl<'a> CredentialSource for StoredCredentials<'a> {
    async fn credential(
        &self,
        stage: Stage,
        version: Option<&str>,
    ) -> Result<Option<CredentialRecord>, RotationError> {
        match stage {
            Stage::Pending => Ok(Some(self.pending.clone())),
            _ => self.rotator.load_record(self.secret_id, stage, version).await,
        }
    }
}

impl Rotator {
    /// Fetch and validate the record at `stage` (pinned to `version`, if given).
    async fn load_record(
        &self,
        secret_id: &str,
        stage: Stage,
        version: Option<&str>,
    ) -> Result<Option<CredentialRecord>, RotationError> {
        let Some(raw) = self.store.get_secret_value(secret_id, stage, version).await? else {
            return Ok(None);
        };
        CredentialRecord::parse(&raw)
            .map(Some)
            .map_err(|source| RotationError::InvalidRecord {
                secret_id: secret_id.to_string(),
                stage,
                source,
            })
    }

    async fn require_record(
        &self,
        secret_id: &str,
        stage: Stage,
        version: Option<&str>,
    ) -> Result<CredentialRecord, RotationError> {
        self.load_record(secret_id, stage, version)
            .await?
            .ok_or_else(|| RotationError::MissingRecord {
                secret_id: secret_id.to_string(),
                stage,
            })
    }

    // -- createSecret --

    pub(super) async fn create_secret(&self, secret_id: &str, token: &str) -> Result<Outcome, RotationError> {
        let current = self.require_record(secret_id, Stage::Current, None).await?;

        if self.load_record(secret_id, Stage::Pending, Some(token)).await?.is_some() {
            tracing::info!(secret_id, version = token, "pending value already exists");
            return Ok(Outcome::AlreadyCreated);
        }

        let password = self
            .store
            .get_random_password(self.settings.password_length, &self.settings.exclude_characters)
            .await?;
        let pending = current.with_password(password);
        let secret_string = pending
            .to_secret_string()
            .map_err(|source| RotationError::InvalidRecord {
                secret_id: secret_id.to_string(),
                stage: Stage::Pending,
                source,
            })?;

        self.store
            .put_secret_value(secret_id, token, &secret_string, &[Stage::Pending])
            .await?;
        tracing::info!(secret_id, version = token, "stored pending value");
        Ok(Outcome::Created)
    }

    // -- setSecret --

    pub(super) async fn set_secret(&self, secret_id: &str, token: &str) -> Result<Outcome, RotationError> {
        let pending = self.require_record(secret_id, Stage::Pending, Some(token)).await?;

        let source = StoredCredentials {
            rotator: self,
            secret_id,
            pending: &pending,
        };
        let candidates = [
            Candidate { stage: Stage::Pending, version: Some(token) },
            Candidate { stage: Stage::Current, version: None },
            Candidate { stage: Stage::Previous, version: None },
        ];

        let Some(won) = arbitrator::arbitrate(self.db.as_ref(), &source, secret_id, &candidates).await? else {
            return Err(RotationError::NoValidCredential {
                secret_id: secret_id.to_string(),
            });
        };
        let mut conn = won.connection;

        if won.matched == Stage::Pending {
            conn.close().await;
            tracing::info!(secret_id, version = token, "pending password already set");
            return Ok(Outcome::AlreadyApplied);
        }

        tracing::info!(secret_id, via = %won.matched, username = %pending.username, "setting password");
        let result = conn
            .execute(Statement::ChangePassword {
                username: &pending.username,
                password: &pending.password,
            })
            .await;
        conn.close().await;
        result.map_err(RotationError::Database)?;

        tracing::info!(secret_id, version = token, "password rotated");
        Ok(Outcome::PasswordApplied { via: won.matched })
    }

    // -- testSecret --

    pub(super) async fn test_secret(&self, secret_id: &str, token: &str) -> Result<Outcome, RotationError> {
        let pending = self.require_record(secret_id, Stage::Pending, Some(token)).await?;

        let mut conn = match db::probe(self.db.as_ref(), &pending).await {
            Probe::Connected(conn) => conn,
            Probe::Unavailable(_) => {
                return Err(RotationError::PendingUnverified {
                    secret_id: secret_id.to_string(),
                })
            }
        };

        let result = conn.execute(Statement::Liveness).await;
        conn.close().await;
        result.map_err(RotationError::Database)?;

        tracing::info!(secret_id, version = token, "pending credential verified");
        Ok(Outcome::Verified)
    }

    // -- finishSecret --

    pub(super) async fn finish_secret(&self, secret_id: &str, token: &str) -> Result<Outcome, RotationError> {
        let metadata = self.store.describe_secret(secret_id).await?;
        let versions = &metadata.version_ids_to_stages;
        tracing::info!(secret_id, ?versions, "version stages");

        let current_version = versions.version_with(Stage::Current);
        if current_version == Some(token) {
            tracing::info!(secret_id, version = token, "version is already current");
            return Ok(Outcome::AlreadyPromoted);
        }

        // Never promote a value the other steps would reject.
        self.require_record(secret_id, Stage::Pending, Some(token)).await?;

        self.store
            .update_secret_version_stage(secret_id, Stage::Current, token, current_version)
            .await?;

        tracing::info!(secret_id, version = token, from = ?current_version, "current stage moved");
        Ok(Outcome::Promoted {
            from: current_version.map(String::from),
        })
    }
}
