//! In-memory [`SecretStore`] with Secrets Manager staging semantics.
//!
//! Suitable for tests and local runs. Staging labels are unique per secret;
//! moving `AWSCURRENT` hands `AWSPREVIOUS` to the version that lost it and
//! clears `AWSPENDING` from the promoted version, as the real service does.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::Rng;

use super::SecretStore;
use crate::models::{SecretMetadata, Stage, VersionStages};

const PASSWORD_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&()*+,-.:;<=>?[]^_{|}~/\"@";

#[derive(Default)]
struct Version {
    secret_string: Option<String>,
    labels: Vec<String>,
}

#[derive(Default)]
struct Secret {
    rotation_enabled: bool,
    versions: BTreeMap<String, Version>,
}

impl Secret {
    fn detach(&mut self, label: &str) {
        for version in self.versions.values_mut() {
            version.labels.retain(|l| l != label);
        }
    }

    fn version_stages(&self) -> VersionStages {
        self.versions.iter().fold(VersionStages::new(), |acc, (id, version)| {
            let stages: Vec<Stage> = version.labels.iter().filter_map(|l| Stage::from_label(l)).collect();
            acc.with_version(id, &stages)
        })
    }

    fn holder_of(&self, label: &str) -> Option<String> {
        self.versions
            .iter()
            .find(|(_, v)| v.labels.iter().any(|l| l == label))
            .map(|(id, _)| id.clone())
    }
}

/// Every mutating call the store has accepted, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Put { version: String, stages: Vec<Stage> },
    UpdateStage { stage: Stage, move_to: String, remove_from: Option<String> },
    RandomPassword { length: u32, exclude_characters: String },
}

#[derive(Default)]
struct Inner {
    secrets: HashMap<String, Secret>,
    calls: Vec<StoreCall>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a secret (replacing any previous one with the same id).
    pub fn create_secret(&self, secret_id: &str, rotation_enabled: bool) {
        self.lock().secrets.insert(
            secret_id.to_string(),
            Secret {
                rotation_enabled,
                versions: BTreeMap::new(),
            },
        );
    }

    /// Seed a version directly, bypassing staging rules. `secret_string`
    /// may be `None` for the value-less placeholder a rotation starts from.
    pub fn insert_version(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: Option<&str>,
        stages: &[Stage],
    ) {
        let mut inner = self.lock();
        let secret = inner.secrets.entry(secret_id.to_string()).or_default();
        secret.versions.insert(
            version_id.to_string(),
            Version {
                secret_string: secret_string.map(String::from),
                labels: stages.iter().map(|s| s.label().to_string()).collect(),
            },
        );
    }

    pub fn secret_string(&self, secret_id: &str, version_id: &str) -> Option<String> {
        self.lock()
            .secrets
            .get(secret_id)
            .and_then(|s| s.versions.get(version_id))
            .and_then(|v| v.secret_string.clone())
    }

    pub fn stages(&self, secret_id: &str) -> VersionStages {
        self.lock()
            .secrets
            .get(secret_id)
            .map(Secret::version_stages)
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn put_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::Put { .. }))
            .count()
    }

    pub fn update_stage_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::UpdateStage { .. }))
            .count()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn describe_secret(&self, secret_id: &str) -> anyhow::Result<SecretMetadata> {
        let inner = self.lock();
        let secret = inner
            .secrets
            .get(secret_id)
            .ok_or_else(|| anyhow::anyhow!("ResourceNotFoundException: secret {} not found", secret_id))?;

        Ok(SecretMetadata {
            rotation_enabled: secret.rotation_enabled,
            version_ids_to_stages: secret.version_stages(),
        })
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: Stage,
        version_id: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        let inner = self.lock();
        let secret = inner
            .secrets
            .get(secret_id)
            .ok_or_else(|| anyhow::anyhow!("ResourceNotFoundException: secret {} not found", secret_id))?;

        let version = match version_id {
            Some(id) => secret.versions.get(id),
            None => secret
                .holder_of(stage.label())
                .and_then(|id| secret.versions.get(&id)),
        };

        Ok(version
            .filter(|v| v.labels.iter().any(|l| l == stage.label()))
            .and_then(|v| v.secret_string.clone()))
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &str,
        stages: &[Stage],
    ) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let secret = inner
            .secrets
            .get_mut(secret_id)
            .ok_or_else(|| anyhow::anyhow!("ResourceNotFoundException: secret {} not found", secret_id))?;

        if let Some(existing) = secret.versions.get(version_id).and_then(|v| v.secret_string.as_deref()) {
            if existing != secret_string {
                anyhow::bail!(
                    "ResourceExistsException: version {} already holds a different value",
                    version_id
                );
            }
        }

        for stage in stages {
            secret.detach(stage.label());
        }
        let version = secret.versions.entry(version_id.to_string()).or_default();
        version.secret_string = Some(secret_string.to_string());
        for stage in stages {
            version.labels.push(stage.label().to_string());
        }

        inner.calls.push(StoreCall::Put {
            version: version_id.to_string(),
            stages: stages.to_vec(),
        });
        Ok(())
    }

    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: Stage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let secret = inner
            .secrets
            .get_mut(secret_id)
            .ok_or_else(|| anyhow::anyhow!("ResourceNotFoundException: secret {} not found", secret_id))?;

        if !secret.versions.contains_key(move_to) {
            anyhow::bail!("ResourceNotFoundException: version {} not found", move_to);
        }
        let holder = secret.holder_of(stage.label());
        if holder.as_deref() != remove_from && holder.as_deref() != Some(move_to) {
            anyhow::bail!(
                "InvalidParameterException: {} is attached to {:?}, not {:?}",
                stage,
                holder,
                remove_from
            );
        }

        secret.detach(stage.label());
        if let Some(version) = secret.versions.get_mut(move_to) {
            version.labels.push(stage.label().to_string());
            if stage == Stage::Current {
                version.labels.retain(|l| l != Stage::Pending.label());
            }
        }
        if stage == Stage::Current {
            if let Some(old) = remove_from.filter(|old| *old != move_to) {
                secret.detach(Stage::Previous.label());
                if let Some(version) = secret.versions.get_mut(old) {
                    version.labels.push(Stage::Previous.label().to_string());
                }
            }
        }

        inner.calls.push(StoreCall::UpdateStage {
            stage,
            move_to: move_to.to_string(),
            remove_from: remove_from.map(String::from),
        });
        Ok(())
    }

    async fn get_random_password(
        &self,
        length: u32,
        exclude_characters: &str,
    ) -> anyhow::Result<String> {
        let alphabet: Vec<char> = PASSWORD_ALPHABET
            .chars()
            .filter(|c| !exclude_characters.contains(*c))
            .collect();
        if alphabet.is_empty() {
            anyhow::bail!("InvalidParameterException: every character is excluded");
        }

        let password: String = (0..length)
            .map(|_| alphabet[OsRng.gen_range(0..alphabet.len())])
            .collect();

        self.lock().calls.push(StoreCall::RandomPassword {
            length,
            exclude_characters: exclude_characters.to_string(),
        });
        Ok(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_secret("db-1", true);
        store.insert_version("db-1", "v1", Some("one"), &[Stage::Current]);
        store.insert_version("db-1", "v2", None, &[Stage::Pending]);
        store
    }

    #[tokio::test]
    async fn test_placeholder_version_has_no_value() {
        let store = seeded();
        assert_eq!(
            store.get_secret_value("db-1", Stage::Pending, Some("v2")).await.unwrap(),
            None
        );
        assert_eq!(
            store.get_secret_value("db-1", Stage::Current, None).await.unwrap(),
            Some("one".to_string())
        );
        // Version exists but does not carry the requested stage.
        assert_eq!(
            store.get_secret_value("db-1", Stage::Pending, Some("v1")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_promotion_moves_previous_and_clears_pending() {
        let store = seeded();
        store.put_secret_value("db-1", "v2", "two", &[Stage::Pending]).await.unwrap();
        store
            .update_secret_version_stage("db-1", Stage::Current, "v2", Some("v1"))
            .await
            .unwrap();

        let stages = store.stages("db-1");
        assert!(stages.holds("v2", Stage::Current));
        assert!(!stages.holds("v2", Stage::Pending));
        assert!(stages.holds("v1", Stage::Previous));
        assert!(!stages.holds("v1", Stage::Current));
    }

    #[tokio::test]
    async fn test_promotion_requires_current_holder() {
        let store = seeded();
        let err = store
            .update_secret_version_stage("db-1", Stage::Current, "v2", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidParameterException"));
    }

    #[tokio::test]
    async fn test_put_rejects_conflicting_value() {
        let store = seeded();
        store.put_secret_value("db-1", "v2", "two", &[Stage::Pending]).await.unwrap();
        store.put_secret_value("db-1", "v2", "two", &[Stage::Pending]).await.unwrap();
        assert!(store
            .put_secret_value("db-1", "v2", "other", &[Stage::Pending])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_random_password_honours_exclusions() {
        let store = MemoryStore::new();
        let password = store.get_random_password(256, "/\"@").await.unwrap();
        assert_eq!(password.chars().count(), 256);
        assert!(!password.contains(['/', '"', '@']));
    }
}
