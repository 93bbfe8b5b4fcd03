//! Four-phase rotation of a database credential.
//!
//! The scheduler calls [`Rotator::rotate`] once per phase
//! (`createSecret` → `setSecret` → `testSecret` → `finishSecret`). No state
//! is kept between calls: everything lives in the store's version/stage
//! map, and each phase checks that map before mutating anything so a
//! retried or duplicated call is harmless.

pub mod arbitrator;
pub mod stages;
mod steps;

use std::sync::Arc;

use serde::Serialize;

use crate::db::Database;
use crate::errors::RotationError;
use crate::models::{RotationEvent, Stage, Step};
use crate::vault::SecretStore;

use stages::Disposition;

/// Parameters for the password requested from the store.
#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub password_length: u32,
    pub exclude_characters: String,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            password_length: 128,
            exclude_characters: "/\"@".to_string(),
        }
    }
}

/// What a phase did. Only success/failure matters to the scheduler; this is
/// for logs, the HTTP response, and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Targeted version already holds `AWSCURRENT`.
    AlreadyCurrent,
    /// A pending value already existed; nothing written.
    AlreadyCreated,
    /// A new pending value was stored.
    Created,
    /// The pending credential already logs in; no password change issued.
    AlreadyApplied,
    /// The password was changed, authenticated as `via`.
    PasswordApplied { via: Stage },
    /// The pending credential logged in and answered a query.
    Verified,
    /// `AWSCURRENT` already points at the targeted version.
    AlreadyPromoted,
    /// `AWSCURRENT` moved to the targeted version from `from`.
    Promoted { from: Option<String> },
}

/// Phase dispatcher. Holds injected clients only; safe to share across tasks.
pub struct Rotator {
    store: Arc<dyn SecretStore>,
    db: Arc<dyn Database>,
    settings: RotationSettings,
}

impl Rotator {
    pub fn new(store: Arc<dyn SecretStore>, db: Arc<dyn Database>, settings: RotationSettings) -> Self {
        Self { store, db, settings }
    }

    /// Run one rotation phase.
    pub async fn rotate(&self, event: &RotationEvent) -> Result<Outcome, RotationError> {
        let RotationEvent {
            secret_id,
            client_request_token: token,
            step,
        } = event;
        tracing::info!(secret_id = %secret_id, version = %token, step = %step, "rotation invoked");

        let metadata = self.store.describe_secret(secret_id).await?;

        let step = match stages::check(secret_id, token, step, &metadata)? {
            Disposition::AlreadyCurrent => {
                tracing::info!(secret_id = %secret_id, version = %token, "version is already current");
                return Ok(Outcome::AlreadyCurrent);
            }
            Disposition::Run(step) => step,
        };

        let outcome = match step {
            Step::Create => self.create_secret(secret_id, token).await,
            Step::Set => self.set_secret(secret_id, token).await,
            Step::Test => self.test_secret(secret_id, token).await,
            Step::Finish => self.finish_secret(secret_id, token).await,
        };

        match &outcome {
            Ok(outcome) => {
                tracing::info!(secret_id = %secret_id, version = %token, step = %step, ?outcome, "step complete")
            }
            Err(e) => {
                tracing::error!(secret_id = %secret_id, version = %token, step = %step, error = %e, "step failed")
            }
        }
        outcome
    }
}
