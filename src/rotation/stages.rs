//! Stage checks run before any step touches the store or the database.

use crate::errors::RotationError;
use crate::models::{SecretMetadata, Stage, Step};

/// What an invocation should do, given the targeted version's stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The version already holds `AWSCURRENT`; rotation finished earlier.
    AlreadyCurrent,
    /// The version is pending; run this step.
    Run(Step),
}

/// Decide how to handle `step` for version `token` of `secret_id`.
///
/// Rotation must be enabled and the version must exist. Then:
/// `AWSCURRENT` wins over everything (the step is not even parsed),
/// `AWSPENDING` dispatches the step, anything else is refused.
pub fn check(
    secret_id: &str,
    token: &str,
    step: &str,
    metadata: &SecretMetadata,
) -> Result<Disposition, RotationError> {
    if !metadata.rotation_enabled {
        return Err(RotationError::RotationDisabled {
            secret_id: secret_id.to_string(),
        });
    }

    let versions = &metadata.version_ids_to_stages;
    if !versions.contains_version(token) {
        return Err(RotationError::UnknownVersion {
            secret_id: secret_id.to_string(),
            version: token.to_string(),
        });
    }

    if versions.holds(token, Stage::Current) {
        return Ok(Disposition::AlreadyCurrent);
    }

    if versions.holds(token, Stage::Pending) {
        return step
            .parse::<Step>()
            .map(Disposition::Run)
            .map_err(|step| RotationError::InvalidStep {
                secret_id: secret_id.to_string(),
                step,
            });
    }

    Err(RotationError::NotPending {
        secret_id: secret_id.to_string(),
        version: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VersionStages;

    fn metadata(enabled: bool) -> SecretMetadata {
        SecretMetadata {
            rotation_enabled: enabled,
            version_ids_to_stages: VersionStages::new()
                .with_version("v0", &[Stage::Previous])
                .with_version("v1", &[Stage::Current])
                .with_version("v2", &[Stage::Pending])
                .with_version("v3", &[]),
        }
    }

    #[test]
    fn test_current_version_is_a_noop_for_any_step() {
        let meta = metadata(true);
        for step in ["createSecret", "finishSecret", "bogus"] {
            assert_eq!(check("db-1", "v1", step, &meta).unwrap(), Disposition::AlreadyCurrent);
        }
    }

    #[test]
    fn test_pending_version_dispatches_each_step() {
        let meta = metadata(true);
        assert_eq!(check("db-1", "v2", "createSecret", &meta).unwrap(), Disposition::Run(Step::Create));
        assert_eq!(check("db-1", "v2", "setSecret", &meta).unwrap(), Disposition::Run(Step::Set));
        assert_eq!(check("db-1", "v2", "testSecret", &meta).unwrap(), Disposition::Run(Step::Test));
        assert_eq!(check("db-1", "v2", "finishSecret", &meta).unwrap(), Disposition::Run(Step::Finish));
    }

    #[test]
    fn test_unknown_step_on_pending_version() {
        let err = check("db-1", "v2", "rollbackSecret", &metadata(true)).unwrap_err();
        assert!(matches!(err, RotationError::InvalidStep { ref step, .. } if step == "rollbackSecret"));
    }

    #[test]
    fn test_rejects_disabled_unknown_and_unstaged() {
        assert!(matches!(
            check("db-1", "v2", "createSecret", &metadata(false)).unwrap_err(),
            RotationError::RotationDisabled { .. }
        ));
        assert!(matches!(
            check("db-1", "v9", "createSecret", &metadata(true)).unwrap_err(),
            RotationError::UnknownVersion { .. }
        ));
        assert!(matches!(
            check("db-1", "v3", "createSecret", &metadata(true)).unwrap_err(),
            RotationError::NotPending { .. }
        ));
        assert!(matches!(
            check("db-1", "v0", "createSecret", &metadata(true)).unwrap_err(),
            RotationError::NotPending { .. }
        ));
    }
}
