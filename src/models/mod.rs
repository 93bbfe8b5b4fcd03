pub mod credential;
pub mod secret;

pub use credential::{CredentialRecord, RecordError};
pub use secret::{RotationEvent, SecretMetadata, Stage, Step, VersionStages};
