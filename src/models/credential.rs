use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The only database engine this rotator knows how to drive.
pub const SUPPORTED_ENGINE: &str = "postgres";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed secret payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid db engine '{0}'")]
    UnsupportedEngine(String),

    #[error("missing key {0}")]
    MissingField(&'static str),
}

/// Decoded payload of one secret version.
///
/// Keys the rotator does not interpret are kept in `extra` so that a record
/// derived from another (see [`CredentialRecord::with_password`]) carries
/// them over unchanged. `port` lives there too: stores hold it as a number
/// or a string, and it is only read through [`CredentialRecord::port`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbname: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CredentialRecord {
    /// Decode and validate a stored secret string.
    pub fn parse(secret_string: &str) -> Result<Self, RecordError> {
        let record: CredentialRecord = serde_json::from_str(secret_string)?;
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.engine != SUPPORTED_ENGINE {
            return Err(RecordError::UnsupportedEngine(self.engine.clone()));
        }
        for (key, value) in [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.is_empty() {
                return Err(RecordError::MissingField(key));
            }
        }
        Ok(())
    }

    /// Port named by the record, if it is a number or a numeric string.
    /// Anything else is treated as absent.
    pub fn port(&self) -> Option<u16> {
        match self.extra.get("port")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A copy of this record with only the password replaced.
    pub fn with_password(&self, password: String) -> Self {
        Self {
            password,
            ..self.clone()
        }
    }

    pub fn to_secret_string(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("dbname", &self.dbname)
            .field("port", &self.port())
            .finish_non_exhaustive()
    }
}
