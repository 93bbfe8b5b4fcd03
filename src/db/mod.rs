//! Database access used by the rotation steps.
//!
//! Opening a connection with a candidate credential is a question, not an
//! operation that is expected to succeed: [`probe`] turns every connection
//! failure into [`Probe::Unavailable`] so callers branch on it instead of
//! propagating it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::CredentialRecord;

/// Where and as whom to connect. Built from a [`CredentialRecord`].
#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub dbname: Option<String>,
}

impl From<&CredentialRecord> for ConnectionParams {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            host: record.host.clone(),
            port: record.port(),
            username: record.username.clone(),
            password: record.password.clone(),
            dbname: record.dbname.clone().filter(|d| !d.is_empty()),
        }
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("dbname", &self.dbname)
            .finish_non_exhaustive()
    }
}

/// The statements rotation needs. Values are carried as data so each
/// backend binds them as parameters.
#[derive(Clone, PartialEq, Eq)]
pub enum Statement<'a> {
    /// `select now()`
    Liveness,
    /// Set `username`'s password to `password`.
    ChangePassword { username: &'a str, password: &'a str },
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Liveness => f.write_str("Liveness"),
            Statement::ChangePassword { username, .. } => f
                .debug_struct("ChangePassword")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// An open, single connection. Must be released with [`DbConnection::close`].
#[async_trait]
pub trait DbConnection: Send {
    async fn execute(&mut self, statement: Statement<'_>) -> anyhow::Result<()>;

    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn open(&self, params: &ConnectionParams) -> anyhow::Result<Box<dyn DbConnection>>;
}

/// Outcome of trying to log in with one credential.
pub enum Probe {
    Connected(Box<dyn DbConnection>),
    Unavailable(String),
}

/// Try to open a connection as `record`. Failure is logged and returned as
/// [`Probe::Unavailable`], never as an error.
pub async fn probe(db: &dyn Database, record: &CredentialRecord) -> Probe {
    tracing::debug!(host = %record.host, username = %record.username, "opening db connection");

    match db.open(&ConnectionParams::from(record)).await {
        Ok(conn) => {
            tracing::debug!(host = %record.host, username = %record.username, "db connection established");
            Probe::Connected(conn)
        }
        Err(e) => {
            tracing::warn!(
                host = %record.host,
                username = %record.username,
                error = %format!("{:#}", e),
                "db connection failed"
            );
            Probe::Unavailable(format!("{:#}", e))
        }
    }
}
