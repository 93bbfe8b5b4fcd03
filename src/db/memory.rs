//! In-memory stand-in for a Postgres server: a table of logins, with every
//! open attempt and statement recorded for assertions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ConnectionParams, Database, DbConnection, Statement};

/// A statement as the fake server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executed {
    Liveness { as_user: String },
    ChangePassword { as_user: String, username: String, password: String },
}

#[derive(Default)]
struct Server {
    logins: HashMap<String, String>,
    attempts: Vec<(String, String)>,
    executed: Vec<Executed>,
    opened: usize,
    closed: usize,
    unreachable: bool,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    server: Arc<Mutex<Server>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Server> {
        self.server.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or overwrite a login.
    pub fn set_login(&self, username: &str, password: &str) {
        self.lock()
            .logins
            .insert(username.to_string(), password.to_string());
    }

    pub fn password_of(&self, username: &str) -> Option<String> {
        self.lock().logins.get(username).cloned()
    }

    /// Refuse every connection, as if the host were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// `(username, password)` of every open attempt, in order.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.lock().attempts.clone()
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.lock().executed.clone()
    }

    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    pub fn live_connections(&self) -> usize {
        let server = self.lock();
        server.opened - server.closed
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn open(&self, params: &ConnectionParams) -> anyhow::Result<Box<dyn DbConnection>> {
        let mut server = self.lock();
        server
            .attempts
            .push((params.username.clone(), params.password.clone()));

        if server.unreachable {
            anyhow::bail!("connection refused: {}", params.host);
        }
        if server.logins.get(&params.username) != Some(&params.password) {
            anyhow::bail!(
                "password authentication failed for user \"{}\"",
                params.username
            );
        }

        server.opened += 1;
        Ok(Box::new(MemoryConnection {
            server: self.clone(),
            user: params.username.clone(),
        }))
    }
}

struct MemoryConnection {
    server: MemoryDatabase,
    user: String,
}

#[async_trait]
impl DbConnection for MemoryConnection {
    async fn execute(&mut self, statement: Statement<'_>) -> anyhow::Result<()> {
        let mut server = self.server.lock();
        match statement {
            Statement::Liveness => server.executed.push(Executed::Liveness {
                as_user: self.user.clone(),
            }),
            Statement::ChangePassword { username, password } => {
                if !server.logins.contains_key(username) {
                    anyhow::bail!("role \"{}\" does not exist", username);
                }
                server
                    .logins
                    .insert(username.to_string(), password.to_string());
                server.executed.push(Executed::ChangePassword {
                    as_user: self.user.clone(),
                    username: username.to_string(),
                    password: password.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.server.lock().closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(username: &str, password: &str) -> ConnectionParams {
        ConnectionParams {
            host: "db.internal".into(),
            port: None,
            username: username.into(),
            password: password.into(),
            dbname: None,
        }
    }

    #[tokio::test]
    async fn test_login_checks_password() {
        let db = MemoryDatabase::new();
        db.set_login("app", "old");

        assert!(db.open(&params("app", "new")).await.is_err());
        let conn = db.open(&params("app", "old")).await.unwrap();
        assert_eq!(db.live_connections(), 1);
        conn.close().await;
        assert_eq!(db.live_connections(), 0);
        assert_eq!(db.attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_change_password_takes_effect() {
        let db = MemoryDatabase::new();
        db.set_login("app", "old");

        let mut conn = db.open(&params("app", "old")).await.unwrap();
        conn.execute(Statement::ChangePassword {
            username: "app",
            password: "new",
        })
        .await
        .unwrap();
        conn.close().await;

        assert_eq!(db.password_of("app").as_deref(), Some("new"));
        assert!(db.open(&params("app", "old")).await.is_err());
    }
}
