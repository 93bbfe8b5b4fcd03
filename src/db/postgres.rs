use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Executor, PgPool, Postgres};

use super::{ConnectionParams, Database, DbConnection, Statement};

/// Postgres backend. Each [`Database::open`] builds a throwaway pool capped
/// at one connection and hands out that connection.
pub struct PgDatabase {
    default_port: u16,
    connect_timeout: Duration,
    ssl_mode: PgSslMode,
}

impl PgDatabase {
    pub fn new(default_port: u16, connect_timeout: Duration, ssl_mode: PgSslMode) -> Self {
        Self {
            default_port,
            connect_timeout,
            ssl_mode,
        }
    }

    fn connect_options(&self, params: &ConnectionParams) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port.unwrap_or(self.default_port))
            .username(&params.username)
            .password(&params.password)
            .ssl_mode(self.ssl_mode)
            .application_name("pg-rotator");
        match &params.dbname {
            Some(dbname) => options.database(dbname),
            None => options,
        }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn open(&self, params: &ConnectionParams) -> anyhow::Result<Box<dyn DbConnection>> {
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect_lazy_with(self.connect_options(params));

        match pool.acquire().await {
            Ok(conn) => Ok(Box::new(PgSession { pool, conn })),
            Err(e) => {
                pool.close().await;
                Err(e.into())
            }
        }
    }
}

struct PgSession {
    pool: PgPool,
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl DbConnection for PgSession {
    async fn execute(&mut self, statement: Statement<'_>) -> anyhow::Result<()> {
        match statement {
            Statement::Liveness => {
                sqlx::query("select now()").execute(&mut *self.conn).await?;
            }
            Statement::ChangePassword { username, password } => {
                // Utility statements take no bind parameters, so the server
                // quotes both values (%I identifier, %L literal) from binds.
                let alter: String =
                    sqlx::query_scalar("SELECT format('ALTER USER %I WITH PASSWORD %L', $1::text, $2::text)")
                        .bind(username)
                        .bind(password)
                        .fetch_one(&mut *self.conn)
                        .await?;
                (&mut *self.conn).execute(sqlx::raw_sql(&alter)).await?;
            }
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let PgSession { pool, conn } = *self;
        if let Err(e) = conn.close().await {
            tracing::warn!("closing db connection failed: {}", e);
        }
        pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(port: Option<u16>, dbname: Option<&str>) -> ConnectionParams {
        ConnectionParams {
            host: "db.internal".into(),
            port,
            username: "app".into(),
            password: "hunter2".into(),
            dbname: dbname.map(String::from),
        }
    }

    #[test]
    fn test_connect_options_use_record_port_over_default() {
        let db = PgDatabase::new(5432, Duration::from_secs(1), PgSslMode::Prefer);

        let opts = db.connect_options(&params(Some(6432), Some("orders")));
        assert_eq!(opts.get_port(), 6432);
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_username(), "app");
        assert_eq!(opts.get_database(), Some("orders"));

        let opts = db.connect_options(&params(None, None));
        assert_eq!(opts.get_port(), 5432);
    }
}
