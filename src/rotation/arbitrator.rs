//! Connection arbitration: find the first candidate credential that can log in.

use async_trait::async_trait;

use crate::db::{self, Database, DbConnection, Probe};
use crate::errors::RotationError;
use crate::models::{CredentialRecord, Stage};

/// One credential to try: the record stored under `stage`, pinned to
/// `version` when given.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub stage: Stage,
    pub version: Option<&'a str>,
}

/// Where candidate records come from. Only asked for a stage once every
/// earlier candidate has failed to log in.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` when the stage holds no value (e.g. no `AWSPREVIOUS`
    /// before the first rotation).
    async fn credential(
        &self,
        stage: Stage,
        version: Option<&str>,
    ) -> Result<Option<CredentialRecord>, RotationError>;
}

/// The connection that won, and which candidate it came from.
pub struct Arbitration {
    pub matched: Stage,
    pub connection: Box<dyn DbConnection>,
}

/// Probe `candidates` strictly in order and return the first successful
/// connection. At most one connection is open when this returns; `Ok(None)`
/// means every candidate failed (or was absent). A record that cannot be
/// loaded fails arbitration only if it is reached.
pub async fn arbitrate(
    db: &dyn Database,
    source: &dyn CredentialSource,
    secret_id: &str,
    candidates: &[Candidate<'_>],
) -> Result<Option<Arbitration>, RotationError> {
    for candidate in candidates {
        let Some(record) = source.credential(candidate.stage, candidate.version).await? else {
            tracing::info!(secret_id, stage = %candidate.stage, "no credential for stage, skipping");
            continue;
        };

        tracing::info!(secret_id, stage = %candidate.stage, "trying credential");
        match db::probe(db, &record).await {
            Probe::Connected(connection) => {
                return Ok(Some(Arbitration {
                    matched: candidate.stage,
                    connection,
                }));
            }
            Probe::Unavailable(_) => continue,
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::models::RecordError;

    fn record(password: &str) -> CredentialRecord {
        CredentialRecord::parse(&format!(
            r#"{{"engine":"postgres","host":"db.internal","username":"app","password":"{}"}}"#,
            password
        ))
        .unwrap()
    }

    /// Fixed records per stage; `"!"` stands for a value that fails to decode.
    struct Fixed {
        records: Vec<(Stage, Option<&'static str>)>,
        loaded: Mutex<Vec<Stage>>,
    }

    impl Fixed {
        fn new(pending: &'static str, current: &'static str, previous: Option<&'static str>) -> Self {
            Self {
                records: vec![
                    (Stage::Pending, Some(pending)),
                    (Stage::Current, Some(current)),
                    (Stage::Previous, previous),
                ],
                loaded: Mutex::new(Vec::new()),
            }
        }

        fn loaded(&self) -> Vec<Stage> {
            self.loaded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialSource for Fixed {
        async fn credential(
            &self,
            stage: Stage,
            _version: Option<&str>,
        ) -> Result<Option<CredentialRecord>, RotationError> {
            self.loaded.lock().unwrap().push(stage);
            let password = self
                .records
                .iter()
                .find(|(s, _)| *s == stage)
                .and_then(|(_, p)| *p);
            match password {
                Some("!") => Err(RotationError::InvalidRecord {
                    secret_id: "db-1".into(),
                    stage,
                    source: RecordError::MissingField("password"),
                }),
                Some(p) => Ok(Some(record(p))),
                None => Ok(None),
            }
        }
    }

    const ORDER: [Candidate<'static>; 3] = [
        Candidate { stage: Stage::Pending, version: Some("v2") },
        Candidate { stage: Stage::Current, version: None },
        Candidate { stage: Stage::Previous, version: None },
    ];

    fn tried(db: &MemoryDatabase) -> Vec<String> {
        db.attempts().into_iter().map(|(_, p)| p).collect()
    }

    #[tokio::test]
    async fn test_first_success_wins_and_stops_probing() {
        let db = MemoryDatabase::new();
        db.set_login("app", "pending-pw");
        let source = Fixed::new("pending-pw", "current-pw", Some("old-pw"));

        let won = arbitrate(&db, &source, "db-1", &ORDER).await.unwrap().unwrap();
        assert_eq!(won.matched, Stage::Pending);
        assert_eq!(tried(&db), vec!["pending-pw"]);
        assert_eq!(source.loaded(), vec![Stage::Pending], "later stages never loaded");
        won.connection.close().await;
    }

    #[tokio::test]
    async fn test_falls_back_in_priority_order() {
        let db = MemoryDatabase::new();
        db.set_login("app", "old-pw");
        let source = Fixed::new("pending-pw", "current-pw", Some("old-pw"));

        let won = arbitrate(&db, &source, "db-1", &ORDER).await.unwrap().unwrap();
        assert_eq!(won.matched, Stage::Previous);
        assert_eq!(tried(&db), vec!["pending-pw", "current-pw", "old-pw"]);
        assert_eq!(db.live_connections(), 1);
        won.connection.close().await;
        assert_eq!(db.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_current_preferred_over_previous() {
        let db = MemoryDatabase::new();
        db.set_login("app", "current-pw");
        let source = Fixed::new("pending-pw", "current-pw", Some("current-pw"));

        let won = arbitrate(&db, &source, "db-1", &ORDER).await.unwrap().unwrap();
        assert_eq!(won.matched, Stage::Current);
        assert_eq!(tried(&db).len(), 2);
        won.connection.close().await;
    }

    #[tokio::test]
    async fn test_undecodable_record_past_the_winner_is_ignored() {
        let db = MemoryDatabase::new();
        db.set_login("app", "current-pw");
        let source = Fixed::new("pending-pw", "current-pw", Some("!"));

        let won = arbitrate(&db, &source, "db-1", &ORDER).await.unwrap().unwrap();
        assert_eq!(won.matched, Stage::Current);
        won.connection.close().await;
    }

    #[tokio::test]
    async fn test_undecodable_record_fails_once_reached() {
        let db = MemoryDatabase::new();
        db.set_login("app", "unrelated");
        let source = Fixed::new("pending-pw", "current-pw", Some("!"));

        let err = arbitrate(&db, &source, "db-1", &ORDER).await.err().unwrap();
        assert!(matches!(err, RotationError::InvalidRecord { stage: Stage::Previous, .. }));
        assert_eq!(db.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_none_and_leaves_nothing_open() {
        let db = MemoryDatabase::new();
        db.set_login("app", "unrelated");
        let source = Fixed::new("a", "b", None);

        assert!(arbitrate(&db, &source, "db-1", &ORDER).await.unwrap().is_none());
        assert_eq!(tried(&db), vec!["a", "b"]);
        assert_eq!(db.opened(), 0);
    }
}
