//! SQLite checkpoint store (WAL mode, one row per session).

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaygraph_core::{
    CheckpointError, CheckpointInfo, CheckpointResult, CheckpointStore, SessionId, State,
};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    session_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    history_len INTEGER NOT NULL,
    updated_at TEXT NOT NULL
)";

fn backend_error(err: rusqlite::Error) -> CheckpointError {
    CheckpointError::Backend(err.to_string())
}

/// Checkpoints kept in a single SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> CheckpointResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(backend_error)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
            .map_err(backend_error)?;
        info!(path = %path.display(), "Opened sqlite checkpoint store");
        Self::init(conn)
    }

    /// A private in-memory database, mainly for tests.
    pub fn in_memory() -> CheckpointResult<Self> {
        Self::init(Connection::open_in_memory().map_err(backend_error)?)
    }

    fn init(conn: Connection) -> CheckpointResult<Self> {
        conn.execute(SCHEMA, []).map_err(backend_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> CheckpointResult<T>
    where
        F: FnOnce(&Connection) -> CheckpointResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CheckpointError::Backend("sqlite connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| CheckpointError::Backend(format!("task join error: {e}")))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, session: &SessionId) -> CheckpointResult<Option<State>> {
        let key = session.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT state FROM checkpoints WHERE session_id = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend_error)
            })
            .await?;
        raw.map(|text| serde_json::from_str(&text).map_err(CheckpointError::from))
            .transpose()
    }

    async fn save(&self, session: &SessionId, state: &State) -> CheckpointResult<()> {
        let key = session.to_string();
        let text = serde_json::to_string(state)?;
        let history_len = state.history().len() as i64;
        let updated_at = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (session_id, state, history_len, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                    state = excluded.state,
                    history_len = excluded.history_len,
                    updated_at = excluded.updated_at",
                params![key, text, history_len, updated_at],
            )
            .map_err(backend_error)?;
            Ok(())
        })
        .await?;
        debug!(session = %session, "Saved checkpoint to sqlite");
        Ok(())
    }

    async fn delete(&self, session: &SessionId) -> CheckpointResult<bool> {
        let key = session.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute("DELETE FROM checkpoints WHERE session_id = ?1", params![key])
                .map_err(backend_error)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointInfo>> {
        let rows: Vec<(String, String, i64)> = self
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT session_id, updated_at, history_len FROM checkpoints")
                    .map_err(backend_error)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                    .map_err(backend_error)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(backend_error)?;
                Ok(rows)
            })
            .await?;

        let mut infos = Vec::with_capacity(rows.len());
        for (session_id, updated_at, history_len) in rows {
            let session_id = SessionId::new(&session_id)
                .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|e| CheckpointError::Serialization(e.to_string()))?
                .with_timezone(&Utc);
            infos.push(CheckpointInfo {
                session_id,
                updated_at,
                history_len: history_len as usize,
            });
        }
        crate::sort_most_recent_first(&mut infos);
        Ok(infos)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_core::Message;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let session: SessionId = "abc".parse().unwrap();
        let state = State::from_message(Message::user("설치 오류"))
            .with_field("resolution_status", "failed");

        store.save(&session, &state).await.unwrap();
        assert_eq!(store.load(&session).await.unwrap(), Some(state.clone()));

        let longer = state.with_message(Message::assistant("재설치 안내"));
        store.save(&session, &longer).await.unwrap();
        assert_eq!(store.load(&session).await.unwrap(), Some(longer));

        let infos = store.list().await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].history_len, 2);

        assert!(store.delete(&session).await.unwrap());
        assert_eq!(store.load(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_real_values_reload_exactly() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let session: SessionId = "sales".parse().unwrap();
        let state = State::new().with_field("average", -1.81996730402717e-179);

        store.save(&session, &state).await.unwrap();
        assert_eq!(store.load(&session).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_persists_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");
        let session: SessionId = "disk".parse().unwrap();
        let state = State::from_message(Message::user("hello"));

        SqliteCheckpointStore::open(&path)
            .unwrap()
            .save(&session, &state)
            .await
            .unwrap();

        let reopened = SqliteCheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.load(&session).await.unwrap(), Some(state));
    }
}
