//! JSON-file checkpoint store: one file per session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaygraph_core::{
    CheckpointError, CheckpointInfo, CheckpointResult, CheckpointStore, SessionId, State,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// On-disk envelope around a persisted state.
#[derive(Debug, Serialize, Deserialize)]
struct Persisted {
    session_id: SessionId,
    updated_at: DateTime<Utc>,
    state: State,
}

/// Stores each session as `<directory>/<session-id>.json`.
///
/// Writes go to a temporary file that is renamed over the previous
/// checkpoint, so a crash mid-write leaves the old checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    /// Creates the directory if it doesn't exist.
    pub fn new(directory: impl Into<PathBuf>) -> CheckpointResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        info!(directory = %directory.display(), "Opened file checkpoint store");
        Ok(Self { directory })
    }

    pub fn shared(directory: impl Into<PathBuf>) -> CheckpointResult<Arc<Self>> {
        Ok(Arc::new(Self::new(directory)?))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn session_path(&self, session: &SessionId) -> PathBuf {
        self.directory.join(format!("{session}.json"))
    }
}

async fn blocking<T, F>(f: F) -> CheckpointResult<T>
where
    F: FnOnce() -> CheckpointResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CheckpointError::Backend(format!("task join error: {e}")))?
}

fn read_persisted(path: &Path) -> CheckpointResult<Option<Persisted>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, session: &SessionId) -> CheckpointResult<Option<State>> {
        let path = self.session_path(session);
        let persisted = blocking(move || read_persisted(&path)).await?;
        Ok(persisted.map(|p| p.state))
    }

    async fn save(&self, session: &SessionId, state: &State) -> CheckpointResult<()> {
        let path = self.session_path(session);
        let content = serde_json::to_string_pretty(&Persisted {
            session_id: session.clone(),
            updated_at: Utc::now(),
            state: state.clone(),
        })?;

        let temp_path = path.with_extension("json.tmp");
        let target = path.clone();
        blocking(move || {
            std::fs::write(&temp_path, &content)?;
            std::fs::rename(&temp_path, &target)?;
            Ok(())
        })
        .await?;

        debug!(session = %session, path = %path.display(), "Saved checkpoint to file");
        Ok(())
    }

    async fn delete(&self, session: &SessionId) -> CheckpointResult<bool> {
        let path = self.session_path(session);
        blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointInfo>> {
        let directory = self.directory.clone();
        let mut infos = blocking(move || {
            let mut infos = Vec::new();
            for entry in std::fs::read_dir(&directory)?.flatten() {
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                match read_persisted(&path) {
                    Ok(Some(p)) => infos.push(CheckpointInfo {
                        session_id: p.session_id,
                        updated_at: p.updated_at,
                        history_len: p.state.history().len(),
                    }),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                    }
                }
            }
            Ok(infos)
        })
        .await?;
        crate::sort_most_recent_first(&mut infos);
        Ok(infos)
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
