//! # relaygraph-memory
//!
//! [`CheckpointStore`] backends:
//!
//! - [`InMemoryCheckpointStore`]: process-local, for tests and throwaway sessions
//! - [`FileCheckpointStore`]: one JSON file per session
//! - `SqliteCheckpointStore`: a single SQLite database (feature `sqlite`)
//!
//! [`open_store`] picks a backend from the `[checkpoint]` config section.

use std::sync::Arc;

use relaygraph_core::config::{CheckpointBackend, CheckpointConfig};
use relaygraph_core::{CheckpointInfo, CheckpointResult, CheckpointStore};

pub mod file;
pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

/// Open the store described by `config`.
pub fn open_store(config: &CheckpointConfig) -> CheckpointResult<Arc<dyn CheckpointStore>> {
    match config.backend {
        CheckpointBackend::Memory => Ok(InMemoryCheckpointStore::shared()),
        CheckpointBackend::File => Ok(FileCheckpointStore::shared(&config.path)?),
        #[cfg(feature = "sqlite")]
        CheckpointBackend::Sqlite => Ok(Arc::new(SqliteCheckpointStore::open(&config.path)?)),
        #[cfg(not(feature = "sqlite"))]
        CheckpointBackend::Sqlite => Err(relaygraph_core::CheckpointError::Backend(
            "sqlite checkpoints require the `sqlite` feature".to_string(),
        )),
    }
}

pub(crate) fn sort_most_recent_first(infos: &mut [CheckpointInfo]) {
    infos.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_open_store_by_backend() {
        let dir = tempfile::tempdir().unwrap();

        let memory = open_store(&CheckpointConfig {
            backend: CheckpointBackend::Memory,
            path: PathBuf::new(),
        })
        .unwrap();
        assert_eq!(memory.backend(), "memory");

        let file = open_store(&CheckpointConfig {
            backend: CheckpointBackend::File,
            path: dir.path().join("sessions"),
        })
        .unwrap();
        assert_eq!(file.backend(), "file");
        assert!(dir.path().join("sessions").is_dir());
    }
}
