use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use relaygraph_core::{
    CheckpointError, CheckpointInfo, CheckpointResult, CheckpointStore, SessionId, State,
};
use relaygraph_memory::InMemoryCheckpointStore;

/// Which operations of a [`FailingCheckpointStore`] fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Load,
    /// Saves succeed until `after` of them have gone through.
    Save { after: usize },
}

/// In-memory store that injects backend failures.
#[derive(Debug)]
pub struct FailingCheckpointStore {
    inner: InMemoryCheckpointStore,
    fail_on: FailOn,
    saves: AtomicUsize,
}

impl FailingCheckpointStore {
    pub fn new(fail_on: FailOn) -> Self {
        Self {
            inner: InMemoryCheckpointStore::new(),
            fail_on,
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of saves that went through.
    pub fn successful_saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn injected(op: &str) -> CheckpointError {
        CheckpointError::Backend(format!("injected {op} failure"))
    }
}

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    async fn load(&self, session: &SessionId) -> CheckpointResult<Option<State>> {
        if self.fail_on == FailOn::Load {
            return Err(Self::injected("load"));
        }
        self.inner.load(session).await
    }

    async fn save(&self, session: &SessionId, state: &State) -> CheckpointResult<()> {
        if let FailOn::Save { after } = self.fail_on {
            if self.saves.load(Ordering::SeqCst) >= after {
                return Err(Self::injected("save"));
            }
        }
        self.inner.save(session, state).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, session: &SessionId) -> CheckpointResult<bool> {
        self.inner.delete(session).await
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointInfo>> {
        self.inner.list().await
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fails_after_n_saves() {
        let store = FailingCheckpointStore::new(FailOn::Save { after: 1 });
        let session: SessionId = "s".parse().unwrap();

        store.save(&session, &State::new()).await.unwrap();
        assert!(store.save(&session, &State::new()).await.is_err());
        assert_eq!(store.successful_saves(), 1);
        assert!(store.load(&session).await.unwrap().is_some());
    }
}
