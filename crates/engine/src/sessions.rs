//! Session routing: one pipeline per active session.
//!
//! A session's pipeline starts on first use (seeded from the snapshot store
//! or empty) and stops when the session ends, writing the final snapshot
//! back to the store.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use tablekeep_domain::{SessionId, SessionState};

use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::ports::RepoError;
use crate::pipeline::{PipelineDeps, PipelineError, PipelineHandle, SessionPipeline};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} is not active")]
    NotFound(SessionId),
    #[error("Snapshot store failed: {0}")]
    Store(#[from] RepoError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub struct SessionManager {
    sessions: DashMap<SessionId, PipelineHandle>,
    deps: PipelineDeps,
    config: PipelineConfig,
    /// Serializes pipeline start-up and shutdown so a session never runs two
    /// pipelines or resumes from a stale snapshot.
    start_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
            config,
            start_lock: Mutex::new(()),
        }
    }

    /// Handle of the running pipeline, starting one when needed.
    pub async fn get_or_start(&self, session_id: SessionId) -> Result<PipelineHandle, SessionError> {
        if let Some(handle) = self.get(session_id) {
            return Ok(handle);
        }

        let _guard = self.start_lock.lock().await;
        if let Some(handle) = self.get(session_id) {
            return Ok(handle);
        }

        let initial = match self.deps.snapshots.load(session_id).await? {
            Some(state) => {
                tracing::info!(session_id = %session_id, version = state.version, "Resuming session from snapshot");
                state
            }
            None => SessionState::new(session_id),
        };

        let handle = SessionPipeline::spawn(initial, self.deps.clone(), self.config.clone());
        self.sessions.insert(session_id, handle.clone());
        Ok(handle)
    }

    /// Running pipeline for a session, if any.
    pub fn get(&self, session_id: SessionId) -> Option<PipelineHandle> {
        let handle = self.sessions.get(&session_id)?.clone();
        if handle.is_closed() {
            self.sessions.remove(&session_id);
            return None;
        }
        Some(handle)
    }

    /// Stop a session's pipeline and persist its final state.
    ///
    /// Holds the start lock until the snapshot is saved, so a concurrent
    /// `get_or_start` resumes from the final state instead of an older one.
    pub async fn end_session(&self, session_id: SessionId) -> Result<Arc<SessionState>, SessionError> {
        let _guard = self.start_lock.lock().await;
        let (_, handle) = self
            .sessions
            .remove(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;

        let state = handle.shutdown().await?;
        self.deps.snapshots.save(&state).await?;
        tracing::info!(session_id = %session_id, version = state.version, "Session ended");
        Ok(state)
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// End every active session; failures are logged and skipped.
    pub async fn shutdown_all(&self) {
        for session_id in self.active_sessions() {
            if let Err(e) = self.end_session(session_id).await {
                tracing::error!(session_id = %session_id, error = %e, "Failed to end session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;

    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::ports::{MockSnapshotStore, SnapshotStore};
    use crate::infrastructure::snapshot_store::InMemorySnapshotStore;
    use crate::pipeline::testing::RecordingBroadcaster;
    use crate::pipeline::ActionOutcome;
    use crate::registry::{
        ActionHandler, ExecuteError, HandlerRegistration, HandlerRegistry, ValidationError,
    };
    use tablekeep_domain::{ActionId, ActionRequest, Document, ParticipantId, Submitter};

    const TICK: &str = "tick";

    /// Applies without touching the state; only the version moves.
    struct Tick;

    #[async_trait]
    impl ActionHandler for Tick {
        async fn validate(
            &self,
            _request: &ActionRequest,
            _state: &SessionState,
        ) -> Result<(), ValidationError> {
            Ok(())
        }

        async fn execute(
            &self,
            _request: &ActionRequest,
            _draft: &mut SessionState,
        ) -> Result<(), ExecuteError> {
            Ok(())
        }
    }

    /// In-memory store whose saves take a while to land.
    struct SlowSaveStore {
        inner: InMemorySnapshotStore,
        delay: Duration,
    }

    #[async_trait]
    impl SnapshotStore for SlowSaveStore {
        async fn load(&self, session_id: SessionId) -> Result<Option<SessionState>, RepoError> {
            self.inner.load(session_id).await
        }

        async fn save(&self, state: &SessionState) -> Result<(), RepoError> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(state).await
        }
    }

    fn manager(snapshots: Arc<dyn SnapshotStore>) -> SessionManager {
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register(TICK, HandlerRegistration::core(Arc::new(Tick)))
            .expect("register tick");
        let deps = PipelineDeps {
            registry,
            broadcaster: Arc::new(RecordingBroadcaster::new()),
            snapshots,
            clock: Arc::new(SystemClock),
        };
        SessionManager::new(deps, PipelineConfig::default())
    }

    #[tokio::test]
    async fn starts_once_per_session() {
        let sessions = manager(Arc::new(InMemorySnapshotStore::new()));
        let id = SessionId::new();

        let first = sessions.get_or_start(id).await.expect("start");
        let second = sessions.get_or_start(id).await.expect("reuse");

        assert!(Arc::ptr_eq(&first.snapshot(), &second.snapshot()));
        assert_eq!(sessions.active_sessions(), vec![id]);
        assert_eq!(first.snapshot().version, 0);
    }

    #[tokio::test]
    async fn resumes_from_stored_snapshot() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let id = SessionId::new();
        let mut saved = SessionState::new(id).with_document(Document::new("character", "Ranger"));
        saved.version = 7;
        store.insert(saved.clone());

        let sessions = manager(store);
        let handle = sessions.get_or_start(id).await.expect("start");
        assert_eq!(*handle.snapshot(), saved);
    }

    #[tokio::test]
    async fn end_session_persists_and_forgets() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let sessions = manager(store.clone());
        let id = SessionId::new();
        let handle = sessions.get_or_start(id).await.expect("start");

        let state = sessions.end_session(id).await.expect("end");
        assert_eq!(state.session_id, id);
        assert!(sessions.get(id).is_none());
        assert!(handle.shutdown().await.is_err());
        assert_eq!(
            store.load(id).await.expect("load").map(|s| s.session_id),
            Some(id)
        );

        assert!(matches!(
            sessions.end_session(id).await,
            Err(SessionError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn load_failure_surfaces_as_store_error() {
        let mut store = MockSnapshotStore::new();
        store
            .expect_load()
            .returning(|_| Err(RepoError::storage("load", "disk on fire")));

        let sessions = manager(Arc::new(store));
        let result = sessions.get_or_start(SessionId::new()).await;
        assert!(matches!(result, Err(SessionError::Store(_))));
        assert!(sessions.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn rejoin_during_end_resumes_from_final_state() {
        let store = Arc::new(SlowSaveStore {
            inner: InMemorySnapshotStore::new(),
            delay: Duration::from_millis(50),
        });
        let sessions = Arc::new(manager(store.clone()));
        let id = SessionId::new();
        let handle = sessions.get_or_start(id).await.expect("start");

        let leader = Submitter::leader(ParticipantId::new());
        for _ in 0..5 {
            let request = ActionRequest::new(ActionId::new(), TICK, leader, Value::Null, Utc::now());
            let outcome = handle.submit(request).await.expect("submit");
            assert!(matches!(outcome, ActionOutcome::Applied { .. }));
        }
        assert_eq!(handle.snapshot().version, 5);

        let ending = {
            let sessions = sessions.clone();
            tokio::spawn(async move { sessions.end_session(id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let rejoined = sessions.get_or_start(id).await.expect("rejoin");
        let ended = ending.await.expect("join end task").expect("end");

        assert_eq!(ended.version, 5);
        assert_eq!(rejoined.snapshot().version, 5);
        assert_eq!(
            store.load(id).await.expect("load").map(|s| s.version),
            Some(5)
        );
    }
}
