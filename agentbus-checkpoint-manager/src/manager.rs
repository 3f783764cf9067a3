//! [`CheckpointManager`]: the orchestration layer over a [`CheckpointStore`].

use std::sync::Arc;

use agentbus_checkpoint_store::{Checkpoint, CheckpointId, CheckpointStore};
use agentbus_common::agent::Agent;
use agentbus_tracing::traced;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    diff::VersionDiff,
    error::{CheckpointManagerError, Result},
};

struct AutoSaveLoop {
    thread_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives auto-save, rollback, and version-comparison on top of a bare
/// [`CheckpointStore`], the way a supervising loop would rather than leaving
/// every caller to reimplement "snapshot this agent every N seconds" by hand.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    auto_save: Mutex<Option<AutoSaveLoop>>,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager").finish_non_exhaustive()
    }
}

impl CheckpointManager {
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store, auto_save: Mutex::new(None) }
    }

    /// Save `checkpoint` as-is; the store assigns a version if it's `0`.
    #[traced]
    pub async fn save(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        Ok(self.store.save(checkpoint).await?)
    }

    #[traced]
    pub async fn load(&self, id: CheckpointId) -> Result<Checkpoint> {
        Ok(self.store.load(id).await?)
    }

    #[traced]
    pub async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        Ok(self.store.load_latest(thread_id).await?)
    }

    /// Restore `agent` to the state recorded in `checkpoint_id`.
    ///
    /// Fails if the checkpoint belongs to a different agent. If the agent
    /// doesn't support [`Agent::transition`] (returns `false`), this logs a
    /// warning rather than erroring — restoring state is advisory for an
    /// agent that can't be rewound.
    #[traced]
    pub async fn resume(&self, agent: &dyn Agent, checkpoint_id: CheckpointId) -> Result<Checkpoint> {
        let checkpoint = self.store.load(checkpoint_id).await?;
        if checkpoint.agent_id != agent.id() {
            return Err(CheckpointManagerError::AgentMismatch {
                agent_id: agent.id().to_string(),
                checkpoint_agent_id: checkpoint.agent_id.clone(),
            });
        }

        match agent.transition(checkpoint.state.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(agent_id = agent.id(), "agent does not support state transition, resume is a no-op");
            }
            Err(err) => return Err(CheckpointManagerError::TransitionFailed(err)),
        }

        Ok(checkpoint)
    }

    /// Snapshot `agent`'s current state into a new checkpoint for `thread_id`.
    #[traced]
    pub async fn create(&self, agent: &dyn Agent, thread_id: &str) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::new(thread_id, agent.id(), agent.state());
        Ok(self.store.save(checkpoint).await?)
    }

    /// Start a background loop that calls [`Self::create`] for `agent` on
    /// `thread_id` every `interval`, until [`Self::disable_auto_save`] is
    /// called or the manager is dropped.
    ///
    /// Only one auto-save loop may run per manager; calling this while one
    /// is already active fails rather than silently replacing it.
    ///
    /// # Errors
    /// Returns [`CheckpointManagerError::AutoSaveAlreadyRunning`] if a loop
    /// is already active.
    pub async fn enable_auto_save(
        self: &Arc<Self>,
        agent: Arc<dyn Agent>,
        thread_id: impl Into<String>,
        interval: std::time::Duration,
    ) -> Result<()> {
        let thread_id = thread_id.into();
        let mut slot = self.auto_save.lock().await;
        if let Some(existing) = slot.as_ref() {
            return Err(CheckpointManagerError::AutoSaveAlreadyRunning(existing.thread_id.clone()));
        }

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let manager = Arc::clone(self);
        let loop_thread_id = thread_id.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it, save on the first full interval
            loop {
                tokio::select! {
                    () = loop_cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        if let Err(err) = manager.create(agent.as_ref(), &loop_thread_id).await {
                            tracing::warn!(thread_id = %loop_thread_id, error = %err, "auto-save tick failed");
                        }
                    }
                }
            }
        });

        *slot = Some(AutoSaveLoop { thread_id, cancel, handle });
        Ok(())
    }

    /// Stop the running auto-save loop, if any.
    ///
    /// # Errors
    /// Returns [`CheckpointManagerError::AutoSaveNotRunning`] if no loop is active.
    pub async fn disable_auto_save(&self) -> Result<()> {
        let mut slot = self.auto_save.lock().await;
        let Some(running) = slot.take() else {
            return Err(CheckpointManagerError::AutoSaveNotRunning);
        };
        running.cancel.cancel();
        running.handle.abort();
        Ok(())
    }

    /// Roll `thread_id` back to `to_version`, restoring `agent`'s state from
    /// that version first (best-effort, same as [`Self::resume`]) before the
    /// store appends the new, higher-versioned checkpoint.
    #[traced]
    pub async fn rollback_to_version(&self, agent: &dyn Agent, thread_id: &str, to_version: u64) -> Result<Checkpoint> {
        let target = self.store.load_version(thread_id, to_version).await?;
        if target.agent_id == agent.id() {
            match agent.transition(target.state.clone()).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    agent_id = agent.id(),
                    version = to_version,
                    "agent does not support state transition during rollback"
                ),
                Err(err) => tracing::warn!(
                    agent_id = agent.id(),
                    version = to_version,
                    error = %err,
                    "agent state transition failed during rollback, proceeding with store rollback regardless"
                ),
            }
        }
        Ok(self.store.rollback(thread_id, to_version).await?)
    }

    /// Compare two versions of a thread's checkpoint history.
    #[traced]
    pub async fn compare_versions(&self, thread_id: &str, v1: u64, v2: u64) -> Result<VersionDiff> {
        let (old, new) = if v1 <= v2 {
            (self.store.load_version(thread_id, v1).await?, self.store.load_version(thread_id, v2).await?)
        } else {
            (self.store.load_version(thread_id, v2).await?, self.store.load_version(thread_id, v1).await?)
        };
        Ok(VersionDiff::compute(thread_id, &old, &new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbus_checkpoint_store::backends::MemoryCheckpointStore;
    use agentbus_common::{agent::AgentState, mock::MockAgent};

    fn manager() -> Arc<CheckpointManager> {
        Arc::new(CheckpointManager::new(Arc::new(MemoryCheckpointStore::new())))
    }

    #[tokio::test]
    async fn create_snapshots_current_agent_state() {
        let manager = manager();
        let agent = MockAgent::new("a1", ["hi"]);
        agent.transition(AgentState::Running).await.unwrap();

        let checkpoint = manager.create(&agent, "thread-1").await.unwrap();
        assert_eq!(checkpoint.version, 1);
        assert_eq!(checkpoint.state, AgentState::Running);
    }

    #[tokio::test]
    async fn resume_rejects_mismatched_agent() {
        let manager = manager();
        let owner = MockAgent::new("owner", ["hi"]);
        let checkpoint = manager.create(&owner, "thread-1").await.unwrap();

        let stranger = MockAgent::new("stranger", ["hi"]);
        let err = manager.resume(&stranger, checkpoint.id).await.unwrap_err();
        assert!(matches!(err, CheckpointManagerError::AgentMismatch { .. }));
    }

    #[tokio::test]
    async fn resume_transitions_agent_to_checkpointed_state() {
        let manager = manager();
        let agent = MockAgent::new("a1", ["hi"]);
        agent.transition(AgentState::Ready).await.unwrap();
        let checkpoint = manager.create(&agent, "thread-1").await.unwrap();

        agent.transition(AgentState::Idle).await.unwrap();
        manager.resume(&agent, checkpoint.id).await.unwrap();
        assert_eq!(agent.state(), AgentState::Ready);
    }

    #[tokio::test]
    async fn rollback_to_version_restores_agent_and_appends_history() {
        let manager = manager();
        let agent = MockAgent::new("a1", ["hi"]);
        agent.transition(AgentState::Init).await.unwrap();
        manager.create(&agent, "thread-1").await.unwrap();
        agent.transition(AgentState::Running).await.unwrap();
        manager.create(&agent, "thread-1").await.unwrap();

        let rolled_back = manager.rollback_to_version(&agent, "thread-1", 1).await.unwrap();
        assert_eq!(rolled_back.version, 3);
        assert_eq!(agent.state(), AgentState::Init);
        assert_eq!(rolled_back.rollback_from_version(), Some(1));
    }

    #[tokio::test]
    async fn compare_versions_reports_state_and_metadata_changes() {
        let manager = manager();
        let agent = MockAgent::new("a1", ["hi"]);
        agent.transition(AgentState::Init).await.unwrap();
        manager.create(&agent, "thread-1").await.unwrap();
        agent.transition(AgentState::Completed).await.unwrap();
        manager.create(&agent, "thread-1").await.unwrap();

        let diff = manager.compare_versions("thread-1", 1, 2).await.unwrap();
        assert!(diff.state_changed);
        assert_eq!(diff.old_state, AgentState::Init);
        assert_eq!(diff.new_state, AgentState::Completed);
    }

    #[tokio::test]
    async fn enable_auto_save_refuses_a_second_concurrent_loop() {
        let manager = manager();
        let agent: Arc<dyn Agent> = Arc::new(MockAgent::new("a1", ["hi"]));

        manager
            .enable_auto_save(Arc::clone(&agent), "thread-1", std::time::Duration::from_millis(20))
            .await
            .unwrap();
        let err = manager
            .enable_auto_save(Arc::clone(&agent), "thread-1", std::time::Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointManagerError::AutoSaveAlreadyRunning(_)));

        manager.disable_auto_save().await.unwrap();
    }

    #[tokio::test]
    async fn auto_save_loop_periodically_creates_checkpoints() {
        let manager = manager();
        let agent: Arc<dyn Agent> = Arc::new(MockAgent::new("a1", ["hi"]));

        manager
            .enable_auto_save(Arc::clone(&agent), "thread-1", std::time::Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(55)).await;
        manager.disable_auto_save().await.unwrap();

        let versions = manager.store.list_versions("thread-1").await.unwrap();
        assert!(versions.len() >= 2, "expected at least two auto-saved checkpoints, got {versions:?}");
    }
}
