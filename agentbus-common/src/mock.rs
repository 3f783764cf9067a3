//! Test doubles shared across the workspace's integration tests.
//!
//! Mirrors the reference crate's `spool::MockController`: an `Arc<Mutex<Vec<_>>>`
//! plus a `tokio::sync::Notify` so concurrency-sensitive tests can await a
//! condition ("N events recorded") instead of sleeping and hoping.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::agent::{Agent, AgentInput, AgentOutput, AgentState};

/// A scripted agent for coordinator tests: returns a fixed output (or error)
/// for each call, in order, repeating the last entry once the script is exhausted.
#[derive(Debug)]
pub struct MockAgent {
    id: String,
    script: Mutex<Vec<MockStep>>,
    calls: Arc<Mutex<u32>>,
    state: Mutex<AgentState>,
}

#[derive(Debug, Clone)]
enum MockStep {
    Output(AgentOutput),
    Error(String),
}

impl MockAgent {
    #[must_use]
    pub fn new(id: impl Into<String>, replies: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| MockStep::Output(AgentOutput::new(r)))
                    .collect(),
            ),
            calls: Arc::new(Mutex::new(0)),
            state: Mutex::new(AgentState::Idle),
        }
    }

    /// Build an agent whose single scripted reply is an error.
    #[must_use]
    pub fn failing(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(vec![MockStep::Error(message.into())]),
            calls: Arc::new(Mutex::new(0)),
            state: Mutex::new(AgentState::Idle),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("MockAgent calls mutex poisoned")
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, input: AgentInput) -> anyhow::Result<AgentOutput> {
        *self.calls.lock().expect("MockAgent calls mutex poisoned") += 1;

        let mut script = self.script.lock().expect("MockAgent script mutex poisoned");
        let step = if script.len() > 1 {
            script.remove(0)
        } else {
            script
                .first()
                .cloned()
                .unwrap_or_else(|| MockStep::Output(AgentOutput::default()))
        };

        match step {
            MockStep::Output(mut out) => {
                out.trace_id = input.trace_id;
                Ok(out)
            }
            MockStep::Error(message) => Err(anyhow::anyhow!(message)),
        }
    }

    fn state(&self) -> AgentState {
        self.state.lock().expect("MockAgent state mutex poisoned").clone()
    }

    async fn transition(&self, new_state: AgentState) -> anyhow::Result<bool> {
        *self.state.lock().expect("MockAgent state mutex poisoned") = new_state;
        Ok(true)
    }
}

/// Records every message handed to it and lets a test await a specific count
/// instead of sleeping, the way the reference crate's `spool::MockController` does
/// for spooled messages.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder<T> {
    events: Arc<Mutex<Vec<T>>>,
    notify: Arc<Notify>,
}

impl<T: Clone + Send + 'static> EventRecorder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// # Panics
    /// Panics if the mutex is poisoned.
    pub fn record(&self, event: T) {
        self.events
            .lock()
            .expect("EventRecorder mutex poisoned")
            .push(event);
        self.notify.notify_waiters();
    }

    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<T> {
        self.events.lock().expect("EventRecorder mutex poisoned").clone()
    }

    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().expect("EventRecorder mutex poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `expected` events have been recorded, or `timeout` elapses.
    ///
    /// # Errors
    /// Returns an error if the timeout elapses first.
    pub async fn wait_for_count(
        &self,
        expected: usize,
        timeout: std::time::Duration,
    ) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.len() >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_agent_cycles_through_script() {
        let agent = MockAgent::new("a1", ["first", "second"]);
        let out1 = agent.execute(AgentInput::new("q")).await.unwrap();
        assert_eq!(out1.content, "first");
        let out2 = agent.execute(AgentInput::new("q")).await.unwrap();
        assert_eq!(out2.content, "second");
        let out3 = agent.execute(AgentInput::new("q")).await.unwrap();
        assert_eq!(out3.content, "second");
        assert_eq!(agent.call_count(), 3);
    }

    #[tokio::test]
    async fn mock_agent_failing_returns_error() {
        let agent = MockAgent::failing("b1", "stage 2 failed");
        let err = agent.execute(AgentInput::new("q")).await.unwrap_err();
        assert!(err.to_string().contains("stage 2 failed"));
    }

    #[tokio::test]
    async fn event_recorder_wait_for_count() {
        let recorder: EventRecorder<u32> = EventRecorder::new();
        let r2 = recorder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            r2.record(1);
            r2.record(2);
        });
        recorder
            .wait_for_count(2, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(recorder.events(), vec![1, 2]);
    }
}
