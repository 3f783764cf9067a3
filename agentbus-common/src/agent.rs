//! The capability set the core depends on.
//!
//! The bus, stores, and coordinators never see a concrete agent
//! implementation — only this narrow interface. Represent agents as a
//! variant or a dispatch table, not an inheritance hierarchy: reflection,
//! tool selection, memory, and observability are solved at the framework
//! layer and are deliberately absent here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A snapshot-able agent state tag.
///
/// Named variants cover the common lifecycle; `Custom` lets a host
/// application attach a domain-specific tag without forking this enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Init,
    Running,
    Waiting,
    Ready,
    Completed,
    Failed,
    Custom(String),
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Init => write!(f, "init"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Ready => write!(f, "ready"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Custom(tag) => write!(f, "{tag}"),
        }
    }
}

impl std::str::FromStr for AgentState {
    type Err = std::convert::Infallible;

    /// The inverse of `Display`: round-trips through a plain string column
    /// (Postgres `state TEXT`) without losing a named variant to `Custom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "idle" => Self::Idle,
            "init" => Self::Init,
            "running" => Self::Running,
            "waiting" => Self::Waiting,
            "ready" => Self::Ready,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// Input handed to `Agent::execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInput {
    pub content: String,
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
    /// Preserved verbatim across pipeline stages so a caller can correlate a
    /// whole pipeline run from any one stage's input/output.
    pub trace_id: Option<String>,
}

impl AgentInput {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            payload: BTreeMap::new(),
            trace_id: None,
        }
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Output produced by `Agent::execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOutput {
    pub content: String,
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
    pub trace_id: Option<String>,
}

impl AgentOutput {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            payload: BTreeMap::new(),
            trace_id: None,
        }
    }
}

/// The opaque entity coordinators and the hub operate on.
///
/// `execute` is the only operation that matters to a coordinator. `state`
/// lets a checkpoint manager snapshot the agent; `transition` is an optional
/// capability — agents that don't support being restored to a prior state
/// simply keep the default no-op, and callers are expected to check the
/// return value rather than assume support.
#[async_trait]
pub trait Agent: Send + Sync + std::fmt::Debug {
    /// Stable identifier used as mailbox key and checkpoint `agent_id`.
    fn id(&self) -> &str;

    /// Run the agent on `input`, producing its contribution to a collaboration round.
    ///
    /// # Errors
    /// Returns an error if the agent's underlying work fails. The error is
    /// opaque to the core; coordinators propagate it unchanged.
    async fn execute(&self, input: AgentInput) -> anyhow::Result<AgentOutput>;

    /// The agent's current state, captured into a checkpoint by the checkpoint manager.
    fn state(&self) -> AgentState;

    /// Restore the agent to `new_state`, if supported.
    ///
    /// Returns `true` if the agent applied the transition, `false` if the
    /// capability is unsupported (the default). Callers should log a warning
    /// on `false` rather than treat it as an error.
    ///
    /// # Errors
    /// Returns an error if the agent supports transitioning but the specific
    /// transition failed.
    async fn transition(&self, new_state: AgentState) -> anyhow::Result<bool> {
        let _ = new_state;
        Ok(false)
    }
}
