use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A decoded inbound event from the orchestration backend.
///
/// The wire carries an open set of `type` strings; everything the deck
/// understands gets its own variant, and anything else lands in
/// `Unrecognized` so it stays visible to the dispatcher instead of being
/// silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Heartbeat(HeartbeatEvt),
    Ping(PingEvt),
    Pong(PongEvt),
    AgentStatus(AgentStatusEvt),
    AgentProgress(AgentProgressEvt),
    AgentThinking(AgentThinkingEvt),
    AgentResponse(AgentResponseEvt),
    AgentError(AgentErrorEvt),
    TaskStart(TaskStartEvt),
    TaskComplete(TaskCompleteEvt),
    WorkflowStatus(WorkflowStatusEvt),
    System(SystemEvt),
    Error(ErrorEvt),
    Chat(ChatEvt),
    ApprovalRequest(ApprovalRequestEvt),
    Unrecognized(UnrecognizedEvt),
}

impl ServerEvent {
    /// The wire `type` string this event decoded from.
    pub fn kind(&self) -> &str {
        match self {
            Self::Heartbeat(_) => "heartbeat",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::AgentStatus(_) => "agent_status",
            Self::AgentProgress(_) => "agent_progress",
            Self::AgentThinking(_) => "agent_thinking",
            Self::AgentResponse(_) => "agent_response",
            Self::AgentError(_) => "agent_error",
            Self::TaskStart(_) => "task_start",
            Self::TaskComplete(_) => "task_complete",
            Self::WorkflowStatus(_) => "workflow_status",
            Self::System(_) => "system",
            Self::Error(_) => "error",
            Self::Chat(_) => "chat",
            Self::ApprovalRequest(_) => "approval_request",
            Self::Unrecognized(evt) => &evt.kind,
        }
    }

    /// The agent this event is scoped to, if any.
    pub fn agent_name(&self) -> Option<&str> {
        match self {
            Self::AgentStatus(e) => Some(&e.agent),
            Self::AgentProgress(e) => Some(&e.agent),
            Self::AgentThinking(e) => Some(&e.agent),
            Self::AgentResponse(e) => Some(&e.agent),
            Self::AgentError(e) => Some(&e.agent),
            Self::TaskStart(e) => Some(&e.agent),
            Self::TaskComplete(e) => Some(&e.agent),
            Self::ApprovalRequest(e) => Some(&e.agent),
            Self::Chat(e) => e.agent.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HeartbeatEvt {
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PingEvt {
    #[serde(default)]
    pub nonce: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PongEvt {
    #[serde(default)]
    pub nonce: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentStatusEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentProgressEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentThinkingEvt {
    #[serde(skip)]
    pub agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentResponseEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentErrorEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskStartEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskCompleteEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub task: Option<String>,
    /// Wall-clock duration the backend reports for the finished task.
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowStatusEvt {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SystemEvt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorEvt {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatEvt {
    #[serde(skip)]
    pub agent: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApprovalRequestEvt {
    #[serde(skip)]
    pub agent: String,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// An event whose `type` the deck does not know. Kept whole so the
/// dispatcher can log it; the protocol is expected to grow on the
/// backend side independently of this client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnrecognizedEvt {
    pub kind: String,
    pub agent: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// Priority tiers for HITL approval gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl GatePriority {
    /// Lenient parse from a wire string; unknown values fall back to Medium.
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Medium,
        }
    }
}
