use serde::{Deserialize, Serialize};

/// Bound on the retained chat transcript.
const MAX_CHAT_MESSAGES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub agent: Option<String>,
    pub content: String,
    pub timestamp: String,
}

/// The chat transcript. A thin consumer of the event stream; bounded the
/// same way the logbook is.
#[derive(Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: ChatRole, agent: Option<String>, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            agent,
            content: content.into(),
            timestamp: crate::time::timestamp_now(),
        });
        if self.messages.len() > MAX_CHAT_MESSAGES {
            let excess = self.messages.len() - MAX_CHAT_MESSAGES;
            self.messages.drain(..excess);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// The five pipeline stages every project moves through.
pub const STAGES: [&str; 5] = ["requirements", "design", "build", "test", "deploy"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl StageStatus {
    fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "active" | "started" => Some(Self::InProgress),
            "complete" | "completed" | "done" => Some(Self::Complete),
            "failed" | "error" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageState {
    pub name: String,
    pub status: StageStatus,
    pub progress: f64,
}

/// Per-stage progress of the running process, driven by `workflow_status`
/// events.
pub struct StageTracker {
    stages: Vec<StageState>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            stages: STAGES
                .iter()
                .map(|name| StageState {
                    name: name.to_string(),
                    status: StageStatus::Pending,
                    progress: 0.0,
                })
                .collect(),
        }
    }

    pub fn stages(&self) -> &[StageState] {
        &self.stages
    }

    /// Apply a workflow update. Unknown stage names are ignored.
    pub fn apply(&mut self, stage: &str, status: Option<&str>, progress: Option<f64>) {
        let Some(state) = self
            .stages
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(stage))
        else {
            tracing::debug!(stage, "workflow update for unknown stage ignored");
            return;
        };
        if let Some(status) = status.and_then(StageStatus::from_wire) {
            state.status = status;
            if status == StageStatus::Complete {
                state.progress = 100.0;
            }
        }
        if let Some(progress) = progress {
            state.progress = progress.clamp(0.0, 100.0);
        }
    }

    /// Overall pipeline completion, 0-100.
    pub fn overall_progress(&self) -> f64 {
        if self.stages.is_empty() {
            return 0.0;
        }
        self.stages.iter().map(|s| s.progress).sum::<f64>() / self.stages.len() as f64
    }
}
