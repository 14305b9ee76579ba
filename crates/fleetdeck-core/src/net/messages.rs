use serde::Serialize;
use serde_json::{Map, Value};

/// An outbound command from the deck to the orchestration backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    StartProject(StartProjectCmd),
    UserCommand(UserCommandCmd),
    Chat(ChatCmd),
    /// Full-resync request sent after every successful (re)connect.
    ListArtifacts,
    Ping(PingCmd),
    Pong(PongCmd),
    GateResponse(GateResponseCmd),
}

impl ClientCommand {
    /// The wire `type` string this command encodes to.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartProject(_) => "start_project",
            Self::UserCommand(_) => "user_command",
            Self::Chat(_) => "chat",
            Self::ListArtifacts => "list_artifacts",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::GateResponse(_) => "hitl_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartProjectCmd {
    pub brief: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserCommandCmd {
    pub command: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCmd {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingCmd {
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongCmd {
    pub nonce: u64,
}

/// A human decision on a HITL gate, pushed back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResponseCmd {
    pub request_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}
