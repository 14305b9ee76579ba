use serde::Deserialize;
use serde_json::json;

use crate::events::{
    AgentErrorEvt, AgentProgressEvt, AgentResponseEvt, AgentStatusEvt, AgentThinkingEvt,
    ApprovalRequestEvt, ChatEvt, ErrorEvt, HeartbeatEvt, PingEvt, PongEvt, ServerEvent, SystemEvt,
    TaskCompleteEvt, TaskStartEvt, UnrecognizedEvt, WorkflowStatusEvt,
};
use crate::time::timestamp_now;

use super::messages::ClientCommand;

/// Maximum accepted frame size in bytes (either direction).
pub const MAX_FRAME_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyFrame,
    FrameTooLarge(usize),
    Malformed(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFrame => write!(f, "empty frame"),
            Self::FrameTooLarge(size) => {
                write!(f, "frame too large: {size} bytes (max {MAX_FRAME_SIZE})")
            },
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// One inbound frame as it appears on the wire, before typing.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    agent_name: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: String,
}

fn payload<T: Default + for<'de> Deserialize<'de>>(
    data: &Option<serde_json::Value>,
) -> Result<T, ProtocolError> {
    match data {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ProtocolError::Malformed(e.to_string())),
        None => Ok(T::default()),
    }
}

/// Decode one text frame into a typed event.
///
/// Unknown `type` values are not an error: they decode to
/// `ServerEvent::Unrecognized` so the dispatcher can log them. Only
/// structurally broken frames (bad JSON, oversized, missing `type`) fail.
pub fn decode_event(line: &str) -> Result<ServerEvent, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    if line.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(line.len()));
    }

    let frame: RawFrame =
        serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let agent = frame.agent_name.clone().unwrap_or_default();

    let event = match frame.kind.as_str() {
        "heartbeat" => ServerEvent::Heartbeat(HeartbeatEvt {
            timestamp: frame.timestamp,
        }),
        "ping" => ServerEvent::Ping(payload::<PingEvt>(&frame.data)?),
        "pong" => ServerEvent::Pong(payload::<PongEvt>(&frame.data)?),
        "agent_status" => {
            let mut evt = payload::<AgentStatusEvt>(&frame.data)?;
            evt.agent = agent;
            ServerEvent::AgentStatus(evt)
        },
        "agent_progress" => {
            let mut evt = payload::<AgentProgressEvt>(&frame.data)?;
            evt.agent = agent;
            ServerEvent::AgentProgress(evt)
        },
        "agent_thinking" => ServerEvent::AgentThinking(AgentThinkingEvt { agent }),
        "agent_response" => {
            let mut evt = payload::<AgentResponseEvt>(&frame.data)?;
            evt.agent = agent;
            if evt.content.is_empty()
                && let Some(content) = frame.content
            {
                evt.content = content;
            }
            ServerEvent::AgentResponse(evt)
        },
        "agent_error" => {
            let mut evt = payload::<AgentErrorEvt>(&frame.data)?;
            evt.agent = agent;
            ServerEvent::AgentError(evt)
        },
        "task_start" => {
            let mut evt = payload::<TaskStartEvt>(&frame.data)?;
            evt.agent = agent;
            ServerEvent::TaskStart(evt)
        },
        "task_complete" => {
            let mut evt = payload::<TaskCompleteEvt>(&frame.data)?;
            evt.agent = agent;
            ServerEvent::TaskComplete(evt)
        },
        "workflow_status" => ServerEvent::WorkflowStatus(payload::<WorkflowStatusEvt>(&frame.data)?),
        "system" => {
            let mut evt = payload::<SystemEvt>(&frame.data)?;
            if evt.message.is_empty()
                && let Some(content) = frame.content
            {
                evt.message = content;
            }
            ServerEvent::System(evt)
        },
        "error" => {
            let mut evt = payload::<ErrorEvt>(&frame.data)?;
            if evt.message.is_empty()
                && let Some(content) = frame.content
            {
                evt.message = content;
            }
            ServerEvent::Error(evt)
        },
        "chat" | "message" => ServerEvent::Chat(ChatEvt {
            agent: frame.agent_name,
            content: frame.content.unwrap_or_default(),
        }),
        "approval_request" => {
            let mut evt = payload::<ApprovalRequestEvt>(&frame.data)?;
            evt.agent = agent;
            ServerEvent::ApprovalRequest(evt)
        },
        _ => ServerEvent::Unrecognized(UnrecognizedEvt {
            kind: frame.kind.clone(),
            agent: frame.agent_name,
            data: frame.data,
        }),
    };
    Ok(event)
}

fn command_value(cmd: &ClientCommand) -> Result<serde_json::Value, ProtocolError> {
    let mut value = match cmd {
        ClientCommand::ListArtifacts => Ok(json!({})),
        ClientCommand::StartProject(c) => serde_json::to_value(c),
        ClientCommand::UserCommand(c) => serde_json::to_value(c),
        ClientCommand::Chat(c) => serde_json::to_value(c),
        ClientCommand::Ping(c) => serde_json::to_value(c),
        ClientCommand::Pong(c) => serde_json::to_value(c),
        ClientCommand::GateResponse(c) => serde_json::to_value(c),
    }
    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let obj = value
        .as_object_mut()
        .ok_or_else(|| ProtocolError::Malformed("command payload is not an object".to_string()))?;
    obj.insert("type".to_string(), json!(cmd.kind()));
    Ok(value)
}

/// Encode one command as a single text frame.
pub fn encode_command(cmd: &ClientCommand) -> Result<String, ProtocolError> {
    let mut value = command_value(cmd)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("timestamp".to_string(), json!(timestamp_now()));
    }
    finish_frame(value)
}

/// Encode a flushed batch: a single command goes out unwrapped, more than
/// one uses the `batch` envelope with the original order preserved.
pub fn encode_flush(commands: &[ClientCommand]) -> Result<String, ProtocolError> {
    match commands {
        [] => Err(ProtocolError::EmptyFrame),
        [single] => encode_command(single),
        many => {
            let messages = many
                .iter()
                .map(command_value)
                .collect::<Result<Vec<_>, _>>()?;
            finish_frame(json!({
                "type": "batch",
                "messages": messages,
                "timestamp": timestamp_now(),
            }))
        },
    }
}

fn finish_frame(value: serde_json::Value) -> Result<String, ProtocolError> {
    let text =
        serde_json::to_string(&value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(text)
}
