use serde_json::Map;

use crate::config::DeckConfig;
use crate::convo::{ChatLog, ChatRole, StageTracker};
use crate::events::{GatePriority, ServerEvent};
use crate::fleet::FleetStore;
use crate::hitl::{GateDecision, GateStore};
use crate::logbook::{LogDraft, LogLevel, LogSource, LogStore};
use crate::net::messages::{
    ChatCmd, ClientCommand, GateResponseCmd, StartProjectCmd, UserCommandCmd,
};
use crate::persist::{Persistor, StorageBackend};
use crate::transport::{SocketDriver, SocketEvent, TimerState, TransportManager};

/// The deck: every store, the transport, and the persistence layer in one
/// explicitly-constructed container. Nothing in this crate is reachable
/// as module-level mutable state; whoever needs the deck gets it passed in.
pub struct Deck<S: SocketDriver, P: StorageBackend> {
    transport: TransportManager<S>,
    fleet: FleetStore,
    logbook: LogStore,
    gates: GateStore,
    chat: ChatLog,
    stages: StageTracker,
    persistor: Persistor<P>,
    persist_timer: TimerState,
    cfg: DeckConfig,
}

impl<S: SocketDriver, P: StorageBackend> Deck<S, P> {
    /// Build the deck and rehydrate whatever earlier sessions left behind.
    pub fn new(cfg: DeckConfig, driver: S, storage: P, now_ms: f64) -> Self {
        let transport = TransportManager::new(cfg.transport.clone(), driver);
        let mut fleet = FleetStore::new(&cfg.fleet.roster, now_ms);
        let mut logbook = LogStore::new(cfg.logbook.clone());
        let mut gates = GateStore::new();
        let persistor = Persistor::new(storage, &cfg.persistence.key_prefix);

        if cfg.persistence.enabled {
            if let Some(agents) = persistor.load_fleet() {
                fleet.restore(agents, now_ms);
            }
            if let Some(history) = persistor.load_gates() {
                gates.restore(history);
            }
            if let Some(tail) = persistor.load_log_tail() {
                logbook.restore(tail, now_ms);
            }
        }

        let mut deck = Self {
            transport,
            fleet,
            logbook,
            gates,
            chat: ChatLog::new(),
            stages: StageTracker::new(),
            persistor,
            persist_timer: TimerState::Idle,
            cfg,
        };
        deck.persist_timer
            .arm(now_ms + deck.cfg.persistence.save_interval_ms as f64);
        deck
    }

    // ---- read access -------------------------------------------------

    pub fn transport(&self) -> &TransportManager<S> {
        &self.transport
    }

    pub fn fleet(&self) -> &FleetStore {
        &self.fleet
    }

    pub fn logbook(&self) -> &LogStore {
        &self.logbook
    }

    pub fn gates(&self) -> &GateStore {
        &self.gates
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn stages(&self) -> &StageTracker {
        &self.stages
    }

    pub fn storage(&self) -> &P {
        self.persistor.backend()
    }

    // ---- socket plumbing ---------------------------------------------

    /// Feed one drained socket event through the deck. A fault in any one
    /// event must never block the events behind it, so every failure path
    /// ends in a log entry rather than an early return to the caller.
    pub fn handle_socket_event(&mut self, event: SocketEvent, now_ms: f64) {
        match event {
            SocketEvent::Frame(line) => match self.transport.handle_frame(&line, now_ms) {
                Ok(event) => self.dispatch(event, now_ms),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed frame");
                    self.logbook.ingest(
                        LogDraft::new(
                            LogSource::Websocket,
                            LogLevel::Warning,
                            format!("dropped malformed frame: {e}"),
                        ),
                        now_ms,
                    );
                },
            },
            SocketEvent::Opened => {
                self.transport.handle_socket_event(&SocketEvent::Opened, now_ms);
                self.logbook.ingest(
                    LogDraft::new(LogSource::Websocket, LogLevel::Success, "connection established"),
                    now_ms,
                );
            },
            SocketEvent::Closed { clean, ref reason } => {
                self.transport.handle_socket_event(&event, now_ms);
                let detail = reason.clone().unwrap_or_else(|| "no reason given".to_string());
                let level = if clean { LogLevel::Info } else { LogLevel::Warning };
                self.logbook.ingest(
                    LogDraft::new(LogSource::Websocket, level, format!("connection closed: {detail}")),
                    now_ms,
                );
            },
            SocketEvent::Errored(ref msg) => {
                self.transport.handle_socket_event(&event, now_ms);
                self.logbook.ingest(
                    LogDraft::new(
                        LogSource::Websocket,
                        LogLevel::Error,
                        format!("connection error: {msg}"),
                    ),
                    now_ms,
                );
            },
        }
    }

    /// The single dispatcher: every decoded event lands here exactly once.
    fn dispatch(&mut self, event: ServerEvent, now_ms: f64) {
        match &event {
            ServerEvent::Heartbeat(_) | ServerEvent::Ping(_) | ServerEvent::Pong(_) => {
                // Liveness traffic; the transport already did the work.
            },
            ServerEvent::AgentStatus(evt) => {
                self.fleet.apply_event(&event, now_ms);
                self.logbook.ingest(
                    LogDraft::new(
                        LogSource::Agent,
                        LogLevel::Info,
                        format!(
                            "status changed to {}",
                            evt.status.as_deref().unwrap_or("unknown")
                        ),
                    )
                    .agent(&evt.agent),
                    now_ms,
                );
            },
            ServerEvent::AgentProgress(_) | ServerEvent::AgentThinking(_) => {
                // High-frequency updates; they mutate the fleet but are too
                // noisy for the logbook.
                self.fleet.apply_event(&event, now_ms);
            },
            ServerEvent::AgentResponse(evt) => {
                self.fleet.apply_event(&event, now_ms);
                if !evt.content.is_empty() {
                    self.chat
                        .push(ChatRole::Agent, Some(evt.agent.clone()), evt.content.clone());
                }
            },
            ServerEvent::AgentError(evt) => {
                self.fleet.apply_event(&event, now_ms);
                self.logbook.ingest(
                    LogDraft::new(LogSource::Agent, LogLevel::Error, evt.message.clone())
                        .agent(&evt.agent),
                    now_ms,
                );
            },
            ServerEvent::TaskStart(evt) => {
                self.fleet.apply_event(&event, now_ms);
                self.logbook.ingest(
                    LogDraft::new(
                        LogSource::Agent,
                        LogLevel::Info,
                        format!("task started: {}", evt.task.as_deref().unwrap_or("unnamed")),
                    )
                    .agent(&evt.agent),
                    now_ms,
                );
            },
            ServerEvent::TaskComplete(evt) => {
                self.fleet.apply_event(&event, now_ms);
                self.logbook.ingest(
                    LogDraft::new(
                        LogSource::Agent,
                        LogLevel::Success,
                        format!("task complete: {}", evt.task.as_deref().unwrap_or("unnamed")),
                    )
                    .agent(&evt.agent),
                    now_ms,
                );
            },
            ServerEvent::WorkflowStatus(evt) => {
                if let Some(ref stage) = evt.stage {
                    self.stages.apply(stage, evt.status.as_deref(), evt.progress);
                }
                if let Some(ref message) = evt.message {
                    self.logbook.ingest(
                        LogDraft::new(LogSource::System, LogLevel::Info, message.clone())
                            .category("workflow"),
                        now_ms,
                    );
                }
            },
            ServerEvent::System(evt) => {
                let level = evt
                    .level
                    .as_deref()
                    .map(LogLevel::from_wire)
                    .unwrap_or(LogLevel::Info);
                self.logbook.ingest(
                    LogDraft::new(LogSource::System, level, evt.message.clone()),
                    now_ms,
                );
            },
            ServerEvent::Error(evt) => {
                self.logbook.ingest(
                    LogDraft::new(LogSource::Websocket, LogLevel::Error, evt.message.clone()),
                    now_ms,
                );
            },
            ServerEvent::Chat(evt) => {
                let role = if evt.agent.is_some() {
                    ChatRole::Agent
                } else {
                    ChatRole::System
                };
                self.chat.push(role, evt.agent.clone(), evt.content.clone());
            },
            ServerEvent::ApprovalRequest(evt) => {
                let priority = evt
                    .priority
                    .as_deref()
                    .map(GatePriority::from_wire)
                    .unwrap_or_default();
                self.gates
                    .add_request(&evt.agent, &evt.decision, evt.context.clone(), priority);
                self.logbook.ingest(
                    LogDraft::new(
                        LogSource::Agent,
                        LogLevel::Warning,
                        format!("approval requested: {}", evt.decision),
                    )
                    .agent(&evt.agent)
                    .category("hitl"),
                    now_ms,
                );
            },
            ServerEvent::Unrecognized(evt) => {
                tracing::warn!(kind = %evt.kind, "Unrecognized event type");
                self.logbook.ingest(
                    LogDraft::new(
                        LogSource::Websocket,
                        LogLevel::Warning,
                        format!("unrecognized event type: {}", evt.kind),
                    ),
                    now_ms,
                );
            },
        }
    }

    /// Drive every due timer: transport, log debounce, persistence.
    pub fn tick(&mut self, now_ms: f64) {
        self.transport.tick(now_ms);
        self.logbook.tick(now_ms);
        if self.persist_timer.fire_if_due(now_ms) {
            self.persist(now_ms);
            self.persist_timer
                .arm(now_ms + self.cfg.persistence.save_interval_ms as f64);
        }
    }

    /// Snapshot everything durable to local storage.
    pub fn persist(&mut self, _now_ms: f64) {
        if !self.cfg.persistence.enabled {
            return;
        }
        let tail = self.logbook.tail(self.cfg.logbook.persisted_tail);
        self.persistor
            .save(&self.fleet.snapshot(), &self.gates.snapshot(), &tail);
    }

    // ---- UI command surface ------------------------------------------

    /// Opt in to the connection and dial. This is the only path that
    /// enables auto-connect; rendering a status badge never dials.
    pub fn enable_connection(&mut self, now_ms: f64) {
        self.transport.set_auto_connect(true);
        self.transport.connect(now_ms);
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    pub fn set_page_url(&mut self, url: Option<String>) {
        self.transport.set_page_url(url);
    }

    pub fn start_project(&mut self, brief: &str, now_ms: f64) {
        self.transport.queue_command(
            ClientCommand::StartProject(StartProjectCmd {
                brief: brief.to_string(),
            }),
            now_ms,
        );
        self.logbook.ingest(
            LogDraft::new(LogSource::User, LogLevel::Info, "project brief submitted"),
            now_ms,
        );
    }

    pub fn send_chat(&mut self, content: &str, now_ms: f64) {
        self.chat.push(ChatRole::User, None, content);
        self.transport.queue_command(
            ClientCommand::Chat(ChatCmd {
                content: content.to_string(),
            }),
            now_ms,
        );
    }

    pub fn send_user_command(
        &mut self,
        command: &str,
        args: Map<String, serde_json::Value>,
        now_ms: f64,
    ) {
        self.transport.queue_command(
            ClientCommand::UserCommand(UserCommandCmd {
                command: command.to_string(),
                args,
            }),
            now_ms,
        );
        self.logbook.ingest(
            LogDraft::new(LogSource::User, LogLevel::Info, format!("command: {command}")),
            now_ms,
        );
    }

    pub fn request_artifacts(&mut self, now_ms: f64) {
        self.transport
            .queue_command(ClientCommand::ListArtifacts, now_ms);
    }

    /// Raise a gate locally, without a transport event.
    pub fn raise_gate(
        &mut self,
        agent: &str,
        decision: &str,
        priority: GatePriority,
        now_ms: f64,
    ) -> String {
        let id = self
            .gates
            .add_request(agent, decision, Default::default(), priority);
        self.logbook.ingest(
            LogDraft::new(
                LogSource::User,
                LogLevel::Warning,
                format!("approval requested: {decision}"),
            )
            .agent(agent)
            .category("hitl"),
            now_ms,
        );
        id
    }

    /// Resolve a gate and push the decision to the orchestrator.
    pub fn resolve_gate(
        &mut self,
        id: &str,
        decision: GateDecision,
        response: Option<String>,
        now_ms: f64,
    ) -> bool {
        if !self.gates.resolve(id, decision, response.clone()) {
            return false;
        }
        self.transport.queue_command(
            ClientCommand::GateResponse(GateResponseCmd {
                request_id: id.to_string(),
                status: decision.as_str().to_string(),
                response,
            }),
            now_ms,
        );
        self.logbook.ingest(
            LogDraft::new(
                LogSource::User,
                LogLevel::Info,
                format!("gate {id} {}", decision.as_str()),
            )
            .category("hitl"),
            now_ms,
        );
        true
    }

    pub fn navigate_to_gate(&mut self, id: &str) {
        self.gates.navigate_to(id);
    }

    pub fn pause_agent(&mut self, name: &str, now_ms: f64) {
        self.fleet.pause(name, now_ms);
        self.logbook.ingest(
            LogDraft::new(LogSource::User, LogLevel::Info, "agent paused").agent(name),
            now_ms,
        );
    }

    pub fn resume_agent(&mut self, name: &str, now_ms: f64) {
        self.fleet.resume(name, now_ms);
        self.logbook.ingest(
            LogDraft::new(LogSource::User, LogLevel::Info, "agent resumed").agent(name),
            now_ms,
        );
    }

    pub fn reset_agent(&mut self, name: &str, now_ms: f64) {
        self.fleet.reset(name, now_ms);
        self.logbook.ingest(
            LogDraft::new(LogSource::User, LogLevel::Info, "agent reset").agent(name),
            now_ms,
        );
    }

    // ---- log view passthroughs ---------------------------------------

    pub fn set_log_filter(&mut self, filter: crate::logbook::LogFilter) {
        self.logbook.set_filter(filter);
    }

    pub fn clear_log_filter(&mut self) {
        self.logbook.clear_filter();
    }

    /// Local diagnostics (captured console output and shell warnings)
    /// enter the same bounded log as everything else.
    pub fn ingest_diagnostic(&mut self, level: LogLevel, message: &str, now_ms: f64) {
        self.logbook.ingest(
            LogDraft::new(LogSource::System, level, message).category("console"),
            now_ms,
        );
    }
}
