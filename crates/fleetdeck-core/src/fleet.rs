use serde::{Deserialize, Serialize};

use crate::events::ServerEvent;
use crate::time::HOUR_MS;

/// Assumed degraded time per recorded error when deriving uptime.
const ERROR_PENALTY_MS: f64 = 60_000.0;

/// Where an agent currently is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    #[default]
    Idle,
    Error,
    Offline,
    Thinking,
    Paused,
}

impl AgentStatus {
    /// Lenient parse from a wire string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "idle" => Some(Self::Idle),
            "error" => Some(Self::Error),
            "offline" => Some(Self::Offline),
            "thinking" => Some(Self::Thinking),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// Task counts per lane for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQueue {
    pub todo: u32,
    pub in_progress: u32,
    pub done: u32,
    pub failed: u32,
}

/// Derived metrics. Always a pure function of the rest of the agent:
/// recomputed on every mutation, never written directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub response_time_ms: f64,
    pub throughput_per_hour: f64,
    pub efficiency: f64,
    pub uptime: f64,
}

/// One member of the fixed fleet roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub current_stage: Option<String>,
    pub last_activity: String,
    pub tasks_completed: u32,
    pub success_rate: f64,
    /// 0-100 progress through the current task.
    pub progress: f64,
    pub error_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub queue: TaskQueue,
    pub performance: Performance,
    /// Accumulated wall-clock spent in completed tasks.
    #[serde(default)]
    pub total_task_ms: f64,
    #[serde(default, skip_serializing)]
    task_started_ms: Option<f64>,
}

impl Agent {
    fn seeded(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            status: AgentStatus::Idle,
            current_task: None,
            current_stage: None,
            last_activity: crate::time::timestamp_now(),
            tasks_completed: 0,
            success_rate: 100.0,
            progress: 0.0,
            error_count: 0,
            last_error: None,
            queue: TaskQueue::default(),
            performance: Performance {
                response_time_ms: 0.0,
                throughput_per_hour: 0.0,
                efficiency: 100.0,
                uptime: 100.0,
            },
            total_task_ms: 0.0,
            task_started_ms: None,
        }
    }

    fn recompute_performance(&mut self, now_ms: f64, boot_ms: f64) {
        let completed = self.tasks_completed as f64;
        let errors = self.error_count as f64;
        let total = completed + errors;

        let efficiency = if total == 0.0 {
            100.0
        } else {
            completed / total * 100.0
        };
        self.success_rate = efficiency;

        let runtime_ms = (now_ms - boot_ms).max(0.0);
        let throughput = if runtime_ms > 0.0 {
            completed / (runtime_ms / HOUR_MS)
        } else {
            0.0
        };

        let penalty = errors * ERROR_PENALTY_MS;
        let uptime = if runtime_ms > 0.0 {
            ((runtime_ms - penalty) / runtime_ms * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };

        let response_time = if completed > 0.0 {
            self.total_task_ms / completed
        } else {
            0.0
        };

        self.performance = Performance {
            response_time_ms: response_time,
            throughput_per_hour: throughput,
            efficiency,
            uptime,
        };
    }
}

/// Fleet-wide aggregates, recomputed as a pure fold over the roster after
/// every mutation so they can never drift from the entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetMetrics {
    pub active_count: u32,
    pub total_tasks_completed: u32,
    pub total_errors: u32,
    pub overall_success_rate: f64,
    pub overall_uptime: f64,
}

/// The keyed agent collection, mutated only by dispatched events and the
/// local pause/resume/reset administrative actions.
pub struct FleetStore {
    agents: Vec<Agent>,
    seeds: Vec<Agent>,
    metrics: FleetMetrics,
    boot_ms: f64,
}

impl FleetStore {
    /// Seed the fixed roster. Agents are never created or destroyed after
    /// this point, only mutated in place.
    pub fn new(roster: &[String], now_ms: f64) -> Self {
        let agents: Vec<Agent> = roster.iter().map(|name| Agent::seeded(name)).collect();
        let seeds = agents.clone();
        let mut store = Self {
            agents,
            seeds,
            metrics: FleetMetrics::default(),
            boot_ms: now_ms,
        };
        store.recompute_metrics();
        store
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn metrics(&self) -> &FleetMetrics {
        &self.metrics
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Apply one dispatched event. Events for agents outside the roster are
    /// a no-op; events that are not agent-scoped are ignored here.
    pub fn apply_event(&mut self, event: &ServerEvent, now_ms: f64) {
        match event {
            ServerEvent::AgentStatus(evt) => {
                let status = evt.status.as_deref().and_then(AgentStatus::from_wire);
                let task = evt.task.clone();
                self.with_agent(&evt.agent, now_ms, |agent| {
                    if let Some(status) = status {
                        agent.status = status;
                    }
                    if task.is_some() {
                        agent.current_task = task;
                    }
                });
            },
            ServerEvent::AgentProgress(evt) => {
                let progress = evt.progress;
                let stage = evt.stage.clone();
                self.with_agent(&evt.agent, now_ms, |agent| {
                    if let Some(p) = progress {
                        agent.progress = p.clamp(0.0, 100.0);
                    }
                    if stage.is_some() {
                        agent.current_stage = stage;
                    }
                    agent.status = AgentStatus::Active;
                });
            },
            ServerEvent::AgentThinking(evt) => {
                self.with_agent(&evt.agent, now_ms, |agent| {
                    agent.status = AgentStatus::Thinking;
                });
            },
            ServerEvent::AgentResponse(evt) => {
                self.with_agent(&evt.agent, now_ms, |agent| {
                    agent.status = AgentStatus::Active;
                });
            },
            ServerEvent::AgentError(evt) => {
                let message = evt.message.clone();
                self.with_agent(&evt.agent, now_ms, |agent| {
                    agent.status = AgentStatus::Error;
                    agent.error_count += 1;
                    agent.last_error = Some(message);
                });
            },
            ServerEvent::TaskStart(evt) => {
                let task = evt.task.clone();
                self.with_agent(&evt.agent, now_ms, |agent| {
                    agent.queue.todo = agent.queue.todo.saturating_sub(1);
                    agent.queue.in_progress += 1;
                    agent.task_started_ms = Some(now_ms);
                    if task.is_some() {
                        agent.current_task = task;
                    }
                    agent.status = AgentStatus::Active;
                });
            },
            ServerEvent::TaskComplete(evt) => {
                let duration = evt.duration_ms;
                self.with_agent(&evt.agent, now_ms, |agent| {
                    agent.tasks_completed += 1;
                    agent.queue.in_progress = agent.queue.in_progress.saturating_sub(1);
                    agent.queue.done += 1;
                    let elapsed = duration.or(agent.task_started_ms.map(|t| (now_ms - t).max(0.0)));
                    if let Some(elapsed) = elapsed {
                        agent.total_task_ms += elapsed;
                    }
                    agent.task_started_ms = None;
                    agent.current_task = None;
                    agent.progress = 0.0;
                    agent.status = AgentStatus::Idle;
                });
            },
            _ => {},
        }
    }

    /// Local administrative action; pausing an already-paused agent is a no-op.
    pub fn pause(&mut self, name: &str, now_ms: f64) {
        if self.get(name).is_some_and(|a| a.status == AgentStatus::Paused) {
            return;
        }
        self.with_agent(name, now_ms, |agent| {
            agent.status = AgentStatus::Paused;
        });
    }

    /// Local administrative action; resuming an already-active agent is a no-op.
    pub fn resume(&mut self, name: &str, now_ms: f64) {
        if self.get(name).is_some_and(|a| a.status == AgentStatus::Active) {
            return;
        }
        self.with_agent(name, now_ms, |agent| {
            agent.status = AgentStatus::Active;
        });
    }

    /// Restore an agent to its seeded state.
    pub fn reset(&mut self, name: &str, now_ms: f64) {
        let Some(seed) = self
            .seeds
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .cloned()
        else {
            tracing::debug!(agent = name, "reset for unknown agent ignored");
            return;
        };
        if let Some(agent) = self
            .agents
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            *agent = seed;
            agent.last_activity = crate::time::timestamp_now();
            agent.recompute_performance(now_ms, self.boot_ms);
        }
        self.recompute_metrics();
    }

    /// Replace roster entries with rehydrated state, matched by name.
    /// Names outside the fixed roster are dropped.
    pub fn restore(&mut self, persisted: Vec<Agent>, now_ms: f64) {
        for incoming in persisted {
            if let Some(agent) = self
                .agents
                .iter_mut()
                .find(|a| a.name.eq_ignore_ascii_case(&incoming.name))
            {
                *agent = incoming;
                agent.recompute_performance(now_ms, self.boot_ms);
            } else {
                tracing::debug!(agent = %incoming.name, "persisted agent not in roster, dropped");
            }
        }
        self.recompute_metrics();
    }

    /// Cloneable snapshot for persistence.
    pub fn snapshot(&self) -> Vec<Agent> {
        self.agents.clone()
    }

    fn with_agent(&mut self, name: &str, now_ms: f64, mutate: impl FnOnce(&mut Agent)) {
        let boot_ms = self.boot_ms;
        let Some(agent) = self
            .agents
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        else {
            tracing::debug!(agent = name, "event for unknown agent ignored");
            return;
        };
        mutate(agent);
        agent.last_activity = crate::time::timestamp_now();
        agent.recompute_performance(now_ms, boot_ms);
        self.recompute_metrics();
    }

    fn recompute_metrics(&mut self) {
        let mut metrics = FleetMetrics::default();
        let mut uptime_sum = 0.0;
        for agent in &self.agents {
            if agent.status == AgentStatus::Active {
                metrics.active_count += 1;
            }
            metrics.total_tasks_completed += agent.tasks_completed;
            metrics.total_errors += agent.error_count;
            uptime_sum += agent.performance.uptime;
        }
        let total = (metrics.total_tasks_completed + metrics.total_errors) as f64;
        metrics.overall_success_rate = if total == 0.0 {
            100.0
        } else {
            metrics.total_tasks_completed as f64 / total * 100.0
        };
        metrics.overall_uptime = if self.agents.is_empty() {
            100.0
        } else {
            uptime_sum / self.agents.len() as f64
        };
        self.metrics = metrics;
    }
}
