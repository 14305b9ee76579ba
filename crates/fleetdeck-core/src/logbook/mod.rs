use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::LogbookConfig;
use crate::transport::TimerState;

pub mod export;
pub mod filter;
pub mod index;
pub mod metrics;

pub use filter::LogFilter;
pub use metrics::LogMetrics;

use index::SearchIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
            Self::Debug => "debug",
        }
    }

    /// Lenient parse; anything unknown reads as info.
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "success" => Self::Success,
            "debug" => Self::Debug,
            _ => Self::Info,
        }
    }

    /// Default severity when the producer did not supply one.
    pub fn default_severity(&self) -> u8 {
        match self {
            Self::Error => 4,
            Self::Warning => 3,
            Self::Info => 2,
            Self::Success | Self::Debug => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Agent,
    System,
    User,
    Websocket,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::System => "system",
            Self::User => "user",
            Self::Websocket => "websocket",
        }
    }
}

/// An immutable, locally-identified record of one thing that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: String,
    pub agent: String,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
    pub severity: u8,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Local monotonic-ish clock at ingestion, for windowed metrics.
    #[serde(default)]
    pub ingested_at_ms: f64,
}

/// Everything a producer supplies; ids, timestamps, and derived severity
/// are filled in by the store.
#[derive(Debug, Clone, Default)]
pub struct LogDraft {
    pub agent: String,
    pub level: Option<LogLevel>,
    pub message: String,
    pub source: Option<LogSource>,
    pub severity: Option<u8>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl LogDraft {
    pub fn new(source: LogSource, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level: Some(level),
            message: message.into(),
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Bounded, debounced, indexed record of everything that happened.
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    pending: Vec<LogEntry>,
    debounce: TimerState,
    index: SearchIndex,
    metrics: LogMetrics,
    filter: Option<LogFilter>,
    next_id: u64,
    session_id: String,
    cfg: LogbookConfig,
}

impl LogStore {
    pub fn new(cfg: LogbookConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            pending: Vec::new(),
            debounce: TimerState::Idle,
            index: SearchIndex::default(),
            metrics: LogMetrics::default(),
            filter: None,
            next_id: 1,
            session_id: uuid::Uuid::new_v4().to_string(),
            cfg,
        }
    }

    /// Queue one entry. Entries arriving inside the debounce window are
    /// coalesced into a single flush; a large enough burst flushes early.
    pub fn ingest(&mut self, draft: LogDraft, now_ms: f64) -> u64 {
        let level = draft.level.unwrap_or(LogLevel::Info);
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(LogEntry {
            id,
            timestamp: crate::time::timestamp_now(),
            agent: draft.agent,
            level,
            message: draft.message,
            source: draft.source.unwrap_or(LogSource::System),
            severity: draft.severity.unwrap_or_else(|| level.default_severity()),
            category: draft.category,
            tags: draft.tags,
            session_id: Some(self.session_id.clone()),
            ingested_at_ms: now_ms,
        });

        if self.pending.len() >= self.cfg.burst_flush_len {
            self.flush(now_ms);
        } else {
            self.debounce.arm(now_ms + self.cfg.debounce_ms as f64);
        }
        id
    }

    /// Run the debounce timer. Called from the single frame pump.
    pub fn tick(&mut self, now_ms: f64) {
        if self.debounce.fire_if_due(now_ms) {
            self.flush(now_ms);
        }
    }

    /// Apply pending entries immediately: append, evict past the cap,
    /// rebuild the index, recompute rolling metrics.
    pub fn flush(&mut self, now_ms: f64) {
        self.debounce.disarm();
        if self.pending.is_empty() {
            return;
        }
        for entry in self.pending.drain(..) {
            self.entries.push_back(entry);
        }
        while self.entries.len() > self.cfg.max_entries {
            self.entries.pop_front();
        }
        self.index.rebuild(self.entries.iter());
        self.metrics = metrics::compute(self.entries.iter(), now_ms, self.cfg.top_agents);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn metrics(&self) -> &LogMetrics {
        &self.metrics
    }

    /// Indexed multi-word search (implicit AND), results in log order.
    pub fn search(&self, query: &str) -> Vec<&LogEntry> {
        let ids = self.index.search(query);
        self.entries.iter().filter(|e| ids.contains(&e.id)).collect()
    }

    pub fn set_filter(&mut self, filter: LogFilter) {
        self.filter = Some(filter);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// The filtered view. With no filter active this is exactly the raw
    /// log; the two views must never diverge.
    pub fn filtered(&self) -> Vec<&LogEntry> {
        match &self.filter {
            None => self.entries.iter().collect(),
            Some(filter) => self.entries.iter().filter(|e| filter.matches(e)).collect(),
        }
    }

    /// Bulk purge of everything, including unflushed entries.
    pub fn clear(&mut self, now_ms: f64) {
        self.entries.clear();
        self.pending.clear();
        self.debounce.disarm();
        self.index.rebuild(self.entries.iter());
        self.metrics = metrics::compute(self.entries.iter(), now_ms, self.cfg.top_agents);
    }

    pub fn export_jsonl(&self) -> String {
        export::to_jsonl(self.entries.iter())
    }

    pub fn export_csv(&self) -> String {
        export::to_csv(self.entries.iter())
    }

    /// The newest entries, oldest first, for persistence.
    pub fn tail(&self, count: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Rehydrate a persisted tail. Only meaningful before live ingestion.
    pub fn restore(&mut self, tail: Vec<LogEntry>, now_ms: f64) {
        for entry in tail {
            self.next_id = self.next_id.max(entry.id + 1);
            self.entries.push_back(entry);
        }
        while self.entries.len() > self.cfg.max_entries {
            self.entries.pop_front();
        }
        self.index.rebuild(self.entries.iter());
        self.metrics = metrics::compute(self.entries.iter(), now_ms, self.cfg.top_agents);
    }
}
