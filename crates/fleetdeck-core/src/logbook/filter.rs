use serde::Deserialize;

use super::{LogEntry, LogLevel, LogSource};

/// On-demand predicate over the full log. Independent of the search
/// index; an unset field matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub agent: Option<String>,
    pub level: Option<LogLevel>,
    pub source: Option<LogSource>,
    pub category: Option<String>,
    pub min_severity: Option<u8>,
    pub from_ms: Option<f64>,
    pub to_ms: Option<f64>,
    pub text: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(ref agent) = self.agent
            && !entry.agent.eq_ignore_ascii_case(agent)
        {
            return false;
        }
        if let Some(level) = self.level
            && entry.level != level
        {
            return false;
        }
        if let Some(source) = self.source
            && entry.source != source
        {
            return false;
        }
        if let Some(ref category) = self.category
            && entry.category.as_deref() != Some(category.as_str())
        {
            return false;
        }
        if let Some(min) = self.min_severity
            && entry.severity < min
        {
            return false;
        }
        if let Some(from) = self.from_ms
            && entry.ingested_at_ms < from
        {
            return false;
        }
        if let Some(to) = self.to_ms
            && entry.ingested_at_ms > to
        {
            return false;
        }
        if let Some(ref text) = self.text
            && !entry
                .message
                .to_lowercase()
                .contains(&text.to_lowercase())
        {
            return false;
        }
        true
    }
}
