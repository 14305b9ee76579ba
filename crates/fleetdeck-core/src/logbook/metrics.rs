use std::collections::HashMap;

use serde::Serialize;

use crate::time::HOUR_MS;

use super::{LogEntry, LogLevel};

/// Rolling log analytics, recomputed from the full (bounded) log on every
/// ingestion batch. Full recomputation over a bounded store is cheaper
/// than getting incremental updates wrong.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogMetrics {
    pub total: usize,
    pub info_count: usize,
    pub warning_count: usize,
    pub error_count: usize,
    pub success_count: usize,
    pub debug_count: usize,
    /// Agents by entry volume, largest first.
    pub top_agents: Vec<(String, usize)>,
    /// Share of last-hour entries that are errors, 0-100.
    pub recent_error_rate: f64,
    /// 100 minus the error+warning share of all entries, 0-100.
    pub health_score: f64,
}

pub fn compute<'a>(
    entries: impl Iterator<Item = &'a LogEntry>,
    now_ms: f64,
    top_n: usize,
) -> LogMetrics {
    let mut metrics = LogMetrics::default();
    let mut by_agent: HashMap<&str, usize> = HashMap::new();
    let mut recent_total = 0usize;
    let mut recent_errors = 0usize;
    let hour_ago = now_ms - HOUR_MS;

    for entry in entries {
        metrics.total += 1;
        match entry.level {
            LogLevel::Info => metrics.info_count += 1,
            LogLevel::Warning => metrics.warning_count += 1,
            LogLevel::Error => metrics.error_count += 1,
            LogLevel::Success => metrics.success_count += 1,
            LogLevel::Debug => metrics.debug_count += 1,
        }
        if !entry.agent.is_empty() {
            *by_agent.entry(entry.agent.as_str()).or_default() += 1;
        }
        if entry.ingested_at_ms >= hour_ago {
            recent_total += 1;
            if entry.level == LogLevel::Error {
                recent_errors += 1;
            }
        }
    }

    let mut leaderboard: Vec<(String, usize)> = by_agent
        .into_iter()
        .map(|(agent, count)| (agent.to_string(), count))
        .collect();
    leaderboard.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    leaderboard.truncate(top_n);
    metrics.top_agents = leaderboard;

    metrics.recent_error_rate = if recent_total == 0 {
        0.0
    } else {
        recent_errors as f64 / recent_total as f64 * 100.0
    };

    metrics.health_score = if metrics.total == 0 {
        100.0
    } else {
        let noisy = (metrics.error_count + metrics.warning_count) as f64;
        100.0 - noisy / metrics.total as f64 * 100.0
    };

    metrics
}
