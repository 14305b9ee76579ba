use serde::Deserialize;

/// Top-level deck configuration, parsed from `fleetdeck.toml` content the
/// host page ships alongside the bundle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    pub transport: TransportConfig,
    pub logbook: LogbookConfig,
    pub fleet: FleetConfig,
    pub persistence: PersistConfig,
}

/// Connection, heartbeat, backoff, and batching settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Operator-supplied endpoint; wins over page derivation and the default.
    pub url_override: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_reconnect_attempts: u32,
    pub batch_max_len: usize,
    pub batch_linger_ms: u64,
    pub overflow_limit: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url_override: None,
            heartbeat_interval_ms: 15_000,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            max_reconnect_attempts: 8,
            batch_max_len: 16,
            batch_linger_ms: 50,
            overflow_limit: 64,
        }
    }
}

/// Log retention and ingestion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogbookConfig {
    pub max_entries: usize,
    pub debounce_ms: u64,
    /// Pending entries beyond this count force a flush before the window closes.
    pub burst_flush_len: usize,
    /// How many of the newest entries are persisted across reloads.
    pub persisted_tail: usize,
    /// How many agents the volume leaderboard reports.
    pub top_agents: usize,
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            max_entries: 2_000,
            debounce_ms: 250,
            burst_flush_len: 200,
            persisted_tail: 200,
            top_agents: 5,
        }
    }
}

/// The fixed agent roster seeded at boot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub roster: Vec<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            roster: vec![
                "Analyst".to_string(),
                "Architect".to_string(),
                "Builder".to_string(),
                "Tester".to_string(),
                "Deployer".to_string(),
            ],
        }
    }
}

/// Browser-local persistence settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    pub enabled: bool,
    pub key_prefix: String,
    /// Snapshot interval; persistence is best-effort, not transactional.
    pub save_interval_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "fleetdeck".to_string(),
            save_interval_ms: 5_000,
        }
    }
}

impl DeckConfig {
    /// Parse a TOML document, falling back to defaults when it is absent
    /// or broken. A dashboard with a bad config file should still come up.
    pub fn from_toml(content: &str) -> Self {
        match toml::from_str::<DeckConfig>(content) {
            Ok(cfg) => cfg.sanitized(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse deck config, using defaults");
                DeckConfig::default()
            },
        }
    }

    /// Clamp nonsense values back to defaults, warning about each one.
    pub fn sanitized(mut self) -> Self {
        let defaults = TransportConfig::default();
        if self.transport.heartbeat_interval_ms == 0 {
            tracing::warn!("transport.heartbeat_interval_ms must be > 0, using default");
            self.transport.heartbeat_interval_ms = defaults.heartbeat_interval_ms;
        }
        if self.transport.backoff_base_ms == 0 {
            tracing::warn!("transport.backoff_base_ms must be > 0, using default");
            self.transport.backoff_base_ms = defaults.backoff_base_ms;
        }
        if self.transport.backoff_max_ms < self.transport.backoff_base_ms {
            tracing::warn!("transport.backoff_max_ms below base, using default");
            self.transport.backoff_max_ms = defaults.backoff_max_ms.max(self.transport.backoff_base_ms);
        }
        if self.transport.batch_max_len == 0 {
            tracing::warn!("transport.batch_max_len must be > 0, using default");
            self.transport.batch_max_len = defaults.batch_max_len;
        }
        if self.transport.overflow_limit == 0 {
            tracing::warn!("transport.overflow_limit must be > 0, using default");
            self.transport.overflow_limit = defaults.overflow_limit;
        }

        let log_defaults = LogbookConfig::default();
        if self.logbook.max_entries == 0 {
            tracing::warn!("logbook.max_entries must be > 0, using default");
            self.logbook.max_entries = log_defaults.max_entries;
        }
        if self.logbook.burst_flush_len == 0 {
            tracing::warn!("logbook.burst_flush_len must be > 0, using default");
            self.logbook.burst_flush_len = log_defaults.burst_flush_len;
        }
        if self.fleet.roster.is_empty() {
            tracing::warn!("fleet.roster is empty, using default roster");
            self.fleet.roster = FleetConfig::default().roster;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DeckConfig::default();
        assert_eq!(cfg.transport.heartbeat_interval_ms, 15_000);
        assert_eq!(cfg.transport.max_reconnect_attempts, 8);
        assert_eq!(cfg.logbook.max_entries, 2_000);
        assert_eq!(cfg.fleet.roster.len(), 5);
        assert!(cfg.persistence.enabled);
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
[transport]
url_override = "wss://orchestrator.internal/ws"
max_reconnect_attempts = 3

[fleet]
roster = ["Alpha", "Beta"]
"#;
        let cfg = DeckConfig::from_toml(toml_str);
        assert_eq!(
            cfg.transport.url_override.as_deref(),
            Some("wss://orchestrator.internal/ws")
        );
        assert_eq!(cfg.transport.max_reconnect_attempts, 3);
        assert_eq!(cfg.fleet.roster, vec!["Alpha", "Beta"]);
        // Untouched sections keep defaults
        assert_eq!(cfg.logbook.debounce_ms, 250);
    }

    #[test]
    fn broken_toml_falls_back_to_defaults() {
        let cfg = DeckConfig::from_toml("this is not toml [[[");
        assert_eq!(cfg.transport.heartbeat_interval_ms, 15_000);
    }

    #[test]
    fn sanitize_clamps_zeros() {
        let cfg = DeckConfig::from_toml(
            r#"
[transport]
heartbeat_interval_ms = 0
batch_max_len = 0

[logbook]
max_entries = 0
"#,
        );
        assert_eq!(cfg.transport.heartbeat_interval_ms, 15_000);
        assert_eq!(cfg.transport.batch_max_len, 16);
        assert_eq!(cfg.logbook.max_entries, 2_000);
    }

    #[test]
    fn sanitize_fixes_inverted_backoff() {
        let cfg = DeckConfig::from_toml(
            r#"
[transport]
backoff_base_ms = 1000
backoff_max_ms = 10
"#,
        );
        assert!(cfg.transport.backoff_max_ms >= cfg.transport.backoff_base_ms);
    }
}
