use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::fleet::Agent;
use crate::hitl::GateRequest;
use crate::logbook::LogEntry;

/// Snapshot schema version; bump when a persisted shape changes.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug)]
pub enum StorageError {
    /// No storage available in this context at all.
    Unavailable,
    /// The write was refused, most likely a quota limit.
    WriteFailed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "storage unavailable"),
            Self::WriteFailed(e) => write!(f, "storage write failed: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// The seam to durable browser-local storage. The shell implements this
/// over `window.localStorage`; tests use an in-memory map.
pub trait StorageBackend {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str);
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// Saves and rehydrates deck state. Every failure is absorbed here: a
/// dashboard with broken storage keeps working in memory.
pub struct Persistor<P: StorageBackend> {
    backend: P,
    fleet_key: String,
    gates_key: String,
    log_tail_key: String,
}

impl<P: StorageBackend> Persistor<P> {
    pub fn new(backend: P, key_prefix: &str) -> Self {
        Self {
            backend,
            fleet_key: format!("{key_prefix}.fleet"),
            gates_key: format!("{key_prefix}.gates"),
            log_tail_key: format!("{key_prefix}.logtail"),
        }
    }

    /// Write all three snapshots. On a failed write the log tail (the
    /// bulkiest, most expendable key) is dropped and the write retried
    /// once; a second failure is logged and swallowed.
    pub fn save(&mut self, fleet: &[Agent], gates: &[GateRequest], log_tail: &[LogEntry]) {
        let fleet_key = self.fleet_key.clone();
        let gates_key = self.gates_key.clone();
        let tail_key = self.log_tail_key.clone();
        self.save_one(&fleet_key, fleet);
        self.save_one(&gates_key, gates);
        self.save_one(&tail_key, log_tail);
    }

    fn save_one<T: Serialize>(&mut self, key: &str, data: T) {
        let envelope = Envelope {
            version: SNAPSHOT_VERSION,
            data,
        };
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, error = %e, "Snapshot serialization failed");
                return;
            },
        };
        if let Err(first) = self.backend.store(key, &json) {
            // Best-effort reclaim: the log tail is rebuildable from live
            // traffic, so it goes first.
            let tail_key = self.log_tail_key.clone();
            self.backend.remove(&tail_key);
            if let Err(second) = self.backend.store(key, &json) {
                tracing::warn!(key, first = %first, second = %second, "Snapshot write failed twice, continuing in-memory");
            }
        }
    }

    pub fn load_fleet(&self) -> Option<Vec<Agent>> {
        self.load_one(&self.fleet_key)
    }

    pub fn load_gates(&self) -> Option<Vec<GateRequest>> {
        self.load_one(&self.gates_key)
    }

    pub fn load_log_tail(&self) -> Option<Vec<LogEntry>> {
        self.load_one(&self.log_tail_key)
    }

    fn load_one<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.backend.load(key)?;
        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) if envelope.version == SNAPSHOT_VERSION => Some(envelope.data),
            Ok(envelope) => {
                tracing::warn!(key, version = envelope.version, "Discarding snapshot with unknown version");
                None
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable snapshot");
                None
            },
        }
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut P {
        &mut self.backend
    }
}
