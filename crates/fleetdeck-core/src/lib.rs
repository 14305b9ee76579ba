pub mod config;
pub mod convo;
pub mod deck;
pub mod events;
pub mod fleet;
pub mod hitl;
pub mod logbook;
pub mod net;
pub mod persist;
pub mod time;
pub mod transport;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::HashMap;

    use crate::persist::{StorageBackend, StorageError};
    use crate::transport::SocketDriver;

    /// Records every call; optionally fails opens or sends.
    #[derive(Debug, Default)]
    pub struct MockSocket {
        pub open_calls: Vec<String>,
        pub sent: Vec<String>,
        pub close_calls: u32,
        pub fail_open: bool,
        pub fail_send: bool,
    }

    impl SocketDriver for MockSocket {
        fn open(&mut self, url: &str) -> Result<(), String> {
            self.open_calls.push(url.to_string());
            if self.fail_open {
                Err("open refused".to_string())
            } else {
                Ok(())
            }
        }

        fn send_text(&mut self, text: &str) -> Result<(), String> {
            if self.fail_send {
                return Err("send refused".to_string());
            }
            self.sent.push(text.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.close_calls += 1;
        }
    }

    /// In-memory storage with injectable write failures.
    #[derive(Debug, Default)]
    pub struct MemoryStorage {
        pub map: HashMap<String, String>,
        /// Fail this many upcoming store() calls.
        pub fail_stores: u32,
    }

    impl StorageBackend for MemoryStorage {
        fn load(&self, key: &str) -> Option<String> {
            self.map.get(key).cloned()
        }

        fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_stores > 0 {
                self.fail_stores -= 1;
                return Err(StorageError::WriteFailed("quota exceeded".to_string()));
            }
            self.map.insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&mut self, key: &str) {
            self.map.remove(key);
        }
    }

    /// Build an agent-scoped wire frame for tests.
    pub fn agent_frame(kind: &str, agent: &str, data: serde_json::Value) -> String {
        serde_json::json!({
            "type": kind,
            "agent_name": agent,
            "data": data,
            "timestamp": "2026-01-01T00:00:00Z",
        })
        .to_string()
    }

    /// Build an agent-less wire frame for tests.
    pub fn system_frame(kind: &str, data: serde_json::Value) -> String {
        serde_json::json!({
            "type": kind,
            "data": data,
            "timestamp": "2026-01-01T00:00:00Z",
        })
        .to_string()
    }
}
