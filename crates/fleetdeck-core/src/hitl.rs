use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::events::GatePriority;

/// Where a gate request is in its lifecycle. Status only ever moves
/// forward from Pending; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
}

/// A terminal decision. Separate from `GateStatus` so `resolve` cannot be
/// handed `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approved,
    Rejected,
    Modified,
}

impl GateDecision {
    pub fn as_status(&self) -> GateStatus {
        match self {
            Self::Approved => GateStatus::Approved,
            Self::Rejected => GateStatus::Rejected,
            Self::Modified => GateStatus::Modified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Modified => "modified",
        }
    }
}

/// One human-approval gate raised by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRequest {
    pub id: String,
    pub agent_name: String,
    pub decision: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub priority: GatePriority,
    pub timestamp: String,
    pub status: GateStatus,
    #[serde(default)]
    pub response: Option<String>,
}

impl GateRequest {
    pub fn is_pending(&self) -> bool {
        self.status == GateStatus::Pending
    }
}

/// Request/response lifecycle for approval gates. Terminal requests are
/// kept for history but drop out of the pending views.
#[derive(Default)]
pub struct GateStore {
    requests: Vec<GateRequest>,
    /// Focused request for the UI; a view convenience with no business
    /// meaning, and deliberately not persisted.
    active: Option<String>,
}

impl GateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a new gate. Multiple simultaneous requests are allowed, even
    /// for the same agent; any at-most-one policy belongs to the caller.
    pub fn add_request(
        &mut self,
        agent_name: &str,
        decision: &str,
        context: HashMap<String, serde_json::Value>,
        priority: GatePriority,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.requests.push(GateRequest {
            id: id.clone(),
            agent_name: agent_name.to_string(),
            decision: decision.to_string(),
            context,
            priority,
            timestamp: crate::time::timestamp_now(),
            status: GateStatus::Pending,
            response: None,
        });
        id
    }

    /// One-shot resolution. Resolving an already-terminal request
    /// overwrites the previous outcome. Resolving the focused request
    /// clears focus.
    pub fn resolve(&mut self, id: &str, decision: GateDecision, response: Option<String>) -> bool {
        let Some(request) = self.requests.iter_mut().find(|r| r.id == id) else {
            tracing::debug!(id, "resolve for unknown gate ignored");
            return false;
        };
        request.status = decision.as_status();
        request.response = response;
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        true
    }

    /// Point the UI at one request.
    pub fn navigate_to(&mut self, id: &str) {
        if self.requests.iter().any(|r| r.id == id) {
            self.active = Some(id.to_string());
        }
    }

    pub fn active(&self) -> Option<&GateRequest> {
        let id = self.active.as_deref()?;
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn requests(&self) -> &[GateRequest] {
        &self.requests
    }

    pub fn get(&self, id: &str) -> Option<&GateRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Requests for one agent, in insertion order.
    pub fn requests_by_agent(&self, agent: &str) -> Vec<&GateRequest> {
        self.requests
            .iter()
            .filter(|r| r.agent_name.eq_ignore_ascii_case(agent))
            .collect()
    }

    pub fn pending(&self) -> Vec<&GateRequest> {
        self.requests.iter().filter(|r| r.is_pending()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.requests.iter().filter(|r| r.is_pending()).count()
    }

    /// History snapshot for persistence. The focus pointer is excluded by
    /// construction.
    pub fn snapshot(&self) -> Vec<GateRequest> {
        self.requests.clone()
    }

    pub fn restore(&mut self, requests: Vec<GateRequest>) {
        self.requests = requests;
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(store: &mut GateStore, agent: &str) -> String {
        store.add_request(agent, "Deploy to production?", HashMap::new(), GatePriority::High)
    }

    #[test]
    fn add_then_resolve_restores_pending_count() {
        let mut store = GateStore::new();
        add(&mut store, "Analyst");
        let before = store.pending_count();

        let id = add(&mut store, "Builder");
        assert_eq!(store.pending_count(), before + 1);

        assert!(store.resolve(&id, GateDecision::Approved, None));
        assert_eq!(store.pending_count(), before);
        assert_eq!(store.get(&id).unwrap().status, GateStatus::Approved);
    }

    #[test]
    fn requests_by_agent_in_insertion_order() {
        let mut store = GateStore::new();
        let a1 = add(&mut store, "Analyst");
        let _b1 = add(&mut store, "Builder");
        let a2 = add(&mut store, "Analyst");
        let _b2 = add(&mut store, "Builder");

        let mine = store.requests_by_agent("analyst");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, a1);
        assert_eq!(mine[1].id, a2);
    }

    #[test]
    fn terminal_requests_kept_for_history() {
        let mut store = GateStore::new();
        let id = add(&mut store, "Analyst");
        store.resolve(&id, GateDecision::Rejected, Some("not yet".to_string()));

        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.requests().len(), 1);
        let request = store.get(&id).unwrap();
        assert_eq!(request.status, GateStatus::Rejected);
        assert_eq!(request.response.as_deref(), Some("not yet"));
    }

    #[test]
    fn double_resolution_overwrites() {
        let mut store = GateStore::new();
        let id = add(&mut store, "Analyst");
        store.resolve(&id, GateDecision::Approved, None);
        store.resolve(&id, GateDecision::Modified, Some("with edits".to_string()));

        let request = store.get(&id).unwrap();
        assert_eq!(request.status, GateStatus::Modified);
        assert_eq!(request.response.as_deref(), Some("with edits"));
    }

    #[test]
    fn resolving_focused_request_clears_focus() {
        let mut store = GateStore::new();
        let id = add(&mut store, "Analyst");
        store.navigate_to(&id);
        assert_eq!(store.active().unwrap().id, id);

        store.resolve(&id, GateDecision::Approved, None);
        assert!(store.active().is_none());
    }

    #[test]
    fn resolving_other_request_keeps_focus() {
        let mut store = GateStore::new();
        let focused = add(&mut store, "Analyst");
        let other = add(&mut store, "Builder");
        store.navigate_to(&focused);
        store.resolve(&other, GateDecision::Approved, None);
        assert_eq!(store.active().unwrap().id, focused);
    }

    #[test]
    fn navigate_to_unknown_id_is_ignored() {
        let mut store = GateStore::new();
        store.navigate_to("nope");
        assert!(store.active().is_none());
    }

    #[test]
    fn resolve_unknown_id_returns_false() {
        let mut store = GateStore::new();
        assert!(!store.resolve("nope", GateDecision::Approved, None));
    }

    #[test]
    fn restore_drops_focus() {
        let mut store = GateStore::new();
        let id = add(&mut store, "Analyst");
        store.navigate_to(&id);

        let snapshot = store.snapshot();
        let mut fresh = GateStore::new();
        fresh.restore(snapshot);
        assert_eq!(fresh.requests().len(), 1);
        assert!(fresh.active().is_none());
    }
}
