//! End-to-end scenarios over the whole deck: socket events in, store
//! state and outbound frames out.

use serde_json::json;

use fleetdeck_core::config::DeckConfig;
use fleetdeck_core::deck::Deck;
use fleetdeck_core::events::GatePriority;
use fleetdeck_core::hitl::GateDecision;
use fleetdeck_core::test_helpers::{MemoryStorage, MockSocket, agent_frame, system_frame};
use fleetdeck_core::transport::SocketEvent;

type TestDeck = Deck<MockSocket, MemoryStorage>;

fn small_config() -> DeckConfig {
    DeckConfig::from_toml(
        r#"
[transport]
heartbeat_interval_ms = 1000
backoff_base_ms = 100
backoff_max_ms = 400
max_reconnect_attempts = 2
batch_max_len = 4
batch_linger_ms = 50
overflow_limit = 8

[logbook]
max_entries = 100
debounce_ms = 100
burst_flush_len = 50
persisted_tail = 10
"#,
    )
}

fn deck() -> TestDeck {
    Deck::new(
        small_config(),
        MockSocket::default(),
        MemoryStorage::default(),
        0.0,
    )
}

fn deck_with_storage(storage: MemoryStorage) -> TestDeck {
    Deck::new(small_config(), MockSocket::default(), storage, 0.0)
}

fn open(deck: &mut TestDeck, now: f64) {
    deck.enable_connection(now);
    deck.handle_socket_event(SocketEvent::Opened, now);
}

fn feed(deck: &mut TestDeck, frame: String, now: f64) {
    deck.handle_socket_event(SocketEvent::Frame(frame), now);
}

fn sent_types(deck: &TestDeck) -> Vec<String> {
    deck.transport()
        .driver()
        .sent
        .iter()
        .map(|frame| {
            let value: serde_json::Value = serde_json::from_str(frame).unwrap();
            value["type"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

#[test]
fn connect_flow_flushes_queued_outbound_in_order() {
    let mut deck = deck();
    assert!(!deck.transport().is_connected());

    // Commands issued while disconnected spill to the overflow queue.
    deck.send_chat("queued first", 0.0);
    deck.tick(100.0);
    deck.send_chat("queued second", 200.0);
    deck.tick(300.0);

    open(&mut deck, 400.0);

    let status = deck.transport().status();
    assert!(status.connected);
    assert!(!status.reconnecting);

    let sent = &deck.transport().driver().sent;
    assert!(sent[0].contains("queued first"));
    assert!(sent[1].contains("queued second"));
    assert_eq!(sent_types(&deck)[2], "list_artifacts");
}

#[test]
fn event_stream_drives_fleet_and_logbook() {
    let mut deck = deck();
    open(&mut deck, 0.0);

    feed(
        &mut deck,
        agent_frame("task_start", "Builder", json!({"task": "compile workspace"})),
        1_000.0,
    );
    feed(
        &mut deck,
        agent_frame("task_complete", "Builder", json!({"task": "compile workspace"})),
        4_000.0,
    );
    feed(
        &mut deck,
        agent_frame("agent_error", "Tester", json!({"message": "flaky suite"})),
        5_000.0,
    );
    deck.tick(10_000.0);

    let builder = deck.fleet().get("Builder").unwrap();
    assert_eq!(builder.tasks_completed, 1);
    assert_eq!(builder.queue.done, 1);
    let tester = deck.fleet().get("Tester").unwrap();
    assert_eq!(tester.error_count, 1);
    assert_eq!(tester.last_error.as_deref(), Some("flaky suite"));

    assert_eq!(deck.fleet().metrics().total_tasks_completed, 1);
    assert_eq!(deck.fleet().metrics().total_errors, 1);

    // connection established + start + complete + error = 4 entries
    assert_eq!(deck.logbook().len(), 4);
    assert_eq!(deck.logbook().search("flaky").len(), 1);
    assert_eq!(deck.logbook().search("compile workspace").len(), 2);
}

#[test]
fn analyst_efficiency_scenario_over_the_wire() {
    let mut deck = deck();
    open(&mut deck, 0.0);

    for i in 0..23 {
        feed(
            &mut deck,
            agent_frame("task_complete", "Analyst", json!({})),
            1_000.0 + i as f64,
        );
    }
    feed(
        &mut deck,
        agent_frame("agent_error", "Analyst", json!({"message": "one slip"})),
        2_000.0,
    );

    let agent = deck.fleet().get("Analyst").unwrap();
    assert_eq!(agent.tasks_completed, 23);
    assert_eq!(agent.error_count, 1);

    feed(
        &mut deck,
        agent_frame("task_complete", "Analyst", json!({})),
        3_000.0,
    );
    let agent = deck.fleet().get("Analyst").unwrap();
    assert_eq!(agent.tasks_completed, 24);
    assert!((agent.performance.efficiency - 96.0).abs() < 1e-9);
}

#[test]
fn approval_request_over_wire_then_local_resolution() {
    let mut deck = deck();
    open(&mut deck, 0.0);
    let pending_before = deck.gates().pending_count();

    feed(
        &mut deck,
        agent_frame(
            "approval_request",
            "Deployer",
            json!({"decision": "Deploy to production?", "priority": "urgent"}),
        ),
        1_000.0,
    );
    assert_eq!(deck.gates().pending_count(), pending_before + 1);

    let id = deck.gates().pending()[0].id.clone();
    deck.navigate_to_gate(&id);
    assert!(deck.resolve_gate(&id, GateDecision::Approved, Some("go".to_string()), 2_000.0));
    assert_eq!(deck.gates().pending_count(), pending_before);
    assert!(deck.gates().active().is_none());

    // The decision goes back over the wire.
    deck.tick(3_000.0);
    assert!(sent_types(&deck).contains(&"hitl_response".to_string()));
}

#[test]
fn four_gates_two_agents_query_in_insertion_order() {
    let mut deck = deck();
    let a1 = deck.raise_gate("Analyst", "first?", GatePriority::Medium, 0.0);
    deck.raise_gate("Builder", "second?", GatePriority::Medium, 0.0);
    let a2 = deck.raise_gate("Analyst", "third?", GatePriority::Medium, 0.0);
    deck.raise_gate("Builder", "fourth?", GatePriority::Medium, 0.0);

    let mine = deck.gates().requests_by_agent("Analyst");
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, a1);
    assert_eq!(mine[1].id, a2);
}

#[test]
fn unknown_and_malformed_frames_never_block_the_stream() {
    let mut deck = deck();
    open(&mut deck, 0.0);

    feed(&mut deck, system_frame("quantum_status", json!({"q": 1})), 1_000.0);
    feed(&mut deck, "{definitely broken".to_string(), 1_100.0);
    feed(
        &mut deck,
        agent_frame("task_complete", "Builder", json!({})),
        1_200.0,
    );
    deck.tick(2_000.0);

    // The good event behind the bad ones still landed.
    assert_eq!(deck.fleet().get("Builder").unwrap().tasks_completed, 1);
    assert_eq!(deck.logbook().search("unrecognized").len(), 1);
    assert_eq!(deck.logbook().search("malformed").len(), 1);
    // Both bad frames still counted as received traffic.
    assert_eq!(deck.transport().status().messages_received, 3);
}

#[test]
fn workflow_and_chat_events_reach_their_stores() {
    let mut deck = deck();
    open(&mut deck, 0.0);

    feed(
        &mut deck,
        system_frame(
            "workflow_status",
            json!({"stage": "build", "status": "in_progress", "progress": 40.0}),
        ),
        1_000.0,
    );
    feed(
        &mut deck,
        serde_json::json!({
            "type": "chat",
            "agent_name": "Analyst",
            "content": "requirements look complete",
            "timestamp": "2026-01-01T00:00:00Z",
        })
        .to_string(),
        1_100.0,
    );

    let build = &deck.stages().stages()[2];
    assert_eq!(build.progress, 40.0);
    let last = deck.chat().messages().last().unwrap();
    assert_eq!(last.agent.as_deref(), Some("Analyst"));
    assert_eq!(last.content, "requirements look complete");
}

#[test]
fn state_survives_a_reload_via_local_storage() {
    let mut deck = deck();
    open(&mut deck, 0.0);
    for _ in 0..3 {
        feed(
            &mut deck,
            agent_frame("task_complete", "Analyst", json!({})),
            1_000.0,
        );
    }
    let gate_id = deck.raise_gate("Analyst", "persist me?", GatePriority::Low, 1_500.0);
    deck.navigate_to_gate(&gate_id);
    deck.tick(2_000.0); // flush logs
    deck.persist(2_000.0);

    let storage = MemoryStorage {
        map: deck.storage().map.clone(),
        fail_stores: 0,
    };
    let deck2 = deck_with_storage(storage);

    assert_eq!(deck2.fleet().get("Analyst").unwrap().tasks_completed, 3);
    assert_eq!(deck2.gates().requests().len(), 1);
    // The focus pointer is explicitly not persisted.
    assert!(deck2.gates().active().is_none());
    assert!(deck2.logbook().len() > 0, "log tail rehydrated");
}

#[test]
fn persistence_failures_leave_the_deck_working() {
    let mut deck = deck_with_storage(MemoryStorage {
        map: Default::default(),
        fail_stores: u32::MAX,
    });
    open(&mut deck, 0.0);
    feed(
        &mut deck,
        agent_frame("task_complete", "Analyst", json!({})),
        1_000.0,
    );
    deck.persist(1_000.0);

    // Still fully operational in memory.
    assert_eq!(deck.fleet().get("Analyst").unwrap().tasks_completed, 1);
    deck.send_chat("still alive", 1_100.0);
    deck.tick(1_200.0);
    assert!(sent_types(&deck).contains(&"chat".to_string()));
}

#[test]
fn reconnect_resyncs_after_abnormal_close() {
    let mut deck = deck();
    open(&mut deck, 0.0);
    assert_eq!(
        sent_types(&deck)
            .iter()
            .filter(|t| t.as_str() == "list_artifacts")
            .count(),
        1
    );

    deck.handle_socket_event(
        SocketEvent::Closed {
            clean: false,
            reason: Some("backend restarted".to_string()),
        },
        1_000.0,
    );
    assert!(deck.transport().status().reconnecting);

    // Past the max jittered delay for attempt 0.
    deck.tick(2_000.0);
    deck.handle_socket_event(SocketEvent::Opened, 2_000.0);

    assert!(deck.transport().is_connected());
    assert_eq!(
        sent_types(&deck)
            .iter()
            .filter(|t| t.as_str() == "list_artifacts")
            .count(),
        2,
        "every (re)connect requests a full resync"
    );
}

#[test]
fn filtered_view_equals_raw_view_after_clearing() {
    let mut deck = deck();
    open(&mut deck, 0.0);
    feed(
        &mut deck,
        agent_frame("agent_error", "Tester", json!({"message": "broken"})),
        1_000.0,
    );
    deck.tick(2_000.0);

    deck.set_log_filter(fleetdeck_core::logbook::LogFilter {
        agent: Some("Tester".to_string()),
        ..Default::default()
    });
    assert_eq!(deck.logbook().filtered().len(), 1);

    deck.clear_log_filter();
    let filtered: Vec<u64> = deck.logbook().filtered().iter().map(|e| e.id).collect();
    let raw: Vec<u64> = deck.logbook().entries().map(|e| e.id).collect();
    assert_eq!(filtered, raw);
}

#[test]
fn console_capture_lands_in_the_logbook() {
    let mut deck = deck();
    deck.ingest_diagnostic(
        fleetdeck_core::logbook::LogLevel::Warning,
        "slow frame detected",
        0.0,
    );
    deck.tick(1_000.0);
    let hits = deck.logbook().search("slow frame");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].category.as_deref(), Some("console"));
}
