use std::collections::VecDeque;

use serde::Serialize;

use crate::config::TransportConfig;
use crate::events::ServerEvent;
use crate::net::messages::{ClientCommand, PingCmd, PongCmd};
use crate::net::protocol::{ProtocolError, decode_event, encode_command, encode_flush};
use crate::time::timestamp_now;

/// Fallback endpoint for local development.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8787/ws";

/// Smoothing factor for the latency moving average. One slow round-trip
/// moves the displayed value by a fifth, not all the way.
const LATENCY_ALPHA: f64 = 0.2;

/// Snapshot of the connection, readable by every other component.
/// Mutated only by the `TransportManager`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnecting: bool,
    pub last_connected: Option<String>,
    pub error: Option<String>,
    pub latency_ms: Option<f64>,
    pub reconnect_count: u32,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// A lifecycle or data event surfaced by the socket shell.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Opened,
    Closed { clean: bool, reason: Option<String> },
    Errored(String),
    Frame(String),
}

/// The seam between the transport state machine and the physical socket.
/// The browser shell implements this over `web_sys::WebSocket`; tests use
/// an in-memory mock.
pub trait SocketDriver {
    fn open(&mut self, url: &str) -> Result<(), String>;
    fn send_text(&mut self, text: &str) -> Result<(), String>;
    fn close(&mut self);
}

/// A one-shot timer as an explicit state machine. Arming an armed timer
/// is a no-op, which removes the double-arm class of bugs outright.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TimerState {
    #[default]
    Idle,
    Armed {
        deadline_ms: f64,
    },
}

impl TimerState {
    /// Arm the timer unless it is already pending.
    pub fn arm(&mut self, deadline_ms: f64) {
        if matches!(self, Self::Idle) {
            *self = Self::Armed { deadline_ms };
        }
    }

    pub fn disarm(&mut self) {
        *self = Self::Idle;
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed { .. })
    }

    /// Returns true (and disarms) when the deadline has passed.
    pub fn fire_if_due(&mut self, now_ms: f64) -> bool {
        match *self {
            Self::Armed { deadline_ms } if now_ms >= deadline_ms => {
                *self = Self::Idle;
                true
            },
            _ => false,
        }
    }
}

/// Exponential backoff with full-range jitter on the upper half.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_ms: f64,
    max_ms: f64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms: base_ms as f64,
            max_ms: max_ms as f64,
        }
    }

    /// Deterministic ceiling for the given attempt (0-based).
    pub fn cap_ms(&self, attempt: u32) -> f64 {
        let exp = self.base_ms * 2f64.powi(attempt.min(20) as i32);
        exp.min(self.max_ms)
    }

    /// Jittered delay in `[cap/2, cap]` so simultaneous clients spread out.
    pub fn delay_ms(&self, attempt: u32) -> f64 {
        let cap = self.cap_ms(attempt);
        cap / 2.0 + rand::random::<f64>() * (cap / 2.0)
    }
}

/// Queued outbound commands waiting for a size- or linger-triggered flush.
#[derive(Debug, Default)]
struct OutboundBatcher {
    pending: Vec<ClientCommand>,
    linger: TimerState,
}

struct PendingPing {
    nonce: u64,
    sent_at_ms: f64,
}

/// Owns the one logical connection to the orchestration backend and
/// insulates everything else from physical connection churn.
pub struct TransportManager<S: SocketDriver> {
    driver: S,
    cfg: TransportConfig,
    backoff: BackoffPolicy,
    status: ConnectionStatus,
    /// Explicit opt-in; passive UI must not dial out by loading a module.
    auto_connect: bool,
    /// A socket handle currently exists (possibly still handshaking).
    has_socket: bool,
    retry_attempt: u32,
    reconnect: TimerState,
    heartbeat: TimerState,
    pending_ping: Option<PendingPing>,
    ping_nonce: u64,
    batcher: OutboundBatcher,
    /// Encoded frames that could not be written; replayed in order on open.
    overflow: VecDeque<String>,
    /// ws URL derived from the hosting page, if the shell could compute one.
    page_url: Option<String>,
}

impl<S: SocketDriver> TransportManager<S> {
    pub fn new(cfg: TransportConfig, driver: S) -> Self {
        let backoff = BackoffPolicy::new(cfg.backoff_base_ms, cfg.backoff_max_ms);
        Self {
            driver,
            cfg,
            backoff,
            status: ConnectionStatus::default(),
            auto_connect: false,
            has_socket: false,
            retry_attempt: 0,
            reconnect: TimerState::Idle,
            heartbeat: TimerState::Idle,
            pending_ping: None,
            ping_nonce: 0,
            batcher: OutboundBatcher::default(),
            overflow: VecDeque::new(),
            page_url: None,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status.connected
    }

    pub fn set_page_url(&mut self, url: Option<String>) {
        self.page_url = url;
    }

    /// Enable or disable automatic connection management. Enabling after a
    /// terminal reconnect failure clears it and starts the attempt count over.
    pub fn set_auto_connect(&mut self, enabled: bool) {
        self.auto_connect = enabled;
        if enabled {
            self.retry_attempt = 0;
            self.status.error = None;
        }
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Target resolution: operator override, then the hosting page, then
    /// the local development default.
    pub fn resolve_url(&self) -> String {
        if let Some(ref url) = self.cfg.url_override {
            return url.clone();
        }
        if let Some(ref url) = self.page_url {
            return url.clone();
        }
        DEFAULT_WS_URL.to_string()
    }

    /// Open the connection. No-op while a socket handle exists or when
    /// auto-connect has not been enabled.
    pub fn connect(&mut self, now_ms: f64) {
        if !self.auto_connect {
            tracing::debug!("connect() ignored: auto-connect not enabled");
            return;
        }
        if self.has_socket {
            tracing::debug!("connect() ignored: socket already exists");
            return;
        }
        self.open_socket(now_ms);
    }

    /// Explicit teardown. Resets status to its boot defaults and leaves
    /// auto-connect off so nothing redials behind the user's back. A
    /// reconnect attempt that is already scheduled stays scheduled; it
    /// re-checks intent when it fires and stands down.
    pub fn disconnect(&mut self) {
        self.auto_connect = false;
        if self.has_socket {
            self.driver.close();
            self.has_socket = false;
        }
        self.heartbeat.disarm();
        self.pending_ping = None;
        self.status = ConnectionStatus::default();
    }

    fn open_socket(&mut self, now_ms: f64) {
        let url = self.resolve_url();
        self.status.connected = false;
        self.status.reconnecting = true;
        match self.driver.open(&url) {
            Ok(()) => {
                self.has_socket = true;
            },
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Socket open failed");
                self.status.error = Some(e);
                self.schedule_reconnect(now_ms);
            },
        }
    }

    /// Feed one socket lifecycle event into the state machine.
    pub fn handle_socket_event(&mut self, event: &SocketEvent, now_ms: f64) {
        match event {
            SocketEvent::Opened => self.on_open(),
            SocketEvent::Closed { clean, reason } => self.on_close(*clean, reason.clone(), now_ms),
            SocketEvent::Errored(msg) => {
                self.status.connected = false;
                self.status.error = Some(msg.clone());
            },
            // Data frames go through handle_frame so the caller can dispatch.
            SocketEvent::Frame(_) => {},
        }
    }

    fn on_open(&mut self) {
        self.status.connected = true;
        self.status.reconnecting = false;
        self.status.error = None;
        self.status.last_connected = Some(timestamp_now());
        self.retry_attempt = 0;
        self.heartbeat.disarm();

        // Replay whatever was queued while disconnected, in original order.
        while let Some(frame) = self.overflow.pop_front() {
            if let Err(e) = self.driver.send_text(&frame) {
                tracing::warn!(error = %e, "Overflow replay failed, requeueing");
                self.overflow.push_front(frame);
                break;
            }
            self.status.messages_sent += 1;
        }

        // Ask the backend for its full current state.
        match encode_command(&ClientCommand::ListArtifacts) {
            Ok(frame) => {
                if self.driver.send_text(&frame).is_ok() {
                    self.status.messages_sent += 1;
                }
            },
            Err(e) => tracing::warn!(error = %e, "Failed to encode resync request"),
        }
    }

    fn on_close(&mut self, clean: bool, reason: Option<String>, now_ms: f64) {
        self.has_socket = false;
        self.status.connected = false;
        self.heartbeat.disarm();
        self.pending_ping = None;

        if clean || !self.auto_connect {
            self.status.reconnecting = false;
            return;
        }
        if let Some(reason) = reason {
            self.status.error = Some(reason);
        }
        self.schedule_reconnect(now_ms);
    }

    fn schedule_reconnect(&mut self, now_ms: f64) {
        if self.retry_attempt >= self.cfg.max_reconnect_attempts {
            // Terminal: the outage is real and the user has to act.
            self.auto_connect = false;
            self.status.reconnecting = false;
            self.status.error = Some(format!(
                "reconnect attempts exhausted after {} tries",
                self.retry_attempt
            ));
            tracing::warn!(
                attempts = self.retry_attempt,
                "Reconnect ceiling reached, giving up"
            );
            return;
        }
        let delay = self.backoff.delay_ms(self.retry_attempt);
        self.retry_attempt += 1;
        self.status.reconnect_count += 1;
        self.status.reconnecting = true;
        self.reconnect.arm(now_ms + delay);
        tracing::debug!(
            attempt = self.retry_attempt,
            delay_ms = delay,
            "Reconnect scheduled"
        );
    }

    /// Queue an application command. Flushes immediately once the batch is
    /// full; otherwise a short linger timer picks it up.
    pub fn queue_command(&mut self, cmd: ClientCommand, now_ms: f64) {
        self.batcher.pending.push(cmd);
        if self.batcher.pending.len() >= self.cfg.batch_max_len {
            self.flush(now_ms);
        } else {
            self.batcher
                .linger
                .arm(now_ms + self.cfg.batch_linger_ms as f64);
        }
    }

    /// Number of commands waiting in the current batch.
    pub fn pending_len(&self) -> usize {
        self.batcher.pending.len()
    }

    /// Encoded frames waiting for the connection to come back.
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    fn flush(&mut self, _now_ms: f64) {
        self.batcher.linger.disarm();
        if self.batcher.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batcher.pending);
        let frame = match encode_flush(&batch) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode outbound batch, dropping");
                return;
            },
        };

        if self.status.connected {
            match self.driver.send_text(&frame) {
                Ok(()) => {
                    self.status.messages_sent += 1;
                    return;
                },
                Err(e) => tracing::warn!(error = %e, "Send failed, spilling to overflow"),
            }
        }
        self.spill(frame);
    }

    fn spill(&mut self, frame: String) {
        self.overflow.push_back(frame);
        while self.overflow.len() > self.cfg.overflow_limit {
            self.overflow.pop_front();
            tracing::warn!("Overflow queue full, dropping oldest outbound frame");
        }
    }

    /// Account for and decode one inbound frame. Pings are answered and
    /// pongs close out the latency probe before the event is returned for
    /// dispatch.
    pub fn handle_frame(&mut self, line: &str, now_ms: f64) -> Result<ServerEvent, ProtocolError> {
        self.status.messages_received += 1;
        let event = decode_event(line)?;
        match &event {
            ServerEvent::Pong(pong) => self.observe_pong(pong.nonce, now_ms),
            ServerEvent::Ping(ping) => {
                let reply = ClientCommand::Pong(PongCmd { nonce: ping.nonce });
                if let Ok(frame) = encode_command(&reply)
                    && self.driver.send_text(&frame).is_ok()
                {
                    self.status.messages_sent += 1;
                }
            },
            _ => {},
        }
        Ok(event)
    }

    fn observe_pong(&mut self, nonce: u64, now_ms: f64) {
        let Some(ref pending) = self.pending_ping else {
            return;
        };
        if pending.nonce != nonce {
            // Stale pong; the in-flight probe keeps waiting for its own.
            return;
        }
        let sent_at_ms = pending.sent_at_ms;
        self.pending_ping = None;
        let sample = (now_ms - sent_at_ms).max(0.0);
        let smoothed = match self.status.latency_ms {
            Some(prev) => prev * (1.0 - LATENCY_ALPHA) + sample * LATENCY_ALPHA,
            None => sample,
        };
        self.status.latency_ms = Some(smoothed);
    }

    /// Run every due timer. Called from the single frame pump.
    pub fn tick(&mut self, now_ms: f64) {
        if self.reconnect.fire_if_due(now_ms) {
            // Polling-style cancellation: re-check intent before dialing.
            if self.auto_connect && !self.has_socket {
                self.open_socket(now_ms);
            } else {
                self.status.reconnecting = false;
            }
        }

        if self.batcher.linger.fire_if_due(now_ms) {
            self.flush(now_ms);
        }

        if self.status.connected {
            self.heartbeat
                .arm(now_ms + self.cfg.heartbeat_interval_ms as f64);
            if self.heartbeat.fire_if_due(now_ms) {
                self.send_ping(now_ms);
                self.heartbeat
                    .arm(now_ms + self.cfg.heartbeat_interval_ms as f64);
            }
        }
    }

    fn send_ping(&mut self, now_ms: f64) {
        self.ping_nonce += 1;
        let nonce = self.ping_nonce;
        let cmd = ClientCommand::Ping(PingCmd { nonce });
        match encode_command(&cmd) {
            Ok(frame) => match self.driver.send_text(&frame) {
                Ok(()) => {
                    self.status.messages_sent += 1;
                    self.pending_ping = Some(PendingPing {
                        nonce,
                        sent_at_ms: now_ms,
                    });
                },
                Err(e) => tracing::debug!(error = %e, "Heartbeat send failed"),
            },
            Err(e) => tracing::warn!(error = %e, "Failed to encode heartbeat"),
        }
    }

    /// Direct access for the shell (native stubs and tests).
    pub fn driver_mut(&mut self) -> &mut S {
        &mut self.driver
    }

    pub fn driver(&self) -> &S {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockSocket;

    fn small_cfg() -> TransportConfig {
        TransportConfig {
            heartbeat_interval_ms: 1_000,
            backoff_base_ms: 100,
            backoff_max_ms: 800,
            max_reconnect_attempts: 2,
            batch_max_len: 3,
            batch_linger_ms: 50,
            overflow_limit: 2,
            ..TransportConfig::default()
        }
    }

    fn manager() -> TransportManager<MockSocket> {
        TransportManager::new(small_cfg(), MockSocket::default())
    }

    fn frame_type(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        value["type"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn connect_is_noop_without_auto_connect() {
        let mut mgr = manager();
        mgr.connect(0.0);
        assert!(mgr.driver().open_calls.is_empty());
        assert!(!mgr.status().reconnecting);
    }

    #[test]
    fn duplicate_connect_is_noop() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.connect(0.0);
        assert_eq!(mgr.driver().open_calls.len(), 1);
    }

    #[test]
    fn connect_publishes_reconnecting_immediately() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        assert!(!mgr.status().connected);
        assert!(mgr.status().reconnecting);
    }

    #[test]
    fn url_resolution_order() {
        let mut mgr = manager();
        assert_eq!(mgr.resolve_url(), DEFAULT_WS_URL);
        mgr.set_page_url(Some("ws://dash.example/ws".to_string()));
        assert_eq!(mgr.resolve_url(), "ws://dash.example/ws");

        let cfg = TransportConfig {
            url_override: Some("wss://op.example/ws".to_string()),
            ..small_cfg()
        };
        let mut mgr = TransportManager::new(cfg, MockSocket::default());
        mgr.set_page_url(Some("ws://dash.example/ws".to_string()));
        assert_eq!(mgr.resolve_url(), "wss://op.example/ws");
    }

    #[test]
    fn open_flushes_overflow_in_order_then_resyncs() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);

        // Queue while disconnected; linger flush spills to overflow.
        mgr.queue_command(
            ClientCommand::Chat(crate::net::messages::ChatCmd {
                content: "first".to_string(),
            }),
            0.0,
        );
        mgr.tick(100.0);
        mgr.queue_command(
            ClientCommand::Chat(crate::net::messages::ChatCmd {
                content: "second".to_string(),
            }),
            200.0,
        );
        mgr.tick(300.0);
        assert_eq!(mgr.overflow_len(), 2);

        mgr.connect(300.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 300.0);

        let sent = &mgr.driver().sent;
        assert_eq!(sent.len(), 3);
        assert!(sent[0].contains("first"));
        assert!(sent[1].contains("second"));
        assert_eq!(frame_type(&sent[2]), "list_artifacts");
        assert!(mgr.status().connected);
        assert!(!mgr.status().reconnecting);
        assert_eq!(mgr.status().messages_sent, 3);
    }

    #[test]
    fn abnormal_close_schedules_backoff_reconnect() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        mgr.handle_socket_event(
            &SocketEvent::Closed {
                clean: false,
                reason: Some("going away".to_string()),
            },
            1_000.0,
        );

        assert!(!mgr.status().connected);
        assert!(mgr.status().reconnecting);
        assert_eq!(mgr.status().reconnect_count, 1);

        // Before any possible deadline: nothing happens.
        mgr.tick(1_010.0);
        assert_eq!(mgr.driver().open_calls.len(), 1);

        // Past the maximum jittered delay for attempt 0 (100ms cap).
        mgr.tick(1_200.0);
        assert_eq!(mgr.driver().open_calls.len(), 2);
    }

    #[test]
    fn clean_close_does_not_reconnect() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        mgr.handle_socket_event(
            &SocketEvent::Closed {
                clean: true,
                reason: None,
            },
            1_000.0,
        );
        assert!(!mgr.status().reconnecting);
        mgr.tick(60_000.0);
        assert_eq!(mgr.driver().open_calls.len(), 1);
    }

    #[test]
    fn reconnect_ceiling_is_terminal() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);

        let mut now = 0.0;
        // Two allowed attempts, then the third failure is terminal.
        for _ in 0..3 {
            mgr.handle_socket_event(
                &SocketEvent::Closed {
                    clean: false,
                    reason: None,
                },
                now,
            );
            now += 10_000.0;
            mgr.tick(now);
        }

        let status = mgr.status();
        assert!(!status.reconnecting);
        assert!(
            status.error.as_deref().unwrap_or("").contains("exhausted"),
            "terminal error expected, got {:?}",
            status.error
        );
        assert!(!mgr.auto_connect());

        // No further automatic dials.
        let opens = mgr.driver().open_calls.len();
        mgr.tick(now + 120_000.0);
        assert_eq!(mgr.driver().open_calls.len(), opens);

        // Explicit re-enable starts over.
        mgr.set_auto_connect(true);
        mgr.connect(now + 120_000.0);
        assert_eq!(mgr.driver().open_calls.len(), opens + 1);
    }

    #[test]
    fn disconnect_while_reconnect_armed_stands_down() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        mgr.handle_socket_event(
            &SocketEvent::Closed {
                clean: false,
                reason: None,
            },
            100.0,
        );
        assert!(mgr.status().reconnecting);

        mgr.disconnect();
        let opens = mgr.driver().open_calls.len();
        // The armed attempt fires, re-checks intent, and stands down.
        mgr.tick(10_000.0);
        assert_eq!(mgr.driver().open_calls.len(), opens);
        assert!(!mgr.status().reconnecting);
    }

    #[test]
    fn disconnect_resets_status() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        assert!(mgr.status().connected);
        mgr.disconnect();
        assert_eq!(*mgr.status(), ConnectionStatus::default());
    }

    #[test]
    fn batch_flushes_at_max_len() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        let sent_before = mgr.driver().sent.len();

        for i in 0..3 {
            mgr.queue_command(
                ClientCommand::Chat(crate::net::messages::ChatCmd {
                    content: format!("m{i}"),
                }),
                10.0,
            );
        }
        // Third enqueue hits batch_max_len and flushes without any tick.
        let sent = &mgr.driver().sent;
        assert_eq!(sent.len(), sent_before + 1);
        assert_eq!(frame_type(sent.last().unwrap()), "batch");
        assert_eq!(mgr.pending_len(), 0);
    }

    #[test]
    fn batch_flushes_on_linger_deadline() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        let sent_before = mgr.driver().sent.len();

        mgr.queue_command(
            ClientCommand::Chat(crate::net::messages::ChatCmd {
                content: "solo".to_string(),
            }),
            0.0,
        );
        mgr.tick(10.0);
        assert_eq!(mgr.driver().sent.len(), sent_before);

        mgr.tick(60.0);
        let sent = &mgr.driver().sent;
        assert_eq!(sent.len(), sent_before + 1);
        // A single command goes out unwrapped.
        assert_eq!(frame_type(sent.last().unwrap()), "chat");
    }

    #[test]
    fn overflow_drops_oldest_beyond_bound() {
        let mut mgr = manager();
        for i in 0..4 {
            mgr.queue_command(
                ClientCommand::Chat(crate::net::messages::ChatCmd {
                    content: format!("m{i}"),
                }),
                i as f64 * 100.0,
            );
            mgr.tick(i as f64 * 100.0 + 60.0);
        }
        assert_eq!(mgr.overflow_len(), 2);

        mgr.set_auto_connect(true);
        mgr.connect(1_000.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 1_000.0);
        let sent = &mgr.driver().sent;
        // The two newest survived, in order.
        assert!(sent[0].contains("m2"));
        assert!(sent[1].contains("m3"));
    }

    #[test]
    fn heartbeat_pings_and_smooths_latency() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        mgr.tick(0.0); // arms the heartbeat

        mgr.tick(1_000.0);
        let ping_frame = mgr.driver().sent.last().unwrap().clone();
        assert_eq!(frame_type(&ping_frame), "ping");
        let nonce = serde_json::from_str::<serde_json::Value>(&ping_frame).unwrap()["nonce"]
            .as_u64()
            .unwrap();

        let pong = format!(r#"{{"type":"pong","data":{{"nonce":{nonce}}},"timestamp":"1Z"}}"#);
        mgr.handle_frame(&pong, 1_100.0).unwrap();
        assert_eq!(mgr.status().latency_ms, Some(100.0));

        // Second round trip folds in, exponentially smoothed.
        mgr.tick(2_000.0);
        let ping_frame = mgr.driver().sent.last().unwrap().clone();
        let nonce = serde_json::from_str::<serde_json::Value>(&ping_frame).unwrap()["nonce"]
            .as_u64()
            .unwrap();
        let pong = format!(r#"{{"type":"pong","data":{{"nonce":{nonce}}},"timestamp":"1Z"}}"#);
        mgr.handle_frame(&pong, 2_300.0).unwrap();
        let expected = 100.0 * 0.8 + 300.0 * 0.2;
        let got = mgr.status().latency_ms.unwrap();
        assert!((got - expected).abs() < 1e-9, "got {got}, want {expected}");
    }

    #[test]
    fn server_ping_is_answered_with_pong() {
        let mut mgr = manager();
        mgr.set_auto_connect(true);
        mgr.connect(0.0);
        mgr.handle_socket_event(&SocketEvent::Opened, 0.0);
        let sent_before = mgr.driver().sent.len();

        let event = mgr
            .handle_frame(r#"{"type":"ping","data":{"nonce":9},"timestamp":"1Z"}"#, 0.0)
            .unwrap();
        assert!(matches!(event, ServerEvent::Ping(_)));
        let reply = mgr.driver().sent.last().unwrap();
        assert_eq!(frame_type(reply), "pong");
        assert_eq!(mgr.driver().sent.len(), sent_before + 1);
    }

    #[test]
    fn malformed_frame_still_counts_as_received() {
        let mut mgr = manager();
        assert!(mgr.handle_frame("{broken", 0.0).is_err());
        assert_eq!(mgr.status().messages_received, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = BackoffPolicy::new(100, 800);
        assert_eq!(policy.cap_ms(0), 100.0);
        assert_eq!(policy.cap_ms(1), 200.0);
        assert_eq!(policy.cap_ms(2), 400.0);
        assert_eq!(policy.cap_ms(3), 800.0);
        assert_eq!(policy.cap_ms(10), 800.0);
    }

    #[test]
    fn backoff_jitter_stays_in_bounds() {
        let policy = BackoffPolicy::new(100, 800);
        for attempt in 0..5 {
            let cap = policy.cap_ms(attempt);
            for _ in 0..50 {
                let d = policy.delay_ms(attempt);
                assert!(d >= cap / 2.0 && d <= cap, "delay {d} outside [{}, {cap}]", cap / 2.0);
            }
        }
    }

    #[test]
    fn timer_cannot_be_double_armed() {
        let mut timer = TimerState::Idle;
        timer.arm(100.0);
        timer.arm(999.0); // ignored: already armed
        assert!(timer.fire_if_due(150.0), "original deadline must win");
        assert!(!timer.is_armed());
        assert!(!timer.fire_if_due(1_000.0), "fired timer is idle again");
    }
}
