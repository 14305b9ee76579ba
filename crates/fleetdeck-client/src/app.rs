use fleetdeck_core::config::DeckConfig;
use fleetdeck_core::deck::Deck;

use crate::socket::{EventBuffer, WsClient, drain_events};
use crate::storage::LocalStorage;

/// The browser application: the deck plus the handles the shell needs to
/// pump it.
pub struct App {
    pub deck: Deck<WsClient, LocalStorage>,
    socket_events: EventBuffer,
    was_connected: bool,
}

impl App {
    pub fn new(config_toml: Option<&str>, now_ms: f64) -> Self {
        let cfg = match config_toml {
            Some(content) => DeckConfig::from_toml(content),
            None => DeckConfig::default(),
        };
        let socket = WsClient::new();
        let socket_events = socket.event_buffer();
        let mut deck = Deck::new(cfg, socket, LocalStorage, now_ms);
        deck.set_page_url(page_ws_url());
        Self {
            deck,
            socket_events,
            was_connected: false,
        }
    }

    /// One pump of the cooperative loop: drain the socket, run the timers,
    /// surface connect/disconnect edges to the page chrome.
    pub fn frame(&mut self, now_ms: f64) {
        for event in drain_events(&self.socket_events) {
            self.deck.handle_socket_event(event, now_ms);
        }
        self.deck.tick(now_ms);

        let connected = self.deck.transport().is_connected();
        if connected != self.was_connected {
            if connected {
                crate::bridge::hide_disconnect_banner();
            } else {
                crate::bridge::show_disconnect_banner();
            }
            self.was_connected = connected;
        }
    }
}

/// Millisecond clock for the pump. `performance.now()` in the browser, a
/// process-relative clock elsewhere.
pub fn now_ms() -> f64 {
    #[cfg(target_family = "wasm")]
    {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or(0.0)
    }
    #[cfg(not(target_family = "wasm"))]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
            * 1000.0
    }
}

/// Derive the backend endpoint from the hosting page. `https` pages get
/// `wss`, everything else `ws`, same host, `/ws` path.
fn page_ws_url() -> Option<String> {
    #[cfg(target_family = "wasm")]
    {
        let location = web_sys::window()?.location();
        let protocol = location.protocol().ok()?;
        let host = location.host().ok()?;
        if host.is_empty() {
            return None;
        }
        let scheme = if protocol == "https:" { "wss" } else { "ws" };
        Some(format!("{scheme}://{host}/ws"))
    }
    #[cfg(not(target_family = "wasm"))]
    {
        None
    }
}
