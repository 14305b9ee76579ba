use std::cell::RefCell;
use std::rc::Rc;

#[cfg(target_family = "wasm")]
use wasm_bindgen::prelude::*;

use fleetdeck_core::transport::{SocketDriver, SocketEvent};

/// Shared buffer the WebSocket callbacks write into and the frame pump
/// drains. Uses Rc<RefCell> because WASM is single-threaded.
pub type EventBuffer = Rc<RefCell<Vec<SocketEvent>>>;

/// The physical WebSocket behind the transport manager's `SocketDriver`
/// seam.
pub struct WsClient {
    #[cfg(target_family = "wasm")]
    ws: Option<web_sys::WebSocket>,
    events: EventBuffer,
}

impl WsClient {
    pub fn new() -> Self {
        Self {
            #[cfg(target_family = "wasm")]
            ws: None,
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A second handle on the event buffer, kept by the app so it can
    /// drain without reaching through the deck.
    pub fn event_buffer(&self) -> EventBuffer {
        Rc::clone(&self.events)
    }
}

impl Default for WsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketDriver for WsClient {
    #[cfg(target_family = "wasm")]
    fn open(&mut self, url: &str) -> Result<(), String> {
        let ws = web_sys::WebSocket::new(url).map_err(|e| format!("WebSocket error: {e:?}"))?;

        let events = Rc::clone(&self.events);
        let onmessage =
            Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |evt: web_sys::MessageEvent| {
                if let Some(text) = evt.data().as_string() {
                    events.borrow_mut().push(SocketEvent::Frame(text));
                }
            });
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();

        let events = Rc::clone(&self.events);
        let onopen = Closure::<dyn FnMut()>::new(move || {
            events.borrow_mut().push(SocketEvent::Opened);
        });
        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        onopen.forget();

        let events = Rc::clone(&self.events);
        let onerror =
            Closure::<dyn FnMut(web_sys::ErrorEvent)>::new(move |evt: web_sys::ErrorEvent| {
                events
                    .borrow_mut()
                    .push(SocketEvent::Errored(evt.message()));
            });
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onerror.forget();

        let events = Rc::clone(&self.events);
        let onclose =
            Closure::<dyn FnMut(web_sys::CloseEvent)>::new(move |evt: web_sys::CloseEvent| {
                let reason = evt.reason();
                events.borrow_mut().push(SocketEvent::Closed {
                    clean: evt.was_clean(),
                    reason: (!reason.is_empty()).then_some(reason),
                });
            });
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        onclose.forget();

        self.ws = Some(ws);
        Ok(())
    }

    /// Stub for non-WASM targets (native check only).
    #[cfg(not(target_family = "wasm"))]
    fn open(&mut self, _url: &str) -> Result<(), String> {
        Ok(())
    }

    #[cfg(target_family = "wasm")]
    fn send_text(&mut self, text: &str) -> Result<(), String> {
        match &self.ws {
            Some(ws) => ws
                .send_with_str(text)
                .map_err(|e| format!("Send error: {e:?}")),
            None => Err("Not connected".to_string()),
        }
    }

    #[cfg(not(target_family = "wasm"))]
    fn send_text(&mut self, _text: &str) -> Result<(), String> {
        Ok(())
    }

    #[cfg(target_family = "wasm")]
    fn close(&mut self) {
        if let Some(ws) = self.ws.take() {
            let _ = ws.close();
        }
    }

    #[cfg(not(target_family = "wasm"))]
    fn close(&mut self) {}
}

/// Drain all buffered socket events.
pub fn drain_events(buffer: &EventBuffer) -> Vec<SocketEvent> {
    std::mem::take(&mut buffer.borrow_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_drains_to_empty() {
        let client = WsClient::new();
        let buffer = client.event_buffer();
        buffer.borrow_mut().push(SocketEvent::Opened);
        buffer
            .borrow_mut()
            .push(SocketEvent::Frame("{}".to_string()));

        let drained = drain_events(&buffer);
        assert_eq!(drained.len(), 2);
        assert!(drain_events(&buffer).is_empty());
    }
}
