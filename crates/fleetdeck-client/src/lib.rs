mod app;
mod bridge;
mod diag;
pub mod socket;
pub mod storage;

pub use app::App;

#[cfg(target_family = "wasm")]
use wasm_bindgen::prelude::*;

/// Pump interval in milliseconds. Fast enough that batch linger and log
/// debounce deadlines feel immediate, slow enough to stay out of the way.
#[cfg(target_family = "wasm")]
const FRAME_INTERVAL_MS: i32 = 100;

/// WASM entry point.
#[cfg_attr(target_family = "wasm", wasm_bindgen(start))]
pub fn start() {
    #[cfg(target_family = "wasm")]
    {
        use std::cell::RefCell;
        use std::rc::Rc;
        use wasm_bindgen::JsCast;
        use wasm_bindgen::closure::Closure;

        console_error_panic_hook::set_once();

        let config = read_embedded_config();
        let app = Rc::new(RefCell::new(App::new(config.as_deref(), app::now_ms())));
        bridge::attach_ui_callbacks(&app);

        let pump = {
            let app = Rc::clone(&app);
            Closure::<dyn FnMut()>::new(move || {
                let now = crate::app::now_ms();
                let mut app = app.borrow_mut();
                app.frame(now);
                bridge::push_ui_state(&app);
            })
        };
        if let Some(window) = web_sys::window() {
            let result = window.set_interval_with_callback_and_timeout_and_arguments_0(
                pump.as_ref().unchecked_ref(),
                FRAME_INTERVAL_MS,
            );
            if let Err(e) = result {
                diag::console_warn!("Failed to start frame pump: {e:?}");
            }
        }
        pump.forget();
    }
}

/// Deck configuration the page can embed as `window._fleetdeckConfig`
/// (a TOML string) before loading the bundle.
#[cfg(target_family = "wasm")]
fn read_embedded_config() -> Option<String> {
    let window = web_sys::window()?;
    let val = js_sys::Reflect::get(&window, &wasm_bindgen::JsValue::from_str("_fleetdeckConfig"))
        .ok()?;
    val.as_string()
}
