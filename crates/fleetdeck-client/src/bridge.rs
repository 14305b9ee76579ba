use crate::app::App;

#[cfg(target_family = "wasm")]
use wasm_bindgen::JsCast;

/// How many of the newest log entries each UI snapshot carries.
#[cfg(target_family = "wasm")]
const SNAPSHOT_LOG_ENTRIES: usize = 100;

/// Push deck state to JavaScript after each pump.
pub fn push_ui_state(app: &App) {
    #[cfg(target_family = "wasm")]
    {
        let deck = &app.deck;
        let state = serde_json::json!({
            "connection": deck.transport().status(),
            "fleet": {
                "agents": deck.fleet().agents(),
                "metrics": deck.fleet().metrics(),
            },
            "logs": {
                "recent": deck.logbook().tail(SNAPSHOT_LOG_ENTRIES),
                "filteredCount": deck.logbook().filtered().len(),
                "metrics": deck.logbook().metrics(),
            },
            "gates": {
                "requests": deck.gates().requests(),
                "pendingCount": deck.gates().pending_count(),
                "activeId": deck.gates().active().map(|r| r.id.clone()),
            },
            "chat": deck.chat().messages(),
            "stages": {
                "list": deck.stages().stages(),
                "overallProgress": deck.stages().overall_progress(),
            },
        });

        match serde_json::to_string(&state) {
            Ok(json_str) => {
                call_window_fn("_fleetdeckUpdate", Some(&json_str));
            },
            Err(e) => {
                crate::diag::console_warn!("Failed to serialize UI state: {e}");
            },
        }
    }
    #[cfg(not(target_family = "wasm"))]
    let _ = app;
}

/// Show disconnect banner via JS.
pub fn show_disconnect_banner() {
    #[cfg(target_family = "wasm")]
    call_window_fn("_fleetdeckDisconnect", None);
}

/// Hide disconnect banner via JS.
pub fn hide_disconnect_banner() {
    #[cfg(target_family = "wasm")]
    call_window_fn("_fleetdeckReconnect", None);
}

/// Call a function on the window object without eval().
/// If `json_arg` is Some, the JSON string is parsed to a JS object and passed as the argument.
#[cfg(target_family = "wasm")]
fn call_window_fn(name: &str, json_arg: Option<&str>) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Ok(val) = js_sys::Reflect::get(&window, &wasm_bindgen::JsValue::from_str(name)) else {
        return;
    };
    if !val.is_function() {
        return;
    }
    let func: js_sys::Function = val.unchecked_into();
    let result = if let Some(json_str) = json_arg {
        match js_sys::JSON::parse(json_str) {
            Ok(parsed) => func.call1(&wasm_bindgen::JsValue::NULL, &parsed),
            Err(e) => {
                crate::diag::console_warn!("JSON parse failed for {name}: {e:?}");
                return;
            },
        }
    } else {
        func.call0(&wasm_bindgen::JsValue::NULL)
    };
    if let Err(e) = result {
        crate::diag::console_warn!("JS bridge {name} failed: {e:?}");
    }
}

/// Pass a plain string to a window callback.
#[cfg(target_family = "wasm")]
fn call_window_fn_str(name: &str, arg: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Ok(val) = js_sys::Reflect::get(&window, &wasm_bindgen::JsValue::from_str(name)) else {
        return;
    };
    if !val.is_function() {
        return;
    }
    let func: js_sys::Function = val.unchecked_into();
    if let Err(e) = func.call1(
        &wasm_bindgen::JsValue::NULL,
        &wasm_bindgen::JsValue::from_str(arg),
    ) {
        crate::diag::console_warn!("JS bridge {name} failed: {e:?}");
    }
}

/// Attach JS->Rust bridge callbacks via global functions on window.
#[cfg(target_family = "wasm")]
pub fn attach_ui_callbacks(app: &std::rc::Rc<std::cell::RefCell<App>>) {
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::closure::Closure;

    use fleetdeck_core::events::GatePriority;
    use fleetdeck_core::hitl::GateDecision;
    use fleetdeck_core::logbook::{LogFilter, LogLevel};

    use crate::app::now_ms;

    let window = match web_sys::window() {
        Some(w) => w,
        None => return,
    };

    // ui_connect
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut()>::new(move || {
            app.borrow_mut().deck.enable_connection(now_ms());
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdConnect".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_disconnect
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut()>::new(move || {
            app.borrow_mut().deck.disconnect();
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdDisconnect".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_start_project(brief)
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |brief: String| {
            let brief = brief.trim().to_string();
            if brief.is_empty() {
                return;
            }
            app.borrow_mut().deck.start_project(&brief, now_ms());
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdStartProject".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_send_chat(text)
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |text: String| {
            if text.trim().is_empty() {
                return;
            }
            app.borrow_mut().deck.send_chat(&text, now_ms());
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdSendChat".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_user_command(command, args_json)
    {
        let app = Rc::clone(app);
        let closure =
            Closure::<dyn FnMut(String, String)>::new(move |command: String, args_json: String| {
                let args = serde_json::from_str(&args_json).unwrap_or_default();
                app.borrow_mut()
                    .deck
                    .send_user_command(&command, args, now_ms());
            });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdUserCommand".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_resolve_gate(id, status, response)
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String, String, String)>::new(
            move |id: String, status: String, response: String| {
                let decision = match status.to_ascii_lowercase().as_str() {
                    "approved" => GateDecision::Approved,
                    "rejected" => GateDecision::Rejected,
                    "modified" => GateDecision::Modified,
                    other => {
                        crate::diag::console_warn!("Unknown gate decision: {other}");
                        return;
                    },
                };
                let response = (!response.is_empty()).then_some(response);
                app.borrow_mut()
                    .deck
                    .resolve_gate(&id, decision, response, now_ms());
            },
        );
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdResolveGate".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_focus_gate(id)
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |id: String| {
            app.borrow_mut().deck.navigate_to_gate(&id);
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdFocusGate".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_raise_gate(agent, decision, priority)
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String, String, String)>::new(
            move |agent: String, decision: String, priority: String| {
                app.borrow_mut().deck.raise_gate(
                    &agent,
                    &decision,
                    GatePriority::from_wire(&priority),
                    now_ms(),
                );
            },
        );
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdRaiseGate".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_pause_agent / ui_resume_agent / ui_reset_agent
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |name: String| {
            app.borrow_mut().deck.pause_agent(&name, now_ms());
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdPauseAgent".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |name: String| {
            app.borrow_mut().deck.resume_agent(&name, now_ms());
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdResumeAgent".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |name: String| {
            app.borrow_mut().deck.reset_agent(&name, now_ms());
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdResetAgent".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_set_log_filter(json)
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |json: String| {
            match serde_json::from_str::<LogFilter>(&json) {
                Ok(filter) => app.borrow_mut().deck.set_log_filter(filter),
                Err(e) => crate::diag::console_warn!("Bad log filter: {e}"),
            }
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdSetLogFilter".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_clear_log_filter
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut()>::new(move || {
            app.borrow_mut().deck.clear_log_filter();
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdClearLogFilter".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_search_logs(query) -> results via _fleetdeckSearchResults
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |query: String| {
            let app = app.borrow();
            let hits = app.deck.logbook().search(&query);
            match serde_json::to_string(&hits) {
                Ok(json) => call_window_fn("_fleetdeckSearchResults", Some(&json)),
                Err(e) => crate::diag::console_warn!("Failed to serialize search hits: {e}"),
            }
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdSearchLogs".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_export_logs(format) -> text via _fleetdeckExport
    {
        let app = Rc::clone(app);
        let closure = Closure::<dyn FnMut(String)>::new(move |format: String| {
            let app = app.borrow();
            let text = match format.to_ascii_lowercase().as_str() {
                "csv" => app.deck.logbook().export_csv(),
                _ => app.deck.logbook().export_jsonl(),
            };
            call_window_fn_str("_fleetdeckExport", &text);
        });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdExportLogs".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }

    // ui_console(level, message): the page's console hook feeds captured
    // output into the logbook.
    {
        let app = Rc::clone(app);
        let closure =
            Closure::<dyn FnMut(String, String)>::new(move |level: String, message: String| {
                app.borrow_mut().deck.ingest_diagnostic(
                    LogLevel::from_wire(&level),
                    &message,
                    now_ms(),
                );
            });
        let _ = js_sys::Reflect::set(
            &window,
            &"_fdConsole".into(),
            closure.as_ref().unchecked_ref(),
        );
        closure.forget();
    }
}

#[cfg(not(target_family = "wasm"))]
#[allow(dead_code)]
pub fn attach_ui_callbacks(_app: &std::rc::Rc<std::cell::RefCell<App>>) {}
