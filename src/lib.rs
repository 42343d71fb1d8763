//! Glint — Tauri application entry point.
//!
//! This is the app shell that wires together:
//! - Capture store (capture/) — bounded, disk-backed screenshot queues
//! - Request orchestrator (orchestrator/) — streaming model calls
//! - View/interactivity state machine (view/)
//! - Tauri command handlers + global shortcuts for the overlay

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod view;

use std::sync::Arc;

use tauri::Manager;

use capture::{CaptureItem, CaptureKind, CaptureStore};
use config::ProviderConfig;
use events::{EventSink, RequestKind, TauriEventSink};
use orchestrator::{
    AnthropicProvider, Orchestrator, OrchestratorOptions, ResponseEntry,
};
use view::{InteractivityMode, ViewController, ViewSnapshot, ViewState, WindowEffects};

const OVERLAY_WINDOW: &str = "main";

type AppOrchestrator = Orchestrator<AnthropicProvider>;

struct AppState {
    store: Arc<CaptureStore>,
    view: Arc<ViewController>,
    orchestrator: Arc<AppOrchestrator>,
    sink: Arc<TauriEventSink>,
}

/// Applies the inertness contract to the real overlay window.
struct TauriWindowEffects {
    app: tauri::AppHandle,
}

impl WindowEffects for TauriWindowEffects {
    fn apply_inertness(&self, inert: bool) {
        if let Some(window) = self.app.get_webview_window(OVERLAY_WINDOW) {
            let _ = window.set_ignore_cursor_events(inert);
            let _ = window.set_skip_taskbar(inert);
            let _ = window.set_focusable(!inert);
        }
    }

    fn resize(&self, width: f64, height: f64) {
        if let Some(window) = self.app.get_webview_window(OVERLAY_WINDOW) {
            let _ = window.set_size(tauri::LogicalSize::new(width, height));
        }
    }
}

// ── Tauri commands ──────────────────────────────────────────────────

#[tauri::command]
async fn capture_screen(
    kind: CaptureKind,
    state: tauri::State<'_, AppState>,
) -> Result<CaptureItem, String> {
    state.store.capture(kind).await.map_err(|e| e.to_string())
}

/// Claims the processing slot synchronously (so a double invocation gets
/// an immediate "already processing" error) and runs the request in the
/// background; results arrive as events.
#[tauri::command]
fn start_processing(
    kind: RequestKind,
    question: Option<String>,
    state: tauri::State<'_, AppState>,
) -> Result<(), String> {
    let permit = state.orchestrator.try_acquire().map_err(|e| e.to_string())?;
    let orchestrator = state.orchestrator.clone();
    tauri::async_runtime::spawn(async move {
        orchestrator.run(permit, kind, question).await;
    });
    Ok(())
}

#[tauri::command]
fn cancel_processing(state: tauri::State<'_, AppState>) {
    state.orchestrator.cancel();
}

#[tauri::command]
async fn clear_queues(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.store.clear_all().await;
    state.sink.queues_cleared();
    Ok(())
}

/// Cancel whatever is in flight, drop all captures, return to idle.
#[tauri::command]
async fn reset(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.orchestrator.cancel();
    state.store.clear_all().await;
    state.sink.queues_cleared();
    state.view.transition(ViewState::Idle);
    Ok(())
}

#[tauri::command]
fn toggle_interactive(state: tauri::State<'_, AppState>) -> InteractivityMode {
    state.view.toggle_user_inert()
}

#[tauri::command]
fn request_resize(width: f64, height: f64, state: tauri::State<'_, AppState>) {
    state.view.request_resize(width, height);
}

#[tauri::command]
fn get_view_state(state: tauri::State<'_, AppState>) -> ViewSnapshot {
    state.view.snapshot()
}

#[tauri::command]
fn get_response_history(state: tauri::State<'_, AppState>) -> Vec<ResponseEntry> {
    state.orchestrator.history_entries()
}

#[tauri::command]
fn copy_response(state: tauri::State<'_, AppState>) -> Result<(), String> {
    let text = state
        .orchestrator
        .latest_response()
        .ok_or("No response to copy")?;
    let mut clipboard = arboard::Clipboard::new().map_err(|e| e.to_string())?;
    clipboard.set_text(text).map_err(|e| e.to_string())?;
    Ok(())
}

#[tauri::command]
fn set_api_key(key: String) -> Result<(), String> {
    config::store_api_key(&key)
}

#[tauri::command]
fn has_api_key() -> bool {
    config::has_api_key()
}

#[tauri::command]
fn set_custom_prompt(prompt: Option<String>, state: tauri::State<'_, AppState>) {
    state.orchestrator.set_custom_prompt(prompt);
}

// ── Global shortcuts (thin glue over the commands above) ────────────

fn trigger_capture(app: &tauri::AppHandle, kind: CaptureKind) {
    let store = app.state::<AppState>().store.clone();
    tauri::async_runtime::spawn(async move {
        if let Err(e) = store.capture(kind).await {
            log::warn!("[SHORTCUT] Capture failed: {}", e);
        }
    });
}

fn trigger_processing(app: &tauri::AppHandle, kind: RequestKind) {
    let orchestrator = app.state::<AppState>().orchestrator.clone();
    match orchestrator.try_acquire() {
        Ok(permit) => {
            tauri::async_runtime::spawn(async move {
                orchestrator.run(permit, kind, None).await;
            });
        }
        Err(e) => log::info!("[SHORTCUT] Ignored: {}", e),
    }
}

fn register_shortcuts(app: &tauri::App) -> Result<(), Box<dyn std::error::Error>> {
    use tauri_plugin_global_shortcut::{GlobalShortcutExt, ShortcutState};

    let shortcuts = app.global_shortcut();

    shortcuts.on_shortcut("CmdOrCtrl+H", |app, _shortcut, event| {
        if event.state() == ShortcutState::Pressed {
            trigger_capture(app, CaptureKind::Primary);
        }
    })?;
    shortcuts.on_shortcut("CmdOrCtrl+Shift+H", |app, _shortcut, event| {
        if event.state() == ShortcutState::Pressed {
            trigger_capture(app, CaptureKind::FollowUp);
        }
    })?;
    shortcuts.on_shortcut("CmdOrCtrl+Enter", |app, _shortcut, event| {
        if event.state() == ShortcutState::Pressed {
            trigger_processing(app, RequestKind::Initial);
        }
    })?;
    shortcuts.on_shortcut("CmdOrCtrl+Shift+Enter", |app, _shortcut, event| {
        if event.state() == ShortcutState::Pressed {
            trigger_processing(app, RequestKind::FollowUp);
        }
    })?;
    shortcuts.on_shortcut("CmdOrCtrl+B", |app, _shortcut, event| {
        if event.state() == ShortcutState::Pressed {
            let mode = app.state::<AppState>().view.toggle_user_inert();
            log::info!("[SHORTCUT] Interactivity toggled: {:?}", mode);
        }
    })?;
    shortcuts.on_shortcut("CmdOrCtrl+R", |app, _shortcut, event| {
        if event.state() == ShortcutState::Pressed {
            let state = app.state::<AppState>();
            state.orchestrator.cancel();
            let store = state.store.clone();
            let sink = state.sink.clone();
            let view = state.view.clone();
            tauri::async_runtime::spawn(async move {
                store.clear_all().await;
                sink.queues_cleared();
                view.transition(ViewState::Idle);
            });
        }
    })?;

    Ok(())
}

/// Entry point — called by Tauri runtime.
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    tauri::Builder::default()
        .plugin(tauri_plugin_global_shortcut::Builder::new().build())
        .setup(|app| {
            log::info!("Glint starting up");

            let sink = Arc::new(TauriEventSink::new(app.handle().clone()));
            let effects: Arc<dyn WindowEffects> = Arc::new(TauriWindowEffects {
                app: app.handle().clone(),
            });
            let view = ViewController::new(effects);
            let store = Arc::new(CaptureStore::new(
                std::env::temp_dir().join("glint-captures"),
            ));
            let orchestrator = Orchestrator::new(
                AnthropicProvider::new(),
                store.clone(),
                view.clone(),
                sink.clone() as Arc<dyn EventSink>,
                ProviderConfig::default(),
                OrchestratorOptions::default(),
            );

            app.manage(AppState {
                store,
                view: view.clone(),
                orchestrator,
                sink,
            });

            register_shortcuts(app)?;

            // Assert the interactivity contract on the freshly created window.
            view.transition(ViewState::Idle);

            log::info!("Shortcuts registered — overlay ready");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            capture_screen,
            start_processing,
            cancel_processing,
            clear_queues,
            reset,
            toggle_interactive,
            request_resize,
            get_view_state,
            get_response_history,
            copy_response,
            set_api_key,
            has_api_key,
            set_custom_prompt,
        ])
        .build(tauri::generate_context!())
        .expect("Error building Glint")
        .run(|app, event| {
            if let tauri::RunEvent::Exit = event {
                // Drain pending store operations, then best-effort delete
                // every capture file before the process goes away.
                let store = app.state::<AppState>().store.clone();
                tauri::async_runtime::block_on(store.clear_all());
                log::info!("Capture queues cleared on shutdown");
            }
        });
}
