//! Outbound event boundary between the pipeline core and the overlay UI.
//!
//! The core never talks to a window directly — it pushes events through
//! an [`EventSink`]. Production wires this to Tauri's event emitter;
//! tests substitute a recording sink.

use serde::{Deserialize, Serialize};

use crate::capture::CaptureKind;
use crate::error::PipelineError;

/// Which request pipeline an operation belongs to. Initial requests read
/// the primary capture queue, follow-ups read the follow-up queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Initial,
    FollowUp,
}

impl RequestKind {
    pub fn capture_kind(self) -> CaptureKind {
        match self {
            RequestKind::Initial => CaptureKind::Primary,
            RequestKind::FollowUp => CaptureKind::FollowUp,
        }
    }
}

/// Payload for the `processing-failed` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotice {
    pub kind: RequestKind,
    pub category: String,
    pub message: String,
}

impl FailureNotice {
    pub fn new(kind: RequestKind, err: &PipelineError) -> Self {
        Self {
            kind,
            category: err.category().to_string(),
            message: err.to_string(),
        }
    }
}

/// Payload for the `response-complete` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub kind: RequestKind,
    pub text: String,
}

/// Everything the core tells the presentation layer.
pub trait EventSink: Send + Sync + 'static {
    fn processing_started(&self, kind: RequestKind);
    /// Coalesced partial output — carries the full accumulated text so a
    /// dropped intermediate update never loses content.
    fn chunk(&self, text: &str);
    fn succeeded(&self, kind: RequestKind, text: &str);
    fn failed(&self, notice: FailureNotice);
    fn queues_cleared(&self);
}

/// Tauri-backed sink — emits app-wide events the overlay webview listens to.
pub struct TauriEventSink {
    app: tauri::AppHandle,
}

impl TauriEventSink {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

impl EventSink for TauriEventSink {
    fn processing_started(&self, kind: RequestKind) {
        use tauri::Emitter;
        let _ = self.app.emit("processing-started", kind);
    }

    fn chunk(&self, text: &str) {
        use tauri::Emitter;
        let _ = self.app.emit("response-chunk", text);
    }

    fn succeeded(&self, kind: RequestKind, text: &str) {
        use tauri::Emitter;
        let _ = self.app.emit(
            "response-complete",
            ResponsePayload {
                kind,
                text: text.to_string(),
            },
        );
    }

    fn failed(&self, notice: FailureNotice) {
        use tauri::Emitter;
        let _ = self.app.emit("processing-failed", notice);
    }

    fn queues_cleared(&self) {
        use tauri::Emitter;
        let _ = self.app.emit("queues-cleared", ());
    }
}
