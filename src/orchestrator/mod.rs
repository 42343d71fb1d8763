//! Request orchestrator — the capture-to-response pipeline.
//!
//! Owns the single processing slot (initial and follow-up requests are
//! mutually exclusive system-wide), reads captures from the store,
//! streams the provider response with a hard deadline and cooperative
//! cancellation, coalesces chunk delivery to the UI, and resolves the
//! failure taxonomy into view transitions and outbound events.

mod history;
pub mod prompts;
mod provider;
mod sse;

pub use history::{ResponseEntry, ResponseHistory, HISTORY_CAPACITY};
pub use provider::{AnthropicProvider, ModelProvider, ProviderRequest};

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::CaptureStore;
use crate::config::{self, ProviderConfig};
use crate::error::PipelineError;
use crate::events::{EventSink, FailureNotice, RequestKind};
use crate::view::{ViewController, ViewState};

/// Hard per-request deadline; expiry takes the same teardown path as a
/// user cancel so a hung call can never pin the processing slot.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(120);

/// Minimum spacing between chunk updates forwarded to the UI.
pub const COALESCE_INTERVAL: Duration = Duration::from_millis(50);

const MIN_PNG_BYTES: usize = 1024;
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Tunables; production uses the defaults, tests shrink them.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub deadline: Duration,
    pub coalesce_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            deadline: REQUEST_DEADLINE,
            coalesce_interval: COALESCE_INTERVAL,
        }
    }
}

/// Exclusive right to run one request. Holding this is what makes two
/// concurrent `run` calls impossible; dropping it frees the slot.
#[derive(Debug)]
pub struct ProcessingPermit {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

/// Terminal result of one request, after taxonomy resolution.
#[derive(Debug)]
pub enum RequestOutcome {
    Succeeded(String),
    Cancelled,
    Failed(PipelineError),
}

pub struct Orchestrator<P: ModelProvider> {
    provider: P,
    store: Arc<CaptureStore>,
    view: Arc<ViewController>,
    sink: Arc<dyn EventSink>,
    config: std::sync::Mutex<ProviderConfig>,
    history: std::sync::Mutex<ResponseHistory>,
    slot: Arc<tokio::sync::Mutex<()>>,
    active: std::sync::Mutex<Option<CancellationToken>>,
    options: OrchestratorOptions,
}

impl<P: ModelProvider> Orchestrator<P> {
    pub fn new(
        provider: P,
        store: Arc<CaptureStore>,
        view: Arc<ViewController>,
        sink: Arc<dyn EventSink>,
        config: ProviderConfig,
        options: OrchestratorOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            store,
            view,
            sink,
            config: std::sync::Mutex::new(config),
            history: std::sync::Mutex::new(ResponseHistory::default()),
            slot: Arc::new(tokio::sync::Mutex::new(())),
            active: std::sync::Mutex::new(None),
            options,
        })
    }

    /// Claim the processing slot, failing immediately if a request of
    /// either kind is already active.
    pub fn try_acquire(&self) -> Result<ProcessingPermit, PipelineError> {
        self.slot
            .clone()
            .try_lock_owned()
            .map(|guard| ProcessingPermit { _guard: guard })
            .map_err(|_| PipelineError::AlreadyProcessing)
    }

    /// Cancel the in-flight request, if any. Idempotent and infallible:
    /// with nothing active this is a no-op and never touches the view.
    pub fn cancel(&self) {
        if let Some(token) = lock_recover(&self.active).take() {
            log::info!("[ORCH] Cancellation requested");
            token.cancel();
        }
    }

    /// Run one request to completion, emitting events along the way.
    /// The permit is held for the whole call.
    pub async fn run(
        &self,
        permit: ProcessingPermit,
        kind: RequestKind,
        question: Option<String>,
    ) -> RequestOutcome {
        let _permit = permit;
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        log::info!("[ORCH] Request {} started ({:?})", request_id, kind);

        self.view.transition(ViewState::Awaiting);
        self.sink.processing_started(kind);

        let token = CancellationToken::new();
        *lock_recover(&self.active) = Some(token.clone());

        let outcome = self.drive(kind, question, &token).await;

        *lock_recover(&self.active) = None;

        match &outcome {
            RequestOutcome::Succeeded(text) => {
                log::info!(
                    "[ORCH] Request {} succeeded in {}ms ({} chars)",
                    request_id,
                    started.elapsed().as_millis(),
                    text.len()
                );
                lock_recover(&self.history).push(kind, text.clone());
                self.sink.succeeded(kind, text);
                self.view.transition(ViewState::Idle);
            }
            RequestOutcome::Cancelled => {
                // User cancellation is silent: no failure banner, just reset.
                log::info!("[ORCH] Request {} cancelled", request_id);
                self.view.transition(ViewState::Idle);
            }
            RequestOutcome::Failed(err) => {
                log::warn!("[ORCH] Request {} failed: {}", request_id, err);
                self.sink.failed(FailureNotice::new(kind, err));
                match err {
                    // Keep the current answer on screen; the user can
                    // retry without recapturing.
                    PipelineError::RateLimited(_) => self.view.transition(ViewState::Errored),
                    PipelineError::NetworkTimeout => {
                        self.store.clear_all().await;
                        self.sink.queues_cleared();
                        self.view.transition(ViewState::Idle);
                    }
                    _ => self.view.transition(ViewState::Idle),
                }
            }
        }

        outcome
    }

    async fn drive(
        &self,
        kind: RequestKind,
        question: Option<String>,
        token: &CancellationToken,
    ) -> RequestOutcome {
        let images_b64 = match self.load_payloads(kind).await {
            Ok(images) => images,
            Err(err) => return RequestOutcome::Failed(err),
        };

        let (model, custom_prompt, api_key) = {
            let cfg = lock_recover(&self.config).clone();
            let api_key = match cfg
                .api_key
                .clone()
                .map(Ok)
                .unwrap_or_else(config::resolve_api_key)
            {
                Ok(key) => key,
                Err(err) => return RequestOutcome::Failed(err),
            };
            (cfg.model, cfg.custom_prompt, api_key)
        };

        let user_text = match kind {
            RequestKind::Initial => {
                prompts::initial_text(question.as_deref(), custom_prompt.as_deref())
            }
            RequestKind::FollowUp => {
                let prior = lock_recover(&self.history)
                    .latest()
                    .map(|e| e.text.clone())
                    .unwrap_or_default();
                prompts::follow_up_text(question.as_deref(), &prior, custom_prompt.as_deref())
            }
        };

        // Checked before starting I/O; mid-stream cancellation is handled
        // by the select loop below.
        if token.is_cancelled() {
            return RequestOutcome::Cancelled;
        }

        let request = ProviderRequest {
            api_key,
            model,
            max_tokens: prompts::MAX_TOKENS,
            system: prompts::SYSTEM_PROMPT.to_string(),
            user_text,
            images_b64,
        };

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let stream_fut = self.provider.stream(request, tx);
        tokio::pin!(stream_fut);
        let deadline = tokio::time::sleep(self.options.deadline);
        tokio::pin!(deadline);

        let mut buffer = String::new();
        let mut chunks_delivered = 0usize;
        let mut coalescer = Coalescer::new(self.options.coalesce_interval);
        let mut provider_result: Option<Result<(), PipelineError>> = None;
        // Accumulated text the UI has not seen yet (throttled away).
        let mut pending_flush = false;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return RequestOutcome::Cancelled;
                }
                _ = &mut deadline => {
                    // Same teardown as cancel; dropping the stream future
                    // aborts any in-flight I/O that could not be interrupted.
                    token.cancel();
                    return RequestOutcome::Failed(PipelineError::DeadlineExpired(
                        self.options.deadline.as_secs(),
                    ));
                }
                result = &mut stream_fut, if provider_result.is_none() => {
                    provider_result = Some(result);
                }
                received = rx.recv() => match received {
                    Some(delta) => {
                        if chunks_delivered == 0 {
                            self.view.transition(ViewState::Streaming);
                        }
                        chunks_delivered += 1;
                        buffer.push_str(&delta);
                        // Forward at most one update per interval; skipped
                        // intermediates are covered because every forward
                        // carries the full accumulated text.
                        if coalescer.ready(Instant::now()) {
                            self.sink.chunk(&buffer);
                            pending_flush = false;
                        } else {
                            pending_flush = true;
                        }
                    }
                    None => break,
                }
            }
        }

        match provider_result.unwrap_or(Ok(())) {
            Ok(()) => RequestOutcome::Succeeded(buffer),
            Err(err) => match err {
                PipelineError::CredentialMissing
                | PipelineError::RateLimited(_)
                | PipelineError::NetworkTimeout => {
                    // The success path delivers the final text itself;
                    // a failure that leaves partial text on screen must
                    // flush the throttled tail before the failure event.
                    if pending_flush {
                        self.sink.chunk(&buffer);
                    }
                    RequestOutcome::Failed(err)
                }
                other if chunks_delivered > 0 => {
                    // Discarding a partially-rendered answer is worse than
                    // returning an incomplete one.
                    log::warn!(
                        "[ORCH] Provider failed after {} chunk(s), keeping partial text: {}",
                        chunks_delivered,
                        other
                    );
                    RequestOutcome::Succeeded(buffer)
                }
                other => RequestOutcome::Failed(other),
            },
        }
    }

    /// Read and validate the queued captures for this kind, returning
    /// their base64 payloads oldest-first.
    async fn load_payloads(&self, kind: RequestKind) -> Result<Vec<String>, PipelineError> {
        let items = self.store.snapshot(kind.capture_kind()).await;
        let mut payloads = Vec::with_capacity(items.len());

        for item in &items {
            let bytes = match tokio::fs::read(&item.file_path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("[ORCH] Unreadable capture {}: {}", item.file_path.display(), e);
                    continue;
                }
            };
            if bytes.len() < MIN_PNG_BYTES || !bytes.starts_with(&PNG_MAGIC) {
                log::warn!(
                    "[ORCH] Skipping malformed capture {} ({} bytes)",
                    item.id,
                    bytes.len()
                );
                continue;
            }
            payloads.push(BASE64.encode(&bytes));
        }

        if payloads.is_empty() {
            return Err(PipelineError::InvalidImageData);
        }
        Ok(payloads)
    }

    pub fn history_entries(&self) -> Vec<ResponseEntry> {
        lock_recover(&self.history).entries()
    }

    pub fn latest_response(&self) -> Option<String> {
        lock_recover(&self.history).latest().map(|e| e.text.clone())
    }

    pub fn set_custom_prompt(&self, prompt: Option<String>) {
        lock_recover(&self.config).custom_prompt = prompt;
    }
}

/// Lock recovery: a panic elsewhere must not wipe the user's config or
/// wedge cancellation, so poisoned guards are taken as-is.
fn lock_recover<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Latest-wins throttle for chunk forwarding.
struct Coalescer {
    interval: Duration,
    last_forward: Option<Instant>,
}

impl Coalescer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_forward: None,
        }
    }

    /// True if an update may be forwarded now; records the forward.
    fn ready(&mut self, now: Instant) -> bool {
        let due = self
            .last_forward
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last_forward = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_lock_still_yields_the_data() {
        let mutex = std::sync::Mutex::new(ProviderConfig {
            model: "custom-model".into(),
            custom_prompt: Some("be brief".into()),
            api_key: None,
        });
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = mutex.lock().unwrap();
            panic!("poisoning");
        }));
        assert!(result.is_err());

        // The configured values survive the poisoning.
        let cfg = lock_recover(&mutex).clone();
        assert_eq!(cfg.model, "custom-model");
        assert_eq!(cfg.custom_prompt.as_deref(), Some("be brief"));
    }

    #[tokio::test]
    async fn coalescer_forwards_first_then_throttles() {
        let mut coalescer = Coalescer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(coalescer.ready(t0));
        assert!(!coalescer.ready(t0 + Duration::from_millis(10)));
        assert!(!coalescer.ready(t0 + Duration::from_millis(49)));
        assert!(coalescer.ready(t0 + Duration::from_millis(50)));
        // The throttle window restarts from the last forward.
        assert!(!coalescer.ready(t0 + Duration::from_millis(80)));
        assert!(coalescer.ready(t0 + Duration::from_millis(120)));
    }
}
