//! Model provider boundary — trait seam plus the Anthropic implementation.
//!
//! The orchestrator only sees [`ModelProvider`]; tests drive it with a
//! scripted provider, production uses [`AnthropicProvider`] streaming the
//! Messages API over SSE.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use super::sse;
use crate::error::PipelineError;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything a provider needs for one streaming request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub user_text: String,
    /// Base64-encoded PNG payloads, oldest capture first.
    pub images_b64: Vec<String>,
}

/// A streaming model call. Text deltas go out through `tx` as they
/// arrive; the returned future resolves `Ok(())` on clean end-of-stream
/// or the classified failure otherwise. Implementations treat a closed
/// receiver as cancellation and return early.
pub trait ModelProvider: Send + Sync + 'static {
    fn stream(
        &self,
        req: ProviderRequest,
        tx: mpsc::Sender<String>,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

pub struct AnthropicProvider {
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelProvider for AnthropicProvider {
    fn stream(
        &self,
        req: ProviderRequest,
        tx: mpsc::Sender<String>,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send {
        let client = self.client.clone();
        async move {
            let mut content: Vec<serde_json::Value> = req
                .images_b64
                .iter()
                .map(|data| {
                    serde_json::json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": data,
                        }
                    })
                })
                .collect();
            content.push(serde_json::json!({ "type": "text", "text": req.user_text }));

            log::info!(
                "[LLM] Model: {} ({} image(s), streaming)",
                req.model,
                req.images_b64.len()
            );
            let start = std::time::Instant::now();

            let mut response = client
                .post(API_URL)
                .header("x-api-key", &req.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&serde_json::json!({
                    "model": req.model,
                    "max_tokens": req.max_tokens,
                    "stream": true,
                    "system": req.system,
                    "messages": [{ "role": "user", "content": content }],
                }))
                .send()
                .await
                .map_err(classify_transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, body));
            }

            log::info!("[LLM] TTFB: {}ms", start.elapsed().as_millis());

            let mut sse_buffer = String::new();
            let mut ttft_logged = false;

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        sse_buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for event in sse::drain_events(&mut sse_buffer) {
                            match event.event.as_str() {
                                "content_block_delta" => {
                                    if let Some(delta) = sse::extract_text_delta(&event.data) {
                                        if !ttft_logged && !delta.is_empty() {
                                            log::info!(
                                                "[LLM] TTFT: {}ms",
                                                start.elapsed().as_millis()
                                            );
                                            ttft_logged = true;
                                        }
                                        if tx.send(delta).await.is_err() {
                                            // Receiver gone: the request was cancelled.
                                            return Ok(());
                                        }
                                    }
                                }
                                "message_delta" => {
                                    if let Ok(json) =
                                        serde_json::from_str::<serde_json::Value>(&event.data)
                                    {
                                        if let Some(tokens) =
                                            json["usage"]["output_tokens"].as_u64()
                                        {
                                            log::info!("[LLM] Output tokens: {}", tokens);
                                        }
                                    }
                                }
                                "error" => {
                                    return Err(PipelineError::Provider(event.data));
                                }
                                _ => {}
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(classify_transport_error(e)),
                }
            }

            log::info!("[LLM] Stream complete in {}ms", start.elapsed().as_millis());
            Ok(())
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() || e.is_connect() {
        PipelineError::NetworkTimeout
    } else {
        PipelineError::Provider(e.to_string())
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> PipelineError {
    match status.as_u16() {
        401 | 403 => PipelineError::CredentialMissing,
        429 => PipelineError::RateLimited(truncate(&body, 200)),
        _ => PipelineError::Provider(format!("HTTP {}: {}", status, truncate(&body, 200))),
    }
}

fn truncate(s: &str, max: usize) -> String {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_credential_missing() {
        let err = classify_status(reqwest::StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(err, PipelineError::CredentialMissing));
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let err = classify_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "overloaded".to_string(),
        );
        assert!(matches!(err, PipelineError::RateLimited(body) if body == "overloaded"));
    }

    #[test]
    fn other_statuses_map_to_provider_error() {
        let err = classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops".into());
        assert!(matches!(err, PipelineError::Provider(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
