//! Failure taxonomy for the capture-to-response pipeline.
//!
//! Every failure mode resolves back to an idle or retry-eligible view —
//! nothing here is ever allowed to take the host process down.

/// All the ways a capture, queue insert, or model request can fail.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("A capture is already in progress")]
    CaptureBusy,

    #[error("Capture queue is busy — retry shortly")]
    QueueBusy,

    #[error("Captured image data is empty or malformed")]
    InvalidImageData,

    #[error("A request is already being processed")]
    AlreadyProcessing,

    #[error("No API key configured — add one in settings")]
    CredentialMissing,

    #[error("Rate limited by the provider: {0}")]
    RateLimited(String),

    #[error("Network request timed out")]
    NetworkTimeout,

    #[error("Request exceeded the {0}s deadline")]
    DeadlineExpired(u64),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl PipelineError {
    /// Stable category string the presentation layer keys off of
    /// (e.g. the rate-limit banner that keeps the current answer visible).
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::CaptureFailed(_) => "capture_failed",
            PipelineError::CaptureBusy => "capture_busy",
            PipelineError::QueueBusy => "queue_busy",
            PipelineError::InvalidImageData => "invalid_image",
            PipelineError::AlreadyProcessing => "already_processing",
            PipelineError::CredentialMissing => "credential_missing",
            PipelineError::RateLimited(_) => "rate_limited",
            PipelineError::NetworkTimeout => "network_timeout",
            PipelineError::DeadlineExpired(_) => "deadline_expired",
            PipelineError::Provider(_) => "provider_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinct_for_surfaced_errors() {
        let surfaced = [
            PipelineError::CredentialMissing,
            PipelineError::RateLimited("429".into()),
            PipelineError::NetworkTimeout,
            PipelineError::Provider("boom".into()),
            PipelineError::DeadlineExpired(120),
        ];
        let mut cats: Vec<_> = surfaced.iter().map(|e| e.category()).collect();
        cats.sort();
        cats.dedup();
        assert_eq!(cats.len(), surfaced.len());
    }

    #[test]
    fn messages_are_human_readable() {
        assert!(PipelineError::CredentialMissing.to_string().contains("API key"));
        assert!(PipelineError::DeadlineExpired(120).to_string().contains("120"));
    }
}
