//! Minimal SSE parsing for the Anthropic Messages streaming API.
//!
//! Events are separated by `\n\n`; each block carries an `event:` line
//! and one or more `data:` lines. We only ever need the text deltas, so
//! the parser stays deliberately small.

/// One parsed server-sent event.
#[derive(Debug, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Drain complete SSE events from `buffer`, leaving any trailing partial
/// block in place for the next network chunk.
pub fn drain_events(buffer: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block = buffer[..pos].to_string();
        buffer.drain(..pos + 2);

        let mut event = String::new();
        let mut data_lines: Vec<&str> = Vec::new();

        for line in block.lines() {
            if let Some(val) = line.strip_prefix("event:") {
                event = val.trim().to_string();
            } else if let Some(val) = line.strip_prefix("data:") {
                data_lines.push(val.trim_start());
            }
        }

        if !event.is_empty() || !data_lines.is_empty() {
            events.push(SseEvent {
                event,
                data: data_lines.join("\n"),
            });
        }
    }

    events
}

/// Extract the text delta from a `content_block_delta` data payload.
pub fn extract_text_delta(data: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;
    json["delta"]["text"].as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_complete_events_and_keeps_partial_tail() {
        let mut buf = String::from(
            "event: content_block_delta\ndata: {\"a\":1}\n\nevent: message_stop\ndata:",
        );
        let events = drain_events(&mut buf);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "content_block_delta");
        assert_eq!(events[0].data, "{\"a\":1}");
        // Incomplete second block stays buffered.
        assert!(buf.starts_with("event: message_stop"));
    }

    #[test]
    fn joins_multi_line_data() {
        let mut buf = String::from("data: line one\ndata: line two\n\n");
        let events = drain_events(&mut buf);
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn empty_blocks_are_skipped() {
        let mut buf = String::from("\n\n\n\n");
        assert!(drain_events(&mut buf).is_empty());
    }

    #[test]
    fn extracts_delta_text() {
        let data = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hel"}}"#;
        assert_eq!(extract_text_delta(data).as_deref(), Some("Hel"));
    }

    #[test]
    fn non_text_delta_yields_none() {
        let data = r#"{"type":"message_delta","usage":{"output_tokens":5}}"#;
        assert_eq!(extract_text_delta(data), None);
    }
}
