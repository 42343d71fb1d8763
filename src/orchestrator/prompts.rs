//! Prompt composition for screenshot requests.
//!
//! A composed prompt is role instructions + the user's optional free-text
//! question + (for follow-ups) the previous canonical response as context.

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const MAX_TOKENS: u32 = 4096;

pub const SYSTEM_PROMPT: &str = "\
You are a screen assistant. The user sends you screenshots of their screen \
and an optional question. Analyze what is shown, answer directly and \
concisely, and format the answer in Markdown. If the screenshot shows a \
problem or question, solve it step by step. Never describe the screenshot \
itself unless asked to.";

/// Build the user-turn text for an initial request.
pub fn initial_text(question: Option<&str>, custom_prompt: Option<&str>) -> String {
    let mut text = String::from("Here is my screen.");
    if let Some(extra) = custom_prompt.filter(|s| !s.trim().is_empty()) {
        text.push_str("\n\nAdditional instructions: ");
        text.push_str(extra.trim());
    }
    match question.filter(|s| !s.trim().is_empty()) {
        Some(q) => {
            text.push_str("\n\nQuestion: ");
            text.push_str(q.trim());
        }
        None => text.push_str("\n\nAnswer whatever is being asked on screen."),
    }
    text
}

/// Build the user-turn text for a follow-up request, threading the prior
/// response so the model keeps context without a multi-turn transcript.
pub fn follow_up_text(
    question: Option<&str>,
    prior_response: &str,
    custom_prompt: Option<&str>,
) -> String {
    let mut text = String::from("Follow-up on your previous answer.\n\nYour previous answer was:\n");
    text.push_str(prior_response);
    if let Some(extra) = custom_prompt.filter(|s| !s.trim().is_empty()) {
        text.push_str("\n\nAdditional instructions: ");
        text.push_str(extra.trim());
    }
    match question.filter(|s| !s.trim().is_empty()) {
        Some(q) => {
            text.push_str("\n\nQuestion: ");
            text.push_str(q.trim());
        }
        None => text.push_str(
            "\n\nThe new screenshot shows what changed. Update or extend your answer accordingly.",
        ),
    }
    text
}
