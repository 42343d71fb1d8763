//! Bounded in-memory history of finalized responses, most recent last.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::events::RequestKind;

pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub id: Uuid,
    pub kind: RequestKind,
    pub text: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ResponseHistory {
    entries: VecDeque<ResponseEntry>,
}

impl ResponseHistory {
    pub fn push(&mut self, kind: RequestKind, text: String) {
        while self.entries.len() >= HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(ResponseEntry {
            id: Uuid::new_v4(),
            kind,
            text,
            completed_at: Utc::now(),
        });
    }

    /// Latest finalized response text, if any.
    pub fn latest(&self) -> Option<&ResponseEntry> {
        self.entries.back()
    }

    pub fn entries(&self) -> Vec<ResponseEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_most_recent_n() {
        let mut history = ResponseHistory::default();
        for i in 0..15 {
            history.push(RequestKind::Initial, format!("answer {}", i));
        }
        let entries = history.entries();
        assert_eq!(entries.len(), HISTORY_CAPACITY);
        assert_eq!(entries[0].text, "answer 5");
        assert_eq!(history.latest().unwrap().text, "answer 14");
    }

    #[test]
    fn latest_is_none_when_empty() {
        assert!(ResponseHistory::default().latest().is_none());
    }
}
