//! Screen capture domain — public API.
//!
//! Owns the two bounded, disk-backed capture queues and the platform
//! screenshot call. Knows nothing about networking or the view.

mod screenshot;
mod store;

pub use screenshot::capture_primary_png;
pub use store::{CaptureItem, CaptureStore, QUEUE_CAPACITY};

use serde::{Deserialize, Serialize};

/// Which logical queue a capture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureKind {
    Primary,
    FollowUp,
}

impl CaptureKind {
    /// Directory name under the store's base dir for this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            CaptureKind::Primary => "primary",
            CaptureKind::FollowUp => "follow-up",
        }
    }
}
