//! Bounded, disk-backed capture queues.
//!
//! Each kind (primary / follow-up) holds at most [`QUEUE_CAPACITY`]
//! items; inserting past the bound evicts the oldest items and deletes
//! their files before the insert completes. All mutual exclusion is
//! advisory: `try_lock` plus bounded-retry backoff, so a stuck caller
//! fails with `QueueBusy` instead of blocking forever. Destructive
//! operations (`clear_all`) await every lock first, draining in-flight
//! captures and inserts.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::screenshot;
use super::CaptureKind;
use crate::error::PipelineError;

/// Maximum live items per queue kind.
pub const QUEUE_CAPACITY: usize = 1;

const ADD_RETRY_ATTEMPTS: u32 = 5;
const ADD_RETRY_BACKOFF: Duration = Duration::from_millis(60);

/// One captured screenshot, backed by a uniquely-named PNG on disk.
/// The store is the only writer of the file; consumers read by path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureItem {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub captured_at: DateTime<Utc>,
    pub kind: CaptureKind,
}

pub struct CaptureStore {
    base_dir: PathBuf,
    primary: Mutex<Vec<CaptureItem>>,
    follow_up: Mutex<Vec<CaptureItem>>,
    /// Serializes platform captures; a second capture while one is in
    /// flight fails with `CaptureBusy` rather than queuing.
    capture_slot: Mutex<()>,
}

impl CaptureStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            primary: Mutex::new(Vec::new()),
            follow_up: Mutex::new(Vec::new()),
            capture_slot: Mutex::new(()),
        }
    }

    fn queue(&self, kind: CaptureKind) -> &Mutex<Vec<CaptureItem>> {
        match kind {
            CaptureKind::Primary => &self.primary,
            CaptureKind::FollowUp => &self.follow_up,
        }
    }

    fn kind_dir(&self, kind: CaptureKind) -> PathBuf {
        self.base_dir.join(kind.dir_name())
    }

    /// Capture the primary monitor, write the PNG to a fresh file under
    /// the kind's directory, and insert it into that kind's queue.
    pub async fn capture(&self, kind: CaptureKind) -> Result<CaptureItem, PipelineError> {
        let _slot = self
            .capture_slot
            .try_lock()
            .map_err(|_| PipelineError::CaptureBusy)?;

        let start = std::time::Instant::now();
        let png_bytes = tokio::task::spawn_blocking(screenshot::capture_primary_png)
            .await
            .map_err(|e| PipelineError::CaptureFailed(format!("capture task failed: {}", e)))?
            .map_err(|e| PipelineError::CaptureFailed(e.to_string()))?;
        log::info!(
            "[CAPTURE] Screen captured in {}ms ({} bytes)",
            start.elapsed().as_millis(),
            png_bytes.len()
        );

        let dir = self.kind_dir(kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::CaptureFailed(format!("create dir failed: {}", e)))?;

        let id = Uuid::new_v4();
        let file_path = dir.join(format!("{}.png", id));
        tokio::fs::write(&file_path, &png_bytes)
            .await
            .map_err(|e| PipelineError::CaptureFailed(format!("write failed: {}", e)))?;

        let item = CaptureItem {
            id,
            file_path,
            captured_at: Utc::now(),
            kind,
        };
        self.add(item.clone(), kind).await?;
        Ok(item)
    }

    /// Insert respecting the bound: evict-then-insert, oldest first.
    ///
    /// Inserts are strictly serialized per kind so two evictions never
    /// compute against the same stale queue snapshot. If the queue lock
    /// stays contended past the bounded retry, fails with `QueueBusy`.
    pub async fn add(&self, item: CaptureItem, kind: CaptureKind) -> Result<(), PipelineError> {
        let queue = self.queue(kind);

        let mut guard = None;
        for attempt in 0..ADD_RETRY_ATTEMPTS {
            match queue.try_lock() {
                Ok(g) => {
                    guard = Some(g);
                    break;
                }
                Err(_) if attempt + 1 < ADD_RETRY_ATTEMPTS => {
                    tokio::time::sleep(ADD_RETRY_BACKOFF).await;
                }
                Err(_) => {}
            }
        }
        let mut items = guard.ok_or(PipelineError::QueueBusy)?;

        while items.len() >= QUEUE_CAPACITY {
            let evicted = items.remove(0);
            log::info!("[CAPTURE] Evicting {} ({:?})", evicted.id, kind);
            remove_file_best_effort(&evicted.file_path).await;
        }
        items.push(item);
        Ok(())
    }

    /// Atomically empty both queues and delete all backing files.
    ///
    /// Awaits the capture slot and both queue locks before touching the
    /// filesystem, so a clear can never race an in-flight capture or add
    /// and leave an orphaned file.
    pub async fn clear_all(&self) {
        let _slot = self.capture_slot.lock().await;
        let mut primary = self.primary.lock().await;
        let mut follow_up = self.follow_up.lock().await;

        let total = primary.len() + follow_up.len();
        for item in primary.drain(..).chain(follow_up.drain(..)) {
            remove_file_best_effort(&item.file_path).await;
        }
        if total > 0 {
            log::info!("[CAPTURE] Cleared {} queued capture(s)", total);
        }
    }

    /// Defensive copy of a queue's contents, oldest first.
    pub async fn snapshot(&self, kind: CaptureKind) -> Vec<CaptureItem> {
        self.queue(kind).lock().await.clone()
    }
}

/// Deletion failures are a storage leak, not a correctness hazard — log
/// and move on, but always issue the attempt.
async fn remove_file_best_effort(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("[CAPTURE] Failed to delete {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CaptureStore {
        CaptureStore::new(dir.path().to_path_buf())
    }

    async fn fake_item(store: &CaptureStore, kind: CaptureKind) -> CaptureItem {
        let dir = store.kind_dir(kind);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let id = Uuid::new_v4();
        let file_path = dir.join(format!("{}.png", id));
        tokio::fs::write(&file_path, b"not-a-real-png").await.unwrap();
        CaptureItem {
            id,
            file_path,
            captured_at: Utc::now(),
            kind,
        }
    }

    #[tokio::test]
    async fn add_respects_bound_and_deletes_evicted_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut paths = Vec::new();
        for _ in 0..5 {
            let item = fake_item(&store, CaptureKind::Primary).await;
            paths.push(item.file_path.clone());
            store.add(item, CaptureKind::Primary).await.unwrap();
        }

        let snapshot = store.snapshot(CaptureKind::Primary).await;
        assert_eq!(snapshot.len(), QUEUE_CAPACITY);
        assert_eq!(snapshot[0].file_path, paths[4]);

        // Exactly the four evicted files are gone, the survivor remains.
        for evicted in &paths[..4] {
            assert!(!evicted.exists(), "evicted file still present: {:?}", evicted);
        }
        assert!(paths[4].exists());
    }

    #[tokio::test]
    async fn kinds_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let p = fake_item(&store, CaptureKind::Primary).await;
        let f = fake_item(&store, CaptureKind::FollowUp).await;
        store.add(p.clone(), CaptureKind::Primary).await.unwrap();
        store.add(f.clone(), CaptureKind::FollowUp).await.unwrap();

        assert_eq!(store.snapshot(CaptureKind::Primary).await.len(), 1);
        assert_eq!(store.snapshot(CaptureKind::FollowUp).await.len(), 1);
        assert!(p.file_path.exists());
        assert!(f.file_path.exists());
    }

    #[tokio::test]
    async fn clear_all_empties_queues_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let p = fake_item(&store, CaptureKind::Primary).await;
        let f = fake_item(&store, CaptureKind::FollowUp).await;
        store.add(p.clone(), CaptureKind::Primary).await.unwrap();
        store.add(f.clone(), CaptureKind::FollowUp).await.unwrap();

        store.clear_all().await;

        assert!(store.snapshot(CaptureKind::Primary).await.is_empty());
        assert!(store.snapshot(CaptureKind::FollowUp).await.is_empty());
        assert!(!p.file_path.exists());
        assert!(!f.file_path.exists());
    }

    #[tokio::test]
    async fn clear_all_survives_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let item = fake_item(&store, CaptureKind::Primary).await;
        tokio::fs::remove_file(&item.file_path).await.unwrap();
        store.add(item, CaptureKind::Primary).await.unwrap();

        // Deleting an already-missing file is logged, not fatal.
        store.clear_all().await;
        assert!(store.snapshot(CaptureKind::Primary).await.is_empty());
    }

    #[tokio::test]
    async fn contended_add_fails_with_queue_busy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let item = fake_item(&store, CaptureKind::Primary).await;
        let _held = store.primary.lock().await;

        let err = store.add(item, CaptureKind::Primary).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueueBusy));
    }

    #[tokio::test]
    async fn snapshot_is_a_defensive_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let item = fake_item(&store, CaptureKind::Primary).await;
        store.add(item, CaptureKind::Primary).await.unwrap();

        let mut copy = store.snapshot(CaptureKind::Primary).await;
        copy.clear();
        assert_eq!(store.snapshot(CaptureKind::Primary).await.len(), 1);
    }
}
