//! Per-space write serialization.
//!
//! Chain appends and update inserts for one space run one at a time.
//! Different spaces never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use hyperspace_core::SpaceId;

type LockMap = DashMap<SpaceId, Arc<Mutex<()>>>;

/// A lazily-created async mutex per space.
///
/// An entry lives only while some task holds or awaits its lock.
#[derive(Default)]
pub struct SpaceLocks {
    locks: Arc<LockMap>,
}

/// Held for the duration of one space mutation.
pub struct SpaceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    space_id: SpaceId,
    locks: Arc<LockMap>,
}

impl Drop for SpaceGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only taken under the shard lock, so a count of one
        // means nobody is waiting.
        self.locks
            .remove_if(&self.space_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl SpaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `space_id`.
    pub async fn lock(&self, space_id: &SpaceId) -> SpaceGuard {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(space_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SpaceGuard {
            guard: Some(lock.lock_owned().await),
            space_id: space_id.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Number of spaces currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
