//! Offline write queue - local durability before remote attempts.
//!
//! The ordering is the contract: a scene edit lands in durable local
//! storage before the network attempt, so a transient outage can never
//! lose it. The queue only serves remote convergence; local application
//! state reflects each write immediately and never waits on the network.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use cluenote_core::store::{PendingWrite, QueueStorage, RoomStore, StoreError};
use cluenote_core::types::SceneIndex;
use cluenote_core::RoomCode;

/// In-memory storage for tests and ephemeral sessions.
pub struct InMemoryQueueStorage {
    entries: RwLock<Vec<PendingWrite>>,
}

impl InMemoryQueueStorage {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryQueueStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStorage for InMemoryQueueStorage {
    async fn put(&self, write: &PendingWrite) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.retain(|entry| {
            !(entry.room_code == write.room_code && entry.scene_index == write.scene_index)
        });
        entries.push(write.clone());
        Ok(())
    }

    async fn remove(&self, room: &RoomCode, scene: SceneIndex) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.retain(|entry| !(entry.room_code == *room && entry.scene_index == scene));
        Ok(())
    }

    async fn list(&self, room: &RoomCode) -> Result<Vec<PendingWrite>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.room_code == *room)
            .cloned()
            .collect())
    }
}

/// File-backed storage: one JSON file per `(room, scene)` key.
pub struct FileQueueStorage {
    root: PathBuf,
}

impl FileQueueStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, room: &RoomCode, scene: SceneIndex) -> PathBuf {
        self.root.join(format!("{room}-{scene}.json"))
    }

    fn room_prefix(room: &RoomCode) -> String {
        format!("{room}-")
    }
}

#[async_trait]
impl QueueStorage for FileQueueStorage {
    async fn put(&self, write: &PendingWrite) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let payload =
            serde_json::to_vec(write).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.entry_path(&write.room_code, write.scene_index);
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn remove(&self, room: &RoomCode, scene: SceneIndex) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.entry_path(room, scene)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }

    async fn list(&self, room: &RoomCode) -> Result<Vec<PendingWrite>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        let prefix = Self::room_prefix(room);
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            match serde_json::from_slice::<PendingWrite>(&bytes) {
                Ok(write) => entries.push(write),
                Err(err) => {
                    // A corrupt entry must not wedge the whole queue.
                    warn!(file = name, error = %err, "skipping unreadable queue entry");
                }
            }
        }
        entries.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        Ok(entries)
    }
}

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub sent: usize,
    pub remaining: usize,
}

impl ReplayOutcome {
    /// Whether the room has no unsynced writes left.
    pub fn drained(&self) -> bool {
        self.remaining == 0
    }
}

/// Reconciliation between the local edit stream and the remote store.
pub struct OfflineWriteQueue {
    storage: Arc<dyn QueueStorage>,
    store: Arc<dyn RoomStore>,
}

impl OfflineWriteQueue {
    pub fn new(storage: Arc<dyn QueueStorage>, store: Arc<dyn RoomStore>) -> Self {
        Self { storage, store }
    }

    /// Persist locally, then attempt the remote write.
    ///
    /// Local durability precedes the network attempt; a failed send leaves
    /// the entry queued for the next replay and still returns Ok. Only a
    /// local storage failure surfaces, because that breaks the durability
    /// guarantee itself.
    pub async fn submit(&self, write: PendingWrite) -> Result<(), StoreError> {
        self.storage.put(&write).await?;
        match self
            .store
            .patch_scene(&write.room_code, write.scene_index, write.scene.clone())
            .await
        {
            Ok(()) => {
                self.storage
                    .remove(&write.room_code, write.scene_index)
                    .await
            }
            Err(err) => {
                debug!(
                    room = %write.room_code,
                    scene = write.scene_index,
                    error = %err,
                    "scene write queued for replay"
                );
                Ok(())
            }
        }
    }

    /// Attempt every queued entry for a room. Successes are dequeued,
    /// failures stay queued for the next trigger.
    pub async fn replay_all(&self, room: &RoomCode) -> Result<ReplayOutcome, StoreError> {
        let entries = self.storage.list(room).await?;
        let mut outcome = ReplayOutcome {
            sent: 0,
            remaining: 0,
        };
        for write in entries {
            match self
                .store
                .patch_scene(&write.room_code, write.scene_index, write.scene.clone())
                .await
            {
                Ok(()) => {
                    self.storage
                        .remove(&write.room_code, write.scene_index)
                        .await?;
                    outcome.sent += 1;
                }
                Err(err) => {
                    warn!(
                        room = %room,
                        scene = write.scene_index,
                        error = %err,
                        "replay attempt failed, entry retained"
                    );
                    outcome.remaining += 1;
                }
            }
        }
        if outcome.sent > 0 {
            debug!(room = %room, sent = outcome.sent, remaining = outcome.remaining, "queue replayed");
        }
        Ok(outcome)
    }

    /// Queued writes for a room, for overlaying onto fetched snapshots.
    pub async fn pending(&self, room: &RoomCode) -> Result<Vec<PendingWrite>, StoreError> {
        self.storage.list(room).await
    }

    /// Drop every queued entry for a room (leave-room cleanup). Returns
    /// how many entries were discarded.
    pub async fn purge_room(&self, room: &RoomCode) -> Result<usize, StoreError> {
        let entries = self.storage.list(room).await?;
        let count = entries.len();
        for write in entries {
            self.storage.remove(room, write.scene_index).await?;
        }
        Ok(count)
    }
}
