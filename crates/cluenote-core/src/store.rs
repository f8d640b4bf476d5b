//! Store seams - room store client and local queue storage.
//!
//! The room store is the only asynchronous boundary in the system; every
//! other operation is synchronous and pure. Implementations live in the
//! cluenote-stores crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::code::RoomCode;
use crate::types::{AuthoredScene, PlayerIndex, Room, RoomSeed, SceneIndex};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("room is read-only: {0}")]
    Frozen(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Client contract for the remote room document store.
///
/// Every call may fail on a transient outage. Only `create_room` surfaces
/// failure to the user; all other call sites treat errors as non-fatal
/// (writes fall back to the offline queue, reads retry on the next poll).
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Allocate a short unique code and persist the initial room document.
    async fn create_room(&self, seed: RoomSeed) -> Result<Room, StoreError>;

    /// Read the whole room document. `None` for unknown codes.
    async fn fetch_room(&self, code: &RoomCode) -> Result<Option<Room>, StoreError>;

    /// Merge-write one scene. Sibling scenes are never clobbered.
    async fn patch_scene(
        &self,
        code: &RoomCode,
        index: SceneIndex,
        scene: AuthoredScene,
    ) -> Result<(), StoreError>;

    /// Best-effort presence hint; callers swallow failures.
    async fn mark_active_scene(
        &self,
        code: &RoomCode,
        player: PlayerIndex,
        index: SceneIndex,
    ) -> Result<(), StoreError>;

    /// Idempotent append-unique at the ready-set path.
    async fn mark_ready(&self, code: &RoomCode, player: PlayerIndex) -> Result<(), StoreError>;
}

/// A scene write not yet confirmed by the room store.
///
/// Keyed by `(room_code, scene_index)`: the queue retains at most one
/// pending write per scene per room, last write wins locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub room_code: RoomCode,
    pub scene_index: SceneIndex,
    pub scene: AuthoredScene,
    pub queued_at: DateTime<Utc>,
}

impl PendingWrite {
    pub fn new(room_code: RoomCode, scene_index: SceneIndex, scene: AuthoredScene) -> Self {
        Self {
            room_code,
            scene_index,
            scene,
            queued_at: Utc::now(),
        }
    }
}

/// Durable local key-value storage backing the offline write queue.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Persist a pending write, replacing any entry for the same scene.
    async fn put(&self, write: &PendingWrite) -> Result<(), StoreError>;

    /// Drop the entry for `(room, scene)` once the store confirmed it.
    async fn remove(&self, room: &RoomCode, scene: SceneIndex) -> Result<(), StoreError>;

    /// All queued writes for a room, oldest first.
    async fn list(&self, room: &RoomCode) -> Result<Vec<PendingWrite>, StoreError>;
}
