//! # Cluenote Core
//!
//! Core abstractions and deterministic logic for collaborative melody
//! puzzle sessions.
//!
//! This crate contains:
//! - MelodyGrid / Contour definitions and scoring
//! - Scene / Room / assignment data model
//! - Room code parsing and generation
//! - RoomStore / QueueStorage abstractions
//!
//! This crate does NOT care about:
//! - How rooms are persisted (see cluenote-stores)
//! - How sessions are driven over time (see cluenote-runtime)
//! - How anything is displayed

pub mod audio;
pub mod code;
pub mod grid;
pub mod scoring;
pub mod store;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audio::{AudioPlayback, NullAudio, RecordingAudio};
    pub use crate::code::{RoomCode, RoomCodeError, ROOM_CODE_ALPHABET};
    pub use crate::grid::{ColumnRule, Contour, GridRules, MelodyGrid, EMPTY_COLUMN};
    pub use crate::scoring::{adjusted_points, passes, score, SceneScore, SolveTuning};
    pub use crate::store::{PendingWrite, QueueStorage, RoomStore, StoreError};
    pub use crate::types::{
        assigned_scenes, scene_owner, AuthoredScene, PlayerIndex, Room, RoomSeed, RoomStatus,
        Scene, SceneIndex, SessionMode,
    };
}

// Re-export key types at crate root
pub use audio::{AudioPlayback, NullAudio};
pub use code::{RoomCode, RoomCodeError};
pub use grid::{Contour, GridRules, MelodyGrid};
pub use scoring::{SceneScore, SolveTuning};
pub use store::{PendingWrite, QueueStorage, RoomStore, StoreError};
pub use types::{
    assigned_scenes, AuthoredScene, PlayerIndex, Room, RoomSeed, RoomStatus, Scene, SceneIndex,
    SessionMode,
};
