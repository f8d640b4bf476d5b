//! # Cluenote Runtime
//!
//! Session orchestration for collaborative melody puzzle sessions.
//!
//! This crate contains:
//! - The Setup → Create → Share → Solve → Results phase machine
//! - The ready barrier over a polled room document
//! - The solve flow (listens, hints, scoring, aggregation)
//!
//! One orchestrator runs per client; clients coordinate only through the
//! shared room document, never directly with each other.

pub mod orchestrator;
pub mod phase;
pub mod solve;
pub mod watcher;

pub use orchestrator::{
    SessionError, SessionOrchestrator, SessionOutcome, SessionSettings,
};
pub use phase::{SessionPhase, SessionRole};
pub use solve::{
    HintReveal, SceneOutcome, SceneSolve, SessionResults, SolveError,
};
pub use watcher::{
    PollingConfig, PollingRoomWatcher, RoomEvent, RoomEvents, RoomWatcher, WatchHandle,
};
