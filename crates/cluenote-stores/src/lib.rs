//! Store implementations for cluenote.
//!
//! - InMemoryRoomStore: development and testing, with fault injection
//! - RestRoomStore: hosted document database over HTTP
//! - Offline write queue: local durability before remote attempts

mod rest_store;
mod room_store;
mod write_queue;

pub use rest_store::RestRoomStore;
pub use room_store::InMemoryRoomStore;
pub use write_queue::{
    FileQueueStorage, InMemoryQueueStorage, OfflineWriteQueue, ReplayOutcome,
};
