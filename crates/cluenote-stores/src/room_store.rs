//! In-memory room store for development and testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use cluenote_core::store::{RoomStore, StoreError};
use cluenote_core::types::{AuthoredScene, PlayerIndex, Room, RoomSeed, SceneIndex};
use cluenote_core::RoomCode;

const MAX_CODE_ATTEMPTS: usize = 32;

/// In-memory implementation for development and testing.
///
/// `set_offline(true)` makes every call fail with a connection error, so
/// tests can exercise the offline queue and poll retry paths.
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<RoomCode, Room>>,
    offline: AtomicBool,
}

impl InMemoryRoomStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate a network outage until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(&self, seed: RoomSeed) -> Result<Room, StoreError> {
        self.ensure_online()?;
        let mut rooms = self.rooms.write().await;
        let mut attempts = 0;
        let code = loop {
            let candidate = {
                let mut rng = rand::thread_rng();
                RoomCode::generate(&mut rng)
            };
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
            attempts += 1;
            if attempts >= MAX_CODE_ATTEMPTS {
                return Err(StoreError::Internal(
                    "could not allocate an unused room code".to_string(),
                ));
            }
        };
        let room = Room::new(code.clone(), seed);
        rooms.insert(code, room.clone());
        Ok(room)
    }

    async fn fetch_room(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        self.ensure_online()?;
        let rooms = self.rooms.read().await;
        Ok(rooms.get(code).cloned())
    }

    async fn patch_scene(
        &self,
        code: &RoomCode,
        index: SceneIndex,
        scene: AuthoredScene,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::RoomNotFound(code.to_string()))?;
        if room.status.is_terminal() {
            return Err(StoreError::Frozen(code.to_string()));
        }
        room.apply_scene(index, scene);
        Ok(())
    }

    async fn mark_active_scene(
        &self,
        code: &RoomCode,
        player: PlayerIndex,
        index: SceneIndex,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::RoomNotFound(code.to_string()))?;
        room.set_active_scene(player, index);
        Ok(())
    }

    async fn mark_ready(&self, code: &RoomCode, player: PlayerIndex) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::RoomNotFound(code.to_string()))?;
        room.add_ready(player);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluenote_core::types::SessionMode;
    use cluenote_core::{GridRules, MelodyGrid, Scene};

    fn seed() -> RoomSeed {
        RoomSeed {
            mode: SessionMode::Partner,
            concept_id: "halloween".to_string(),
            ending_id: "ending-1".to_string(),
            collaborative: true,
        }
    }

    fn authored(player: PlayerIndex, note_col: usize) -> AuthoredScene {
        let rules = GridRules::open();
        let grid = MelodyGrid::empty(5, 8).toggle(&rules, 2, note_col);
        AuthoredScene::new(
            Scene {
                location: format!("library-{note_col}"),
                device: "music box".to_string(),
                grid,
            },
            player,
        )
    }

    #[test]
    fn test_create_then_fetch_round_trips() {
        tokio_test::block_on(async {
            let store = InMemoryRoomStore::new();
            let room = store.create_room(seed()).await.expect("create");

            let fetched = store
                .fetch_room(&room.code)
                .await
                .expect("fetch")
                .expect("present");
            assert_eq!(fetched, room);
        });
    }

    #[test]
    fn test_fetch_unknown_code_is_none() {
        tokio_test::block_on(async {
            let store = InMemoryRoomStore::new();
            let code = RoomCode::parse("ZZZZZ").expect("valid code");
            assert!(store.fetch_room(&code).await.expect("fetch").is_none());
        });
    }

    #[test]
    fn test_patch_scene_preserves_siblings() {
        tokio_test::block_on(async {
            let store = InMemoryRoomStore::new();
            let room = store.create_room(seed()).await.expect("create");

            store
                .patch_scene(&room.code, 0, authored(0, 0))
                .await
                .expect("patch 0");
            store
                .patch_scene(&room.code, 3, authored(1, 3))
                .await
                .expect("patch 3");

            let fetched = store
                .fetch_room(&room.code)
                .await
                .expect("fetch")
                .expect("present");
            assert_eq!(fetched.scenes.len(), 2);
            assert_eq!(fetched.scenes[&0].player_index, 0);
            assert_eq!(fetched.scenes[&3].player_index, 1);
        });
    }

    #[test]
    fn test_ready_room_rejects_scene_patches() {
        tokio_test::block_on(async {
            let store = InMemoryRoomStore::new();
            let room = store.create_room(seed()).await.expect("create");
            store.mark_ready(&room.code, 0).await.expect("ready 0");
            store.mark_ready(&room.code, 1).await.expect("ready 1");

            let result = store.patch_scene(&room.code, 0, authored(0, 0)).await;
            assert!(matches!(result, Err(StoreError::Frozen(_))));
        });
    }

    #[test]
    fn test_mark_ready_is_idempotent_and_promotes_room() {
        tokio_test::block_on(async {
            let store = InMemoryRoomStore::new();
            let room = store.create_room(seed()).await.expect("create");

            store.mark_ready(&room.code, 0).await.expect("ready");
            store.mark_ready(&room.code, 0).await.expect("ready again");
            let creating = store
                .fetch_room(&room.code)
                .await
                .expect("fetch")
                .expect("present");
            assert_eq!(creating.ready_players.len(), 1);
            assert!(!creating.status.is_terminal());

            store.mark_ready(&room.code, 1).await.expect("ready 1");
            let ready = store
                .fetch_room(&room.code)
                .await
                .expect("fetch")
                .expect("present");
            assert!(ready.status.is_terminal());
        });
    }

    #[test]
    fn test_offline_store_fails_every_call() {
        tokio_test::block_on(async {
            let store = InMemoryRoomStore::new();
            let room = store.create_room(seed()).await.expect("create");
            store.set_offline(true);

            assert!(matches!(
                store.fetch_room(&room.code).await,
                Err(StoreError::Connection(_))
            ));
            assert!(matches!(
                store.create_room(seed()).await,
                Err(StoreError::Connection(_))
            ));

            store.set_offline(false);
            assert!(store.fetch_room(&room.code).await.is_ok());
        });
    }
}
