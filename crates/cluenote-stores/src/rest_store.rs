//! REST-backed room store for the hosted document database.
//!
//! The remote API is a plain document store addressed by `rooms/{code}`
//! with member sub-paths. Scene writes are merge-patches at the scene
//! path, so concurrent authors never clobber each other's partitions;
//! ready-ups are idempotent member PUTs under the ready-set path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use cluenote_core::store::{RoomStore, StoreError};
use cluenote_core::types::{AuthoredScene, PlayerIndex, Room, RoomSeed, SceneIndex};
use cluenote_core::RoomCode;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CREATE_ATTEMPTS: usize = 5;

pub struct RestRoomStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestRoomStore {
    /// Create a store client for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn room_url(&self, code: &RoomCode) -> String {
        format!("{}/rooms/{}", self.base_url, code)
    }

    fn scene_url(&self, code: &RoomCode, index: SceneIndex) -> String {
        format!("{}/rooms/{}/scenes/{}", self.base_url, code, index)
    }

    fn ready_url(&self, code: &RoomCode, player: PlayerIndex) -> String {
        format!("{}/rooms/{}/ready_players/{}", self.base_url, code, player)
    }

    fn active_url(&self, code: &RoomCode, player: PlayerIndex) -> String {
        format!("{}/rooms/{}/active_scenes/{}", self.base_url, code, player)
    }
}

fn connection_error(err: reqwest::Error) -> StoreError {
    StoreError::Connection(err.to_string())
}

fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(StoreError::Connection(format!(
        "unexpected status {status}"
    )))
}

#[async_trait]
impl RoomStore for RestRoomStore {
    async fn create_room(&self, seed: RoomSeed) -> Result<Room, StoreError> {
        // Conditional create; a code collision answers 409/412 and we draw
        // a fresh code.
        for _ in 0..CREATE_ATTEMPTS {
            let code = {
                let mut rng = rand::thread_rng();
                RoomCode::generate(&mut rng)
            };
            let room = Room::new(code.clone(), seed.clone());
            let response = self
                .client
                .put(self.room_url(&code))
                .header(reqwest::header::IF_NONE_MATCH, "*")
                .json(&room)
                .send()
                .await
                .map_err(connection_error)?;
            match response.status() {
                StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                    debug!(code = %code, "room code collision, retrying");
                    continue;
                }
                _ => {
                    ensure_success(response)?;
                    return Ok(room);
                }
            }
        }
        Err(StoreError::Internal(
            "could not allocate an unused room code".to_string(),
        ))
    }

    async fn fetch_room(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        let response = self
            .client
            .get(self.room_url(code))
            .send()
            .await
            .map_err(connection_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response)?;
        let room = response
            .json::<Room>()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(room))
    }

    async fn patch_scene(
        &self,
        code: &RoomCode,
        index: SceneIndex,
        scene: AuthoredScene,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .patch(self.scene_url(code, index))
            .json(&scene)
            .send()
            .await
            .map_err(connection_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::RoomNotFound(code.to_string()));
        }
        ensure_success(response)?;
        Ok(())
    }

    async fn mark_active_scene(
        &self,
        code: &RoomCode,
        player: PlayerIndex,
        index: SceneIndex,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.active_url(code, player))
            .json(&json!(index))
            .send()
            .await
            .map_err(connection_error)?;
        ensure_success(response)?;
        Ok(())
    }

    async fn mark_ready(&self, code: &RoomCode, player: PlayerIndex) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.ready_url(code, player))
            .json(&json!(true))
            .send()
            .await
            .map_err(connection_error)?;
        ensure_success(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_address_member_paths() {
        let store = RestRoomStore::new("https://rooms.example.edu/api/").expect("client");
        let code = RoomCode::parse("QX7PM").expect("valid code");

        assert_eq!(
            store.room_url(&code),
            "https://rooms.example.edu/api/rooms/QX7PM"
        );
        assert_eq!(
            store.scene_url(&code, 3),
            "https://rooms.example.edu/api/rooms/QX7PM/scenes/3"
        );
        assert_eq!(
            store.ready_url(&code, 1),
            "https://rooms.example.edu/api/rooms/QX7PM/ready_players/1"
        );
        assert_eq!(
            store.active_url(&code, 2),
            "https://rooms.example.edu/api/rooms/QX7PM/active_scenes/2"
        );
    }
}
