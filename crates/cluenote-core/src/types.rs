//! Session data model - scenes, rooms, player assignment.
//!
//! A Room is the shared document one collaborative session lives in. Scene
//! authorship is partitioned deterministically across players so that
//! concurrent writers never target the same scene path; the ready set is
//! the only field written by more than one player and it is append-only.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::code::RoomCode;
use crate::grid::MelodyGrid;

pub type PlayerIndex = usize;
pub type SceneIndex = usize;

/// Scenes per room.
pub const SCENE_COUNT: usize = 6;
/// Minimum notes a scene needs before its author may mark ready.
pub const MIN_SCENE_NOTES: usize = 3;

/// How many players author a session together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Solo,
    Partner,
    Trio,
}

impl SessionMode {
    pub fn required_players(&self) -> usize {
        match self {
            SessionMode::Solo => 1,
            SessionMode::Partner => 2,
            SessionMode::Trio => 3,
        }
    }
}

/// Deterministic scene partition for one player.
///
/// Contiguous blocks, remainder spread to the earliest players. Every
/// client computes this identically, which is what lets concurrent authors
/// skip negotiation entirely: the partition is disjoint and exhaustive by
/// construction. Out-of-range players get nothing.
pub fn assigned_scenes(
    mode: SessionMode,
    player: PlayerIndex,
    scene_count: usize,
) -> Vec<SceneIndex> {
    let players = mode.required_players();
    if player >= players {
        return Vec::new();
    }
    let base = scene_count / players;
    let extra = scene_count % players;
    let size_of = |p: usize| base + usize::from(p < extra);
    let start: usize = (0..player).map(size_of).sum();
    (start..start + size_of(player)).collect()
}

/// Which player authors a given scene, if any.
pub fn scene_owner(
    mode: SessionMode,
    scene: SceneIndex,
    scene_count: usize,
) -> Option<PlayerIndex> {
    (0..mode.required_players())
        .find(|player| assigned_scenes(mode, *player, scene_count).contains(&scene))
}

/// One puzzle unit: a location, its target melody, and the chosen device.
/// The device is flavor metadata, opaque to scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub location: String,
    pub device: String,
    pub grid: MelodyGrid,
}

/// A scene as stored in the room, stamped with its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoredScene {
    pub scene: Scene,
    pub player_index: PlayerIndex,
    pub authored_at: DateTime<Utc>,
}

impl AuthoredScene {
    pub fn new(scene: Scene, player_index: PlayerIndex) -> Self {
        Self {
            scene,
            player_index,
            authored_at: Utc::now(),
        }
    }
}

/// Room lifecycle: authored progressively, then frozen for solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Creating,
    Ready,
}

impl RoomStatus {
    /// Ready rooms are read-only; watchers stop polling here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomStatus::Ready)
    }
}

/// Initial room contents, before a code is allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSeed {
    pub mode: SessionMode,
    pub concept_id: String,
    pub ending_id: String,
    /// Collaborative rooms wait for every player's ready flag; a
    /// single-creator room only waits for its author.
    pub collaborative: bool,
}

/// The shared session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub code: RoomCode,
    pub mode: SessionMode,
    pub concept_id: String,
    pub ending_id: String,
    /// Quorum for the ready barrier, fixed at creation.
    pub required_ready: usize,
    #[serde(default)]
    pub scenes: BTreeMap<SceneIndex, AuthoredScene>,
    /// Stored as a map of player index to membership so concurrent
    /// ready-ups merge at member-path granularity.
    #[serde(default, with = "ready_set")]
    pub ready_players: BTreeSet<PlayerIndex>,
    /// Presence hints: which scene each player is currently editing.
    #[serde(default)]
    pub active_scenes: BTreeMap<PlayerIndex, SceneIndex>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(code: RoomCode, seed: RoomSeed) -> Self {
        let now = Utc::now();
        let required_ready = if seed.collaborative {
            seed.mode.required_players()
        } else {
            1
        };
        Self {
            code,
            mode: seed.mode,
            concept_id: seed.concept_id,
            ending_id: seed.ending_id,
            required_ready,
            scenes: BTreeMap::new(),
            ready_players: BTreeSet::new(),
            active_scenes: BTreeMap::new(),
            status: RoomStatus::Creating,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge one authored scene into the room.
    pub fn apply_scene(&mut self, index: SceneIndex, authored: AuthoredScene) {
        self.scenes.insert(index, authored);
        self.touch();
    }

    /// Append a player to the ready set if absent. Returns whether the set
    /// grew. Monotonic: players are never removed.
    pub fn add_ready(&mut self, player: PlayerIndex) -> bool {
        let inserted = self.ready_players.insert(player);
        self.refresh_status();
        self.touch();
        inserted
    }

    /// Record which scene a player is editing.
    pub fn set_active_scene(&mut self, player: PlayerIndex, scene: SceneIndex) {
        self.active_scenes.insert(player, scene);
        self.touch();
    }

    /// The ready barrier, recomputed identically by every client.
    pub fn is_collectively_ready(&self) -> bool {
        self.ready_players.len() >= self.required_ready
    }

    /// Promote to Ready once the barrier is satisfied.
    pub fn refresh_status(&mut self) {
        if self.status == RoomStatus::Creating && self.is_collectively_ready() {
            self.status = RoomStatus::Ready;
        }
    }

    /// Note count for a scene, zero when unauthored.
    pub fn scene_note_count(&self, index: SceneIndex) -> usize {
        self.scenes
            .get(&index)
            .map_or(0, |authored| authored.scene.grid.count_active())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Ready set on the wire: `{"0": true, "2": true}` rather than an array,
/// so a single member PUT is an idempotent append-unique.
mod ready_set {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        set: &BTreeSet<usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<String, bool> = set.iter().map(|p| (p.to_string(), true)).collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<usize>, D::Error> {
        let map = BTreeMap::<String, bool>::deserialize(deserializer)?;
        map.into_iter()
            .filter(|(_, member)| *member)
            .map(|(key, _)| key.parse::<usize>().map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(mode: SessionMode, collaborative: bool) -> RoomSeed {
        RoomSeed {
            mode,
            concept_id: "halloween".to_string(),
            ending_id: "ending-1".to_string(),
            collaborative,
        }
    }

    fn room(mode: SessionMode, collaborative: bool) -> Room {
        let code = RoomCode::parse("QX7PM").expect("valid code");
        Room::new(code, seed(mode, collaborative))
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        for mode in [SessionMode::Solo, SessionMode::Partner, SessionMode::Trio] {
            let mut seen = BTreeSet::new();
            for player in 0..mode.required_players() {
                for scene in assigned_scenes(mode, player, SCENE_COUNT) {
                    assert!(seen.insert(scene), "{mode:?}: scene {scene} assigned twice");
                }
            }
            assert_eq!(seen, (0..SCENE_COUNT).collect(), "{mode:?} missed scenes");
        }
    }

    #[test]
    fn test_partner_partition_matches_expected_blocks() {
        assert_eq!(
            assigned_scenes(SessionMode::Partner, 0, SCENE_COUNT),
            vec![0, 1, 2]
        );
        assert_eq!(
            assigned_scenes(SessionMode::Partner, 1, SCENE_COUNT),
            vec![3, 4, 5]
        );
    }

    #[test]
    fn test_out_of_range_player_gets_no_scenes() {
        assert!(assigned_scenes(SessionMode::Partner, 2, SCENE_COUNT).is_empty());
        assert!(assigned_scenes(SessionMode::Solo, 1, SCENE_COUNT).is_empty());
    }

    #[test]
    fn test_scene_owner_inverts_assignment() {
        for scene in 0..SCENE_COUNT {
            let owner = scene_owner(SessionMode::Trio, scene, SCENE_COUNT).expect("owned");
            assert!(assigned_scenes(SessionMode::Trio, owner, SCENE_COUNT).contains(&scene));
        }
    }

    #[test]
    fn test_ready_set_is_idempotent_and_promotes_status() {
        let mut room = room(SessionMode::Partner, true);
        assert_eq!(room.required_ready, 2);

        assert!(room.add_ready(0));
        assert!(!room.add_ready(0));
        assert_eq!(room.status, RoomStatus::Creating);
        assert!(!room.is_collectively_ready());

        assert!(room.add_ready(1));
        assert_eq!(room.status, RoomStatus::Ready);
        assert!(room.is_collectively_ready());
    }

    #[test]
    fn test_single_creator_room_only_waits_for_its_author() {
        let mut room = room(SessionMode::Partner, false);
        assert_eq!(room.required_ready, 1);

        room.add_ready(0);
        assert_eq!(room.status, RoomStatus::Ready);
    }

    #[test]
    fn test_ready_set_serializes_as_member_map() {
        let mut room = room(SessionMode::Trio, true);
        room.add_ready(0);
        room.add_ready(2);

        let json = serde_json::to_value(&room).expect("serialize");
        assert_eq!(
            json["ready_players"],
            serde_json::json!({"0": true, "2": true})
        );

        let back: Room = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.ready_players, [0, 2].into_iter().collect());
    }
}
