//! Session orchestrator - wires store + queue + watcher + solve flow.
//!
//! One orchestrator per client. "Concurrency" here means independent
//! client processes running their own orchestrator against a shared room
//! document; inside a client everything is driven through this type. Scene
//! writes are partitioned so concurrent authors never touch the same path,
//! and the ready set is the only shared mutable field.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use cluenote_config::ClueNoteConfig;
use cluenote_core::audio::AudioPlayback;
use cluenote_core::scoring::SolveTuning;
use cluenote_core::store::{PendingWrite, QueueStorage, RoomStore, StoreError};
use cluenote_core::types::{
    assigned_scenes, AuthoredScene, PlayerIndex, Room, RoomSeed, Scene, SceneIndex, SessionMode,
};
use cluenote_core::{GridRules, MelodyGrid, RoomCode};
use cluenote_stores::OfflineWriteQueue;

use crate::phase::{SessionPhase, SessionRole};
use crate::solve::{HintReveal, SceneOutcome, SceneSolve, SessionResults, SolveError};
use crate::watcher::{PollingConfig, RoomEvent, RoomWatcher, WatchHandle};

/// Everything clients of one session must agree on.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub rows: usize,
    pub cols: usize,
    pub min_notes: usize,
    pub scene_count: usize,
    pub rules: GridRules,
    pub solve: SolveTuning,
    pub poll: PollingConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 8,
            min_notes: 3,
            scene_count: 6,
            rules: GridRules::open(),
            solve: SolveTuning::default(),
            poll: PollingConfig::default(),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &ClueNoteConfig) -> Self {
        Self {
            rows: config.grid.rows,
            cols: config.grid.cols,
            min_notes: config.grid.min_notes,
            scene_count: config.session.scene_count,
            rules: GridRules::open(),
            solve: SolveTuning {
                max_listens: config.solve.max_listens,
                max_hints: config.solve.max_hints,
                hint_penalty: config.solve.hint_penalty,
                replay_penalty: config.solve.replay_penalty,
                pass_points: config.solve.pass_points,
                floor_points: config.solve.floor_points,
            },
            poll: PollingConfig {
                interval: std::time::Duration::from_millis(config.session.poll_interval_ms),
                fail_threshold: config.session.fail_threshold,
            },
        }
    }
}

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Actionable: the user should check the code they typed.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("solve error: {0}")]
    Solve(#[from] SolveError),

    #[error("scene {scene_index} needs at least {need} notes, has {have}")]
    InsufficientContent {
        scene_index: SceneIndex,
        have: usize,
        need: usize,
    },

    #[error("operation not allowed in phase {phase:?}")]
    WrongPhase { phase: SessionPhase },

    #[error("scenes are frozen once marked ready")]
    ScenesFrozen,

    #[error("scene {0} is not assigned to this player")]
    NotAssigned(SceneIndex),

    #[error("player {player} out of range for {mode:?}")]
    PlayerOutOfRange {
        player: PlayerIndex,
        mode: SessionMode,
    },

    #[error("no active session")]
    NoSession,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Final output, handed to the completion callback exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub melodies: BTreeMap<SceneIndex, AuthoredScene>,
    pub results: SessionResults,
}

type CompletionCallback = Box<dyn FnOnce(SessionOutcome) + Send>;

struct SolveProgress {
    scenes: Vec<SceneSolve>,
    current: usize,
    outcomes: Vec<SceneOutcome>,
}

struct SessionState {
    phase: SessionPhase,
    role: Option<SessionRole>,
    player: PlayerIndex,
    /// Local authoritative-for-UI cache; remote snapshots merge into it.
    room: Option<Room>,
    watch: Option<WatchHandle>,
    last_active_scene: Option<SceneIndex>,
    ready_requested: bool,
    /// Whether the store has confirmed this player's ready flag.
    ready_confirmed: bool,
    solve: Option<SolveProgress>,
    results: Option<SessionResults>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Setup,
            role: None,
            player: 0,
            room: None,
            watch: None,
            last_active_scene: None,
            ready_requested: false,
            ready_confirmed: false,
            solve: None,
            results: None,
        }
    }
}

pub struct SessionOrchestrator {
    store: Arc<dyn RoomStore>,
    queue: OfflineWriteQueue,
    watcher: Arc<dyn RoomWatcher>,
    audio: Arc<dyn AudioPlayback>,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn RoomStore>,
        storage: Arc<dyn QueueStorage>,
        watcher: Arc<dyn RoomWatcher>,
        audio: Arc<dyn AudioPlayback>,
        settings: SessionSettings,
    ) -> Self {
        let queue = OfflineWriteQueue::new(storage, store.clone());
        Self {
            store,
            queue,
            watcher,
            audio,
            settings,
            state: RwLock::new(SessionState::new()),
            on_complete: Mutex::new(None),
        }
    }

    /// Register the completion callback, fired once on reaching Results.
    pub fn on_complete(
        mut self,
        callback: impl FnOnce(SessionOutcome) + Send + 'static,
    ) -> Self {
        self.on_complete = Mutex::new(Some(Box::new(callback)));
        self
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    pub async fn role(&self) -> Option<SessionRole> {
        self.state.read().await.role
    }

    pub async fn player_index(&self) -> PlayerIndex {
        self.state.read().await.player
    }

    /// The local room view (local-first: reflects every local write).
    pub async fn room(&self) -> Option<Room> {
        self.state.read().await.room.clone()
    }

    pub async fn room_code(&self) -> Option<RoomCode> {
        self.state
            .read()
            .await
            .room
            .as_ref()
            .map(|room| room.code.clone())
    }

    pub async fn results(&self) -> Option<SessionResults> {
        self.state.read().await.results.clone()
    }

    /// Start a solo session. Fully local: the code is generated here and
    /// the room never touches the store.
    pub async fn begin_solo(
        &self,
        concept_id: impl Into<String>,
        ending_id: impl Into<String>,
    ) -> Result<RoomCode, SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Setup)?;
        let code = {
            let mut rng = rand::thread_rng();
            RoomCode::generate(&mut rng)
        };
        let seed = RoomSeed {
            mode: SessionMode::Solo,
            concept_id: concept_id.into(),
            ending_id: ending_id.into(),
            collaborative: false,
        };
        let room = Room::new(code.clone(), seed);
        state.room = Some(room);
        state.role = Some(SessionRole::Solo);
        state.player = 0;
        state.phase = SessionPhase::Create;
        info!(room = %code, "solo session started");
        Ok(code)
    }

    /// Create a shared room and lead it. This is the one store call whose
    /// failure surfaces to the user.
    pub async fn begin_lead(
        &self,
        mode: SessionMode,
        concept_id: impl Into<String>,
        ending_id: impl Into<String>,
        collaborative: bool,
    ) -> Result<RoomCode, SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Setup)?;
        let seed = RoomSeed {
            mode,
            concept_id: concept_id.into(),
            ending_id: ending_id.into(),
            collaborative,
        };
        let room = self.store.create_room(seed).await?;
        let code = room.code.clone();
        if collaborative {
            state.watch = Some(self.watcher.watch(code.clone()).await?);
        }
        state.room = Some(room);
        state.role = Some(SessionRole::Lead { collaborative });
        state.player = 0;
        state.phase = SessionPhase::Create;
        info!(room = %code, ?mode, collaborative, "session created");
        Ok(code)
    }

    /// Join an existing room by code. An unknown code keeps the session in
    /// Setup so the user can correct it.
    pub async fn join(
        &self,
        code: &RoomCode,
        player: PlayerIndex,
    ) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Setup)?;
        let Some(room) = self.store.fetch_room(code).await? else {
            return Err(SessionError::RoomNotFound(code.to_string()));
        };
        if player >= room.mode.required_players() {
            return Err(SessionError::PlayerOutOfRange {
                player,
                mode: room.mode,
            });
        }
        state.watch = Some(self.watcher.watch(code.clone()).await?);
        state.room = Some(room);
        state.role = Some(SessionRole::Joiner);
        state.player = player;
        state.phase = SessionPhase::Create;
        info!(room = %code, player, "joined session");
        Ok(())
    }

    /// Scenes this client authors: the whole set for single creators, the
    /// deterministic partition otherwise.
    pub async fn authoring_scenes(&self) -> Vec<SceneIndex> {
        let state = self.state.read().await;
        authoring_scenes_for(&state, &self.settings)
    }

    /// Set a scene's location and device, keeping any melody already
    /// entered.
    pub async fn stage_scene(
        &self,
        index: SceneIndex,
        location: impl Into<String>,
        device: impl Into<String>,
    ) -> Result<(), SessionError> {
        let location = location.into();
        let device = device.into();
        let write = {
            let mut state = self.state.write().await;
            ensure_phase(&state, SessionPhase::Create)?;
            if state.ready_requested {
                return Err(SessionError::ScenesFrozen);
            }
            let assigned = authoring_scenes_for(&state, &self.settings);
            if !assigned.contains(&index) {
                return Err(SessionError::NotAssigned(index));
            }
            let player = state.player;
            let remote = state.role.is_some_and(|role| role.is_remote());
            let room = state.room.as_mut().ok_or(SessionError::NoSession)?;
            let grid = room
                .scenes
                .get(&index)
                .map(|authored| authored.scene.grid.clone())
                .unwrap_or_else(|| MelodyGrid::empty(self.settings.rows, self.settings.cols));
            let authored = AuthoredScene::new(
                Scene {
                    location,
                    device,
                    grid,
                },
                player,
            );
            room.apply_scene(index, authored.clone());
            remote.then(|| PendingWrite::new(room.code.clone(), index, authored))
        };
        if let Some(write) = write {
            self.queue.submit(write).await?;
            self.note_presence(index).await;
        }
        Ok(())
    }

    /// Toggle one cell of an authored scene. Local state updates first;
    /// the store write goes through the offline queue. Returns whether the
    /// grid changed (a rule violation is a silent no-op).
    pub async fn toggle_cell(
        &self,
        index: SceneIndex,
        row: usize,
        col: usize,
    ) -> Result<bool, SessionError> {
        let write = {
            let mut state = self.state.write().await;
            ensure_phase(&state, SessionPhase::Create)?;
            if state.ready_requested {
                return Err(SessionError::ScenesFrozen);
            }
            let assigned = authoring_scenes_for(&state, &self.settings);
            if !assigned.contains(&index) {
                return Err(SessionError::NotAssigned(index));
            }
            let player = state.player;
            let remote = state.role.is_some_and(|role| role.is_remote());
            let room = state.room.as_mut().ok_or(SessionError::NoSession)?;
            let (location, device, grid) = match room.scenes.get(&index) {
                Some(authored) => (
                    authored.scene.location.clone(),
                    authored.scene.device.clone(),
                    authored.scene.grid.clone(),
                ),
                None => (
                    format!("scene-{index}"),
                    String::new(),
                    MelodyGrid::empty(self.settings.rows, self.settings.cols),
                ),
            };
            let next = grid.toggle(&self.settings.rules, row, col);
            if next == grid {
                return Ok(false);
            }
            let authored = AuthoredScene::new(
                Scene {
                    location,
                    device,
                    grid: next,
                },
                player,
            );
            room.apply_scene(index, authored.clone());
            remote.then(|| PendingWrite::new(room.code.clone(), index, authored))
        };
        if let Some(write) = write {
            self.queue.submit(write).await?;
            self.note_presence(index).await;
        }
        Ok(true)
    }

    /// Validate this player's partition, flush the queue, raise the ready
    /// flag. Validation is local and happens before any network call.
    pub async fn mark_ready(&self) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Create)?;
        let role = state.role.ok_or(SessionError::NoSession)?;
        let player = state.player;
        let assigned = authoring_scenes_for(&state, &self.settings);
        {
            let room = state.room.as_ref().ok_or(SessionError::NoSession)?;
            for index in &assigned {
                let have = room.scene_note_count(*index);
                if have < self.settings.min_notes {
                    return Err(SessionError::InsufficientContent {
                        scene_index: *index,
                        have,
                        need: self.settings.min_notes,
                    });
                }
            }
        }
        let code = {
            let room = state.room.as_mut().ok_or(SessionError::NoSession)?;
            room.add_ready(player);
            room.code.clone()
        };
        state.ready_requested = true;

        if role.is_single_creator() {
            state.phase = SessionPhase::Share;
            info!(room = %code, "authoring complete, session shareable");
            drop(state);
            if role.is_remote() {
                self.push_ready(&code, player).await;
            }
            return Ok(());
        }

        drop(state);
        self.push_ready(&code, player).await;
        Ok(())
    }

    /// Flush queued scenes, then the ready flag. The flag is only sent
    /// once the queue is drained so a player's ready never precedes their
    /// content; failures are retried on every poll tick.
    async fn push_ready(&self, code: &RoomCode, player: PlayerIndex) {
        let replay = match self.queue.replay_all(code).await {
            Ok(replay) => replay,
            Err(err) => {
                warn!(room = %code, error = %err, "queue replay failed");
                return;
            }
        };
        if !replay.drained() {
            debug!(
                room = %code,
                remaining = replay.remaining,
                "ready flag deferred until queue drains"
            );
            return;
        }
        match self.store.mark_ready(code, player).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.ready_confirmed = true;
            }
            Err(err) => {
                warn!(room = %code, error = %err, "ready flag will retry on next poll");
            }
        }
    }

    /// Drive the ready barrier for collaborative sessions. Resolves to
    /// true once the session entered Solve, or false if watching stopped
    /// without the room becoming ready (cancellation).
    pub async fn await_ready(&self) -> Result<bool, SessionError> {
        let (code, mut events) = {
            let state = self.state.read().await;
            ensure_phase(&state, SessionPhase::Create)?;
            let room = state.room.as_ref().ok_or(SessionError::NoSession)?;
            let watch = state.watch.as_ref().ok_or_else(|| {
                SessionError::Internal("session has no watcher".to_string())
            })?;
            (room.code.clone(), watch.subscribe())
        };

        // The watcher may have seen the barrier before we subscribed.
        if let Ok(Some(room)) = self.store.fetch_room(&code).await {
            if room.is_collectively_ready() {
                return self.enter_solve(room).await;
            }
            self.merge_snapshot(room).await;
        }

        loop {
            match events.recv().await {
                Some(RoomEvent::Ready(room)) => {
                    return self.enter_solve(room).await;
                }
                Some(RoomEvent::Snapshot(room)) => {
                    self.merge_snapshot(room).await;
                    self.sync_tick(&code).await;
                }
                Some(RoomEvent::Unreachable {
                    consecutive_failures,
                }) => {
                    warn!(
                        room = %code,
                        failures = consecutive_failures,
                        "room store unreachable while waiting for partners"
                    );
                }
                None => {
                    // Watcher gone: cancelled, or terminal before we
                    // subscribed.
                    if let Ok(Some(room)) = self.store.fetch_room(&code).await {
                        if room.is_collectively_ready() {
                            return self.enter_solve(room).await;
                        }
                    }
                    return Ok(false);
                }
            }
        }
    }

    /// Single-creator transition out of Share.
    pub async fn begin_solve(&self) -> Result<(), SessionError> {
        let room = {
            let state = self.state.read().await;
            ensure_phase(&state, SessionPhase::Share)?;
            state.room.clone().ok_or(SessionError::NoSession)?
        };
        if self.enter_solve(room).await? {
            Ok(())
        } else {
            Err(SessionError::Internal(
                "session left Share before solving began".to_string(),
            ))
        }
    }

    /// Scene currently being solved, `None` outside Solve or when done.
    pub async fn current_scene(&self) -> Option<SceneIndex> {
        let state = self.state.read().await;
        state
            .solve
            .as_ref()
            .and_then(|progress| progress.scenes.get(progress.current))
            .map(SceneSolve::scene_index)
    }

    /// The solver's working grid for the current scene.
    pub async fn attempt_grid(&self) -> Option<MelodyGrid> {
        let state = self.state.read().await;
        state
            .solve
            .as_ref()
            .and_then(|progress| progress.scenes.get(progress.current))
            .map(|scene| scene.attempt().clone())
    }

    /// Edit the current attempt. Same silent-no-op semantics as authoring.
    pub async fn toggle_attempt(
        &self,
        row: usize,
        col: usize,
    ) -> Result<bool, SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Solve)?;
        let scene = current_scene_mut(&mut state)?;
        Ok(scene.toggle(&self.settings.rules, row, col))
    }

    /// Play the current target melody. Returns listens remaining.
    pub async fn listen(&self) -> Result<u32, SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Solve)?;
        let audio = self.audio.clone();
        let scene = current_scene_mut(&mut state)?;
        Ok(scene.listen(audio.as_ref(), &self.settings.solve)?)
    }

    /// Reveal the next unrevealed note-bearing beat of the current target.
    pub async fn request_hint(&self) -> Result<HintReveal, SessionError> {
        let mut state = self.state.write().await;
        ensure_phase(&state, SessionPhase::Solve)?;
        let scene = current_scene_mut(&mut state)?;
        Ok(scene.request_hint(&self.settings.solve)?)
    }

    /// Score the current attempt. Passing advances to the next scene;
    /// finishing the last scene reaches Results and fires the completion
    /// callback.
    pub async fn submit_attempt(&self) -> Result<SceneOutcome, SessionError> {
        let (outcome, finished) = {
            let mut state = self.state.write().await;
            ensure_phase(&state, SessionPhase::Solve)?;
            let min_notes = self.settings.min_notes;
            let tuning = self.settings.solve;
            let progress = state.solve.as_mut().ok_or(SessionError::NoSession)?;
            let current = progress.current;
            let scene = progress
                .scenes
                .get_mut(current)
                .ok_or_else(|| SessionError::Internal("no scene left to solve".to_string()))?;
            let outcome = scene.submit(min_notes, &tuning)?;
            let mut results = None;
            if outcome.passed {
                progress.outcomes.push(outcome.clone());
                progress.current += 1;
                if progress.current >= progress.scenes.len() {
                    results = Some(SessionResults::from_outcomes(progress.outcomes.clone()));
                }
            }
            let finished = results.is_some();
            if let Some(results) = results {
                state.results = Some(results);
                state.phase = SessionPhase::Results;
            }
            (outcome, finished)
        };
        if finished {
            self.finish().await;
        }
        Ok(outcome)
    }

    /// Return to Setup from any phase. In-memory state is dropped; synced
    /// room data stays in the store for later resumption by code. Unsynced
    /// queue entries for this room are purged rather than left behind.
    pub async fn cancel(&self) {
        let (watch, code) = {
            let mut state = self.state.write().await;
            let watch = state.watch.take();
            let code = state.room.as_ref().map(|room| room.code.clone());
            *state = SessionState::new();
            (watch, code)
        };
        if let Some(watch) = watch {
            watch.stop();
        }
        if let Some(code) = code {
            match self.queue.purge_room(&code).await {
                Ok(0) => {}
                Ok(count) => debug!(room = %code, count, "purged unsynced writes"),
                Err(err) => warn!(room = %code, error = %err, "queue purge failed"),
            }
            info!(room = %code, "session cancelled");
        }
    }

    /// Best-effort presence hint; failures are swallowed.
    async fn note_presence(&self, index: SceneIndex) {
        let target = {
            let mut state = self.state.write().await;
            if state.last_active_scene == Some(index) {
                None
            } else {
                state.last_active_scene = Some(index);
                state
                    .room
                    .as_ref()
                    .map(|room| (room.code.clone(), state.player))
            }
        };
        if let Some((code, player)) = target {
            if let Err(err) = self.store.mark_active_scene(&code, player, index).await {
                debug!(room = %code, scene = index, error = %err, "presence hint dropped");
            }
        }
    }

    /// Fold a fetched snapshot into the local cache. Queued local writes
    /// win over the snapshot: the UI must never regress behind an edit the
    /// player already made.
    async fn merge_snapshot(&self, mut remote: Room) {
        let pending = self
            .queue
            .pending(&remote.code)
            .await
            .unwrap_or_default();
        let mut state = self.state.write().await;
        if state.phase != SessionPhase::Create {
            return;
        }
        state.ready_confirmed = remote.ready_players.contains(&state.player);
        for write in pending {
            remote.scenes.insert(write.scene_index, write.scene);
        }
        if state.ready_requested {
            remote.add_ready(state.player);
        }
        state.room = Some(remote);
    }

    /// Poll-tick convergence: retry queued writes, then the ready flag.
    async fn sync_tick(&self, code: &RoomCode) {
        let (player, resend_ready) = {
            let state = self.state.read().await;
            (
                state.player,
                state.ready_requested && !state.ready_confirmed,
            )
        };
        if resend_ready {
            self.push_ready(code, player).await;
        } else {
            match self.queue.replay_all(code).await {
                Ok(_) => {}
                Err(err) => warn!(room = %code, error = %err, "queue replay failed"),
            }
        }
    }

    /// Freeze the room and move to Solve. Resolves to false when the
    /// session moved somewhere else in the meantime (cancellation).
    async fn enter_solve(&self, mut room: Room) -> Result<bool, SessionError> {
        let mut state = self.state.write().await;
        if !matches!(state.phase, SessionPhase::Create | SessionPhase::Share) {
            return Ok(false);
        }
        room.refresh_status();
        let mut scenes = Vec::with_capacity(self.settings.scene_count);
        for index in 0..self.settings.scene_count {
            let authored = room.scenes.get(&index).ok_or_else(|| {
                SessionError::Internal(format!("scene {index} missing from ready room"))
            })?;
            scenes.push(SceneSolve::new(index, authored.scene.grid.clone()));
        }
        if let Some(watch) = state.watch.take() {
            watch.stop();
        }
        info!(room = %room.code, scenes = scenes.len(), "solving started");
        state.room = Some(room);
        state.solve = Some(SolveProgress {
            scenes,
            current: 0,
            outcomes: Vec::new(),
        });
        state.phase = SessionPhase::Solve;
        Ok(true)
    }

    /// Hand the final outcome to the completion callback, exactly once.
    async fn finish(&self) {
        let outcome = {
            let state = self.state.read().await;
            match (state.room.as_ref(), state.results.clone()) {
                (Some(room), Some(results)) => Some(SessionOutcome {
                    melodies: room.scenes.clone(),
                    results,
                }),
                _ => None,
            }
        };
        let Some(outcome) = outcome else {
            return;
        };
        info!(
            points = outcome.results.total_points,
            stars = outcome.results.total_stars,
            "session complete"
        );
        let callback = self
            .on_complete
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

fn ensure_phase(state: &SessionState, expected: SessionPhase) -> Result<(), SessionError> {
    if state.phase == expected {
        Ok(())
    } else {
        Err(SessionError::WrongPhase { phase: state.phase })
    }
}

fn authoring_scenes_for(state: &SessionState, settings: &SessionSettings) -> Vec<SceneIndex> {
    let Some(role) = state.role else {
        return Vec::new();
    };
    let Some(room) = &state.room else {
        return Vec::new();
    };
    if role.is_single_creator() {
        (0..settings.scene_count).collect()
    } else {
        assigned_scenes(room.mode, state.player, settings.scene_count)
    }
}

fn current_scene_mut(state: &mut SessionState) -> Result<&mut SceneSolve, SessionError> {
    let progress = state.solve.as_mut().ok_or(SessionError::NoSession)?;
    let current = progress.current;
    progress
        .scenes
        .get_mut(current)
        .ok_or_else(|| SessionError::Internal("no scene left to solve".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::watcher::PollingRoomWatcher;
    use cluenote_core::audio::NullAudio;
    use cluenote_stores::{InMemoryQueueStorage, InMemoryRoomStore};

    fn settings() -> SessionSettings {
        SessionSettings {
            poll: PollingConfig {
                interval: Duration::from_millis(10),
                fail_threshold: 3,
            },
            ..SessionSettings::default()
        }
    }

    fn orchestrator(store: Arc<InMemoryRoomStore>) -> SessionOrchestrator {
        let settings = settings();
        let watcher = Arc::new(PollingRoomWatcher::new(store.clone(), settings.poll.clone()));
        SessionOrchestrator::new(
            store,
            Arc::new(InMemoryQueueStorage::new()),
            watcher,
            Arc::new(NullAudio),
            settings,
        )
    }

    async fn author_all(orchestrator: &SessionOrchestrator) {
        for index in orchestrator.authoring_scenes().await {
            orchestrator
                .stage_scene(index, format!("location-{index}"), "music box")
                .await
                .expect("stage");
            for col in 0..3 {
                let row = (index + col) % 5;
                assert!(orchestrator
                    .toggle_cell(index, row, col)
                    .await
                    .expect("toggle"));
            }
        }
    }

    async fn solve_all(orchestrator: &SessionOrchestrator) {
        let room = orchestrator.room().await.expect("room");
        while let Some(index) = orchestrator.current_scene().await {
            let target = room.scenes[&index].scene.grid.clone();
            for (row, col) in target.active_cells() {
                assert!(orchestrator.toggle_attempt(row, col).await.expect("toggle"));
            }
            let outcome = orchestrator.submit_attempt().await.expect("submit");
            assert!(outcome.passed, "scene {index} should pass");
        }
    }

    #[test]
    fn test_solo_session_reaches_results_and_fires_callback_once() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let fired = Arc::new(AtomicUsize::new(0));
            let fired_in_callback = fired.clone();
            let orchestrator = orchestrator(store).on_complete(move |outcome| {
                assert_eq!(outcome.results.scenes.len(), 6);
                assert_eq!(outcome.results.total_points, 600);
                assert_eq!(outcome.results.total_stars, 18);
                assert_eq!(outcome.melodies.len(), 6);
                fired_in_callback.fetch_add(1, Ordering::SeqCst);
            });

            orchestrator
                .begin_solo("halloween", "ending-1")
                .await
                .expect("begin");
            assert_eq!(orchestrator.phase().await, SessionPhase::Create);

            author_all(&orchestrator).await;
            orchestrator.mark_ready().await.expect("ready");
            assert_eq!(orchestrator.phase().await, SessionPhase::Share);

            orchestrator.begin_solve().await.expect("begin solve");
            assert_eq!(orchestrator.phase().await, SessionPhase::Solve);

            solve_all(&orchestrator).await;
            assert_eq!(orchestrator.phase().await, SessionPhase::Results);
            assert_eq!(fired.load(Ordering::SeqCst), 1);

            let results = orchestrator.results().await.expect("results");
            assert_eq!(results.total_points, 600);
        });
    }

    #[test]
    fn test_join_unknown_room_stays_in_setup() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let orchestrator = orchestrator(store);
            let code = RoomCode::parse("ZZZZZ").expect("valid code");

            let result = orchestrator.join(&code, 1).await;
            assert!(matches!(result, Err(SessionError::RoomNotFound(_))));
            assert_eq!(orchestrator.phase().await, SessionPhase::Setup);
        });
    }

    #[test]
    fn test_collaborative_lead_cannot_edit_partner_scenes() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let orchestrator = orchestrator(store);
            orchestrator
                .begin_lead(SessionMode::Partner, "halloween", "ending-1", true)
                .await
                .expect("lead");

            assert_eq!(orchestrator.authoring_scenes().await, vec![0, 1, 2]);
            let result = orchestrator.toggle_cell(3, 0, 0).await;
            assert!(matches!(result, Err(SessionError::NotAssigned(3))));
        });
    }

    #[test]
    fn test_mark_ready_rejects_thin_scenes_locally() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let orchestrator = orchestrator(store);
            orchestrator
                .begin_solo("halloween", "ending-1")
                .await
                .expect("begin");

            // Scene 0 gets only two notes; the rest are untouched.
            orchestrator.toggle_cell(0, 0, 0).await.expect("toggle");
            orchestrator.toggle_cell(0, 1, 1).await.expect("toggle");

            let result = orchestrator.mark_ready().await;
            assert!(matches!(
                result,
                Err(SessionError::InsufficientContent {
                    scene_index: 0,
                    have: 2,
                    need: 3,
                })
            ));
            assert_eq!(orchestrator.phase().await, SessionPhase::Create);
        });
    }

    #[test]
    fn test_scenes_freeze_once_player_marks_ready() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let orchestrator = orchestrator(store);
            orchestrator
                .begin_lead(SessionMode::Partner, "halloween", "ending-1", true)
                .await
                .expect("lead");

            author_all(&orchestrator).await;
            orchestrator.mark_ready().await.expect("ready");

            // Still in Create (the barrier waits on the partner), but this
            // player's partition is frozen.
            assert_eq!(orchestrator.phase().await, SessionPhase::Create);
            let result = orchestrator.toggle_cell(0, 4, 4).await;
            assert!(matches!(result, Err(SessionError::ScenesFrozen)));
        });
    }

    #[test]
    fn test_editing_outside_create_phase_is_rejected() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let orchestrator = orchestrator(store);

            let result = orchestrator.toggle_cell(0, 0, 0).await;
            assert!(matches!(
                result,
                Err(SessionError::WrongPhase {
                    phase: SessionPhase::Setup
                })
            ));
        });
    }

    #[test]
    fn test_cancel_returns_to_setup_and_purges_queue() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let orchestrator = orchestrator(store.clone());
            orchestrator
                .begin_lead(SessionMode::Partner, "halloween", "ending-1", true)
                .await
                .expect("lead");

            store.set_offline(true);
            orchestrator.toggle_cell(0, 0, 0).await.expect("toggle");
            store.set_offline(false);

            orchestrator.cancel().await;
            assert_eq!(orchestrator.phase().await, SessionPhase::Setup);
            assert!(orchestrator.room().await.is_none());

            // A fresh session can start immediately.
            orchestrator
                .begin_solo("winter", "ending-2")
                .await
                .expect("begin again");
        });
    }

    #[test]
    fn test_rule_violating_edit_is_silent_noop() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryRoomStore::new());
            let mut settings = settings();
            settings.rules = GridRules::open().with_column(
                0,
                cluenote_core::grid::ColumnRule::Only { rows: vec![0] },
            );
            let watcher =
                Arc::new(PollingRoomWatcher::new(store.clone(), settings.poll.clone()));
            let orchestrator = SessionOrchestrator::new(
                store,
                Arc::new(InMemoryQueueStorage::new()),
                watcher,
                Arc::new(NullAudio),
                settings,
            );
            orchestrator
                .begin_solo("halloween", "ending-1")
                .await
                .expect("begin");

            assert!(!orchestrator.toggle_cell(0, 4, 0).await.expect("toggle"));
            assert!(orchestrator.toggle_cell(0, 0, 0).await.expect("toggle"));
        });
    }
}
