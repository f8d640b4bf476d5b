//! Solve flow - listens, hints, attempts, aggregation.
//!
//! Scenes are frozen by the time solving starts, so everything here is
//! client-side state with no further multi-player coordination.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cluenote_core::audio::AudioPlayback;
use cluenote_core::grid::{GridRules, MelodyGrid, EMPTY_COLUMN};
use cluenote_core::scoring::{adjusted_points, passes, score, SceneScore, SolveTuning};
use cluenote_core::types::SceneIndex;

/// Solve-flow errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("no listens left (cap {cap})")]
    ListensExhausted { cap: u32 },

    #[error("no hints left (cap {cap})")]
    HintsExhausted { cap: u32 },

    #[error("every note-bearing beat is already revealed")]
    NoHintAvailable,

    #[error("attempt needs at least {need} notes, has {have}")]
    InsufficientContent { have: usize, need: usize },

    #[error("scene already solved")]
    AlreadySolved,
}

/// One revealed note from a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintReveal {
    pub column: usize,
    pub row: usize,
}

/// Final record for one solved (or attempted) scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneOutcome {
    pub scene_index: SceneIndex,
    pub score: SceneScore,
    pub adjusted_points: u32,
    pub hints_used: u32,
    pub listens_used: u32,
    pub passed: bool,
}

/// Progress on one scene from the solving side.
#[derive(Debug, Clone)]
pub struct SceneSolve {
    scene_index: SceneIndex,
    target: MelodyGrid,
    attempt: MelodyGrid,
    listens_used: u32,
    hints_used: u32,
    revealed: Vec<usize>,
    solved: bool,
}

impl SceneSolve {
    pub fn new(scene_index: SceneIndex, target: MelodyGrid) -> Self {
        let attempt = MelodyGrid::empty(target.rows(), target.cols());
        Self {
            scene_index,
            target,
            attempt,
            listens_used: 0,
            hints_used: 0,
            revealed: Vec::new(),
            solved: false,
        }
    }

    pub fn scene_index(&self) -> SceneIndex {
        self.scene_index
    }

    pub fn attempt(&self) -> &MelodyGrid {
        &self.attempt
    }

    pub fn listens_used(&self) -> u32 {
        self.listens_used
    }

    pub fn hints_used(&self) -> u32 {
        self.hints_used
    }

    pub fn revealed_columns(&self) -> &[usize] {
        &self.revealed
    }

    /// Edit the attempt. Returns whether the grid changed; rejected edits
    /// are value no-ops exactly as in authoring.
    pub fn toggle(&mut self, rules: &GridRules, row: usize, col: usize) -> bool {
        if self.solved {
            return false;
        }
        let next = self.attempt.toggle(rules, row, col);
        let changed = next != self.attempt;
        self.attempt = next;
        changed
    }

    /// Play the target melody. Counts against the cap regardless of what
    /// the solver does with what they hear.
    pub fn listen(
        &mut self,
        audio: &dyn AudioPlayback,
        tuning: &SolveTuning,
    ) -> Result<u32, SolveError> {
        if self.listens_used >= tuning.max_listens {
            return Err(SolveError::ListensExhausted {
                cap: tuning.max_listens,
            });
        }
        audio.play_sequence(&self.target);
        self.listens_used += 1;
        Ok(tuning.max_listens - self.listens_used)
    }

    /// Reveal the leftmost note-bearing beat not yet revealed.
    pub fn request_hint(&mut self, tuning: &SolveTuning) -> Result<HintReveal, SolveError> {
        if self.hints_used >= tuning.max_hints {
            return Err(SolveError::HintsExhausted {
                cap: tuning.max_hints,
            });
        }
        let contour = self.target.contour();
        let next = contour
            .values()
            .iter()
            .enumerate()
            .find(|(col, value)| **value != EMPTY_COLUMN && !self.revealed.contains(col));
        let Some((column, value)) = next else {
            return Err(SolveError::NoHintAvailable);
        };
        self.revealed.push(column);
        self.hints_used += 1;
        Ok(HintReveal {
            column,
            row: *value as usize,
        })
    }

    /// Score the current attempt. A passing attempt freezes the scene; a
    /// failing one can be retried freely with the grid already entered.
    pub fn submit(
        &mut self,
        min_notes: usize,
        tuning: &SolveTuning,
    ) -> Result<SceneOutcome, SolveError> {
        if self.solved {
            return Err(SolveError::AlreadySolved);
        }
        let have = self.attempt.count_active();
        if have < min_notes {
            return Err(SolveError::InsufficientContent {
                have,
                need: min_notes,
            });
        }
        let score = score(&self.attempt, &self.target);
        let adjusted = adjusted_points(&score, self.hints_used, self.listens_used, tuning);
        let passed = passes(&score, adjusted, tuning);
        if passed {
            self.solved = true;
        }
        Ok(SceneOutcome {
            scene_index: self.scene_index,
            score,
            adjusted_points: adjusted,
            hints_used: self.hints_used,
            listens_used: self.listens_used,
            passed,
        })
    }
}

/// Aggregate results across all scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResults {
    pub scenes: Vec<SceneOutcome>,
    pub total_points: u32,
    pub total_stars: u32,
}

impl SessionResults {
    pub fn from_outcomes(scenes: Vec<SceneOutcome>) -> Self {
        let total_points = scenes.iter().map(|o| o.adjusted_points).sum();
        let star_cap = 3 * scenes.len() as u32;
        let total_stars = scenes
            .iter()
            .map(|o| o.score.stars)
            .sum::<u32>()
            .min(star_cap);
        Self {
            scenes,
            total_points,
            total_stars,
        }
    }
}
