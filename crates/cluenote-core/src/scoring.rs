//! Scene scoring - tiered comparison with partial credit.
//!
//! The tier function is pure; hint/listen penalties are applied by the
//! solve flow through [`adjusted_points`] so the same attempt can be
//! re-scored without replaying usage.

use serde::{Deserialize, Serialize};

use crate::grid::MelodyGrid;

pub const MSG_PERFECT: &str = "Perfect!";
pub const MSG_CLOSE: &str = "So close!";
pub const MSG_GETTING_THERE: &str = "Getting there!";
pub const MSG_KEEP_LISTENING: &str = "Keep listening!";

/// Product-tuning values for the solve flow. Preserved as configuration,
/// not re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveTuning {
    /// Target playbacks available per scene.
    pub max_listens: u32,
    /// Hints available per scene.
    pub max_hints: u32,
    /// Points lost per hint used.
    pub hint_penalty: u32,
    /// Points lost per listen beyond the first.
    pub replay_penalty: u32,
    /// Adjusted points required to advance (exact matches always pass).
    pub pass_points: u32,
    /// Penalties never push a score below this.
    pub floor_points: u32,
}

impl Default for SolveTuning {
    fn default() -> Self {
        Self {
            max_listens: 3,
            max_hints: 2,
            hint_penalty: 10,
            replay_penalty: 5,
            pass_points: 50,
            floor_points: 25,
        }
    }
}

/// Raw score for one attempt against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneScore {
    pub points: u32,
    pub stars: u32,
    pub message: String,
    /// Cell-wise exact match.
    pub exact: bool,
    /// Contour similarity percentage backing the tier.
    pub contour_pct: f64,
}

/// Tier an attempt: exact match, then contour similarity bands.
pub fn score(attempt: &MelodyGrid, target: &MelodyGrid) -> SceneScore {
    if attempt == target {
        return SceneScore {
            points: 100,
            stars: 3,
            message: MSG_PERFECT.to_string(),
            exact: true,
            contour_pct: 100.0,
        };
    }
    let contour_pct = attempt.contour().similarity(&target.contour());
    let (points, stars, message) = if contour_pct >= 80.0 {
        (75, 2, MSG_CLOSE)
    } else if contour_pct >= 50.0 {
        (50, 1, MSG_GETTING_THERE)
    } else {
        (25, 0, MSG_KEEP_LISTENING)
    };
    SceneScore {
        points,
        stars,
        message: message.to_string(),
        exact: false,
        contour_pct,
    }
}

/// Apply hint/replay penalties, floored at the configured minimum.
pub fn adjusted_points(
    score: &SceneScore,
    hints_used: u32,
    listens_used: u32,
    tuning: &SolveTuning,
) -> u32 {
    let penalty = tuning.hint_penalty * hints_used
        + tuning.replay_penalty * listens_used.saturating_sub(1);
    score.points.saturating_sub(penalty).max(tuning.floor_points)
}

/// Pass gate: adjusted points reach the threshold, or the match was exact.
pub fn passes(score: &SceneScore, adjusted: u32, tuning: &SolveTuning) -> bool {
    score.exact || adjusted >= tuning.pass_points
}
