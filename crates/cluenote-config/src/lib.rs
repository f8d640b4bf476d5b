//! Unified configuration for cluenote sessions.
//!
//! Every knob is a product-tuning value with a named default; config files
//! only need to state what they change. Clients of one session must agree
//! on these values, so configuration is read once at startup.

mod loader;

pub use loader::{load_config, validate_config, ConfigError};

use serde::{Deserialize, Serialize};

pub const DEFAULT_GRID_ROWS: usize = 5;
pub const DEFAULT_GRID_COLS: usize = 8;
pub const DEFAULT_MIN_NOTES: usize = 3;
pub const DEFAULT_SCENE_COUNT: usize = 6;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_FAIL_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_LISTENS: u32 = 3;
pub const DEFAULT_MAX_HINTS: u32 = 2;
pub const DEFAULT_HINT_PENALTY: u32 = 10;
pub const DEFAULT_REPLAY_PENALTY: u32 = 5;
pub const DEFAULT_PASS_POINTS: u32 = 50;
pub const DEFAULT_FLOOR_POINTS: u32 = 25;

/// Full configuration file shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClueNoteConfig {
    pub version: u32,
    pub grid: GridConfig,
    pub session: SessionConfig,
    pub solve: SolveConfig,
}

impl Default for ClueNoteConfig {
    fn default() -> Self {
        Self {
            version: 1,
            grid: GridConfig::default(),
            session: SessionConfig::default(),
            solve: SolveConfig::default(),
        }
    }
}

/// Melody grid shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Notes a scene needs before its author may mark ready.
    pub min_notes: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_GRID_ROWS,
            cols: DEFAULT_GRID_COLS,
            min_notes: DEFAULT_MIN_NOTES,
        }
    }
}

/// Session coordination knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub scene_count: usize,
    pub poll_interval_ms: u64,
    /// Consecutive fetch failures before the outage is surfaced.
    pub fail_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scene_count: DEFAULT_SCENE_COUNT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
        }
    }
}

/// Solve-time tuning. These are preserved product values, not re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveConfig {
    pub max_listens: u32,
    pub max_hints: u32,
    pub hint_penalty: u32,
    pub replay_penalty: u32,
    pub pass_points: u32,
    pub floor_points: u32,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            max_listens: DEFAULT_MAX_LISTENS,
            max_hints: DEFAULT_MAX_HINTS,
            hint_penalty: DEFAULT_HINT_PENALTY,
            replay_penalty: DEFAULT_REPLAY_PENALTY,
            pass_points: DEFAULT_PASS_POINTS,
            floor_points: DEFAULT_FLOOR_POINTS,
        }
    }
}
