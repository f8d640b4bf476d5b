//! Audio playback capability.
//!
//! Injected at the solve boundary so grid and scoring logic stay free of
//! global synth state. A real renderer lives outside this core; tests and
//! headless use get the null and recording implementations below.

use std::sync::Mutex;

use crate::grid::MelodyGrid;

pub trait AudioPlayback: Send + Sync {
    /// Sound a single pitch row.
    fn play_note(&self, row: usize);

    /// Render a grid left to right, one beat per column.
    fn play_sequence(&self, grid: &MelodyGrid);
}

/// Discards playback. Default for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioPlayback for NullAudio {
    fn play_note(&self, _row: usize) {}

    fn play_sequence(&self, _grid: &MelodyGrid) {}
}

/// Records requested playback for assertions.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    notes: Mutex<Vec<usize>>,
    sequences: Mutex<Vec<Vec<i32>>>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played_notes(&self) -> Vec<usize> {
        self.notes.lock().map(|notes| notes.clone()).unwrap_or_default()
    }

    /// Contours of every grid played so far.
    pub fn played_sequences(&self) -> Vec<Vec<i32>> {
        self.sequences
            .lock()
            .map(|sequences| sequences.clone())
            .unwrap_or_default()
    }
}

impl AudioPlayback for RecordingAudio {
    fn play_note(&self, row: usize) {
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(row);
        }
    }

    fn play_sequence(&self, grid: &MelodyGrid) {
        if let Ok(mut sequences) = self.sequences.lock() {
            sequences.push(grid.contour().values().to_vec());
        }
    }
}
