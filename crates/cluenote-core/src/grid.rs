//! Melody grid - a constrained monophonic pitch/beat matrix.
//!
//! Row 0 is the lowest pitch. Every mutation returns a new grid so callers
//! can rely on value semantics for change detection; a rejected edit is a
//! silent no-op that returns a value-equal grid, never an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Contour sentinel for a beat with no note.
pub const EMPTY_COLUMN: i32 = -1;

/// Legality restriction for a single beat column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnRule {
    /// Any pitch row may be placed in this column.
    Any,
    /// Only the listed pitch rows are legal in this column.
    Only { rows: Vec<usize> },
}

impl ColumnRule {
    /// Check whether a pitch row is legal under this rule.
    pub fn allows(&self, row: usize) -> bool {
        match self {
            ColumnRule::Any => true,
            ColumnRule::Only { rows } => rows.contains(&row),
        }
    }
}

/// Per-column rules for a grid shape. Columns without an entry are open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GridRules {
    #[serde(default)]
    pub columns: Vec<ColumnRule>,
}

impl GridRules {
    /// Rules that allow every row in every column.
    pub fn open() -> Self {
        Self::default()
    }

    /// Restrict one column, extending the rule table as needed.
    pub fn with_column(mut self, col: usize, rule: ColumnRule) -> Self {
        if self.columns.len() <= col {
            self.columns.resize(col + 1, ColumnRule::Any);
        }
        self.columns[col] = rule;
        self
    }

    /// Check whether `(row, col)` is legal under these rules.
    pub fn allows(&self, row: usize, col: usize) -> bool {
        self.columns.get(col).map_or(true, |rule| rule.allows(row))
    }
}

/// A rectangular boolean melody matrix with at most one note per beat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MelodyGrid {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl MelodyGrid {
    /// Create a grid with every cell inactive.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    /// Number of pitch rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of beat columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Whether the cell at `(row, col)` is active. Out-of-range is inactive.
    pub fn is_active(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        self.cells[self.index(row, col)]
    }

    /// Toggle a cell, preserving the one-note-per-column invariant.
    ///
    /// Returns the input unchanged for out-of-range or rule-violating
    /// targets. Toggling an active cell clears it. Activating a cell first
    /// clears the whole column, so the invariant holds by construction.
    pub fn toggle(&self, rules: &GridRules, row: usize, col: usize) -> MelodyGrid {
        if row >= self.rows || col >= self.cols || !rules.allows(row, col) {
            return self.clone();
        }
        let mut next = self.clone();
        let target = next.index(row, col);
        if next.cells[target] {
            next.cells[target] = false;
            return next;
        }
        for r in 0..next.rows {
            let idx = next.index(r, col);
            next.cells[idx] = false;
        }
        next.cells[target] = true;
        next
    }

    /// Count of active cells.
    pub fn count_active(&self) -> usize {
        self.cells.iter().filter(|cell| **cell).count()
    }

    /// Whether the grid holds no notes at all.
    pub fn is_empty(&self) -> bool {
        self.count_active() == 0
    }

    /// Active cells as `(row, col)` pairs in row-major order.
    pub fn active_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell)
            .map(|(idx, _)| (idx / self.cols, idx % self.cols))
    }

    /// Per-beat pitch row sequence, [`EMPTY_COLUMN`] where no note sounds.
    pub fn contour(&self) -> Contour {
        let mut values = Vec::with_capacity(self.cols);
        for col in 0..self.cols {
            let active = (0..self.rows).find(|row| self.cells[self.index(*row, col)]);
            values.push(active.map_or(EMPTY_COLUMN, |row| row as i32));
        }
        Contour(values)
    }
}

impl fmt::Display for MelodyGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Highest pitch on top, one character per beat.
        for row in (0..self.rows).rev() {
            for col in 0..self.cols {
                let ch = if self.cells[self.index(row, col)] {
                    '#'
                } else {
                    '.'
                };
                write!(f, "{ch}")?;
            }
            if row > 0 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Derived per-beat pitch sequence used for partial-credit comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<i32>);

impl Contour {
    /// The raw per-column values.
    pub fn values(&self) -> &[i32] {
        &self.0
    }

    /// Similarity percentage in `[0, 100]`.
    ///
    /// Over columns where either side holds a note, the fraction where both
    /// hold the same note. Columns empty on both sides are excluded from
    /// the denominator; two all-empty contours are fully similar.
    pub fn similarity(&self, other: &Contour) -> f64 {
        let len = self.0.len().max(other.0.len());
        let mut counted = 0usize;
        let mut matched = 0usize;
        for col in 0..len {
            let a = self.0.get(col).copied().unwrap_or(EMPTY_COLUMN);
            let b = other.0.get(col).copied().unwrap_or(EMPTY_COLUMN);
            if a == EMPTY_COLUMN && b == EMPTY_COLUMN {
                continue;
            }
            counted += 1;
            if a == b {
                matched += 1;
            }
        }
        if counted == 0 {
            return 100.0;
        }
        matched as f64 / counted as f64 * 100.0
    }
}
