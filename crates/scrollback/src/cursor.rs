use crate::ring::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Unknown,
    Known,
    /// The terminal reported the last column. Whether the next character
    /// lands there or on the next row depends on the terminal's wrap state.
    Uncertain,
}

#[derive(Debug)]
pub struct CursorTracker {
    row: usize,
    col: usize,
    status: PositionStatus,
    geometry: Geometry,
}

impl CursorTracker {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            row: 0,
            col: 0,
            status: PositionStatus::Unknown,
            geometry,
        }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn position(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_known(&self) -> bool {
        self.status == PositionStatus::Known
    }

    /// Whether the next write has to wait for a position report.
    pub fn needs_resolution(&self) -> bool {
        self.status != PositionStatus::Known
    }

    pub fn invalidate(&mut self) {
        self.status = PositionStatus::Unknown;
    }

    fn in_range(&self, row: usize, col: usize) -> bool {
        (1..=self.geometry.rows).contains(&row) && (1..=self.geometry.cols).contains(&col)
    }

    /// Adopt a 1-based `CSI row ; col R` report. Out-of-range reports are not
    /// position reports and leave the tracker untouched.
    pub fn on_position_report(&mut self, row: usize, col: usize) -> bool {
        if !self.in_range(row, col) {
            return false;
        }
        self.row = row - 1;
        self.col = col - 1;
        self.status = if col == self.geometry.cols {
            PositionStatus::Uncertain
        } else {
            PositionStatus::Known
        };
        true
    }

    /// Adopt the target of a 1-based `CSI row ; col H` the shell sent. An
    /// explicit move clears any pending wrap, so the last column is Known.
    pub fn adopt_move(&mut self, row: usize, col: usize) -> bool {
        if !self.in_range(row, col) {
            self.invalidate();
            return false;
        }
        self.row = row - 1;
        self.col = col - 1;
        self.status = PositionStatus::Known;
        true
    }

    /// Position as a 1-based report for the shell, clamped to the screen.
    pub fn report(&self) -> (usize, usize) {
        (
            self.row.min(self.geometry.rows - 1) + 1,
            self.col.min(self.geometry.cols - 1) + 1,
        )
    }

    /// Claim the column for the next printed character and step past it.
    /// `wrap` is true when the row was already full and the caller has to
    /// start a new row before writing.
    pub fn place(&mut self) -> (usize, bool) {
        let wrap = self.col >= self.geometry.cols;
        if wrap {
            self.col = 0;
        }
        let col = self.col;
        self.col += 1;
        if self.status == PositionStatus::Uncertain {
            self.status = PositionStatus::Known;
        }
        (col, wrap)
    }

    pub fn set_row(&mut self, row: usize) {
        self.row = row;
    }

    pub fn carriage_return(&mut self) {
        self.col = 0;
    }

    pub fn backspace(&mut self) -> Option<usize> {
        if self.col == 0 {
            return None;
        }
        self.col -= 1;
        Some(self.col)
    }
}
