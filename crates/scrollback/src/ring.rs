use crate::error::SessionError;
use std::ops::Range;

const BLANK: u32 = b' ' as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub rows: usize,
    pub cols: usize,
}

impl Geometry {
    pub fn new(rows: usize, cols: usize) -> Result<Self, SessionError> {
        if rows == 0 || cols == 0 {
            return Err(SessionError::InvalidGeometry { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

#[derive(Debug)]
pub struct RingBuffer {
    cells: Vec<u32>,
    geometry: Geometry,
    /// First cell of the live screen mirror.
    origin: usize,
    /// First cell of the window currently on screen.
    show: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize, geometry: Geometry) -> Result<Self, SessionError> {
        if capacity < geometry.cells() {
            return Err(SessionError::BufferTooSmall {
                capacity,
                rows: geometry.rows,
                cols: geometry.cols,
            });
        }
        Ok(Self {
            cells: vec![BLANK; capacity],
            geometry,
            origin: 0,
            show: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn origin(&self) -> usize {
        self.origin
    }

    pub fn show(&self) -> usize {
        self.show
    }

    pub fn is_live(&self) -> bool {
        self.show == self.origin
    }

    pub fn index(&self, offset: usize) -> usize {
        offset % self.cells.len()
    }

    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        let Geometry { rows, cols } = self.geometry;
        (row < rows && col < cols).then(|| self.origin + row * cols + col)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<u32> {
        self.offset(row, col).map(|off| self.cells[self.index(off)])
    }

    /// Store `cp` at a live-mirror position. Returns false when the position
    /// lies outside the mirror.
    pub fn write(&mut self, row: usize, col: usize, cp: u32) -> bool {
        match self.offset(row, col) {
            Some(off) => {
                let slot = self.index(off);
                self.cells[slot] = cp;
                true
            }
            None => false,
        }
    }

    /// Blank `[from_col, to_col)` on `from_row` and every row below it.
    pub fn erase(&mut self, from_row: usize, from_col: usize, to_col: usize) {
        let Geometry { rows, cols } = self.geometry;
        if from_row >= rows {
            return;
        }
        let line = self.origin + from_row * cols;
        let to_col = to_col.min(cols);
        self.fill(line + from_col.min(to_col)..line + to_col);
        self.fill(line + cols..self.origin + rows * cols);
    }

    fn fill(&mut self, range: Range<usize>) {
        for off in range {
            let slot = self.index(off);
            self.cells[slot] = BLANK;
        }
    }

    /// Move down one row from `row`. At the bottom of the mirror the screen
    /// scrolls: the oldest row becomes history, a blank row appears and any
    /// scrollback view is dropped.
    pub fn new_row(&mut self, row: usize) -> usize {
        let Geometry { rows, cols } = self.geometry;
        if row + 1 < rows {
            return row + 1;
        }
        self.origin += cols;
        self.show = self.origin;
        self.erase(rows - 1, 0, cols);
        rows - 1
    }

    pub fn history_rows(&self) -> usize {
        (self.capacity() - self.geometry.cells()) / self.geometry.cols
    }

    pub fn oldest_show(&self) -> usize {
        self.origin
            .saturating_sub(self.history_rows() * self.geometry.cols)
    }

    pub fn lines_below(&self) -> usize {
        (self.origin - self.show) / self.geometry.cols
    }

    pub fn can_scroll_up(&self) -> bool {
        self.show > self.oldest_show()
    }

    /// Move the view `lines` rows back. Returns true if `show` changed.
    pub fn scroll_up(&mut self, lines: usize) -> bool {
        let target = self
            .show
            .saturating_sub(lines * self.geometry.cols)
            .max(self.oldest_show());
        self.set_show(target)
    }

    pub fn scroll_down(&mut self, lines: usize) -> bool {
        let target = (self.show + lines * self.geometry.cols).min(self.origin);
        self.set_show(target)
    }

    /// Return to the live view. Returns true if the view was scrolled back.
    pub fn snap_live(&mut self) -> bool {
        self.set_show(self.origin)
    }

    fn set_show(&mut self, target: usize) -> bool {
        let changed = target != self.show;
        self.show = target;
        changed
    }

    pub fn render(&self, start: usize, count: usize) -> impl Iterator<Item = u32> + '_ {
        (start..start + count).map(move |off| self.cells[self.index(off)])
    }

    /// Every retrievable row: the history above the mirror plus the mirror.
    pub fn history(&self) -> Range<usize> {
        self.oldest_show()..self.origin + self.geometry.cells()
    }
}
