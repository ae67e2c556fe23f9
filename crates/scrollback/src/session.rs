use crate::cursor::CursorTracker;
use crate::error::SessionError;
use crate::keymap::{KeyMapper, KeyTable};
use crate::persist::Persistence;
use crate::ring::{Geometry, RingBuffer};
use crate::view;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_BUFFER_CELLS: usize = 8192;
pub const DEFAULT_POSITION_PRESERVING: &str = "mK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub buffer_cells: usize,
    /// Rows moved per scroll key. Half the screen when unset.
    pub scroll_lines: Option<usize>,
    pub single_char: bool,
    /// CSI final bytes known not to move the cursor.
    pub position_preserving: Vec<u8>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            buffer_cells: DEFAULT_BUFFER_CELLS,
            scroll_lines: None,
            single_char: false,
            position_preserving: DEFAULT_POSITION_PRESERVING.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    pub terminal: Vec<u8>,
    pub shell: Vec<u8>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.terminal.is_empty() && self.shell.is_empty()
    }
}

pub struct Session {
    pub ring: RingBuffer,
    pub cursor: CursorTracker,
    pub keys: KeyTable,
    pub store: Box<dyn Persistence>,
    scroll_lines: usize,
    single_char: bool,
    position_preserving: Vec<u8>,
    pager_request: Option<PathBuf>,
    notice: Option<String>,
}

impl Session {
    pub fn new(
        geometry: Geometry,
        settings: SessionSettings,
        keys: &dyn KeyMapper,
        store: Box<dyn Persistence>,
    ) -> Result<Self, SessionError> {
        let ring = RingBuffer::new(settings.buffer_cells, geometry)?;
        let scroll_lines = settings
            .scroll_lines
            .unwrap_or(geometry.rows / 2)
            .max(1);
        debug!(
            rows = geometry.rows,
            cols = geometry.cols,
            cells = settings.buffer_cells,
            history_rows = ring.history_rows(),
            scroll_lines,
            "session created"
        );
        Ok(Self {
            ring,
            cursor: CursorTracker::new(geometry),
            keys: KeyTable::from_mapper(keys),
            store,
            scroll_lines,
            single_char: settings.single_char,
            position_preserving: settings.position_preserving,
            pager_request: None,
            notice: None,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.ring.geometry()
    }

    pub fn scroll_lines(&self) -> usize {
        self.scroll_lines
    }

    pub fn single_char(&self) -> bool {
        self.single_char
    }

    pub fn preserves_position(&self, final_byte: u8) -> bool {
        self.position_preserving.contains(&final_byte)
    }

    /// Line feed: move the cursor down, scrolling the mirror at the bottom.
    pub fn new_row(&mut self) {
        let row = self.ring.new_row(self.cursor.row());
        self.cursor.set_row(row);
    }

    /// Repaint the screen. A pending notice is shown once.
    pub fn redraw(&mut self, out: &mut Vec<u8>) {
        let notice = self.notice.take();
        view::redraw(&self.ring, self.single_char, notice.as_deref(), out);
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn request_pager(&mut self, path: PathBuf) {
        self.pager_request = Some(path);
    }

    pub fn take_pager_request(&mut self) -> Option<PathBuf> {
        self.pager_request.take()
    }
}
