use crate::ring::RingBuffer;
use crate::view::push_cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

pub const SAVE_FILE_NAME: &str = "scrollback.txt";

pub trait Persistence {
    fn save(&mut self, contents: &[u8]) -> io::Result<PathBuf>;

    /// Show a saved file to the user. Blocks until they are done with it.
    fn page(&mut self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    pager: String,
}

impl FileStore {
    pub fn new(path: PathBuf, pager: String) -> Self {
        Self { path, pager }
    }
}

impl Persistence for FileStore {
    fn save(&mut self, contents: &[u8]) -> io::Result<PathBuf> {
        fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), bytes = contents.len(), "saved scrollback");
        Ok(self.path.clone())
    }

    fn page(&mut self, path: &Path) -> io::Result<()> {
        let mut words = self.pager.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty pager command"))?;
        let status = Command::new(program).args(words).arg(path).status()?;
        if !status.success() {
            warn!(pager = %self.pager, %status, "pager exited unsuccessfully");
        }
        Ok(())
    }
}

/// The retrievable history as text: one line per row with trailing blanks
/// trimmed. Blank rows before the first and after the last written row are
/// left out.
pub fn render_history(ring: &RingBuffer, single_char: bool) -> Vec<u8> {
    let cols = ring.geometry().cols;
    let history = ring.history();

    let mut lines: Vec<Vec<u8>> = Vec::new();
    for start in history.step_by(cols) {
        let row: Vec<u32> = ring.render(start, cols).collect();
        let used = row
            .iter()
            .rposition(|&cp| cp != b' ' as u32)
            .map_or(0, |last| last + 1);
        let mut line = Vec::with_capacity(used);
        for &cp in &row[..used] {
            push_cell(cp, single_char, &mut line);
        }
        lines.push(line);
    }

    let first = lines.iter().position(|line| !line.is_empty());
    let last = lines.iter().rposition(|line| !line.is_empty());
    let mut out = Vec::new();
    if let (Some(first), Some(last)) = (first, last) {
        for line in &lines[first..=last] {
            out.extend_from_slice(line);
            out.push(b'\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Geometry;
    use tempfile::TempDir;

    fn ring_with(lines: &[&str], rows: usize, cols: usize, capacity: usize) -> RingBuffer {
        let mut ring = RingBuffer::new(capacity, Geometry::new(rows, cols).unwrap()).unwrap();
        let mut row = 0;
        for text in lines {
            for (col, c) in text.chars().enumerate() {
                ring.write(row, col, c as u32);
            }
            row = ring.new_row(row);
        }
        ring
    }

    #[test]
    fn test_render_history_trims_blanks() {
        let ring = ring_with(&["one", "", "two  x", "three"], 3, 8, 64);
        assert_eq!(render_history(&ring, false), b"one\n\ntwo  x\nthree\n".to_vec());
    }

    #[test]
    fn test_render_history_keeps_only_retrievable_rows() {
        // Two rows of history plus a two-row mirror.
        let ring = ring_with(&["a", "b", "c", "d", "e"], 2, 4, 16);
        assert_eq!(render_history(&ring, false), b"c\nd\ne\n".to_vec());
    }

    #[test]
    fn test_render_history_encodes_utf8() {
        let ring = ring_with(&["é↑"], 2, 4, 16);
        assert_eq!(render_history(&ring, false), "é↑\n".as_bytes().to_vec());
    }

    #[test]
    fn test_render_empty_history() {
        let ring = ring_with(&[], 2, 4, 16);
        assert!(render_history(&ring, false).is_empty());
    }

    #[test]
    fn test_file_store_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SAVE_FILE_NAME);
        let mut store = FileStore::new(path.clone(), "true".to_string());
        let saved = store.save(b"hello\n").unwrap();
        assert_eq!(saved, path);
        assert_eq!(fs::read(&path).unwrap(), b"hello\n");
        assert!(store.page(&path).is_ok());
    }

    #[test]
    fn test_file_store_save_to_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join(SAVE_FILE_NAME);
        let mut store = FileStore::new(path, "true".to_string());
        assert!(store.save(b"x").is_err());
    }

    #[test]
    fn test_empty_pager_is_an_error() {
        let mut store = FileStore::new(PathBuf::from("unused"), "  ".to_string());
        assert!(store.page(Path::new("unused")).is_err());
    }
}
