use crate::escape_sequences::ASK_POSITION;
use crate::keymap::ConfiguredKeys;
use crate::mux::{Channels, Readiness};
use crate::persist::Persistence;
use crate::ring::Geometry;
use crate::session::{Session, SessionSettings};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub fn session(rows: usize, cols: usize) -> Session {
    session_with(rows, cols, |_| {})
}

pub fn session_with(rows: usize, cols: usize, adjust: impl FnOnce(&mut SessionSettings)) -> Session {
    let mut settings = SessionSettings::default();
    adjust(&mut settings);
    Session::new(
        Geometry::new(rows, cols).unwrap(),
        settings,
        &ConfiguredKeys::default(),
        Box::new(MemoryStore::default()),
    )
    .unwrap()
}

#[derive(Debug, Default)]
pub struct StoreLog {
    pub saved: Vec<Vec<u8>>,
    pub paged: Vec<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub log: Rc<RefCell<StoreLog>>,
    pub fail: bool,
}

impl Persistence for MemoryStore {
    fn save(&mut self, contents: &[u8]) -> io::Result<PathBuf> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.log.borrow_mut().saved.push(contents.to_vec());
        Ok(PathBuf::from("/tmp/scrollback.txt"))
    }

    fn page(&mut self, path: &Path) -> io::Result<()> {
        self.log.borrow_mut().paged.push(path.to_path_buf());
        Ok(())
    }
}

/// Scripted terminal and shell. Position queries written to the terminal are
/// answered with `reply`, or not at all when it is `None`.
#[derive(Debug, Default)]
pub struct FakeTerminal {
    pub typed: VecDeque<Vec<u8>>,
    pub printed: VecDeque<Vec<u8>>,
    pub reply: Option<Vec<u8>>,
    pub queries: usize,
    pub screen: Vec<u8>,
    pub to_shell: Vec<u8>,
    pub waits: Vec<(bool, Option<Duration>)>,
}

impl FakeTerminal {
    pub fn answering(reply: &[u8]) -> Self {
        Self {
            reply: Some(reply.to_vec()),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn take_screen(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.screen)
    }
}

fn read_chunk(queue: &mut VecDeque<Vec<u8>>, buf: &mut [u8]) -> usize {
    let Some(mut chunk) = queue.pop_front() else {
        return 0;
    };
    if chunk.len() > buf.len() {
        let rest = chunk.split_off(buf.len());
        queue.push_front(rest);
    }
    buf[..chunk.len()].copy_from_slice(&chunk);
    chunk.len()
}

impl Channels for FakeTerminal {
    fn wait(&mut self, shell: bool, timeout: Option<Duration>) -> io::Result<Readiness> {
        self.waits.push((shell, timeout));
        if !self.typed.is_empty() {
            return Ok(Readiness {
                terminal: true,
                shell: shell && !self.printed.is_empty(),
            });
        }
        if shell {
            // An empty script reads as end of file.
            return Ok(Readiness {
                terminal: false,
                shell: true,
            });
        }
        if let Some(timeout) = timeout {
            std::thread::sleep(timeout);
        }
        Ok(Readiness::default())
    }

    fn read_terminal(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_chunk(&mut self.typed, buf))
    }

    fn read_shell(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_chunk(&mut self.printed, buf))
    }

    fn write_terminal(&mut self, data: &[u8]) -> io::Result<()> {
        self.screen.extend_from_slice(data);
        let asked = data
            .windows(ASK_POSITION.len())
            .filter(|w| *w == ASK_POSITION)
            .count();
        self.queries += asked;
        if let Some(reply) = &self.reply {
            for _ in 0..asked {
                self.typed.push_back(reply.clone());
            }
        }
        Ok(())
    }

    fn write_shell(&mut self, data: &[u8]) -> io::Result<()> {
        self.to_shell.extend_from_slice(data);
        Ok(())
    }
}
