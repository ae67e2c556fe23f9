use crate::cursor::PositionStatus;
use crate::error::{SessionError, Side};
use crate::escape_sequences::{
    ASK_POSITION, OUTPUT_BUFFER_CAPACITY, POSITION_ATTEMPTS, POSITION_TIMEOUT_MS,
    READ_BUFFER_CAPACITY,
};
use crate::session::{Outbox, Session};
use crate::shell_to_terminal::{Flow, ShellToTerminal};
use crate::terminal_to_shell::TerminalToShell;
use std::io;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub terminal: bool,
    pub shell: bool,
}

/// The two byte streams the proxy sits between.
pub trait Channels {
    /// Block until at least one side is readable or `timeout` passes. The
    /// shell is only watched when `shell` is true. A side that hung up
    /// counts as readable.
    fn wait(&mut self, shell: bool, timeout: Option<Duration>) -> io::Result<Readiness>;

    fn read_terminal(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn read_shell(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_terminal(&mut self, data: &[u8]) -> io::Result<()>;

    /// May queue what the shell cannot take yet. The queue drains while
    /// waiting, so this never blocks on a shell that is busy writing.
    fn write_shell(&mut self, data: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// A position query is outstanding.
    ResolvingPosition { attempts_left: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    Closed(Side),
}

pub struct Multiplexer<C> {
    channels: C,
    session: Session,
    shell_side: ShellToTerminal,
    terminal_side: TerminalToShell,
    mode: Mode,
    out: Outbox,
    buf: Vec<u8>,
    /// The shell's last read, processed up to `parked_pos`.
    parked: Vec<u8>,
    parked_pos: usize,
    /// The terminal stayed silent during this read; later bytes of it do not
    /// wait again.
    gave_up: bool,
}

impl<C: Channels> Multiplexer<C> {
    pub fn new(channels: C, session: Session) -> Self {
        Self {
            channels,
            session,
            shell_side: ShellToTerminal::new(),
            terminal_side: TerminalToShell::new(),
            mode: Mode::Normal,
            out: Outbox {
                terminal: Vec::with_capacity(OUTPUT_BUFFER_CAPACITY),
                shell: Vec::with_capacity(READ_BUFFER_CAPACITY),
            },
            buf: vec![0u8; READ_BUFFER_CAPACITY],
            parked: Vec::with_capacity(READ_BUFFER_CAPACITY),
            parked_pos: 0,
            gave_up: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn channels(&self) -> &C {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut C {
        &mut self.channels
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Run until either side closes. Returns the side that did.
    pub fn run(&mut self) -> Result<Side, SessionError> {
        loop {
            if let Progress::Closed(side) = self.step()? {
                debug!(%side, "stream closed");
                return Ok(side);
            }
        }
    }

    pub fn step(&mut self) -> Result<Progress, SessionError> {
        match self.mode {
            Mode::Normal => self.step_normal(),
            Mode::ResolvingPosition { attempts_left } => self.step_resolving(attempts_left),
        }
    }

    /// Settle the cursor position. Unless `already_asked`, a query is sent
    /// first. Blocks for at most a few hundred milliseconds.
    pub fn resolve(&mut self, already_asked: bool) -> Result<PositionStatus, SessionError> {
        if self.session.cursor.is_known() && !already_asked {
            return Ok(PositionStatus::Known);
        }
        self.gave_up = false;
        self.begin_resolution(already_asked)?;
        while self.mode != Mode::Normal {
            if let Progress::Closed(side) = self.step()? {
                debug!(%side, "stream closed while resolving");
                break;
            }
        }
        Ok(self.session.cursor.status())
    }

    fn step_normal(&mut self) -> Result<Progress, SessionError> {
        let ready = self
            .channels
            .wait(true, None)
            .map_err(SessionError::io(Side::Terminal))?;

        if ready.terminal && !self.pump_terminal()? {
            return Ok(Progress::Closed(Side::Terminal));
        }

        if ready.shell {
            let n = match self.channels.read_shell(&mut self.buf) {
                Ok(0) => return Ok(Progress::Closed(Side::Shell)),
                Ok(n) => n,
                Err(e) if retryable(&e) => return Ok(Progress::Running),
                Err(e) => {
                    return Err(SessionError::Io {
                        side: Side::Shell,
                        source: e,
                    });
                }
            };
            trace!(bytes = n, "shell output");
            self.parked.clear();
            self.parked.extend_from_slice(&self.buf[..n]);
            self.parked_pos = 0;
            self.gave_up = false;
            self.process_parked()?;
        }

        Ok(Progress::Running)
    }

    fn step_resolving(&mut self, attempts_left: u8) -> Result<Progress, SessionError> {
        if self.session.cursor.status() != PositionStatus::Unknown {
            self.finish_resolution()?;
            return Ok(Progress::Running);
        }
        if attempts_left == 0 {
            warn!("terminal did not report the cursor position");
            self.gave_up = true;
            self.finish_resolution()?;
            return Ok(Progress::Running);
        }

        self.mode = Mode::ResolvingPosition {
            attempts_left: attempts_left - 1,
        };
        let ready = self
            .channels
            .wait(false, Some(Duration::from_millis(POSITION_TIMEOUT_MS)))
            .map_err(SessionError::io(Side::Terminal))?;
        if ready.terminal && !self.pump_terminal()? {
            return Ok(Progress::Closed(Side::Terminal));
        }
        Ok(Progress::Running)
    }

    /// Read and handle one chunk from the terminal. Returns false at end of
    /// file.
    fn pump_terminal(&mut self) -> Result<bool, SessionError> {
        let n = match self.channels.read_terminal(&mut self.buf) {
            Ok(0) => return Ok(false),
            Ok(n) => n,
            Err(e) if retryable(&e) => return Ok(true),
            Err(e) => {
                return Err(SessionError::Io {
                    side: Side::Terminal,
                    source: e,
                });
            }
        };
        trace!(bytes = n, "terminal input");
        self.terminal_side
            .feed_chunk(&self.buf[..n], &mut self.session, &mut self.out);
        self.flush()?;

        if let Some(path) = self.session.take_pager_request() {
            debug!(path = %path.display(), "opening pager");
            if let Err(e) = self.session.store.page(&path) {
                warn!(error = %e, "pager failed");
                self.session.set_notice(format!("pager failed: {}", e));
            }
            self.session.redraw(&mut self.out.terminal);
            self.flush()?;
        }
        Ok(true)
    }

    fn process_parked(&mut self) -> Result<(), SessionError> {
        while self.parked_pos < self.parked.len() {
            let byte = self.parked[self.parked_pos];
            self.parked_pos += 1;
            let flow = self.shell_side.feed(byte, &mut self.session, &mut self.out);
            if let Flow::Resolve { already_asked } = flow {
                if self.gave_up {
                    self.shell_side.resume(&mut self.session, &mut self.out);
                    continue;
                }
                return self.begin_resolution(already_asked);
            }
        }
        self.flush()
    }

    fn begin_resolution(&mut self, already_asked: bool) -> Result<(), SessionError> {
        if !already_asked {
            self.out.terminal.extend_from_slice(ASK_POSITION);
        }
        self.session.cursor.invalidate();
        self.flush()?;
        trace!(already_asked, "waiting for cursor position");
        self.mode = Mode::ResolvingPosition {
            attempts_left: POSITION_ATTEMPTS,
        };
        Ok(())
    }

    fn finish_resolution(&mut self) -> Result<(), SessionError> {
        self.mode = Mode::Normal;
        self.shell_side
            .resume(&mut self.session, &mut self.out);
        self.process_parked()
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        if !self.out.terminal.is_empty() {
            self.channels
                .write_terminal(&self.out.terminal)
                .map_err(SessionError::io(Side::Terminal))?;
            self.out.terminal.clear();
        }
        if !self.out.shell.is_empty() {
            self.channels
                .write_shell(&self.out.shell)
                .map_err(SessionError::io(Side::Shell))?;
            self.out.shell.clear();
        }
        Ok(())
    }
}

fn retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
