use crate::codec::{Decoded, REPLACEMENT, Utf8Decoder};
use crate::escape::{ESC, EscapeAccumulator, Push, Sequence};
use crate::session::{Outbox, Session};
use tracing::{debug, trace};

const BS: u8 = 0x08;
const LF: u8 = 0x0A;
const FF: u8 = 0x0C;
const CR: u8 = 0x0D;
const DEL: u8 = 0x7F;
const BLANK: u32 = b' ' as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The cursor position has to be resolved before the byte is finished.
    /// `already_asked` means the query went out with the shell's own bytes.
    Resolve { already_asked: bool },
}

/// Work held back until the cursor position is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Print(u8),
    EraseBelow,
    AnswerQuery,
}

#[derive(Debug, Default)]
pub struct ShellToTerminal {
    escape: EscapeAccumulator,
    utf8: Utf8Decoder,
    deferred: Option<Deferred>,
}

impl ShellToTerminal {
    pub fn new() -> Self {
        Self {
            escape: EscapeAccumulator::new(),
            utf8: Utf8Decoder::new(),
            deferred: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn feed(&mut self, byte: u8, session: &mut Session, out: &mut Outbox) -> Flow {
        // Anything from the shell brings the view back to the live screen.
        if session.ring.snap_live() {
            debug!("shell output ended scrollback view");
            session.redraw(&mut out.terminal);
        }

        if self.escape.is_active() {
            out.terminal.push(byte);
            return self.continue_sequence(byte, session, out);
        }

        match byte {
            ESC => {
                out.terminal.push(byte);
                self.flush_partial(session);
                self.escape.start();
                Flow::Continue
            }
            BS | LF | FF | CR | DEL => self.defer(Deferred::Print(byte), session, out),
            0x00..=0x1F => {
                out.terminal.push(byte);
                self.flush_partial(session);
                session.cursor.invalidate();
                trace!(byte, "untracked control byte");
                Flow::Continue
            }
            // The position of a multi-byte character was settled at its lead byte.
            _ if self.utf8.continues(byte) => {
                self.complete(Deferred::Print(byte), session, out);
                Flow::Continue
            }
            _ => self.defer(Deferred::Print(byte), session, out),
        }
    }

    /// Finish the parked work once the position is as good as it gets.
    pub fn resume(&mut self, session: &mut Session, out: &mut Outbox) {
        if let Some(deferred) = self.deferred.take() {
            self.complete(deferred, session, out);
        }
    }

    fn continue_sequence(&mut self, byte: u8, session: &mut Session, out: &mut Outbox) -> Flow {
        match self.escape.push(byte) {
            Push::Pending => Flow::Continue,
            Push::Complete(sequence) => self.apply(sequence, session, out),
            Push::Restarted => {
                session.cursor.invalidate();
                Flow::Continue
            }
            Push::Interrupted => {
                debug!(sequence = ?self.escape.bytes(), byte, "escape sequence cut short");
                self.escape.abort();
                // The terminal still acts on the control byte.
                if matches!(byte, BS | LF | CR | FF) {
                    self.track(byte, session);
                }
                session.cursor.invalidate();
                Flow::Continue
            }
            Push::Overflow => {
                debug!(sequence = ?self.escape.bytes(), byte, "escape sequence too long");
                self.escape.abort();
                session.cursor.invalidate();
                Flow::Continue
            }
        }
    }

    fn apply(&mut self, sequence: Sequence, session: &mut Session, out: &mut Outbox) -> Flow {
        trace!(?sequence, "shell sequence");
        match sequence {
            Sequence::EraseDisplay => {
                let cols = session.geometry().cols;
                session.ring.erase(0, 0, cols);
                Flow::Continue
            }
            Sequence::EraseBelow => self.defer(Deferred::EraseBelow, session, out),
            Sequence::QueryPosition => {
                // The query already reached the terminal; its answer is ours.
                session.cursor.invalidate();
                self.deferred = Some(Deferred::AnswerQuery);
                Flow::Resolve {
                    already_asked: true,
                }
            }
            Sequence::CursorMove { row, col } => {
                if !session.cursor.adopt_move(row, col) {
                    debug!(row, col, "cursor moved off screen");
                }
                Flow::Continue
            }
            Sequence::Csi { final_byte } if session.preserves_position(final_byte) => {
                Flow::Continue
            }
            Sequence::String => Flow::Continue,
            _ => {
                session.cursor.invalidate();
                Flow::Continue
            }
        }
    }

    fn defer(&mut self, deferred: Deferred, session: &mut Session, out: &mut Outbox) -> Flow {
        if session.cursor.needs_resolution() {
            self.deferred = Some(deferred);
            return Flow::Resolve {
                already_asked: false,
            };
        }
        self.complete(deferred, session, out);
        Flow::Continue
    }

    fn complete(&mut self, deferred: Deferred, session: &mut Session, out: &mut Outbox) {
        match deferred {
            Deferred::Print(byte) => {
                out.terminal.push(byte);
                self.track(byte, session);
            }
            Deferred::EraseBelow => {
                let (row, col) = session.cursor.position();
                let cols = session.geometry().cols;
                session.ring.erase(row, col, cols);
            }
            Deferred::AnswerQuery => {
                let (row, col) = session.cursor.report();
                debug!(row, col, status = ?session.cursor.status(), "answering shell position query");
                out.shell
                    .extend_from_slice(format!("\x1b[{};{}R", row, col).as_bytes());
            }
        }
    }

    fn track(&mut self, byte: u8, session: &mut Session) {
        match byte {
            BS | DEL => {
                self.flush_partial(session);
                if let Some(col) = session.cursor.backspace() {
                    session.ring.write(session.cursor.row(), col, BLANK);
                }
            }
            LF => {
                self.flush_partial(session);
                session.new_row();
            }
            CR | FF => {
                self.flush_partial(session);
                session.cursor.carriage_return();
            }
            _ if session.single_char() => put(byte as u32, session),
            _ => match self.utf8.push(byte) {
                Decoded::Pending => {}
                Decoded::Char(cp) => put(cp, session),
                Decoded::Invalid { resume } => {
                    put(REPLACEMENT, session);
                    if let Some(cp) = resume {
                        put(cp, session);
                    }
                }
            },
        }
    }

    /// A control byte cut a multi-byte character short.
    fn flush_partial(&mut self, session: &mut Session) {
        if self.utf8.reset() {
            put(REPLACEMENT, session);
        }
    }
}

fn put(cp: u32, session: &mut Session) {
    let (col, wrap) = session.cursor.place();
    if wrap {
        session.new_row();
    }
    session.ring.write(session.cursor.row(), col, cp);
}
