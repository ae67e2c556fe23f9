use crate::escape::{ESC, EscapeAccumulator, Push, Sequence};
use crate::escape_sequences::SAVE_CURSOR;
use crate::keymap::Action;
use crate::persist;
use crate::session::{Outbox, Session};
use memchr::memchr;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
pub struct TerminalToShell {
    escape: EscapeAccumulator,
}

impl TerminalToShell {
    pub fn new() -> Self {
        Self {
            escape: EscapeAccumulator::new(),
        }
    }

    pub fn feed_chunk(&mut self, data: &[u8], session: &mut Session, out: &mut Outbox) {
        let mut pos = 0;
        while pos < data.len() {
            if !self.escape.is_active() {
                match memchr(ESC, &data[pos..]) {
                    Some(skip) => {
                        out.shell.extend_from_slice(&data[pos..pos + skip]);
                        pos += skip;
                    }
                    None => {
                        out.shell.extend_from_slice(&data[pos..]);
                        return;
                    }
                }
            }
            let more = pos + 1 < data.len();
            self.feed(data[pos], more, session, out);
            pos += 1;
        }
    }

    /// Handle one byte. `more` says whether the same read has bytes after it;
    /// an ESC that ends a read is a lone Escape key press.
    pub fn feed(&mut self, byte: u8, more: bool, session: &mut Session, out: &mut Outbox) {
        if self.escape.in_string() {
            out.shell.push(byte);
            self.escape.push(byte);
            if !self.escape.in_string() {
                // Finished, or cut short by a new sequence whose start is
                // already forwarded.
                self.escape.abort();
            }
            return;
        }

        if byte == ESC {
            if self.escape.is_active() {
                out.shell.extend_from_slice(self.escape.bytes());
                self.escape.abort();
            }
            if more {
                self.escape.start();
            } else {
                out.shell.push(byte);
            }
            return;
        }

        if !self.escape.is_active() {
            out.shell.push(byte);
            return;
        }

        match self.escape.push(byte) {
            Push::Pending if self.escape.in_string() => {
                out.shell.extend_from_slice(self.escape.bytes());
            }
            Push::Pending | Push::Restarted => {}
            Push::Complete(sequence) => self.dispatch(sequence, session, out),
            Push::Interrupted | Push::Overflow => {
                out.shell.extend_from_slice(self.escape.bytes());
                out.shell.push(byte);
                self.escape.abort();
            }
        }
    }

    fn dispatch(&mut self, sequence: Sequence, session: &mut Session, out: &mut Outbox) {
        let bytes = self.escape.bytes();

        if let Some(action) = session.keys.action_for(bytes)
            && perform(action, session, out)
        {
            return;
        }

        if let Sequence::PositionReport { row, col } = sequence
            && session.cursor.on_position_report(row, col)
        {
            debug!(row, col, status = ?session.cursor.status(), "terminal reported cursor position");
            return;
        }

        trace!(?sequence, "forwarding terminal sequence");
        out.shell.extend_from_slice(bytes);
    }
}

/// Carry out a scrollback key. Returns false when the key means nothing in
/// the current view and should reach the shell instead.
fn perform(action: Action, session: &mut Session, out: &mut Outbox) -> bool {
    let lines = session.scroll_lines();
    match action {
        Action::ScrollUp => {
            let was_live = session.ring.is_live();
            if session.ring.scroll_up(lines) {
                if was_live {
                    out.terminal.extend_from_slice(SAVE_CURSOR);
                }
                debug!(lines_below = session.ring.lines_below(), "scrolled up");
                session.redraw(&mut out.terminal);
            }
        }
        Action::ScrollDown => {
            if session.ring.scroll_down(lines) {
                debug!(lines_below = session.ring.lines_below(), "scrolled down");
                session.redraw(&mut out.terminal);
            }
        }
        Action::Save | Action::Pager => {
            if session.ring.is_live() {
                return false;
            }
            let contents = persist::render_history(&session.ring, session.single_char());
            match session.store.save(&contents) {
                Ok(path) if action == Action::Pager => session.request_pager(path),
                Ok(path) => {
                    session.set_notice(format!("saved to {}", path.display()));
                    session.redraw(&mut out.terminal);
                }
                Err(e) => {
                    warn!(error = %e, "failed to save scrollback");
                    session.set_notice(format!("save failed: {}", e));
                    session.redraw(&mut out.terminal);
                }
            }
        }
    }
    true
}
