pub const ESC: u8 = 0x1B;
pub const BEL: u8 = 0x07;

/// Sequences longer than this are abandoned.
pub const MAX_SEQUENCE_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    EraseDisplay,
    EraseBelow,
    QueryPosition,
    /// `CSI row ; col H` or `f`, 1-based.
    CursorMove { row: usize, col: usize },
    /// `CSI row ; col R`, 1-based.
    PositionReport { row: usize, col: usize },
    Csi { final_byte: u8 },
    Escape { final_byte: u8 },
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Pending,
    Complete(Sequence),
    /// The sequence grew past [`MAX_SEQUENCE_LEN`] and was dropped.
    Overflow,
    /// A C0 control byte cut the sequence short. The byte was not consumed.
    Interrupted,
    /// An ESC abandoned the sequence and started a new one.
    Restarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Idle,
    Escape,       // Saw ESC
    Intermediate, // Saw ESC followed by 0x20-0x2F or O
    Csi,          // Saw ESC [
    Str,          // Inside a string sequence
    StrEscape,    // Saw ESC inside a string, looking for \
}

#[derive(Debug, Default)]
pub struct EscapeAccumulator {
    state: State,
    bytes: Vec<u8>,
}

impl EscapeAccumulator {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            bytes: Vec::with_capacity(MAX_SEQUENCE_LEN),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != State::Idle
    }

    /// Inside an OSC, DCS or similar string, including a possible ST.
    pub fn in_string(&self) -> bool {
        matches!(self.state, State::Str | State::StrEscape)
    }

    pub fn start(&mut self) {
        self.bytes.clear();
        self.bytes.push(ESC);
        self.state = State::Escape;
    }

    pub fn abort(&mut self) {
        self.bytes.clear();
        self.state = State::Idle;
    }

    /// Bytes of the sequence in progress, or of the one that just ended.
    /// String payloads are not kept, and neither is a byte that interrupted
    /// or overflowed the sequence.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn push(&mut self, byte: u8) -> Push {
        match self.state {
            State::Idle => {
                if byte == ESC {
                    self.start();
                    Push::Pending
                } else {
                    Push::Interrupted
                }
            }

            State::Str => {
                match byte {
                    BEL => return self.finish(Sequence::String),
                    ESC => self.state = State::StrEscape,
                    _ => {}
                }
                Push::Pending
            }

            State::StrEscape => {
                if byte == b'\\' {
                    return self.finish(Sequence::String);
                }
                // Not ST: the string ended and ESC began a new sequence.
                self.start();
                match self.push(byte) {
                    Push::Pending => Push::Restarted,
                    other => other,
                }
            }

            _ if byte == ESC => {
                self.start();
                Push::Restarted
            }
            _ if byte < 0x20 => {
                self.state = State::Idle;
                Push::Interrupted
            }
            _ if self.bytes.len() >= MAX_SEQUENCE_LEN => {
                self.state = State::Idle;
                Push::Overflow
            }

            State::Escape => {
                self.bytes.push(byte);
                match byte {
                    b'[' => self.state = State::Csi,
                    b']' | b'P' | b'X' | b'^' | b'_' => self.state = State::Str,
                    // SS3 carries one more byte, like an intermediate.
                    b'O' | 0x20..=0x2F => self.state = State::Intermediate,
                    _ => return self.finish(Sequence::Escape { final_byte: byte }),
                }
                Push::Pending
            }

            State::Intermediate => {
                self.bytes.push(byte);
                match byte {
                    0x30..=0x7E => self.finish(Sequence::Escape { final_byte: byte }),
                    _ => Push::Pending,
                }
            }

            State::Csi => {
                self.bytes.push(byte);
                match byte {
                    0x40..=0x7E => {
                        let sequence = classify_csi(&self.bytes);
                        self.finish(sequence)
                    }
                    _ => Push::Pending,
                }
            }
        }
    }

    fn finish(&mut self, sequence: Sequence) -> Push {
        self.state = State::Idle;
        Push::Complete(sequence)
    }
}

pub fn classify_csi(bytes: &[u8]) -> Sequence {
    let Some((&final_byte, rest)) = bytes.split_last() else {
        return Sequence::Csi { final_byte: 0 };
    };
    let other = Sequence::Csi { final_byte };
    let Some(body) = rest.strip_prefix(&[ESC, b'['][..]) else {
        return other;
    };
    // Private markers and intermediates mean some other command.
    if body.iter().any(|b| !matches!(b, b'0'..=b'9' | b';')) {
        return other;
    }
    let Some(params) = parse_params(body) else {
        return other;
    };

    match (final_byte, params.as_slice()) {
        (b'J', [] | [Some(0)] | [None]) => Sequence::EraseBelow,
        (b'J', [Some(2)]) => Sequence::EraseDisplay,
        (b'n', [Some(6)]) => Sequence::QueryPosition,
        (b'H' | b'f', _) if params.len() <= 2 => Sequence::CursorMove {
            row: param_or_one(params.first()),
            col: param_or_one(params.get(1)),
        },
        (b'R', [Some(row), Some(col)]) => Sequence::PositionReport {
            row: *row,
            col: *col,
        },
        _ => other,
    }
}

/// `;`-separated decimal parameters; empty parameters are `None`.
fn parse_params(body: &[u8]) -> Option<Vec<Option<usize>>> {
    if body.is_empty() {
        return Some(Vec::new());
    }
    body.split(|&b| b == b';')
        .map(|param| {
            if param.is_empty() {
                return Some(None);
            }
            param
                .iter()
                .try_fold(0usize, |acc, &b| {
                    acc.checked_mul(10)?.checked_add((b - b'0') as usize)
                })
                .map(Some)
        })
        .collect()
}

fn param_or_one(param: Option<&Option<usize>>) -> usize {
    match param {
        Some(Some(n)) if *n > 0 => *n,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(acc: &mut EscapeAccumulator, input: &[u8]) -> Vec<Push> {
        input.iter().map(|&b| acc.push(b)).collect()
    }

    fn complete(input: &[u8]) -> Sequence {
        let mut acc = EscapeAccumulator::new();
        match run(&mut acc, input).last() {
            Some(Push::Complete(sequence)) => *sequence,
            other => panic!("expected complete sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_erase_display() {
        assert_eq!(complete(b"\x1b[2J"), Sequence::EraseDisplay);
    }

    #[test]
    fn test_erase_below() {
        assert_eq!(complete(b"\x1b[J"), Sequence::EraseBelow);
        assert_eq!(complete(b"\x1b[0J"), Sequence::EraseBelow);
        assert_eq!(complete(b"\x1b[1J"), Sequence::Csi { final_byte: b'J' });
    }

    #[test]
    fn test_query_position() {
        assert_eq!(complete(b"\x1b[6n"), Sequence::QueryPosition);
        assert_eq!(complete(b"\x1b[5n"), Sequence::Csi { final_byte: b'n' });
        assert_eq!(complete(b"\x1b[?6n"), Sequence::Csi { final_byte: b'n' });
    }

    #[test]
    fn test_cursor_move_defaults() {
        assert_eq!(complete(b"\x1b[H"), Sequence::CursorMove { row: 1, col: 1 });
        assert_eq!(
            complete(b"\x1b[12;40H"),
            Sequence::CursorMove { row: 12, col: 40 }
        );
        assert_eq!(complete(b"\x1b[7H"), Sequence::CursorMove { row: 7, col: 1 });
        assert_eq!(complete(b"\x1b[;5f"), Sequence::CursorMove { row: 1, col: 5 });
        assert_eq!(complete(b"\x1b[1;2;3H"), Sequence::Csi { final_byte: b'H' });
    }

    #[test]
    fn test_position_report() {
        assert_eq!(
            complete(b"\x1b[5;10R"),
            Sequence::PositionReport { row: 5, col: 10 }
        );
        assert_eq!(complete(b"\x1b[5R"), Sequence::Csi { final_byte: b'R' });
    }

    #[test]
    fn test_other_csi_keeps_final_byte() {
        assert_eq!(complete(b"\x1b[1;31m"), Sequence::Csi { final_byte: b'm' });
        assert_eq!(complete(b"\x1b[?25l"), Sequence::Csi { final_byte: b'l' });
        assert_eq!(complete(b"\x1b[23~"), Sequence::Csi { final_byte: b'~' });
    }

    #[test]
    fn test_two_byte_escape() {
        assert_eq!(complete(b"\x1b7"), Sequence::Escape { final_byte: b'7' });
        assert_eq!(complete(b"\x1bM"), Sequence::Escape { final_byte: b'M' });
        assert_eq!(complete(b"\x1b(B"), Sequence::Escape { final_byte: b'B' });
        assert_eq!(complete(b"\x1bOP"), Sequence::Escape { final_byte: b'P' });
    }

    #[test]
    fn test_osc_terminated_by_bel_and_st() {
        assert_eq!(complete(b"\x1b]0;a rather long window title\x07"), Sequence::String);
        assert_eq!(complete(b"\x1b]2;title\x1b\\"), Sequence::String);
    }

    #[test]
    fn test_long_osc_does_not_overflow() {
        let mut input = b"\x1b]0;".to_vec();
        input.extend(std::iter::repeat_n(b'x', 200));
        input.push(BEL);
        assert_eq!(complete(&input), Sequence::String);
    }

    #[test]
    fn test_overflow() {
        let mut acc = EscapeAccumulator::new();
        let mut input = b"\x1b[".to_vec();
        // ESC and [ plus these fill the accumulator; one more byte overflows.
        input.extend(std::iter::repeat_n(b';', MAX_SEQUENCE_LEN - 1));
        let results = run(&mut acc, &input);
        assert_eq!(results.last(), Some(&Push::Overflow));
        assert_eq!(
            results.iter().filter(|r| **r == Push::Overflow).count(),
            1
        );
        assert!(!acc.is_active());
    }

    #[test]
    fn test_control_interrupts() {
        let mut acc = EscapeAccumulator::new();
        run(&mut acc, b"\x1b[1");
        assert_eq!(acc.push(b'\r'), Push::Interrupted);
        assert!(!acc.is_active());
        assert_eq!(acc.bytes(), b"\x1b[1");
    }

    #[test]
    fn test_escape_restarts() {
        let mut acc = EscapeAccumulator::new();
        run(&mut acc, b"\x1b[12");
        assert_eq!(acc.push(ESC), Push::Restarted);
        assert_eq!(acc.bytes(), &[ESC]);
        let results = run(&mut acc, b"[6n");
        assert_eq!(results.last(), Some(&Push::Complete(Sequence::QueryPosition)));
    }

    #[test]
    fn test_escape_after_string_starts_new_sequence() {
        let mut acc = EscapeAccumulator::new();
        run(&mut acc, b"\x1b]0;title");
        assert!(acc.in_string());
        assert_eq!(acc.push(ESC), Push::Pending);
        assert!(acc.in_string());
        assert_eq!(acc.push(b'['), Push::Restarted);
        let results = run(&mut acc, b"2J");
        assert_eq!(results.last(), Some(&Push::Complete(Sequence::EraseDisplay)));
    }

    #[test]
    fn test_bytes_kept_after_completion() {
        let mut acc = EscapeAccumulator::new();
        run(&mut acc, b"\x1b[24~");
        assert!(!acc.is_active());
        assert_eq!(acc.bytes(), b"\x1b[24~");
    }

    #[test]
    fn test_huge_parameter_is_not_a_move() {
        assert_eq!(
            complete(b"\x1b[99999999999999999999999;1H"),
            Sequence::Csi { final_byte: b'H' }
        );
    }
}
