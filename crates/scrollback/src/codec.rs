/// Glyph stored in place of a malformed sequence.
pub const REPLACEMENT: u32 = 0xFFFD;

pub const MAX_CODE_POINT: u32 = 0x1F_FFFF;

/// Length of the sequence announced by a lead byte, or `None` for a
/// continuation byte or a byte that never starts a sequence.
pub fn sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC0..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF7 => Some(4),
        _ => None,
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Decode exactly one UTF-8 sequence.
pub fn decode(bytes: &[u8]) -> Option<u32> {
    let (&lead, rest) = bytes.split_first()?;
    if sequence_len(lead)? != bytes.len() || !rest.iter().all(|&b| is_continuation(b)) {
        return None;
    }

    let lead_bits = match bytes.len() {
        1 => return Some(lead as u32),
        2 => lead & 0x1F,
        3 => lead & 0x0F,
        _ => lead & 0x07,
    };
    Some(
        rest.iter()
            .fold(lead_bits as u32, |acc, &b| (acc << 6) | (b & 0x3F) as u32),
    )
}

/// Append the minimal encoding of `cp` to `out`.
///
/// Values above [`MAX_CODE_POINT`] are stored as [`REPLACEMENT`].
pub fn encode(cp: u32, out: &mut Vec<u8>) {
    let cp = if cp > MAX_CODE_POINT { REPLACEMENT } else { cp };
    if cp < 0x80 {
        out.push(cp as u8);
    } else if cp < 0x800 {
        out.push(0xC0 | (cp >> 6) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    } else if cp < 0x1_0000 {
        out.push(0xE0 | (cp >> 12) as u8);
        out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    } else {
        out.push(0xF0 | (cp >> 18) as u8);
        out.push(0x80 | ((cp >> 12) & 0x3F) as u8);
        out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Pending,
    Char(u32),
    /// The bytes seen so far are not valid UTF-8. `resume` is an ASCII byte
    /// that cut a sequence short and still has to be emitted after the
    /// placeholder.
    Invalid { resume: Option<u32> },
}

#[derive(Debug, Default)]
pub struct Utf8Decoder {
    partial: [u8; 4],
    len: usize,
    expected: usize,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_sequence(&self) -> bool {
        self.len > 0
    }

    /// Whether `byte` would continue the character in progress.
    pub fn continues(&self, byte: u8) -> bool {
        self.in_sequence() && is_continuation(byte)
    }

    /// Drop a partial character. Returns true if one was pending.
    pub fn reset(&mut self) -> bool {
        let had_partial = self.in_sequence();
        self.len = 0;
        self.expected = 0;
        had_partial
    }

    pub fn push(&mut self, byte: u8) -> Decoded {
        if self.in_sequence() {
            if is_continuation(byte) {
                self.partial[self.len] = byte;
                self.len += 1;
                if self.len < self.expected {
                    return Decoded::Pending;
                }
                let bytes = self.partial;
                let len = self.len;
                self.reset();
                return match decode(&bytes[..len]) {
                    Some(cp) => Decoded::Char(cp),
                    None => Decoded::Invalid { resume: None },
                };
            }

            // Cut short: the partial character is lost, the new byte starts over.
            self.reset();
            return match self.start(byte) {
                Decoded::Char(cp) => Decoded::Invalid { resume: Some(cp) },
                _ => Decoded::Invalid { resume: None },
            };
        }
        self.start(byte)
    }

    fn start(&mut self, byte: u8) -> Decoded {
        match sequence_len(byte) {
            Some(1) => Decoded::Char(byte as u32),
            Some(n) => {
                self.partial[0] = byte;
                self.len = 1;
                self.expected = n;
                Decoded::Pending
            }
            None => Decoded::Invalid { resume: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(cp: u32) -> Vec<u8> {
        let mut out = Vec::new();
        encode(cp, &mut out);
        out
    }

    fn feed(decoder: &mut Utf8Decoder, bytes: &[u8]) -> Vec<Decoded> {
        bytes.iter().map(|&b| decoder.push(b)).collect()
    }

    #[test]
    fn test_round_trip_every_scalar_value() {
        for cp in (0..=0x10FFFF).filter(|cp| !(0xD800..=0xDFFF).contains(cp)) {
            assert_eq!(decode(&encoded(cp)), Some(cp), "code point {:#x}", cp);
        }
    }

    #[test]
    fn test_encoding_matches_std() {
        for c in ['a', 'é', '€', '日', '𝕳', '\u{7FF}', '\u{FFFF}'] {
            let mut buf = [0u8; 4];
            assert_eq!(encoded(c as u32), c.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[test]
    fn test_minimal_length() {
        assert_eq!(encoded(0x7F).len(), 1);
        assert_eq!(encoded(0x80).len(), 2);
        assert_eq!(encoded(0x7FF).len(), 2);
        assert_eq!(encoded(0x800).len(), 3);
        assert_eq!(encoded(0xFFFF).len(), 3);
        assert_eq!(encoded(0x10000).len(), 4);
        assert_eq!(encoded(MAX_CODE_POINT).len(), 4);
    }

    #[test]
    fn test_flipped_continuation_bits_are_invalid() {
        for cp in [0xE9, 0x20AC, 0x65E5, 0x1D573] {
            let good = encoded(cp);
            for i in 1..good.len() {
                for mask in [0x40u8, 0x80, 0xC0] {
                    let mut bad = good.clone();
                    bad[i] ^= mask;
                    assert_eq!(decode(&bad), None, "{:02x?}", bad);
                }
            }
            // Lead byte turned into a continuation byte.
            let mut bad = good.clone();
            bad[0] = 0x80 | (bad[0] & 0x3F);
            if good.len() > 1 {
                assert_eq!(decode(&bad), None, "{:02x?}", bad);
            }
        }
    }

    #[test]
    fn test_length_mismatch_is_invalid() {
        assert_eq!(decode(&[0xC3]), None);
        assert_eq!(decode(&[0xE2, 0x82]), None);
        assert_eq!(decode(&[0x41, 0x42]), None);
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0xF8, 0x80, 0x80, 0x80]), None);
    }

    #[test]
    fn test_decoder_split_three_byte_char() {
        let mut decoder = Utf8Decoder::new();
        let steps = feed(&mut decoder, "€".as_bytes());
        assert_eq!(
            steps,
            vec![Decoded::Pending, Decoded::Pending, Decoded::Char(0x20AC)]
        );
        assert!(!decoder.in_sequence());
    }

    #[test]
    fn test_decoder_ascii_interrupts_sequence() {
        let mut decoder = Utf8Decoder::new();
        let steps = feed(&mut decoder, &[0xE2, 0x82, b'x']);
        assert_eq!(steps[2], Decoded::Invalid { resume: Some(b'x' as u32) });
        assert_eq!(decoder.push(b'y'), Decoded::Char(b'y' as u32));
    }

    #[test]
    fn test_decoder_lead_interrupts_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(0xE2), Decoded::Pending);
        assert_eq!(decoder.push(0xC3), Decoded::Invalid { resume: None });
        assert_eq!(decoder.push(0xA9), Decoded::Char(0xE9));
    }

    #[test]
    fn test_decoder_orphan_continuation() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(0xA9), Decoded::Invalid { resume: None });
        assert_eq!(decoder.push(b'a'), Decoded::Char(b'a' as u32));
    }

    #[test]
    fn test_decoder_reset_reports_partial() {
        let mut decoder = Utf8Decoder::new();
        assert!(!decoder.reset());
        decoder.push(0xF0);
        assert!(decoder.continues(0x9D));
        assert!(decoder.reset());
        assert!(!decoder.continues(0x9D));
    }
}
