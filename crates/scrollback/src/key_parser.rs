use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError {
    pub raw: String,
    pub reason: String,
}

impl ParseKeyError {
    pub fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse {:?} as key: {}", self.raw, self.reason)
    }
}

impl std::error::Error for ParseKeyError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    /// xterm modifier parameter: 1 + shift + 2*alt + 4*ctrl, 0 when unmodified.
    fn code(&self) -> u8 {
        if !(self.ctrl || self.shift || self.alt) {
            return 0;
        }
        1 + self.shift as u8 + (self.alt as u8 * 2) + (self.ctrl as u8 * 4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    F(u8),
    Esc,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombination {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyCombination {
    pub fn to_escape_sequence(&self) -> Vec<u8> {
        key_to_escape_sequence(&self.code, &self.modifiers)
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            write!(f, "[ctrl]")?;
        }
        if self.modifiers.shift {
            write!(f, "[shift]")?;
        }
        if self.modifiers.alt {
            write!(f, "[alt]")?;
        }
        match &self.code {
            KeyCode::Char(c) => write!(f, "[{}]", c),
            KeyCode::F(n) => write!(f, "[f{}]", n),
            KeyCode::Esc => write!(f, "[esc]"),
            KeyCode::Insert => write!(f, "[insert]"),
            KeyCode::Delete => write!(f, "[delete]"),
            KeyCode::Home => write!(f, "[home]"),
            KeyCode::End => write!(f, "[end]"),
            KeyCode::PageUp => write!(f, "[pageup]"),
            KeyCode::PageDown => write!(f, "[pagedown]"),
            KeyCode::Up => write!(f, "[up]"),
            KeyCode::Down => write!(f, "[down]"),
            KeyCode::Left => write!(f, "[left]"),
            KeyCode::Right => write!(f, "[right]"),
        }
    }
}

/// Bytes sent by a binding, in either notation.
pub fn parse_binding(raw: &str) -> Result<Vec<u8>, ParseKeyError> {
    if raw.starts_with('\\') || raw.starts_with('^') {
        parse_literal(raw)
    } else {
        parse(raw).map(|key| key.to_escape_sequence())
    }
}

/// `\e`, `\033`, `\x1b` and `^[` all stand for ESC; other characters are
/// taken as they are.
fn parse_literal(raw: &str) -> Result<Vec<u8>, ParseKeyError> {
    let mut out = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let (bytes, len): (&[u8], usize) = if rest.starts_with("\\e") {
            (b"\x1b", 2)
        } else if rest.starts_with("\\033") {
            (b"\x1b", 4)
        } else if rest.to_ascii_lowercase().starts_with("\\x1b") {
            (b"\x1b", 4)
        } else if rest.starts_with("^[") {
            (b"\x1b", 2)
        } else if rest.starts_with('\\') {
            return Err(ParseKeyError::new(raw, "unknown backslash escape"));
        } else {
            let c = rest.chars().next().unwrap_or(' ');
            out.extend_from_slice(c.encode_utf8(&mut [0u8; 4]).as_bytes());
            rest = &rest[c.len_utf8()..];
            continue;
        };
        out.extend_from_slice(bytes);
        rest = &rest[len..];
    }
    if out.is_empty() {
        return Err(ParseKeyError::new(raw, "empty sequence"));
    }
    Ok(out)
}

pub fn parse(raw: &str) -> Result<KeyCombination, ParseKeyError> {
    let lower = raw.to_ascii_lowercase();
    let mut modifiers = Modifiers::default();
    let mut key_code: Option<KeyCode> = None;
    let mut rest = lower.as_str();

    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return Err(ParseKeyError::new(
                raw,
                format!("expected '[' at position {}", lower.len() - rest.len()),
            ));
        };
        // `[]]` names the bracket key itself.
        let end = if inner.starts_with(']') {
            inner[1..].find(']').map(|i| i + 1)
        } else {
            inner.find(']')
        };
        let Some(end) = end else {
            return Err(ParseKeyError::new(raw, "unclosed bracket"));
        };
        let token = &inner[..end];
        rest = &inner[end + 1..];

        match token {
            "ctrl" | "control" => modifiers.ctrl = true,
            "shift" => modifiers.shift = true,
            "alt" | "meta" => modifiers.alt = true,
            _ => {
                if key_code.is_some() {
                    return Err(ParseKeyError::new(raw, "multiple key codes specified"));
                }
                key_code = Some(parse_key_code(token, raw)?);
            }
        }
    }

    match key_code {
        Some(code) => Ok(KeyCombination { code, modifiers }),
        None => Err(ParseKeyError::new(raw, "no key code specified")),
    }
}

fn parse_key_code(token: &str, raw: &str) -> Result<KeyCode, ParseKeyError> {
    let code = match token {
        "esc" | "escape" => KeyCode::Esc,
        "insert" | "ins" => KeyCode::Insert,
        "delete" | "del" => KeyCode::Delete,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" | "pgdown" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        f if f.starts_with('f') && f.len() > 1 => match f[1..].parse::<u8>() {
            Ok(n @ 1..=12) => KeyCode::F(n),
            _ => return Err(ParseKeyError::new(raw, format!("unknown key: {}", token))),
        },
        s if s.chars().count() == 1 => KeyCode::Char(s.chars().next().unwrap_or(' ')),
        _ => return Err(ParseKeyError::new(raw, format!("unknown key: {}", token))),
    };
    Ok(code)
}

fn key_to_escape_sequence(code: &KeyCode, modifiers: &Modifiers) -> Vec<u8> {
    let modifier = modifiers.code();

    match code {
        KeyCode::Insert => tilde_key(2, modifier),
        KeyCode::Delete => tilde_key(3, modifier),
        KeyCode::PageUp => tilde_key(5, modifier),
        KeyCode::PageDown => tilde_key(6, modifier),
        KeyCode::Home => letter_key(b'H', modifier),
        KeyCode::End => letter_key(b'F', modifier),
        KeyCode::Up => letter_key(b'A', modifier),
        KeyCode::Down => letter_key(b'B', modifier),
        KeyCode::Right => letter_key(b'C', modifier),
        KeyCode::Left => letter_key(b'D', modifier),
        KeyCode::F(n) => function_key(*n, modifier),
        KeyCode::Esc => b"\x1b".to_vec(),
        KeyCode::Char(c) => char_sequence(*c, modifiers),
    }
}

/// Alt prefixes ESC; ctrl maps letters onto C0 controls.
fn char_sequence(c: char, modifiers: &Modifiers) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    if modifiers.alt {
        out.push(0x1b);
    }
    let byte = match c {
        'a'..='z' if modifiers.ctrl => c as u8 - b'a' + 1,
        '[' if modifiers.ctrl => 0x1b,
        '\\' if modifiers.ctrl => 0x1c,
        ']' if modifiers.ctrl => 0x1d,
        '^' | '6' if modifiers.ctrl => 0x1e,
        '_' | '7' if modifiers.ctrl => 0x1f,
        c if modifiers.shift => c.to_ascii_uppercase() as u8,
        c => c as u8,
    };
    out.push(byte);
    out
}

fn tilde_key(number: u8, modifier: u8) -> Vec<u8> {
    if modifier == 0 {
        format!("\x1b[{}~", number).into_bytes()
    } else {
        format!("\x1b[{};{}~", number, modifier).into_bytes()
    }
}

fn letter_key(letter: u8, modifier: u8) -> Vec<u8> {
    if modifier == 0 {
        vec![0x1b, b'[', letter]
    } else {
        format!("\x1b[1;{}{}", modifier, letter as char).into_bytes()
    }
}

fn function_key(n: u8, modifier: u8) -> Vec<u8> {
    let number = match n {
        1..=5 => 10 + n,
        6..=10 => 11 + n,
        11 | 12 => 12 + n,
        _ => 24,
    };
    tilde_key(number, modifier)
}
