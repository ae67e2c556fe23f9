use crate::escape::ESC;
use crate::key_parser;
use memchr::memchr;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use tracing::{debug, warn};

// Console keymap ioctls and table layout, from linux/kd.h and linux/keyboard.h.
const KDGKBENT: u32 = 0x4B46;
const KDGKBSENT: u32 = 0x4B48;
const K_SHIFTTAB: u8 = 0x01;
const KT_FN: u16 = 1;
const KEYCODE_PAGE_UP: u8 = 104;
const KEYCODE_PAGE_DOWN: u8 = 109;

#[repr(C)]
struct KbEntry {
    kb_table: u8,
    kb_index: u8,
    kb_value: u16,
}

#[repr(C)]
struct KbsEntry {
    kb_func: u8,
    kb_string: [u8; 512],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ScrollUp,
    ScrollDown,
    Save,
    Pager,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::ScrollUp,
        Action::ScrollDown,
        Action::Save,
        Action::Pager,
    ];

    pub fn default_key(self) -> &'static str {
        match self {
            Action::ScrollUp => "[f11]",
            Action::ScrollDown => "[f12]",
            Action::Save => "[f9]",
            Action::Pager => "[f10]",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ScrollUp => "scroll up",
            Action::ScrollDown => "scroll down",
            Action::Save => "save",
            Action::Pager => "pager",
        };
        write!(f, "{}", name)
    }
}

pub trait KeyMapper {
    fn lookup(&self, action: Action) -> Vec<u8>;
}

/// Bindings such as `[f11]`, `[shift][pageup]` or `\e[11~`, resolved once.
#[derive(Debug, Clone)]
pub struct ConfiguredKeys {
    scroll_up: Vec<u8>,
    scroll_down: Vec<u8>,
    save: Vec<u8>,
    pager: Vec<u8>,
}

impl ConfiguredKeys {
    pub fn new(scroll_up: &str, scroll_down: &str, save: &str, pager: &str) -> Self {
        Self {
            scroll_up: resolve(Action::ScrollUp, scroll_up),
            scroll_down: resolve(Action::ScrollDown, scroll_down),
            save: resolve(Action::Save, save),
            pager: resolve(Action::Pager, pager),
        }
    }
}

impl Default for ConfiguredKeys {
    fn default() -> Self {
        Self::new(
            Action::ScrollUp.default_key(),
            Action::ScrollDown.default_key(),
            Action::Save.default_key(),
            Action::Pager.default_key(),
        )
    }
}

impl KeyMapper for ConfiguredKeys {
    fn lookup(&self, action: Action) -> Vec<u8> {
        match action {
            Action::ScrollUp => self.scroll_up.clone(),
            Action::ScrollDown => self.scroll_down.clone(),
            Action::Save => self.save.clone(),
            Action::Pager => self.pager.clone(),
        }
    }
}

/// Only escape sequences can be recognized on the terminal side, so a key
/// that sends a plain byte falls back to the default.
fn resolve(action: Action, name: &str) -> Vec<u8> {
    let reason = match key_parser::parse_binding(name) {
        Ok(sequence) if sequence.len() > 1 && sequence[0] == ESC => return sequence,
        Ok(_) => "it does not send an escape sequence".to_string(),
        Err(e) => e.to_string(),
    };
    eprintln!(
        "Warning: invalid {} key '{}': {}; using {}",
        action,
        name,
        reason,
        action.default_key()
    );
    warn!(%action, name, %reason, "falling back to default key");
    key_parser::parse_binding(action.default_key()).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct KeyTable {
    entries: Vec<(Action, Vec<u8>)>,
}

impl KeyTable {
    pub fn from_mapper(mapper: &dyn KeyMapper) -> Self {
        let entries = Action::ALL
            .iter()
            .map(|&action| (action, mapper.lookup(action)))
            .filter(|(_, sequence)| !sequence.is_empty())
            .collect();
        Self { entries }
    }

    pub fn action_for(&self, sequence: &[u8]) -> Option<Action> {
        self.entries
            .iter()
            .find(|(_, bytes)| bytes == sequence)
            .map(|(action, _)| *action)
    }

}

/// Shift+PageUp and Shift+PageDown as the Linux console keymap defines them,
/// with the configured keys for everything the console does not provide.
#[derive(Debug, Clone)]
pub struct ConsoleKeys {
    scroll_up: Option<Vec<u8>>,
    scroll_down: Option<Vec<u8>>,
    fallback: ConfiguredKeys,
}

impl ConsoleKeys {
    pub fn from_console(fd: RawFd, fallback: ConfiguredKeys) -> Self {
        Self {
            scroll_up: console_key(fd, Action::ScrollUp, KEYCODE_PAGE_UP),
            scroll_down: console_key(fd, Action::ScrollDown, KEYCODE_PAGE_DOWN),
            fallback,
        }
    }
}

impl KeyMapper for ConsoleKeys {
    fn lookup(&self, action: Action) -> Vec<u8> {
        let console = match action {
            Action::ScrollUp => self.scroll_up.as_ref(),
            Action::ScrollDown => self.scroll_down.as_ref(),
            Action::Save | Action::Pager => None,
        };
        console
            .cloned()
            .unwrap_or_else(|| self.fallback.lookup(action))
    }
}

fn console_key(fd: RawFd, action: Action, keycode: u8) -> Option<Vec<u8>> {
    match shifted_function_string(fd, keycode) {
        Ok(Some(sequence)) if sequence.len() > 1 && sequence[0] == ESC => {
            debug!(%action, ?sequence, "using console keymap");
            Some(sequence)
        }
        Ok(_) => {
            debug!(%action, keycode, "console key is not an escape sequence");
            None
        }
        Err(e) => {
            debug!(%action, error = %e, "console keymap unavailable");
            None
        }
    }
}

/// The string the console sends for `keycode` with shift held, if that
/// entry is a function key.
fn shifted_function_string(fd: RawFd, keycode: u8) -> io::Result<Option<Vec<u8>>> {
    let mut entry = KbEntry {
        kb_table: K_SHIFTTAB,
        kb_index: keycode,
        kb_value: 0,
    };
    if unsafe { libc::ioctl(fd, KDGKBENT as _, &mut entry) } == -1 {
        return Err(io::Error::last_os_error());
    }
    let Some(func) = function_index(entry.kb_value) else {
        return Ok(None);
    };

    let mut strings = KbsEntry {
        kb_func: func,
        kb_string: [0; 512],
    };
    if unsafe { libc::ioctl(fd, KDGKBSENT as _, &mut strings) } == -1 {
        return Err(io::Error::last_os_error());
    }
    let len = memchr(0, &strings.kb_string).unwrap_or(strings.kb_string.len());
    Ok(Some(strings.kb_string[..len].to_vec()))
}

/// Holes, missing maps and non-function keys all have a type other than KT_FN.
fn function_index(kb_value: u16) -> Option<u8> {
    (kb_value >> 8 == KT_FN).then_some((kb_value & 0xFF) as u8)
}
