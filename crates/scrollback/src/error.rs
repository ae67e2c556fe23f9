use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Terminal,
    Shell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Terminal => write!(f, "terminal"),
            Side::Shell => write!(f, "shell"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("scrollback buffer of {capacity} cells cannot hold a {rows}x{cols} screen")]
    BufferTooSmall {
        capacity: usize,
        rows: usize,
        cols: usize,
    },
    #[error("unusable terminal geometry {rows}x{cols}")]
    InvalidGeometry { rows: usize, cols: usize },
    #[error("I/O error on {side}: {source}")]
    Io {
        side: Side,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    pub fn io(side: Side) -> impl FnOnce(io::Error) -> Self {
        move |source| SessionError::Io { side, source }
    }
}
