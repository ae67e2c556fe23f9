pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod escape;
pub mod escape_sequences;
pub mod key_parser;
pub mod keymap;
pub mod logging;
pub mod mux;
pub mod persist;
pub mod proxy;
pub mod ring;
pub mod session;
pub mod shell_to_terminal;
pub mod terminal_to_shell;
pub mod view;

#[cfg(test)]
mod testing;
