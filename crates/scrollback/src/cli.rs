use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "scrollback",
    version,
    about = "Scrollback buffer for terminals that have none"
)]
pub struct Cli {
    /// Code points kept in the scrollback buffer
    #[arg(short = 'b', long)]
    pub buffer_cells: Option<usize>,

    /// Lines moved per scroll key press (default: half the screen)
    #[arg(short = 'l', long)]
    pub lines: Option<usize>,

    /// Key that scrolls back, e.g. "[f11]" or "[shift][pageup]"
    #[arg(long)]
    pub scroll_up_key: Option<String>,

    /// Key that scrolls forward
    #[arg(long)]
    pub scroll_down_key: Option<String>,

    /// One byte per character instead of UTF-8
    #[arg(long)]
    pub single_char: bool,

    /// Write debug logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Program to run (default: $SHELL)
    pub command: Option<String>,

    /// Arguments for the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn shell_command(&self) -> String {
        self.command
            .clone()
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}
