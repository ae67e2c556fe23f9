mod cli;

use clap::Parser;
use scrollback::config::Config;
use scrollback::logging;
use scrollback::persist::FileStore;
use scrollback::proxy::{self, NESTED_ENV, Proxy};
use scrollback::session::Session;
use std::io::IsTerminal;
use std::os::fd::AsRawFd;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    if std::env::var_os(NESTED_ENV).is_some() {
        eprintln!("scrollback is already running in this terminal");
        return ExitCode::from(1);
    }

    if !std::io::stdin().is_terminal() {
        eprintln!("scrollback needs a terminal on standard input");
        return ExitCode::from(1);
    }

    let mut config = Config::load();

    if let Some(log_file) = cli.log_file.as_ref().or(config.log_file.as_ref())
        && let Err(e) = logging::init(log_file)
    {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let mut settings = config.session_settings();
    if let Some(cells) = cli.buffer_cells {
        settings.buffer_cells = cells;
    }
    if cli.lines.is_some() {
        settings.scroll_lines = cli.lines;
    }
    settings.single_char |= cli.single_char;

    // Keys named on the command line win over the console keymap.
    if let Some(key) = &cli.scroll_up_key {
        config.scroll_up_key = key.clone();
        config.console_keys = false;
    }
    if let Some(key) = &cli.scroll_down_key {
        config.scroll_down_key = key.clone();
        config.console_keys = false;
    }
    let keys = config.key_mapper(std::io::stdin().as_raw_fd());
    let store = FileStore::new(config.save_path(), config.pager());

    let geometry = match proxy::terminal_geometry() {
        Ok(geometry) => geometry,
        Err(e) => {
            eprintln!("Failed to start proxy: {:#}", e);
            return ExitCode::from(1);
        }
    };
    let session = match Session::new(geometry, settings, keys.as_ref(), Box::new(store)) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to start proxy: {}", e);
            return ExitCode::from(1);
        }
    };

    let command = cli.shell_command();
    let cmd_args: Vec<&str> = cli.args.iter().map(|s| s.as_str()).collect();

    match Proxy::spawn(&command, &cmd_args, geometry) {
        Ok(mut proxy) => {
            let result = proxy.run(session);
            // Restores the terminal mode before anything is printed.
            drop(proxy);
            match result {
                Ok(exit_code) => ExitCode::from(exit_code as u8),
                Err(e) => {
                    eprintln!("Session error: {:#}", e);
                    ExitCode::from(1)
                }
            }
        }
        Err(e) => {
            eprintln!("Failed to start proxy: {:#}", e);
            ExitCode::from(1)
        }
    }
}
