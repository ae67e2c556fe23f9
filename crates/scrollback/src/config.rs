use crate::keymap::{ConfiguredKeys, ConsoleKeys, KeyMapper};
use crate::persist::SAVE_FILE_NAME;
use crate::session::{DEFAULT_BUFFER_CELLS, DEFAULT_POSITION_PRESERVING, SessionSettings};
use serde::Deserialize;
use std::fs;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

const DEFAULT_PAGER: &str = "less";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buffer_cells: usize,
    pub scroll_lines: Option<usize>,
    pub scroll_up_key: String,
    pub scroll_down_key: String,
    pub save_key: String,
    pub pager_key: String,
    /// Ask the console keymap for the scroll keys first.
    pub console_keys: bool,
    pub single_char: bool,
    pub position_preserving: String,
    pub save_path: Option<PathBuf>,
    pub pager: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_cells: DEFAULT_BUFFER_CELLS,
            scroll_lines: None,
            scroll_up_key: "[f11]".to_string(),
            scroll_down_key: "[f12]".to_string(),
            save_key: "[f9]".to_string(),
            pager_key: "[f10]".to_string(),
            console_keys: true,
            single_char: false,
            position_preserving: DEFAULT_POSITION_PRESERVING.to_string(),
            save_path: None,
            pager: None,
            log_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Self::default(),
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("scrollback.toml"))
    }

    fn load_from_file(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to parse config file {}: {}",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!(
                    "Warning: Failed to read config file {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn keys(&self) -> ConfiguredKeys {
        ConfiguredKeys::new(
            &self.scroll_up_key,
            &self.scroll_down_key,
            &self.save_key,
            &self.pager_key,
        )
    }

    pub fn key_mapper(&self, terminal: RawFd) -> Box<dyn KeyMapper> {
        if self.console_keys {
            Box::new(ConsoleKeys::from_console(terminal, self.keys()))
        } else {
            Box::new(self.keys())
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            buffer_cells: self.buffer_cells,
            scroll_lines: self.scroll_lines,
            single_char: self.single_char,
            position_preserving: self.position_preserving.as_bytes().to_vec(),
        }
    }

    pub fn save_path(&self) -> PathBuf {
        self.save_path.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(SAVE_FILE_NAME)
        })
    }

    pub fn pager(&self) -> String {
        self.pager
            .clone()
            .or_else(|| std::env::var("PAGER").ok().filter(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_PAGER.to_string())
    }
}
