pub const ASK_POSITION: &[u8] = b"\x1b[6n";
pub const SAVE_CURSOR: &[u8] = b"\x1b[s";
pub const RESTORE_CURSOR: &[u8] = b"\x1b[u";
pub const CURSOR_HOME: &[u8] = b"\x1b[H";
pub const ERASE_DISPLAY: &[u8] = b"\x1b[2J";
pub const BLUE_BACKGROUND: &[u8] = b"\x1b[44m";
pub const NORMAL_BACKGROUND: &[u8] = b"\x1b[49m";

pub const BAR_INDENT: &str = "            ";
pub const BAR_UP: &str = "↑↑↑↑↑↑↑↑↑";
pub const BAR_DOWN: &str = "↓↓↓↓↓↓↓↓↓";

pub const READ_BUFFER_CAPACITY: usize = 1024;
pub const OUTPUT_BUFFER_CAPACITY: usize = 32768;

pub const POSITION_ATTEMPTS: u8 = 4;
pub const POSITION_TIMEOUT_MS: u64 = 100;
