use crate::codec;
use crate::escape_sequences::{
    BAR_DOWN, BAR_INDENT, BAR_UP, BLUE_BACKGROUND, CURSOR_HOME, ERASE_DISPLAY, NORMAL_BACKGROUND,
    RESTORE_CURSOR,
};
use crate::ring::RingBuffer;

pub fn push_cell(cp: u32, single_char: bool, out: &mut Vec<u8>) {
    if single_char {
        out.push((cp & 0xFF) as u8);
    } else {
        codec::encode(cp, out);
    }
}

fn push_bar(bar: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(BAR_INDENT.as_bytes());
    out.extend_from_slice(BLUE_BACKGROUND);
    out.extend_from_slice(bar.as_bytes());
    out.extend_from_slice(NORMAL_BACKGROUND);
}

/// Repaint the whole screen from the buffer.
pub fn redraw(ring: &RingBuffer, single_char: bool, notice: Option<&str>, out: &mut Vec<u8>) {
    let geometry = ring.geometry();
    out.extend_from_slice(CURSOR_HOME);
    out.extend_from_slice(ERASE_DISPLAY);

    if ring.is_live() {
        for cp in ring.render(ring.origin(), geometry.cells()) {
            push_cell(cp, single_char, out);
        }
        out.extend_from_slice(RESTORE_CURSOR);
        return;
    }

    if ring.can_scroll_up() {
        push_bar(BAR_UP, out);
    }
    out.extend_from_slice(b"\r\n");
    let visible = geometry.rows.saturating_sub(2) * geometry.cols;
    for cp in ring.render(ring.show(), visible) {
        push_cell(cp, single_char, out);
    }
    push_bar(BAR_DOWN, out);
    out.extend_from_slice(format!("       {} lines below", ring.lines_below()).as_bytes());
    if let Some(notice) = notice {
        out.extend_from_slice(format!("   {}", notice).as_bytes());
    }
}
