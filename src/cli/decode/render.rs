use ttx::process::elements::{CharMode, ParseFlags, ParseFlow, parse_page_elements};
use ttx::structs::page::{COLUMNS, Page, ROWS};

/// Stand-in for any non-blank mosaic cell.
pub const MOSAIC_GLYPH: char = '\u{2588}';

const KEYWORD_ROW: usize = ROWS - 1;

fn glyph(ch: u8, mode: CharMode) -> char {
    let ch = ch & 0x7F;
    if mode.has(CharMode::CONCEAL) {
        return ' ';
    }

    match ch {
        0x20 => ' ',
        0x21..=0x3F | 0x60..=0x7F if mode.has(CharMode::GRAPHICS) => MOSAIC_GLYPH,
        0x21..=0x7E => ch as char,
        _ => ' ',
    }
}

/// Renders a display page into one 40-column string per row.
///
/// Row 25 is only included with [`ParseFlags::SHOW_KEYWORDS`]. Rows the
/// parser skips stay blank, except the lower half of a double height pair,
/// which receives the repeated upper half.
pub fn render_page(page: &Page, flags: ParseFlags) -> Vec<String> {
    let mut grid = [[' '; COLUMNS]; ROWS];

    parse_page_elements(page, flags, |_, (row, col), _, _, ch, mode| {
        grid[row][col] = glyph(ch, mode);
        ParseFlow::Continue
    });

    let rows = if flags.has(ParseFlags::SHOW_KEYWORDS) {
        ROWS
    } else {
        KEYWORD_ROW
    };

    grid[..rows].iter().map(|row| row.iter().collect()).collect()
}
