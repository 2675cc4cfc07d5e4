//! Page element parser.
//!
//! Walks the rows of a display page left to right and turns in-band spacing
//! attributes into one `(position, colours, character, mode)` element per
//! column. Spacing attributes occupy a cell of their own, which renders as a
//! space (or the held mosaic) in the attribute state that applies to it.

use crate::structs::page::{ControlBits, Page, ROWS};

/// Options and markers passed into the parser and echoed to the callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseFlags(pub u16);

impl ParseFlags {
    /// Only rows whose `UPDATED` state is set are parsed.
    pub const REFRESH: u16 = 0x0001;
    /// Parse the header row even if the page suppresses it, without box
    /// filtering.
    pub const FORCE_HEADER: u16 = 0x0002;
    /// Parse row 25 as well.
    pub const SHOW_KEYWORDS: u16 = 0x0004;
    /// Parse row 24 even when the page does not request it.
    pub const SHOW_ROW24: u16 = 0x0008;
    /// Set by the parser on the lower half of a double height pair.
    pub const REPEAT: u16 = 0x0010;

    #[inline(always)]
    pub const fn has(self, flags: u16) -> bool {
        self.0 & flags != 0
    }

    pub const fn with(self, flags: u16) -> Self {
        Self(self.0 | flags)
    }
}

/// Display attributes of an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharMode(pub u8);

impl CharMode {
    pub const GRAPHICS: u8 = 0x01;
    pub const SEPARATED: u8 = 0x02;
    pub const FLASH: u8 = 0x04;
    pub const CONCEAL: u8 = 0x08;
    pub const DOUBLE_HEIGHT: u8 = 0x10;
    pub const BOXED: u8 = 0x20;

    #[inline(always)]
    pub const fn has(self, mode: u8) -> bool {
        self.0 & mode != 0
    }
}

/// Foreground and background colour indices (0 black .. 7 white).
///
/// A `None` background lets video show through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colors {
    pub fg: u8,
    pub bg: Option<u8>,
}

/// Callback verdict after each element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseFlow {
    #[default]
    Continue,
    StopLine,
    StopPage,
}

/// Why a row produced no elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSkip {
    NoData,
    SuppressHeader,
    InhibitDisplay,
    Row24Hidden,
    SkipKeywords,
    NotUpdated,
    /// The row is the lower half of a double height pair.
    DoubleSkip,
    ConfigError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Parsed,
    Skipped(LineSkip),
    StopLine,
    StopPage,
}

const WHITE: u8 = 7;
const BLACK: u8 = 0;
const SPACE: u8 = 0x20;

/// Parses every displayable row of `page`.
///
/// The callback receives `(page, (row, column), flags, colours, character,
/// mode)` for each element. Returns [`ParseFlow::StopPage`] when the callback
/// aborted the page and [`ParseFlow::Continue`] otherwise.
pub fn parse_page_elements<F>(page: &Page, flags: ParseFlags, mut callback: F) -> ParseFlow
where
    F: FnMut(&Page, (usize, usize), ParseFlags, Colors, u8, CharMode) -> ParseFlow,
{
    for row in 0..ROWS {
        match parse_line_elements(page, row, flags, &mut callback) {
            LineOutcome::StopPage => return ParseFlow::StopPage,
            LineOutcome::Parsed | LineOutcome::StopLine if is_pair_top(page, row) => {
                let repeat = flags.with(ParseFlags::REPEAT);
                let outcome = parse_line_elements(page, row + 1, repeat, &mut callback);
                if outcome == LineOutcome::StopPage {
                    return ParseFlow::StopPage;
                }
            }
            _ => {}
        }
    }

    ParseFlow::Continue
}

/// `true` when `row` is the upper half of a double height pair.
///
/// Only rows 1..=22 can start a pair, and a row consumed as the lower half of
/// the previous pair cannot start another one.
pub fn is_pair_top(page: &Page, row: usize) -> bool {
    let mut top = false;
    for r in 1..=row.min(22) {
        top = !top
            && page.has_data(r)
            && page.frame[r].iter().any(|&b| matches!(b & 0x7F, 0x0D | 0x0F));
    }
    top && row <= 22
}

/// Parses one row.
///
/// With [`ParseFlags::REPEAT`] the elements of `row - 1` are produced at
/// `row`: double height cells repeat their character and every other cell
/// becomes a space. Without it, the lower row of a pair is skipped.
pub fn parse_line_elements<F>(
    page: &Page,
    row: usize,
    flags: ParseFlags,
    callback: &mut F,
) -> LineOutcome
where
    F: FnMut(&Page, (usize, usize), ParseFlags, Colors, u8, CharMode) -> ParseFlow,
{
    let repeat = flags.has(ParseFlags::REPEAT);
    if row >= ROWS || (repeat && row == 0) {
        return LineOutcome::Skipped(LineSkip::ConfigError);
    }
    if !repeat && row > 0 && is_pair_top(page, row - 1) {
        return LineOutcome::Skipped(LineSkip::DoubleSkip);
    }
    let source = if repeat { row - 1 } else { row };

    if let Err(skip) = check_row(page, source, flags) {
        return LineOutcome::Skipped(skip);
    }

    let box_filter =
        page.control.is_boxed_page() && !(source == 0 && flags.has(ParseFlags::FORCE_HEADER));
    let mut state = RowState::default();

    for (column, &byte) in page.frame[source].iter().enumerate() {
        let (colors, ch, mode) = state.cell(byte & 0x7F);

        let (colors, ch, mode) = if box_filter && !mode.has(CharMode::BOXED) {
            (Colors { fg: colors.fg, bg: None }, SPACE, CharMode::default())
        } else if repeat && !mode.has(CharMode::DOUBLE_HEIGHT) {
            (colors, SPACE, mode)
        } else {
            (colors, ch, mode)
        };

        match callback(page, (row, column), flags, colors, ch, mode) {
            ParseFlow::Continue => {}
            ParseFlow::StopLine => return LineOutcome::StopLine,
            ParseFlow::StopPage => return LineOutcome::StopPage,
        }
    }

    LineOutcome::Parsed
}

fn check_row(page: &Page, row: usize, flags: ParseFlags) -> Result<(), LineSkip> {
    if !page.has_data(row) {
        return Err(LineSkip::NoData);
    }

    let control = page.control;
    match row {
        0 if control.has(ControlBits::SUPPRESS_HEADER)
            && !flags.has(ParseFlags::FORCE_HEADER) =>
        {
            return Err(LineSkip::SuppressHeader);
        }
        1..=24 if control.has(ControlBits::INHIBIT_DISPLAY) => {
            return Err(LineSkip::InhibitDisplay);
        }
        24 if !page.show_row24 && !flags.has(ParseFlags::SHOW_ROW24) => {
            return Err(LineSkip::Row24Hidden);
        }
        25 if !flags.has(ParseFlags::SHOW_KEYWORDS) => return Err(LineSkip::SkipKeywords),
        _ => {}
    }

    if flags.has(ParseFlags::REFRESH) && !page.is_updated(row) {
        return Err(LineSkip::NotUpdated);
    }

    Ok(())
}

/// Attribute state while scanning a row.
#[derive(Debug, Clone, Copy)]
struct RowState {
    fg: u8,
    bg: u8,
    graphics: bool,
    separated: bool,
    flash: bool,
    conceal: bool,
    double_height: bool,
    boxed: bool,
    hold: bool,
    held: u8,
    held_separated: bool,
    last_code: Option<u8>,
}

impl Default for RowState {
    fn default() -> Self {
        Self {
            fg: WHITE,
            bg: BLACK,
            graphics: false,
            separated: false,
            flash: false,
            conceal: false,
            double_height: false,
            boxed: false,
            hold: false,
            held: SPACE,
            held_separated: false,
            last_code: None,
        }
    }
}

impl RowState {
    /// Produces the element for one 7-bit cell and advances the state.
    fn cell(&mut self, byte: u8) -> (Colors, u8, CharMode) {
        if byte >= 0x20 {
            self.last_code = None;
            return self.character(byte);
        }

        let set_at = is_set_at(byte, self.last_code);
        if set_at {
            self.apply(byte);
        }

        let (ch, separated) = if self.hold && self.graphics {
            (self.held, self.held_separated)
        } else {
            (SPACE, false)
        };
        let mut mode = self.mode();
        if ch != SPACE {
            mode.0 |= CharMode::GRAPHICS;
            if separated {
                mode.0 |= CharMode::SEPARATED;
            } else {
                mode.0 &= !CharMode::SEPARATED;
            }
        } else {
            mode.0 &= !(CharMode::GRAPHICS | CharMode::SEPARATED);
        }
        let element = (self.colors(), ch, mode);

        if !set_at {
            self.apply(byte);
        }
        self.last_code = Some(byte);

        element
    }

    fn character(&mut self, byte: u8) -> (Colors, u8, CharMode) {
        let mut mode = self.mode();
        if self.graphics && is_mosaic(byte) {
            self.held = byte;
            self.held_separated = self.separated;
        } else {
            // Upper case blast-through and all alphanumerics.
            mode.0 &= !(CharMode::GRAPHICS | CharMode::SEPARATED);
        }

        (self.colors(), byte, mode)
    }

    fn apply(&mut self, code: u8) {
        match code {
            0x00..=0x07 => {
                if self.graphics {
                    self.reset_held();
                }
                self.fg = code;
                self.graphics = false;
                self.conceal = false;
            }
            0x08 => self.flash = true,
            0x09 => self.flash = false,
            0x0A => self.boxed = false,
            0x0B => self.boxed = true,
            0x0C => {
                if self.double_height {
                    self.reset_held();
                }
                self.double_height = false;
            }
            0x0D | 0x0F => {
                if !self.double_height {
                    self.reset_held();
                }
                self.double_height = true;
            }
            0x10..=0x17 => {
                if !self.graphics {
                    self.reset_held();
                }
                self.fg = code - 0x10;
                self.graphics = true;
                self.conceal = false;
            }
            0x18 => self.conceal = true,
            0x19 => self.separated = false,
            0x1A => self.separated = true,
            0x1C => self.bg = BLACK,
            0x1D => self.bg = self.fg,
            0x1E => self.hold = true,
            0x1F => self.hold = false,
            // Double width and the second G0 set are not rendered at level 1.
            _ => {}
        }
    }

    fn reset_held(&mut self) {
        self.held = SPACE;
        self.held_separated = false;
    }

    fn colors(&self) -> Colors {
        Colors {
            fg: self.fg,
            bg: Some(self.bg),
        }
    }

    fn mode(&self) -> CharMode {
        let mut mode = 0;
        if self.graphics {
            mode |= CharMode::GRAPHICS;
        }
        if self.separated {
            mode |= CharMode::SEPARATED;
        }
        if self.flash {
            mode |= CharMode::FLASH;
        }
        if self.conceal {
            mode |= CharMode::CONCEAL;
        }
        if self.double_height {
            mode |= CharMode::DOUBLE_HEIGHT;
        }
        if self.boxed {
            mode |= CharMode::BOXED;
        }
        CharMode(mode)
    }
}

/// Attributes taking effect in their own cell. Start Box does so only as the
/// second of a pair.
fn is_set_at(code: u8, previous: Option<u8>) -> bool {
    match code {
        0x09 | 0x0C | 0x0D | 0x18 | 0x19 | 0x1A | 0x1C | 0x1D | 0x1E => true,
        0x0B => previous == Some(0x0B),
        _ => false,
    }
}

/// Mosaic characters; 0x40..=0x5F blast through as alphanumerics.
const fn is_mosaic(byte: u8) -> bool {
    matches!(byte, 0x20..=0x3F | 0x60..=0x7F)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::page::{COLUMNS, PageCode, line_state};

    type Element = ((usize, usize), Colors, u8, CharMode);

    fn page_with_rows(rows: &[(usize, &[u8])]) -> Page {
        let mut page = Page::new(PageCode::new(0x100, 0));
        page.line_state = [line_state::HAS_DATA; ROWS];
        for &(row, bytes) in rows {
            page.frame[row][..bytes.len()].copy_from_slice(bytes);
        }
        page
    }

    fn collect_line(page: &Page, row: usize, flags: ParseFlags) -> (LineOutcome, Vec<Element>) {
        let mut elements = Vec::new();
        let mut collect = |_: &Page, pos, _: ParseFlags, colors: Colors, ch: u8, mode: CharMode| {
            elements.push((pos, colors, ch, mode));
            ParseFlow::Continue
        };
        let outcome = parse_line_elements(page, row, flags, &mut collect);
        (outcome, elements)
    }

    fn outcome(page: &Page, row: usize) -> LineOutcome {
        collect_line(page, row, ParseFlags::default()).0
    }

    #[test]
    fn set_after_colour_keeps_previous_state_in_its_cell() {
        let page = page_with_rows(&[(1, b"A\x01BC")]);
        let (outcome, elements) = collect_line(&page, 1, ParseFlags::default());

        assert_eq!(outcome, LineOutcome::Parsed);
        assert_eq!(elements.len(), COLUMNS);
        assert_eq!(elements[0].1.fg, WHITE);
        // The red alpha attribute cell is drawn white, the next one red.
        assert_eq!((elements[1].1.fg, elements[1].2), (WHITE, SPACE));
        assert_eq!((elements[2].1.fg, elements[2].2), (1, b'B'));
    }

    #[test]
    fn set_at_background_applies_to_its_own_cell() {
        let page = page_with_rows(&[(1, b"\x02\x1DX\x1CY")]);
        let (_, elements) = collect_line(&page, 1, ParseFlags::default());

        assert_eq!(elements[1].1, Colors { fg: 2, bg: Some(2) });
        assert_eq!(elements[2].1, Colors { fg: 2, bg: Some(2) });
        assert_eq!(elements[3].1.bg, Some(BLACK));
        assert_eq!(elements[4].1.bg, Some(BLACK));
    }

    #[test]
    fn hold_graphics_repeats_last_mosaic() {
        // Mosaic red, hold, mosaic char, release, colour change.
        let page = page_with_rows(&[(1, b"\x11\x1E\x7F\x12\x1F\x03Z")]);
        let (_, elements) = collect_line(&page, 1, ParseFlags::default());

        assert_eq!(elements[0].2, SPACE);
        assert_eq!(elements[1].2, SPACE);
        assert_eq!(elements[2].2, 0x7F);
        assert!(elements[2].3.has(CharMode::GRAPHICS));
        // Attribute cells under hold show the held mosaic.
        assert_eq!(elements[3].2, 0x7F);
        assert!(elements[3].3.has(CharMode::GRAPHICS));
        // Release is set-after.
        assert_eq!(elements[4].2, 0x7F);
        assert_eq!(elements[5].2, SPACE);
        assert_eq!(elements[6].2, b'Z');
        assert!(!elements[6].3.has(CharMode::GRAPHICS));
    }

    #[test]
    fn blast_through_is_not_held() {
        let page = page_with_rows(&[(1, b"\x17\x1E\x41\x07")]);
        let (_, elements) = collect_line(&page, 1, ParseFlags::default());

        assert_eq!(elements[2].2, 0x41);
        assert!(!elements[2].3.has(CharMode::GRAPHICS));
        assert_eq!(elements[3].2, SPACE);
    }

    #[test]
    fn boxed_page_blanks_unboxed_cells() {
        let mut page = page_with_rows(&[(0, b"HEAD"), (20, b"ab\x0B\x0BHI\x0Acd")]);
        page.control = ControlBits(ControlBits::SUBTITLE);
        let (_, elements) = collect_line(&page, 20, ParseFlags::default());

        assert_eq!((elements[0].1.bg, elements[0].2), (None, SPACE));
        assert_eq!(elements[2].1.bg, None);
        // The second start box is set-at.
        assert!(elements[3].3.has(CharMode::BOXED));
        assert_eq!((elements[4].1.bg, elements[4].2), (Some(BLACK), b'H'));
        assert_eq!(elements[5].2, b'I');
        // End box is set-after.
        assert!(elements[6].3.has(CharMode::BOXED));
        assert_eq!((elements[7].1.bg, elements[7].2), (None, SPACE));

        let (_, header) = collect_line(&page, 0, ParseFlags(ParseFlags::FORCE_HEADER));
        assert_eq!(header[0].2, b'H');
    }

    #[test]
    fn row_skips() {
        use LineOutcome::Skipped;

        let mut page = page_with_rows(&[]);
        page.line_state[3] = 0;
        page.control = ControlBits(ControlBits::SUPPRESS_HEADER);

        assert_eq!(outcome(&page, 0), Skipped(LineSkip::SuppressHeader));
        assert_eq!(outcome(&page, 3), Skipped(LineSkip::NoData));
        assert_eq!(outcome(&page, 24), Skipped(LineSkip::Row24Hidden));
        assert_eq!(
            collect_line(&page, 24, ParseFlags(ParseFlags::SHOW_ROW24)).0,
            LineOutcome::Parsed
        );
        assert_eq!(outcome(&page, 25), Skipped(LineSkip::SkipKeywords));
        assert_eq!(outcome(&page, 26), Skipped(LineSkip::ConfigError));
        assert_eq!(
            collect_line(&page, 1, ParseFlags(ParseFlags::REFRESH)).0,
            Skipped(LineSkip::NotUpdated)
        );

        page.control = ControlBits(ControlBits::INHIBIT_DISPLAY);
        assert_eq!(outcome(&page, 5), Skipped(LineSkip::InhibitDisplay));
        assert_eq!(outcome(&page, 0), LineOutcome::Parsed);
    }

    #[test]
    fn double_height_row_is_repeated_and_next_row_skipped() {
        let page = page_with_rows(&[(2, b"ab\x0DBIG"), (3, b"lost"), (4, b"next")]);
        let mut rows = Vec::new();
        let mut lower = Vec::new();

        let flow = parse_page_elements(
            &page,
            ParseFlags::default(),
            |_: &Page, (row, column), flags, _, ch, _| {
                if column == 0 {
                    rows.push(row);
                }
                if flags.has(ParseFlags::REPEAT) {
                    lower.push(ch);
                }
                ParseFlow::Continue
            },
        );

        assert_eq!(flow, ParseFlow::Continue);
        // Row 24 and 25 are hidden by default.
        assert_eq!(rows, (0..24).collect::<Vec<_>>());
        // Lower half: normal height cells are spaces, double height repeat.
        assert_eq!(&lower[..6], b"   BIG");
        assert!(!lower.contains(&b'l'));
    }

    #[test]
    fn consumed_row_cannot_start_a_pair() {
        let page = page_with_rows(&[(5, b"\x0DA"), (6, b"\x0DB"), (7, b"\x0DC")]);
        let mut repeats = Vec::new();

        parse_page_elements(
            &page,
            ParseFlags::default(),
            |_: &Page, (row, column), flags, _, _, _| {
                if column == 0 && flags.has(ParseFlags::REPEAT) {
                    repeats.push(row);
                }
                ParseFlow::Continue
            },
        );

        assert_eq!(repeats, vec![6, 8]);
    }

    #[test]
    fn callback_can_stop() {
        let page = page_with_rows(&[]);
        let mut count = 0;
        let flow = parse_page_elements(
            &page,
            ParseFlags::default(),
            |_: &Page, (_, column), _, _, _, _| {
                count += 1;
                if column == 9 {
                    ParseFlow::StopPage
                } else {
                    ParseFlow::Continue
                }
            },
        );
        assert_eq!(flow, ParseFlow::StopPage);
        assert_eq!(count, 10);

        let mut columns = Vec::new();
        let mut first_only = |_: &Page, (_, column): (usize, usize), _, _, _, _| {
            columns.push(column);
            ParseFlow::StopLine
        };
        let outcome = parse_line_elements(&page, 1, ParseFlags::default(), &mut first_only);
        assert_eq!(outcome, LineOutcome::StopLine);
        assert_eq!(columns, vec![0]);
    }
}
