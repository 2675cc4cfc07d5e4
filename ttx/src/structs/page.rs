//! Cached teletext pages and their addressing.

use std::fmt::{Display, Formatter};

use crate::utils::errors::PageCodeError;

pub const ROWS: usize = 26;
pub const COLUMNS: usize = 40;

/// Number of page-hex buckets for BCD-valid pages 0x100..=0x899.
pub const VISIBLE_PAGES: usize = 800;

/// Sub-code meaning "any sub-page".
pub const SUBCODE_ANY: u16 = 0x3F7F;

/// Per-row cache state bits.
pub mod line_state {
    pub const HAS_DATA: u8 = 0x01;
    pub const UPDATED: u8 = 0x02;
    pub const HAS_ERROR: u8 = 0x04;
}

/// Page-hex plus sub-code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageCode {
    pub page: u16,
    pub subcode: u16,
}

impl Default for PageCode {
    fn default() -> Self {
        Self {
            page: 0x1FF,
            subcode: SUBCODE_ANY,
        }
    }
}

impl Display for PageCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.subcode >= SUBCODE_ANY {
            write!(f, "{:03X}", self.page)
        } else {
            write!(f, "{:03X}/{:04X}", self.page, self.subcode)
        }
    }
}

impl PageCode {
    pub const fn new(page: u16, subcode: u16) -> Self {
        Self { page, subcode }
    }

    /// Page code matching any sub-page of `page`.
    pub const fn any(page: u16) -> Self {
        Self::new(page, SUBCODE_ANY)
    }

    /// Filler headers use page units/tens `0xFF`.
    pub const fn is_filler(&self) -> bool {
        self.page & 0xFF == 0xFF
    }

    pub const fn is_any_subcode(&self) -> bool {
        self.subcode >= SUBCODE_ANY
    }

    /// Magazine digit as it appears in the page number (1..=8).
    pub const fn magazine(&self) -> u8 {
        ((self.page >> 8) & 0xF) as u8
    }
}

/// Maps a BCD page-hex in 0x100..=0x899 to a bucket index in 0..800.
pub fn page_hex_to_index(page: u16) -> Result<usize, PageCodeError> {
    let hundreds = (page >> 8) as usize;
    let tens = ((page >> 4) & 0xF) as usize;
    let units = (page & 0xF) as usize;

    if !(1..=8).contains(&hundreds) || tens > 9 || units > 9 {
        return Err(PageCodeError::InvalidPageCode(page));
    }

    Ok((hundreds - 1) * 100 + tens * 10 + units)
}

/// Inverse of [`page_hex_to_index`].
pub fn index_to_page_hex(index: usize) -> Result<u16, PageCodeError> {
    if index >= VISIBLE_PAGES {
        return Err(PageCodeError::InvalidPageCode(index as u16));
    }

    let hundreds = index / 100 + 1;
    let tens = (index / 10) % 10;
    let units = index % 10;

    Ok(((hundreds << 8) | (tens << 4) | units) as u16)
}

/// Pages of magazines 1..=8 with a hex digit in tens or units.
///
/// Broadcasters use these for system data (TOP tables, filler); they are
/// never shown through normal page numbering.
pub const fn is_non_visible(page: u16) -> bool {
    let hundreds = page >> 8;
    hundreds >= 1 && hundreds <= 8 && ((page >> 4) & 0xF > 9 || page & 0xF > 9)
}

/// Distance between two bucket indices on the 800-entry ring.
pub const fn circular_distance(a: usize, b: usize) -> usize {
    let diff = a.abs_diff(b) % VISIBLE_PAGES;
    if diff > VISIBLE_PAGES / 2 {
        VISIBLE_PAGES - diff
    } else {
        diff
    }
}

/// Page header control bits (C4..C14 plus the magazine number).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlBits(pub u16);

impl ControlBits {
    pub const MAGAZINE: u16 = 0x0007;
    pub const ERASE_PAGE: u16 = 0x0008;
    pub const NEWSFLASH: u16 = 0x0010;
    pub const SUBTITLE: u16 = 0x0020;
    pub const SUPPRESS_HEADER: u16 = 0x0040;
    pub const UPDATE: u16 = 0x0080;
    pub const INTERRUPTED: u16 = 0x0100;
    pub const INHIBIT_DISPLAY: u16 = 0x0200;
    pub const MAGAZINE_SERIAL: u16 = 0x0400;
    pub const CHARACTER_SUBSET: u16 = 0x3800;

    /// `true` when any of `flags` is set.
    #[inline(always)]
    pub const fn has(self, flags: u16) -> bool {
        self.0 & flags != 0
    }

    pub const fn magazine(self) -> u8 {
        (self.0 & Self::MAGAZINE) as u8
    }

    pub const fn character_subset(self) -> u8 {
        ((self.0 & Self::CHARACTER_SUBSET) >> 11) as u8
    }

    /// Newsflash and subtitle pages only show boxed content.
    pub const fn is_boxed_page(self) -> bool {
        self.has(Self::NEWSFLASH | Self::SUBTITLE)
    }
}

/// FLOF link slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSlot {
    Red = 0,
    Green = 1,
    Yellow = 2,
    Blue = 3,
    Index = 4,
    Reserved = 5,
}

/// A cached teletext page: 26 rows of 40 raw bytes plus metadata.
///
/// Frame bytes keep their parity bit while cached; display copies produced by
/// the page store have it stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub code: PageCode,
    pub control: ControlBits,
    pub frame: [[u8; COLUMNS]; ROWS],
    pub line_state: [u8; ROWS],
    pub editorial_links: [Option<PageCode>; 6],
    pub show_row24: bool,
    pub character_subset: u8,
    pub character_region: u8,
    pub received: bool,
    pub(crate) reserved: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            code: PageCode::default(),
            control: ControlBits::default(),
            frame: [[0x20; COLUMNS]; ROWS],
            line_state: [line_state::HAS_DATA | line_state::HAS_ERROR; ROWS],
            editorial_links: [None; 6],
            show_row24: false,
            character_subset: 0,
            character_region: 0,
            received: false,
            reserved: false,
        }
    }
}

impl Page {
    pub fn new(code: PageCode) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    /// Prepares a recycled slot for a new page code.
    ///
    /// Every row is flagged as errored so the first reception overwrites it.
    pub(crate) fn initialize(&mut self, code: PageCode) {
        self.code = code;
        self.control = ControlBits::default();
        self.character_subset = 0;
        self.character_region = 0;
        self.line_state = [line_state::HAS_DATA | line_state::HAS_ERROR; ROWS];
        self.editorial_links = [None; 6];
        self.frame[0][..8].fill(0x20);
        self.received = false;
        self.show_row24 = false;
    }

    pub fn has_data(&self, row: usize) -> bool {
        self.line_state[row] & line_state::HAS_DATA != 0
    }

    pub fn is_updated(&self, row: usize) -> bool {
        self.line_state[row] & line_state::UPDATED != 0
    }

    pub fn has_error(&self, row: usize) -> bool {
        self.line_state[row] & line_state::HAS_ERROR != 0
    }

    pub(crate) fn clear_updated(&mut self) {
        for state in self.line_state.iter_mut() {
            *state &= !line_state::UPDATED;
        }
    }

    /// FLOF link for a colour key, ignoring "no link" targets.
    pub fn link(&self, slot: LinkSlot) -> Option<PageCode> {
        self.editorial_links[slot as usize].filter(|code| !code.is_filler())
    }

    /// `true` when the page carries at least one usable FLOF link.
    pub fn has_flof_links(&self) -> bool {
        [LinkSlot::Red, LinkSlot::Green, LinkSlot::Yellow, LinkSlot::Blue]
            .into_iter()
            .any(|slot| self.link(slot).is_some())
    }

    /// Row contents as text with control bytes shown as spaces.
    pub fn row_text(&self, row: usize) -> String {
        self.frame[row]
            .iter()
            .map(|&b| match b & 0x7F {
                c @ 0x20..=0x7E => c as char,
                _ => ' ',
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_hex_index_bijection() {
        let mut seen = vec![false; VISIBLE_PAGES];
        for page in 0..=u16::MAX {
            match page_hex_to_index(page) {
                Ok(index) => {
                    assert!(index < VISIBLE_PAGES);
                    assert!(!seen[index], "duplicate index for {page:#X}");
                    seen[index] = true;
                    assert_eq!(index_to_page_hex(index).unwrap(), page);
                }
                Err(PageCodeError::InvalidPageCode(p)) => assert_eq!(p, page),
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn index_formula() {
        assert_eq!(page_hex_to_index(0x100).unwrap(), 0);
        assert_eq!(page_hex_to_index(0x199).unwrap(), 99);
        assert_eq!(page_hex_to_index(0x899).unwrap(), 799);
        assert!(page_hex_to_index(0x1A0).is_err());
        assert!(page_hex_to_index(0x10F).is_err());
        assert!(page_hex_to_index(0x900).is_err());
        assert!(page_hex_to_index(0x099).is_err());
    }

    #[test]
    fn non_visible_pages() {
        assert!(is_non_visible(0x1F0));
        assert!(is_non_visible(0x8FF));
        assert!(is_non_visible(0x10A));
        assert!(!is_non_visible(0x100));
        assert!(!is_non_visible(0x900));
    }

    #[test]
    fn ring_distance() {
        assert_eq!(circular_distance(0, 799), 1);
        assert_eq!(circular_distance(10, 60), 50);
        assert_eq!(circular_distance(0, 400), 400);
        assert_eq!(circular_distance(750, 20), 70);
    }

    #[test]
    fn control_bits() {
        let control = ControlBits(0x2805 | ControlBits::SUBTITLE);
        assert_eq!(control.magazine(), 5);
        assert_eq!(control.character_subset(), 5);
        assert!(control.is_boxed_page());
        assert!(!control.has(ControlBits::UPDATE));
    }

    #[test]
    fn page_code_display() {
        assert_eq!(PageCode::any(0x100).to_string(), "100");
        assert_eq!(PageCode::new(0x1F0, 0x0001).to_string(), "1F0/0001");
    }
}
