//! TOP-Text navigation tables (BTT, MPT and AIT).
//!
//! The Basic TOP Table is always carried on page 1F0. Its rows 21 and 22
//! announce further carrier pages holding the Multi-Page Table and the
//! Additional Information Table.

use log::debug;

use crate::structs::page::{COLUMNS, PageCode, VISIBLE_PAGES, index_to_page_hex, page_hex_to_index};
use crate::utils::errors::TopTextError;
use crate::utils::hamming::{has_odd_parity, unham84};

/// Page carrying the Basic TOP Table.
pub const BTT_PAGE: u16 = 0x1F0;

/// Carrier pages remembered from the BTT page-linking rows.
pub const MAX_EXTRA_PAGES: usize = 10;

pub const TITLE_LENGTH: usize = 12;

const TABLE_ROWS: usize = 20;
const AIT_ROWS: usize = 22;

/// BTT level of one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TopLevel {
    #[default]
    Unreceived,
    /// 0 unused, 1 subtitle, 2/3 programme, 4/5 block, 6/7 group, 8..=0xB normal.
    Level(u8),
}

impl TopLevel {
    /// Any page that can be navigated to.
    pub const fn is_page(self) -> bool {
        matches!(self, Self::Level(2..=0xB))
    }

    pub const fn is_group(self) -> bool {
        matches!(self, Self::Level(6 | 7))
    }

    pub const fn is_block(self) -> bool {
        matches!(self, Self::Level(2..=5))
    }
}

/// Table carried by a TOP page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopTable {
    Btt,
    Mpt,
    Ait,
}

/// One coloured navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopLink {
    /// Red: return to the previously viewed page.
    Back,
    Page { page: u16, title: Option<String> },
    /// The walk reached a BTT entry that has not been received.
    Waiting { index: usize },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopNavigation {
    pub red: TopLink,
    pub green: TopLink,
    pub yellow: TopLink,
    pub blue: TopLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waiting {
    Level(usize),
    Title(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Green = 0,
    Yellow = 1,
    Blue = 2,
}

/// Table coverage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopStats {
    pub levels: usize,
    pub sub_page_counts: usize,
    pub titles: usize,
    pub extra_pages: usize,
}

#[derive(Debug)]
pub struct TopText {
    btt: Vec<TopLevel>,
    mpt: Vec<u8>,
    ait: Vec<Option<[u8; TITLE_LENGTH]>>,
    extra_pages: Vec<(PageCode, TopTable)>,
    next_extra: usize,
    btt_received: bool,
    waiting: [Option<Waiting>; 3],
}

impl Default for TopText {
    fn default() -> Self {
        Self {
            btt: vec![TopLevel::Unreceived; VISIBLE_PAGES],
            mpt: vec![0; VISIBLE_PAGES],
            ait: vec![None; VISIBLE_PAGES],
            extra_pages: Vec::with_capacity(MAX_EXTRA_PAGES),
            next_extra: 0,
            btt_received: false,
            waiting: [None; 3],
        }
    }
}

impl TopText {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Which table, if any, `page` carries.
    pub fn carrier(&self, page: u16) -> Option<TopTable> {
        if page == BTT_PAGE {
            return Some(TopTable::Btt);
        }

        self.extra_pages
            .iter()
            .find(|(code, _)| code.page == page)
            .map(|&(_, table)| table)
    }

    pub fn extra_pages(&self) -> &[(PageCode, TopTable)] {
        &self.extra_pages
    }

    /// Decodes one received row of a TOP carrier page.
    ///
    /// Returns `true` when the row resolved an outstanding navigation wait.
    pub fn decode_row(&mut self, carrier: PageCode, row: usize, bytes: &[u8; COLUMNS]) -> bool {
        match self.carrier(carrier.page) {
            Some(TopTable::Btt) => self.decode_btt_row(row, bytes),
            Some(TopTable::Mpt) => {
                self.decode_mpt_row(row, bytes);
                false
            }
            Some(TopTable::Ait) => self.decode_ait_row(carrier, row, bytes),
            None => false,
        }
    }

    fn decode_btt_row(&mut self, row: usize, bytes: &[u8; COLUMNS]) -> bool {
        match row {
            1..=TABLE_ROWS => {
                let base = (row - 1) * COLUMNS;
                for (offset, &byte) in bytes.iter().enumerate() {
                    if let Ok(level) = unham84(byte) {
                        self.btt[base + offset] = TopLevel::Level(level);
                    }
                }
                self.btt_received = true;

                self.resolve(|waiting| match waiting {
                    Waiting::Level(index) => (base..base + COLUMNS).contains(&index),
                    Waiting::Title(_) => false,
                })
            }
            21 | 22 => {
                for entry in bytes.chunks_exact(8) {
                    self.decode_page_link(entry);
                }
                false
            }
            _ => false,
        }
    }

    /// One 8-nibble BTT page-linking entry: magazine, tens, units, four
    /// sub-code nibbles and the table type.
    fn decode_page_link(&mut self, entry: &[u8]) {
        let mut nibbles = [0u8; 8];
        for (nibble, &byte) in nibbles.iter_mut().zip(entry) {
            match unham84(byte) {
                Ok(value) => *nibble = value,
                Err(_) => return,
            }
        }

        let magazine = match nibbles[0] & 0x7 {
            0 => 8,
            m => m as u16,
        };
        let page = magazine << 8 | (nibbles[1] as u16) << 4 | nibbles[2] as u16;
        if page & 0xFF == 0xFF {
            return;
        }

        let subcode = (nibbles[3] as u16) << 12
            | (nibbles[4] as u16) << 8
            | (nibbles[5] as u16) << 4
            | nibbles[6] as u16;
        let table = match nibbles[7] {
            1 => TopTable::Mpt,
            2 => TopTable::Ait,
            _ => return,
        };

        let code = PageCode::new(page, subcode & 0x3F7F);
        if let Some(existing) = self.extra_pages.iter_mut().find(|(c, _)| c.page == page) {
            *existing = (code, table);
            return;
        }

        debug!("TOP {table:?} carried on page {page:03X}");
        if self.extra_pages.len() < MAX_EXTRA_PAGES {
            self.extra_pages.push((code, table));
        } else {
            self.extra_pages[self.next_extra] = (code, table);
            self.next_extra = (self.next_extra + 1) % MAX_EXTRA_PAGES;
        }
    }

    fn decode_mpt_row(&mut self, row: usize, bytes: &[u8; COLUMNS]) {
        if !(1..=TABLE_ROWS).contains(&row) {
            return;
        }

        let base = (row - 1) * COLUMNS;
        for (offset, &byte) in bytes.iter().enumerate() {
            if let Ok(count) = unham84(byte) {
                self.mpt[base + offset] = count;
            }
        }
    }

    /// Two titles per row, each an 8-byte page reference and 12 characters.
    ///
    /// Characters are only replaced by parity-clean ones.
    fn decode_ait_row(&mut self, carrier: PageCode, row: usize, bytes: &[u8; COLUMNS]) -> bool {
        if !(1..=AIT_ROWS).contains(&row) {
            return false;
        }

        let magazine = carrier.magazine() & 0x7;
        let mut changed = Vec::new();
        for entry in bytes.chunks_exact(20) {
            let Ok(target) = crate::structs::packet::decode_page_link(entry, 0, magazine) else {
                continue;
            };
            let Ok(index) = page_hex_to_index(target.page) else {
                continue;
            };

            let title = self.ait[index].get_or_insert([0x20; TITLE_LENGTH]);
            let mut title_changed = false;
            for (dst, &src) in title.iter_mut().zip(&entry[8..]) {
                if has_odd_parity(src) && *dst != src & 0x7F {
                    *dst = src & 0x7F;
                    title_changed = true;
                }
            }

            if title_changed {
                changed.push(index);
            }
        }

        self.resolve(|waiting| match waiting {
            Waiting::Title(index) => changed.contains(&index),
            Waiting::Level(_) => false,
        })
    }

    fn resolve(&mut self, resolved: impl Fn(Waiting) -> bool) -> bool {
        let mut any = false;
        for slot in self.waiting.iter_mut() {
            if slot.is_some_and(&resolved) {
                *slot = None;
                any = true;
            }
        }

        any
    }

    pub fn level(&self, page: u16) -> Option<TopLevel> {
        page_hex_to_index(page).ok().map(|index| self.btt[index])
    }

    pub fn sub_page_count(&self, page: u16) -> Option<u8> {
        page_hex_to_index(page).ok().map(|index| self.mpt[index])
    }

    /// AIT title of `page`, trimmed.
    pub fn title(&self, page: u16) -> Option<String> {
        let index = page_hex_to_index(page).ok()?;
        let title = self.ait[index]?;
        let text: String = title
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { ' ' })
            .collect();
        let text = text.trim();

        (!text.is_empty()).then(|| text.to_string())
    }

    fn walk(
        &mut self,
        page: u16,
        slot: Slot,
        wanted: fn(TopLevel) -> bool,
    ) -> Result<Option<u16>, TopTextError> {
        let start = page_hex_to_index(page).map_err(|_| TopTextError::NotTopPage)?;
        if !self.btt_received {
            return Err(TopTextError::NotTopPage);
        }

        for step in 1..VISIBLE_PAGES {
            let index = (start + step) % VISIBLE_PAGES;
            match self.btt[index] {
                TopLevel::Unreceived => {
                    self.waiting[slot as usize] = Some(Waiting::Level(index));
                    return Err(TopTextError::Unreceived { index });
                }
                level if wanted(level) => return Ok(index_to_page_hex(index).ok()),
                _ => {}
            }
        }

        Ok(None)
    }

    /// Next navigable page after `page`.
    pub fn next_page(&mut self, page: u16) -> Result<Option<u16>, TopTextError> {
        self.walk(page, Slot::Green, TopLevel::is_page)
    }

    /// First page of the next group after `page`.
    pub fn next_group(&mut self, page: u16) -> Result<Option<u16>, TopTextError> {
        self.walk(page, Slot::Yellow, TopLevel::is_group)
    }

    /// First page of the next block after `page`.
    pub fn next_block(&mut self, page: u16) -> Result<Option<u16>, TopTextError> {
        self.walk(page, Slot::Blue, TopLevel::is_block)
    }

    fn link(
        &mut self,
        result: Result<Option<u16>, TopTextError>,
        slot: Slot,
        titled: bool,
    ) -> TopLink {
        match result {
            Ok(Some(page)) => {
                let title = if titled { self.title(page) } else { None };
                if titled && title.is_none() {
                    if let Ok(index) = page_hex_to_index(page) {
                        self.waiting[slot as usize] = Some(Waiting::Title(index));
                    }
                }
                TopLink::Page { page, title }
            }
            Ok(None) => TopLink::None,
            Err(TopTextError::Unreceived { index }) => TopLink::Waiting { index },
            Err(TopTextError::NotTopPage) => TopLink::None,
        }
    }

    /// Colour-key targets for `page` derived from the BTT.
    pub fn navigation(&mut self, page: u16) -> Result<TopNavigation, TopTextError> {
        page_hex_to_index(page).map_err(|_| TopTextError::NotTopPage)?;
        if !self.btt_received {
            return Err(TopTextError::NotTopPage);
        }

        let green = self.next_page(page);
        let green = self.link(green, Slot::Green, false);
        let yellow = self.next_group(page);
        let yellow = self.link(yellow, Slot::Yellow, true);
        let blue = self.next_block(page);
        let blue = self.link(blue, Slot::Blue, true);

        Ok(TopNavigation {
            red: TopLink::Back,
            green,
            yellow,
            blue,
        })
    }

    /// Row 24 replacement showing the TOP colour keys for `page`.
    pub fn comment_row(&mut self, page: u16) -> Result<[u8; COLUMNS], TopTextError> {
        let navigation = self.navigation(page)?;

        let mut row = [0x20; COLUMNS];
        let keys = [
            (0x01, &navigation.red),
            (0x02, &navigation.green),
            (0x03, &navigation.yellow),
            (0x06, &navigation.blue),
        ];
        for (segment, (colour, link)) in row.chunks_exact_mut(COLUMNS / 4).zip(keys) {
            let label = match link {
                TopLink::Back => "<<".to_string(),
                TopLink::Page { title: Some(title), .. } => title.clone(),
                TopLink::Page { page, title: None } => format!("{page:03X}"),
                TopLink::Waiting { .. } => "...".to_string(),
                TopLink::None => continue,
            };

            segment[0] = colour;
            for (dst, src) in segment[1..].iter_mut().zip(label.bytes()) {
                *dst = src;
            }
        }

        Ok(row)
    }

    pub fn stats(&self) -> TopStats {
        TopStats {
            levels: self
                .btt
                .iter()
                .filter(|level| **level != TopLevel::Unreceived)
                .count(),
            sub_page_counts: self.mpt.iter().filter(|&&count| count > 0).count(),
            titles: self.ait.iter().filter(|title| title.is_some()).count(),
            extra_pages: self.extra_pages.len(),
        }
    }
}
