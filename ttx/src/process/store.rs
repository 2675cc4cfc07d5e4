//! Page cache: bucketed page storage, the magazine merge and display queries.

use log::debug;

use crate::process::event::DecoderEvent;
use crate::structs::magazine::MagazineState;
use crate::structs::packet::{LINK_HIDE_ROW24, LINK_SHOW_ROW24};
use crate::structs::page::{
    COLUMNS, ControlBits, Page, PageCode, ROWS, VISIBLE_PAGES, circular_distance,
    index_to_page_hex, is_non_visible, line_state, page_hex_to_index,
};
use crate::utils::errors::{PacketError, PageCodeError};
use crate::utils::hamming::{check_parity, has_odd_parity};

/// Maximum number of sub-pages kept per bucket before slots are recycled.
pub const MAX_PAGE_LIST: usize = 64;

/// Default size of the caching window around the current page.
pub const DEFAULT_MAX_PAGE_NUM: usize = 100;

/// Policy for overwriting rows that were already cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachingControl {
    /// Overwrite on update, on missing data or over an errored copy.
    #[default]
    Normal,
    /// Additionally overwrite whenever the new copy is parity clean.
    SecondChance,
    /// Always overwrite.
    AlwaysUpdate,
}

enum Slot {
    Hit(usize),
    Spare(usize),
}

type Bucket = Vec<Box<Page>>;

/// Entries that are in use; everything after the first spare slot is stale.
fn reserved(bucket: &Bucket) -> impl Iterator<Item = &Box<Page>> {
    bucket.iter().take_while(|page| page.reserved)
}

fn reserved_mut(bucket: &mut Bucket) -> impl Iterator<Item = &mut Box<Page>> {
    bucket.iter_mut().take_while(|page| page.reserved)
}

/// Closest sub-page of `code.page` after (or before) `code.subcode`.
fn next_sub_page(bucket: &Bucket, code: PageCode, reverse: bool) -> Option<usize> {
    let candidates = bucket
        .iter()
        .enumerate()
        .take_while(|(_, page)| page.reserved)
        .filter(|(_, page)| page.received && page.code.page == code.page);

    if reverse {
        candidates
            .filter(|(_, page)| page.code.subcode < code.subcode)
            .max_by_key(|(_, page)| page.code.subcode)
            .map(|(i, _)| i)
    } else {
        candidates
            .filter(|(_, page)| page.code.subcode > code.subcode)
            .min_by_key(|(_, page)| page.code.subcode)
            .map(|(i, _)| i)
    }
}

/// Display copy of a cached page with parity bits stripped.
///
/// Bytes that failed parity become spaces when `substitute` is set or when the
/// masked value would be a control code.
fn display_copy(page: &Page, substitute: bool) -> Page {
    let mut copy = page.clone();
    for row in copy.frame.iter_mut() {
        for byte in row.iter_mut() {
            let masked = *byte & 0x7F;
            *byte = if has_odd_parity(*byte) || (!substitute && masked >= 0x20) {
                masked
            } else {
                0x20
            };
        }
    }
    copy.received = true;

    copy
}

#[derive(Debug)]
struct PageLists {
    visible: Vec<Bucket>,
    non_visible: Bucket,
}

impl PageLists {
    fn new() -> Self {
        Self {
            visible: (0..VISIBLE_PAGES).map(|_| Vec::new()).collect(),
            non_visible: Vec::new(),
        }
    }

    fn bucket(&self, page: u16) -> Option<&Bucket> {
        if is_non_visible(page) {
            return Some(&self.non_visible);
        }
        page_hex_to_index(page).ok().map(|i| &self.visible[i])
    }

    fn bucket_mut(&mut self, page: u16) -> Option<&mut Bucket> {
        if is_non_visible(page) {
            return Some(&mut self.non_visible);
        }
        page_hex_to_index(page).ok().map(|i| &mut self.visible[i])
    }

    /// Finds the slot for `code`, creating it when asked.
    ///
    /// Hits and new slots are moved to the front of their bucket. Once a
    /// bucket holds [`MAX_PAGE_LIST`] pages its last one is recycled.
    fn lookup(&mut self, code: PageCode, create: bool) -> Option<&mut Page> {
        let bucket = self.bucket_mut(code.page)?;

        let slot = bucket
            .iter()
            .enumerate()
            .find_map(|(i, page)| {
                if !page.reserved {
                    Some(Slot::Spare(i))
                } else if page.code == code {
                    Some(Slot::Hit(i))
                } else if i + 1 >= MAX_PAGE_LIST {
                    Some(Slot::Spare(i))
                } else {
                    None
                }
            })
            .unwrap_or(Slot::Spare(bucket.len()));

        match slot {
            Slot::Hit(i) if create => {
                bucket[..=i].rotate_right(1);
                Some(bucket[0].as_mut())
            }
            Slot::Hit(i) => Some(bucket[i].as_mut()),
            Slot::Spare(_) if !create => None,
            Slot::Spare(i) => {
                if i == bucket.len() {
                    bucket.push(Box::default());
                }
                bucket[..=i].rotate_right(1);

                let page: &mut Page = &mut bucket[0];
                page.reserved = true;
                page.initialize(code);
                Some(page)
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.visible.iter().chain(std::iter::once(&self.non_visible))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Bucket> {
        self.visible
            .iter_mut()
            .chain(std::iter::once(&mut self.non_visible))
    }
}

/// The page cache together with the viewer state it depends on.
#[derive(Debug)]
pub struct PageStore {
    lists: PageLists,
    received_pages: usize,
    current_page: u16,
    waiting_page: Option<u16>,
    max_page_num: usize,
    caching: CachingControl,
    substitute_spaces: bool,
}

impl Default for PageStore {
    fn default() -> Self {
        Self {
            lists: PageLists::new(),
            received_pages: 0,
            current_page: 0x100,
            waiting_page: None,
            max_page_num: DEFAULT_MAX_PAGE_NUM,
            caching: CachingControl::Normal,
            substitute_spaces: false,
        }
    }
}

impl PageStore {
    pub fn new(
        current_page: u16,
        max_page_num: usize,
        caching: CachingControl,
        substitute_spaces: bool,
    ) -> Self {
        Self {
            current_page,
            max_page_num,
            caching,
            substitute_spaces,
            ..Default::default()
        }
    }

    pub fn current_page(&self) -> u16 {
        self.current_page
    }

    pub fn waiting_page(&self) -> Option<u16> {
        self.waiting_page
    }

    pub fn set_waiting_page(&mut self, page: u16, enabled: bool) {
        self.waiting_page = enabled.then_some(page);
    }

    pub fn set_caching_control(&mut self, caching: CachingControl) {
        self.caching = caching;
    }

    pub fn set_substitute_spaces(&mut self, substitute: bool) {
        self.substitute_spaces = substitute;
    }

    pub fn set_max_page_num(&mut self, max_page_num: usize) {
        self.max_page_num = max_page_num;
    }

    pub fn received_pages(&self) -> usize {
        self.received_pages
    }

    /// Moves the caching window; pages outside it are freed.
    pub fn set_current_page(&mut self, page: u16) -> Result<(), PageCodeError> {
        page_hex_to_index(page)?;

        if self.current_page != page {
            self.current_page = page;
            self.evict_outside_window();
            self.waiting_page = None;
        }

        Ok(())
    }

    /// Rejects visible pages too far from the current page to be cached.
    pub fn check_in_window(&self, page: u16) -> Result<(), PacketError> {
        if is_non_visible(page) {
            return Ok(());
        }

        let (Ok(center), Ok(index)) = (
            page_hex_to_index(self.current_page),
            page_hex_to_index(page),
        ) else {
            return Err(PacketError::OutOfWindow { page });
        };

        if circular_distance(center, index) > self.max_page_num / 2 {
            return Err(PacketError::OutOfWindow { page });
        }

        Ok(())
    }

    fn evict_outside_window(&mut self) {
        let Ok(center) = page_hex_to_index(self.current_page) else {
            return;
        };

        let half = self.max_page_num / 2;
        let mut freed = 0;
        for (index, bucket) in self.lists.visible.iter_mut().enumerate() {
            if !bucket.is_empty() && circular_distance(center, index) > half {
                freed += bucket.len();
                *bucket = Vec::new();
            }
        }

        if freed > 0 {
            debug!(
                "Freed {freed} cached pages outside the window around {:03X}",
                self.current_page
            );
        }
    }

    /// Recycles every page without freeing memory.
    pub fn reset(&mut self) {
        for bucket in self.lists.iter_mut() {
            for page in bucket.iter_mut() {
                page.received = false;
                page.reserved = false;
            }
        }
        self.received_pages = 0;
        self.waiting_page = None;
    }

    /// Folds a finished reception into the cache.
    ///
    /// Returns the events to raise once the store lock is released.
    pub fn merge(&mut self, state: &MagazineState) -> Vec<DecoderEvent> {
        let caching = self.caching;
        let Some(page) = self.lists.lookup(state.code, true) else {
            return Vec::new();
        };

        let control = state.control;
        let erase = control.has(ControlBits::ERASE_PAGE)
            || !page.received
            || control.has(ControlBits::INHIBIT_DISPLAY);
        let mut flush = erase || control.has(ControlBits::UPDATE);

        let mut lines_added = false;
        let mut changed = false;

        if control.has(ControlBits::SUPPRESS_HEADER) {
            if page.has_data(0) {
                page.frame[0][8..].fill(0x20);
                page.line_state[0] = line_state::UPDATED;
                changed = true;
            }
        } else {
            let clean = check_parity(&state.header);
            if flush
                || caching == CachingControl::AlwaysUpdate
                || !page.has_data(0)
                || page.has_error(0)
            {
                page.line_state[0] = line_state::HAS_DATA | line_state::UPDATED;
                if !clean {
                    page.line_state[0] |= line_state::HAS_ERROR;
                }
                page.frame[0][8..].copy_from_slice(&state.header);
                changed = true;
            } else if caching == CachingControl::SecondChance && clean {
                page.line_state[0] = line_state::HAS_DATA | line_state::UPDATED;
                page.frame[0][8..].copy_from_slice(&state.header);
                changed = true;
            }
        }

        // Broadcasters do not always set the update bit on subtitles
        if control.has(ControlBits::SUBTITLE) || caching == CachingControl::AlwaysUpdate {
            flush = true;
        }

        for row in 1..ROWS {
            let line = row - 1;
            if state.line_received[line] && !control.has(ControlBits::INHIBIT_DISPLAY) {
                let clean = check_parity(&state.lines[line]);
                if flush || !page.has_data(row) || page.has_error(row) {
                    page.line_state[row] = line_state::HAS_DATA | line_state::UPDATED;
                    if !clean {
                        page.line_state[row] |= line_state::HAS_ERROR;
                    }
                    page.frame[row] = state.lines[line];
                    lines_added = true;
                } else if caching == CachingControl::SecondChance && clean {
                    page.line_state[row] = line_state::HAS_DATA | line_state::UPDATED;
                    page.frame[row] = state.lines[line];
                    lines_added = true;
                }
            } else if erase && page.has_data(row) {
                page.frame[row] = [0x20; COLUMNS];
                page.line_state[row] = line_state::UPDATED;
                changed = true;
            }
        }

        for (n, link) in state.links.iter().enumerate() {
            if state.link_received & (1 << n) != 0 {
                page.editorial_links[n] = *link;
            }
        }

        if state.link_received & LINK_SHOW_ROW24 != 0 {
            page.show_row24 = true;
        } else if state.link_received & LINK_HIDE_ROW24 != 0 {
            page.show_row24 = false;
        }

        // Boxed-only filtering depends on these bits
        let boxed = ControlBits::NEWSFLASH | ControlBits::SUBTITLE;
        if control.0 & boxed != page.control.0 & boxed {
            // Row 25 carries no display text
            for flags in page.line_state[..ROWS - 1].iter_mut() {
                *flags |= line_state::UPDATED;
            }
        }

        page.control = control;
        page.character_subset = state.character_subset;
        page.character_region = state.character_region;

        if !page.received {
            // Not worth keeping a page that came with no display lines
            if !lines_added {
                return Vec::new();
            }

            page.received = true;
            self.received_pages += 1;
        }

        let mut events = Vec::new();
        if state.code.page == self.current_page {
            events.push(if lines_added || changed {
                DecoderEvent::PageUpdate(state.code)
            } else {
                DecoderEvent::PageRefresh(state.code)
            });
        }

        if self.waiting_page == Some(state.code.page) {
            events.push(DecoderEvent::WaitingPageResolved(state.code));
            self.waiting_page = None;
        }

        events
    }

    /// Display copy of a page; any sub-page when the sub-code is
    /// [`SUBCODE_ANY`](crate::structs::page::SUBCODE_ANY) or above.
    ///
    /// Reading a page clears its `UPDATED` row flags.
    pub fn get_display_page(&mut self, code: PageCode) -> Option<Page> {
        if code.is_filler() {
            return None;
        }

        let substitute = self.substitute_spaces;
        let bucket = self.lists.bucket_mut(code.page)?;
        let page = reserved_mut(bucket).find(|page| {
            page.received
                && if code.is_any_subcode() {
                    page.code.page == code.page
                } else {
                    page.code == code
                }
        })?;

        let copy = display_copy(page, substitute);
        page.clear_updated();
        Some(copy)
    }

    fn read_at(&mut self, page: u16, position: usize) -> Option<Page> {
        let substitute = self.substitute_spaces;
        let page = self.lists.bucket_mut(page)?.get_mut(position)?;
        let copy = display_copy(page, substitute);
        page.clear_updated();
        Some(copy)
    }

    fn first_received(&self, index: usize) -> Option<usize> {
        reserved(&self.lists.visible[index]).position(|page| page.received)
    }

    /// Next (or previous) received page-hex, wrapping around 100..=899.
    pub fn get_next_display_page(&mut self, code: PageCode, reverse: bool) -> Option<Page> {
        let (start, mut found) = match page_hex_to_index(code.page) {
            Ok(index) => (index, None),
            Err(_) => {
                // Start from the closest visible page
                let base = if is_non_visible(code.page) {
                    ((code.page >> 8) & 0xF) as usize * 100
                } else {
                    VISIBLE_PAGES
                };
                let start = (if reverse { base + VISIBLE_PAGES - 1 } else { base }) % VISIBLE_PAGES;
                (start, self.first_received(start).map(|pos| (start, pos)))
            }
        };

        if found.is_none() {
            found = (1..VISIBLE_PAGES).find_map(|step| {
                let index = if reverse {
                    (start + VISIBLE_PAGES - step) % VISIBLE_PAGES
                } else {
                    (start + step) % VISIBLE_PAGES
                };
                self.first_received(index).map(|pos| (index, pos))
            });
        }

        let (index, position) = found?;
        let page = index_to_page_hex(index).ok()?;
        self.read_at(page, position)
    }

    /// Next (or previous) sub-page; moves on to the neighbouring page-hex when
    /// the current one has no further sub-pages.
    pub fn get_next_display_sub_page(&mut self, code: PageCode, reverse: bool) -> Option<Page> {
        let index = page_hex_to_index(code.page);
        if index.is_err() && !is_non_visible(code.page) {
            return None;
        }

        let bucket = self.lists.bucket(code.page)?;
        if let Some(position) = next_sub_page(bucket, code, reverse) {
            return self.read_at(code.page, position);
        }

        // Non-visible pages have no neighbours to wrap to
        let start = index.ok()?;

        let (next_index, fallback) = (1..VISIBLE_PAGES).find_map(|step| {
            let i = if reverse {
                (start + VISIBLE_PAGES - step) % VISIBLE_PAGES
            } else {
                (start + step) % VISIBLE_PAGES
            };
            self.first_received(i).map(|pos| (i, pos))
        })?;

        let next_hex = index_to_page_hex(next_index).ok()?;
        let bucket = &self.lists.visible[next_index];
        let edge = PageCode::new(next_hex, if reverse { u16::MAX } else { 0 });
        let position = reserved(bucket)
            .position(|page| page.received && page.code == edge)
            .or_else(|| next_sub_page(bucket, edge, reverse))
            .unwrap_or(fallback);

        if bucket[position].code == code {
            return None;
        }

        self.read_at(next_hex, position)
    }

    /// Page-hex of every visible page with a received sub-page, in order.
    pub fn visible_page_numbers(&self, limit: usize) -> Vec<u16> {
        self.lists
            .visible
            .iter()
            .filter_map(|bucket| reserved(bucket).find(|page| page.received))
            .map(|page| page.code.page)
            .take(limit)
            .collect()
    }

    /// Deduplicated page-hex of received non-visible pages.
    pub fn non_visible_page_numbers(&self, limit: usize) -> Vec<u16> {
        let mut numbers: Vec<u16> = Vec::new();
        for page in reserved(&self.lists.non_visible).filter(|page| page.received) {
            if numbers.len() >= limit {
                break;
            }
            if !numbers.contains(&page.code.page) {
                numbers.push(page.code.page);
            }
        }

        numbers
    }

    /// Codes of every received page and sub-page, sorted.
    pub fn received_page_codes(&self) -> Vec<PageCode> {
        let mut codes: Vec<PageCode> = self
            .lists
            .iter()
            .flat_map(|bucket| reserved(bucket).filter(|page| page.received))
            .map(|page| page.code)
            .collect();
        codes.sort();

        codes
    }
}
