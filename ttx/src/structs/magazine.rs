//! Per-magazine reception buffers.

use crate::structs::packet::{FlofLinks, HEADER_SIZE, PageHeader};
use crate::structs::page::{COLUMNS, ControlBits, PageCode};

pub const MAGAZINES: usize = 8;

/// Body rows carried by packets 1..=25.
pub const BODY_LINES: usize = 25;

/// Result of storing a body or link packet into an open reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    Stored,
    /// The packet repeated one already received: a header was missed and the
    /// reception is now closed and pending merge.
    Closed,
    /// No reception is open for this magazine.
    Idle,
}

/// Page being assembled in one magazine.
#[derive(Debug, Clone)]
pub struct MagazineState {
    pub code: PageCode,
    pub control: ControlBits,
    pub character_subset: u8,
    pub character_region: u8,
    pub header: [u8; HEADER_SIZE],
    pub lines: [[u8; COLUMNS]; BODY_LINES],
    pub line_received: [bool; BODY_LINES],
    pub links: [Option<PageCode>; 6],
    /// Bits 0..5 per received link, plus the row-24 show/hide flags.
    pub link_received: u8,
    pub receiving: bool,
    pub new_data: bool,
}

impl Default for MagazineState {
    fn default() -> Self {
        Self {
            code: PageCode::default(),
            control: ControlBits::default(),
            character_subset: 0,
            character_region: 0,
            header: [0x20; HEADER_SIZE],
            lines: [[0x20; COLUMNS]; BODY_LINES],
            line_received: [false; BODY_LINES],
            links: [None; 6],
            link_received: 0,
            receiving: false,
            new_data: false,
        }
    }
}

impl MagazineState {
    /// Starts a new reception from a page header.
    pub fn open(&mut self, header: &PageHeader, header_bytes: &[u8]) {
        self.receiving = true;
        self.new_data = false;
        self.code = header.code;
        self.control = header.control;
        self.character_subset = header.control.character_subset();
        self.header.copy_from_slice(&header_bytes[..HEADER_SIZE]);
        self.line_received = [false; BODY_LINES];
        self.link_received = 0;
    }

    /// Drops any open reception without merging it.
    pub fn close(&mut self) {
        self.receiving = false;
        self.new_data = false;
    }

    /// Takes a closed or still open reception for merging, leaving the
    /// magazine idle.
    pub fn take_pending(&mut self) -> Option<MagazineState> {
        if !self.receiving && !self.new_data {
            return None;
        }

        self.close();
        Some(self.clone())
    }

    fn close_for_merge(&mut self) -> Reception {
        self.receiving = false;
        self.new_data = true;
        Reception::Closed
    }

    /// Stores packet `row` (1..=25) unless that row was already received.
    pub fn store_line(&mut self, row: usize, bytes: &[u8]) -> Reception {
        if !self.receiving {
            return Reception::Idle;
        }

        let line = row - 1;
        if self.line_received[line] {
            return self.close_for_merge();
        }

        self.lines[line].copy_from_slice(&bytes[..COLUMNS]);
        self.line_received[line] = true;
        Reception::Stored
    }

    /// Stores packet X/27/0 unless links were already received.
    pub fn store_links(&mut self, flof: &FlofLinks) -> Reception {
        if !self.receiving {
            return Reception::Idle;
        }

        if self.link_received != 0 {
            return self.close_for_merge();
        }

        for (slot, link) in self.links.iter_mut().zip(flof.links) {
            if link.is_some() {
                *slot = link;
            }
        }
        self.link_received = flof.received_mask();
        Reception::Stored
    }

    pub fn lines_received(&self) -> usize {
        self.line_received.iter().filter(|&&r| r).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_state() -> MagazineState {
        let mut state = MagazineState::default();
        let header = PageHeader {
            code: PageCode::new(0x100, 0),
            control: ControlBits(0x0801),
        };
        state.open(&header, &[b'H'; HEADER_SIZE]);
        state
    }

    #[test]
    fn duplicate_line_closes_reception() {
        let mut state = open_state();
        assert_eq!(state.character_subset, 1);
        assert_eq!(state.store_line(1, &[b'A'; COLUMNS]), Reception::Stored);
        assert_eq!(state.store_line(2, &[b'B'; COLUMNS]), Reception::Stored);
        assert_eq!(state.store_line(1, &[b'C'; COLUMNS]), Reception::Closed);

        assert!(!state.receiving);
        assert!(state.new_data);
        assert_eq!(state.lines[0], [b'A'; COLUMNS]);
        assert_eq!(state.lines_received(), 2);

        let pending = state.take_pending().unwrap();
        assert_eq!(pending.code, PageCode::new(0x100, 0));
        assert!(state.take_pending().is_none());
        assert_eq!(state.store_line(3, &[b'D'; COLUMNS]), Reception::Idle);
    }

    #[test]
    fn duplicate_links_close_reception() {
        let mut state = open_state();
        let flof = FlofLinks {
            links: [Some(PageCode::new(0x200, 0)), None, None, None, None, None],
            show_row24: Some(true),
        };
        assert_eq!(state.store_links(&flof), Reception::Stored);
        assert_eq!(state.links[0], Some(PageCode::new(0x200, 0)));
        assert_eq!(state.store_links(&flof), Reception::Closed);
    }
}
