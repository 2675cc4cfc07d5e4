use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, trace};

use crate::process::event::{DecoderEvent, EventSink, dispatch};
use crate::process::store::{CachingControl, DEFAULT_MAX_PAGE_NUM, PageStore};
use crate::process::toptext::{TopNavigation, TopStats, TopText};
use crate::structs::magazine::{MAGAZINES, MagazineState, Reception};
use crate::structs::packet::{
    FlofLinks, HEADER_OFFSET, HEADER_SIZE, LINE_OFFSET, PACKET_SIZE, PacketAddress, PageHeader,
    ServicePacket, decode_character_region,
};
use crate::structs::page::{
    COLUMNS, ControlBits, LinkSlot, Page, PageCode, is_non_visible, line_state, page_hex_to_index,
};
use crate::structs::service_data::ServiceData;
use crate::utils::errors::{PacketError, PageCodeError, TopTextError};
use crate::utils::hamming::{REVERSE, check_parity, has_odd_parity};

/// Settings applied when a [`Decoder`] is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub caching: CachingControl,
    /// Width of the caching window around the current page, in pages.
    pub max_page_num: usize,
    /// Show bytes that failed parity as spaces.
    pub substitute_spaces: bool,
    /// Current page at start-up; centre of the caching window.
    pub initial_page: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            caching: CachingControl::Normal,
            max_page_num: DEFAULT_MAX_PAGE_NUM,
            substitute_spaces: false,
            initial_page: 0x100,
        }
    }
}

/// Colour-key targets of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationLinks {
    /// Editorial links in red, green, yellow, blue order.
    Flof([Option<PageCode>; 4]),
    Top(TopNavigation),
    None,
}

/// Packet counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub packets: u64,
    /// Packets dropped for an uncorrectable structural field.
    pub errors: u64,
    /// Page headers outside the caching window.
    pub out_of_window: u64,
    /// Packets per 3-bit magazine number; index 0 is magazine 8.
    pub magazine_packets: [u64; MAGAZINES],
}

#[derive(Debug, Default)]
struct Counters {
    packets: AtomicU64,
    errors: AtomicU64,
    out_of_window: AtomicU64,
    magazine_packets: [AtomicU64; MAGAZINES],
}

#[derive(Debug, Default)]
struct Magazines {
    states: [MagazineState; MAGAZINES],
    last_magazine: Option<u8>,
    serial: bool,
}

/// Guarded regions are plain data and stay usable after a poisoning panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Teletext decoder context.
///
/// One thread feeds packets through [`decode_packet`](Self::decode_packet)
/// while others query pages. Each data region has its own lock and no lock is
/// taken while another is held; events are raised after all of them have been
/// released.
pub struct Decoder {
    common_header: Mutex<[u8; HEADER_SIZE]>,
    magazines: Mutex<Magazines>,
    store: Mutex<PageStore>,
    service: Mutex<ServiceData>,
    top: Mutex<TopText>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    counters: Counters,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::with_store(PageStore::default())
    }
}

impl Decoder {
    /// Creates a decoder; fails when the initial page is not a valid page-hex.
    pub fn new(config: DecoderConfig) -> Result<Self, PageCodeError> {
        page_hex_to_index(config.initial_page)?;

        Ok(Self::with_store(PageStore::new(
            config.initial_page,
            config.max_page_num,
            config.caching,
            config.substitute_spaces,
        )))
    }

    fn with_store(store: PageStore) -> Self {
        Self {
            common_header: Mutex::new([0x20; HEADER_SIZE]),
            magazines: Mutex::new(Magazines::default()),
            store: Mutex::new(store),
            service: Mutex::new(ServiceData::default()),
            top: Mutex::new(TopText::default()),
            sink: RwLock::new(None),
            counters: Counters::default(),
        }
    }

    /// Registers the receiver of decoder events, replacing any previous one.
    pub fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    fn raise(&self, events: impl IntoIterator<Item = DecoderEvent>) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(sink) = sink else {
            return;
        };
        for event in events {
            dispatch(sink.as_ref(), event);
        }
    }

    /// Decodes one 42-byte packet in PES bit orientation (MSB first).
    ///
    /// Errors report packets that were dropped; the decoder state stays
    /// consistent and decoding can continue with the next packet.
    pub fn decode_packet(&self, packet: &[u8; PACKET_SIZE]) -> Result<(), PacketError> {
        self.counters.packets.fetch_add(1, Ordering::Relaxed);

        let data = packet.map(|b| REVERSE[b as usize]);
        let result = self.decode_transmission(&data);

        match result {
            Err(PacketError::OutOfWindow { .. }) => {
                self.counters.out_of_window.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                trace!("Dropping packet: {e}");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
            Ok(()) => {}
        }

        result
    }

    fn decode_transmission(&self, data: &[u8; PACKET_SIZE]) -> Result<(), PacketError> {
        let address = PacketAddress::decode(data)?;
        self.counters.magazine_packets[address.magazine as usize].fetch_add(1, Ordering::Relaxed);

        match address.packet {
            0 => self.decode_header(address.magazine, data),
            row @ 1..=25 => {
                self.decode_line(address.magazine, row as usize, data);
                Ok(())
            }
            27 => {
                if address.designation_code(data)? == Some(0) {
                    self.decode_links(address.magazine, data);
                }
                Ok(())
            }
            28 | 29 => {
                if matches!(address.designation_code(data)?, Some(0 | 4)) {
                    let region = decode_character_region(data).map_err(PacketError::Enhancement)?;
                    let mut magazines = lock(&self.magazines);
                    magazines.states[address.magazine as usize].character_region = region;
                }
                Ok(())
            }
            30 if address.magazine == 0 => {
                let designation = address.designation_code(data)?.unwrap_or(0);
                if designation & 0x0C == 0 {
                    let packet = ServicePacket::decode(designation, data);
                    lock(&self.service).update(&packet);
                }
                Ok(())
            }
            // Enhancement data and independent data services
            _ => Ok(()),
        }
    }

    fn decode_header(&self, magazine: u8, data: &[u8; PACKET_SIZE]) -> Result<(), PacketError> {
        let header = PageHeader::decode(magazine, data)?;
        let header_bytes = &data[HEADER_OFFSET..HEADER_OFFSET + HEADER_SIZE];

        let pending = {
            let mut magazines = lock(&self.magazines);
            let ending = match magazines.last_magazine {
                Some(last) if magazines.serial => last,
                _ => magazine,
            };
            let pending = magazines.states[ending as usize].take_pending();
            magazines.states[magazine as usize].close();
            pending
        };

        if let Some(state) = pending {
            self.complete(state);
        }

        let current_page = {
            let store = lock(&self.store);
            store.check_in_window(header.code.page)?;
            store.current_page()
        };

        let control = header.control;
        lock(&self.magazines).serial = control.has(ControlBits::MAGAZINE_SERIAL);

        if header.code.is_filler() {
            self.raise([DecoderEvent::HeaderUpdate(header.code)]);
            return Ok(());
        }

        let rolling = !is_non_visible(header.code.page)
            && !control.has(ControlBits::SUPPRESS_HEADER | ControlBits::INTERRUPTED)
            && check_parity(header_bytes);
        if rolling {
            lock(&self.common_header).copy_from_slice(header_bytes);
        }

        {
            let mut magazines = lock(&self.magazines);
            magazines.states[magazine as usize].open(&header, header_bytes);
            magazines.last_magazine = Some(magazine);
        }

        if rolling && header.code.page == current_page {
            self.raise([DecoderEvent::HeaderUpdate(header.code)]);
        }

        Ok(())
    }

    fn decode_line(&self, magazine: u8, row: usize, data: &[u8; PACKET_SIZE]) {
        let pending = {
            let mut magazines = lock(&self.magazines);
            let state = &mut magazines.states[magazine as usize];
            match state.store_line(row, &data[LINE_OFFSET..]) {
                Reception::Closed => {
                    debug!("Row {row} repeated on page {}, header missed", state.code);
                    state.take_pending()
                }
                Reception::Stored | Reception::Idle => None,
            }
        };

        if let Some(state) = pending {
            self.complete(state);
        }
    }

    fn decode_links(&self, magazine: u8, data: &[u8; PACKET_SIZE]) {
        let links = FlofLinks::decode(magazine, data);

        let pending = {
            let mut magazines = lock(&self.magazines);
            let state = &mut magazines.states[magazine as usize];
            match state.store_links(&links) {
                Reception::Closed => {
                    debug!("Links repeated on page {}, header missed", state.code);
                    state.take_pending()
                }
                Reception::Stored | Reception::Idle => None,
            }
        };

        if let Some(state) = pending {
            self.complete(state);
        }
    }

    /// Merges a finished reception and raises the resulting events.
    fn complete(&self, state: MagazineState) {
        let mut events = lock(&self.store).merge(&state);

        if self.decode_top_rows(&state) {
            events.push(DecoderEvent::WaitingPageResolved(state.code));
        }

        self.raise(events);
    }

    /// Feeds the rows of a TOP table carrier; `true` when a wait resolved.
    fn decode_top_rows(&self, state: &MagazineState) -> bool {
        let mut top = lock(&self.top);
        if top.carrier(state.code.page).is_none() {
            return false;
        }

        let mut resolved = false;
        for (line, bytes) in state.lines.iter().enumerate() {
            if state.line_received[line] {
                resolved |= top.decode_row(state.code, line + 1, bytes);
            }
        }

        resolved
    }

    /// Display copy of a received page; see [`PageStore::get_display_page`].
    pub fn get_display_page(&self, code: PageCode) -> Option<Page> {
        lock(&self.store).get_display_page(code)
    }

    pub fn get_next_display_page(&self, code: PageCode, reverse: bool) -> Option<Page> {
        lock(&self.store).get_next_display_page(code, reverse)
    }

    pub fn get_next_display_sub_page(&self, code: PageCode, reverse: bool) -> Option<Page> {
        lock(&self.store).get_next_display_sub_page(code, reverse)
    }

    /// Writes the rolling header into row 0 of `page`.
    ///
    /// With `clock_only` only the last 8 columns (the clock) are replaced.
    pub fn display_header(&self, page: &mut Page, clock_only: bool) {
        let header = *lock(&self.common_header);

        let start = if clock_only { HEADER_SIZE - 8 } else { 0 };
        let offset = COLUMNS - HEADER_SIZE;
        for (column, &byte) in header.iter().enumerate().skip(start) {
            page.frame[0][offset + column] = if has_odd_parity(byte) { byte & 0x7F } else { 0x20 };
        }
        page.line_state[0] |= line_state::HAS_DATA | line_state::UPDATED;
    }

    /// Synthesized row 24 with TOP-Text colour keys for `page`.
    pub fn display_comment(&self, page: u16) -> Result<[u8; COLUMNS], TopTextError> {
        lock(&self.top).comment_row(page)
    }

    /// FLOF links of `page` when it carries any, otherwise TOP-Text
    /// navigation.
    pub fn navigation_links(&self, page: &Page) -> NavigationLinks {
        if page.has_flof_links() {
            return NavigationLinks::Flof([
                page.link(LinkSlot::Red),
                page.link(LinkSlot::Green),
                page.link(LinkSlot::Yellow),
                page.link(LinkSlot::Blue),
            ]);
        }

        match lock(&self.top).navigation(page.code.page) {
            Ok(navigation) => NavigationLinks::Top(navigation),
            Err(_) => NavigationLinks::None,
        }
    }

    pub fn top_navigation(&self, page: u16) -> Result<TopNavigation, TopTextError> {
        lock(&self.top).navigation(page)
    }

    pub fn next_page(&self, page: u16) -> Result<Option<u16>, TopTextError> {
        lock(&self.top).next_page(page)
    }

    pub fn next_group(&self, page: u16) -> Result<Option<u16>, TopTextError> {
        lock(&self.top).next_group(page)
    }

    pub fn next_block(&self, page: u16) -> Result<Option<u16>, TopTextError> {
        lock(&self.top).next_block(page)
    }

    pub fn top_title(&self, page: u16) -> Option<String> {
        lock(&self.top).title(page)
    }

    pub fn top_stats(&self) -> TopStats {
        lock(&self.top).stats()
    }

    /// Clears all reception state, cached pages, tables and service data.
    pub fn reset(&self) {
        lock(&self.common_header).fill(0x20);
        *lock(&self.magazines) = Magazines::default();
        lock(&self.store).reset();
        *lock(&self.service) = ServiceData::default();
        lock(&self.top).reset();
    }

    pub fn received_pages_count(&self) -> usize {
        lock(&self.store).received_pages()
    }

    pub fn visible_page_numbers(&self, limit: usize) -> Vec<u16> {
        lock(&self.store).visible_page_numbers(limit)
    }

    pub fn non_visible_page_numbers(&self, limit: usize) -> Vec<u16> {
        lock(&self.store).non_visible_page_numbers(limit)
    }

    pub fn received_page_codes(&self) -> Vec<PageCode> {
        lock(&self.store).received_page_codes()
    }

    /// Page being received in the most recently addressed magazine.
    pub fn processing_page_code(&self) -> Option<PageCode> {
        let magazines = lock(&self.magazines);
        let state = &magazines.states[magazines.last_magazine? as usize];
        state.receiving.then_some(state.code)
    }

    pub fn status_display(&self) -> String {
        lock(&self.service).status_text()
    }

    pub fn service_data(&self) -> ServiceData {
        lock(&self.service).clone()
    }

    pub fn current_page(&self) -> u16 {
        lock(&self.store).current_page()
    }

    /// Moves the caching window; see [`PageStore::set_current_page`].
    pub fn set_current_page(&self, page: u16) -> Result<(), PageCodeError> {
        lock(&self.store).set_current_page(page)
    }

    pub fn set_waiting_page(&self, page: u16, enabled: bool) {
        lock(&self.store).set_waiting_page(page, enabled);
    }

    pub fn set_caching_control(&self, caching: CachingControl) {
        lock(&self.store).set_caching_control(caching);
    }

    pub fn set_substitute_spaces_for_error(&self, substitute: bool) {
        lock(&self.store).set_substitute_spaces(substitute);
    }

    pub fn set_max_page_num(&self, max_page_num: usize) {
        lock(&self.store).set_max_page_num(max_page_num);
    }

    pub fn stats(&self) -> DecoderStats {
        let counters = &self.counters;
        DecoderStats {
            packets: counters.packets.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            out_of_window: counters.out_of_window.load(Ordering::Relaxed),
            magazine_packets: counters
                .magazine_packets
                .each_ref()
                .map(|count| count.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::structs::packet::builder::PacketBuilder;
    use crate::utils::hamming::{encode84, with_parity};

    fn decoder_with_events() -> (Decoder, mpsc::Receiver<DecoderEvent>) {
        let decoder = Decoder::default();
        let (tx, rx) = mpsc::channel();
        decoder.set_event_sink(Some(Arc::new(tx)));
        (decoder, rx)
    }

    fn feed(decoder: &Decoder, packets: &[PacketBuilder]) {
        for packet in packets {
            decoder.decode_packet(&packet.build()).unwrap();
        }
    }

    #[test]
    fn hello_page() {
        let decoder = Decoder::default();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x100, 0x0000, 0),
                PacketBuilder::line(1, 1, b"HELLO"),
                PacketBuilder::header(0x100, 0x0000, 0),
            ],
        );

        let page = decoder.get_display_page(PageCode::new(0x100, 0)).unwrap();
        let mut expected = [b' '; COLUMNS];
        expected[..5].copy_from_slice(b"HELLO");
        assert_eq!(page.frame[1], expected);
        assert!(page.line_state[1] & line_state::HAS_DATA != 0);
        assert_eq!(decoder.received_pages_count(), 1);
        assert_eq!(decoder.processing_page_code(), Some(PageCode::new(0x100, 0)));
    }

    #[test]
    fn reception_closes_once() {
        let (decoder, rx) = decoder_with_events();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x100, 0, 0).header_text(b"NEWS"),
                PacketBuilder::line(1, 1, b"ONE"),
                PacketBuilder::line(1, 3, b"THREE"),
                // Another magazine does not end the reception in parallel mode
                PacketBuilder::header(0x899, 0, 0),
                PacketBuilder::header(0x100, 0, 0),
            ],
        );

        let events: Vec<_> = rx.try_iter().collect();
        let code = PageCode::new(0x100, 0);
        assert_eq!(
            events,
            vec![
                DecoderEvent::HeaderUpdate(code),
                DecoderEvent::PageUpdate(code),
                DecoderEvent::HeaderUpdate(code),
            ]
        );

        let page = decoder.get_display_page(code).unwrap();
        assert_eq!(page.row_text(1).trim_end(), "ONE");
        assert_eq!(page.row_text(3).trim_end(), "THREE");
        assert!(!page.has_data(2));
        assert_eq!(&page.frame[0][8..12], b"NEWS");
    }

    #[test]
    fn duplicate_row_forces_merge() {
        let (decoder, rx) = decoder_with_events();
        decoder.set_current_page(0x150).unwrap();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x150, 0, 0),
                PacketBuilder::line(1, 2, b"FIRST"),
                PacketBuilder::line(1, 2, b"SECOND"),
            ],
        );

        assert_eq!(
            rx.try_iter().last(),
            Some(DecoderEvent::PageUpdate(PageCode::new(0x150, 0)))
        );
        let page = decoder.get_display_page(PageCode::any(0x150)).unwrap();
        assert_eq!(page.row_text(2).trim_end(), "FIRST");
        assert_eq!(decoder.processing_page_code(), None);
    }

    #[test]
    fn identical_repeat_is_a_refresh() {
        let (decoder, rx) = decoder_with_events();
        let transmission = [
            PacketBuilder::header(0x100, 0, 0),
            PacketBuilder::line(1, 1, b"SAME"),
        ];
        feed(&decoder, &transmission);
        feed(&decoder, &transmission);

        let page = decoder.get_display_page(PageCode::any(0x100)).unwrap();
        assert!(page.is_updated(1));

        feed(&decoder, &transmission);
        feed(&decoder, &[PacketBuilder::header(0x100, 0, 0)]);

        let merges: Vec<_> = rx
            .try_iter()
            .filter(|event| !matches!(event, DecoderEvent::HeaderUpdate(_)))
            .collect();
        let code = PageCode::new(0x100, 0);
        assert_eq!(
            merges,
            vec![
                DecoderEvent::PageUpdate(code),
                DecoderEvent::PageRefresh(code),
                DecoderEvent::PageRefresh(code),
            ]
        );

        let page = decoder.get_display_page(PageCode::any(0x100)).unwrap();
        assert!(!page.is_updated(1));
    }

    #[test]
    fn caching_window() {
        let decoder = Decoder::new(DecoderConfig {
            max_page_num: 10,
            ..Default::default()
        })
        .unwrap();

        feed(
            &decoder,
            &[
                PacketBuilder::header(0x104, 0, 0),
                PacketBuilder::line(1, 1, b"IN"),
                PacketBuilder::header(0x1F0, 0, 0),
            ],
        );
        assert_eq!(
            decoder.decode_packet(&PacketBuilder::header(0x120, 0, 0).build()),
            Err(PacketError::OutOfWindow { page: 0x120 })
        );
        // Rows for a rejected header are not collected
        feed(&decoder, &[PacketBuilder::line(1, 1, b"OUT")]);
        assert!(decoder.get_display_page(PageCode::any(0x104)).is_some());
        assert!(decoder.get_display_page(PageCode::any(0x120)).is_none());

        decoder.set_current_page(0x120).unwrap();
        assert!(decoder.get_display_page(PageCode::any(0x104)).is_none());
        assert_eq!(decoder.stats().out_of_window, 1);
        assert_eq!(
            decoder.set_current_page(0x1A0),
            Err(PageCodeError::InvalidPageCode(0x1A0))
        );
    }

    #[test]
    fn serial_mode_ends_reception_on_any_header() {
        let serial = ControlBits::MAGAZINE_SERIAL;
        let decoder = Decoder::default();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x100, 0, serial),
                PacketBuilder::line(1, 1, b"SERIAL"),
                PacketBuilder::header(0x899, 0, serial),
            ],
        );
        assert!(decoder.get_display_page(PageCode::any(0x100)).is_some());

        let parallel = Decoder::default();
        feed(
            &parallel,
            &[
                PacketBuilder::header(0x100, 0, 0),
                PacketBuilder::line(1, 1, b"PARALLEL"),
                PacketBuilder::header(0x899, 0, 0),
            ],
        );
        assert!(parallel.get_display_page(PageCode::any(0x100)).is_none());
    }

    #[test]
    fn out_of_window_header_leaves_serial_state_alone() {
        let decoder = Decoder::default();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x100, 0, 0),
                PacketBuilder::line(1, 1, b"KEEP"),
            ],
        );

        let far = PacketBuilder::header(0x350, 0, ControlBits::MAGAZINE_SERIAL);
        assert!(matches!(
            decoder.decode_packet(&far.build()),
            Err(PacketError::OutOfWindow { page: 0x350 })
        ));
        assert_eq!(decoder.processing_page_code(), Some(PageCode::new(0x100, 0)));

        // Still parallel: a header in another magazine leaves 1xx open.
        feed(&decoder, &[PacketBuilder::header(0x860, 0, 0)]);
        assert!(decoder.get_display_page(PageCode::any(0x100)).is_none());
        assert_eq!(decoder.processing_page_code(), Some(PageCode::new(0x860, 0)));
    }

    #[test]
    fn filler_header_closes_reception() {
        let (decoder, rx) = decoder_with_events();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x100, 0, 0),
                PacketBuilder::line(1, 1, b"X"),
                PacketBuilder::header(0x1FF, 0x3F7F, 0),
            ],
        );

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events.last(),
            Some(&DecoderEvent::HeaderUpdate(PageCode::new(0x1FF, 0x3F7F)))
        );
        assert!(decoder.get_display_page(PageCode::any(0x100)).is_some());
        assert_eq!(decoder.processing_page_code(), None);
    }

    #[test]
    fn damaged_header_is_dropped() {
        let decoder = Decoder::default();
        let packet = PacketBuilder::header(0x100, 0, 0).set(4, encode84(0) ^ 0x03);
        assert!(matches!(
            decoder.decode_packet(&packet.build()),
            Err(PacketError::HeaderField(_))
        ));
        assert_eq!(decoder.stats().errors, 1);
        assert_eq!(decoder.processing_page_code(), None);
    }

    #[test]
    fn links_and_region() {
        let decoder = Decoder::default();
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x100, 0, 0),
                PacketBuilder::line(1, 1, b"LINKS"),
                PacketBuilder::links(1, &[(0x200, 0x3F7F), (0x300, 0x3F7F)], true),
                PacketBuilder::region(1, 5),
                PacketBuilder::header(0x100, 0, 0),
            ],
        );

        let page = decoder.get_display_page(PageCode::any(0x100)).unwrap();
        assert!(page.show_row24);
        assert_eq!(page.character_region, 5);
        let NavigationLinks::Flof(links) = decoder.navigation_links(&page) else {
            panic!("expected FLOF links");
        };
        assert_eq!(
            links[..2],
            [
                Some(PageCode::new(0x200, 0x3F7F)),
                Some(PageCode::new(0x300, 0x3F7F))
            ]
        );
    }

    #[test]
    fn broadcast_service_data() {
        let decoder = Decoder::default();
        let mut packet = PacketBuilder::new(0, 30)
            .set(2, encode84(0))
            // Initial page 100, any sub-code
            .set(3, encode84(0))
            .set(4, encode84(0))
            .set(5, encode84(0xF))
            .set(6, encode84(0xF))
            .set(7, encode84(0xF))
            .set(8, encode84(0x3))
            .set(9, REVERSE[0x12])
            .set(10, REVERSE[0x34])
            .set(11, 0x00)
            // MJD 60000 and 12:30:05, every digit sent plus one
            .set(12, 0x07)
            .set(13, 0x11)
            .set(14, 0x11)
            .set(15, 0x23)
            .set(16, 0x41)
            .set(17, 0x16);
        for (i, &c) in b"TELETEXT 1".iter().enumerate() {
            packet = packet.set(22 + i, with_parity(c));
        }
        decoder.decode_packet(&packet.build()).unwrap();

        let service = decoder.service_data();
        assert_eq!(service.initial_page, Some(PageCode::new(0x100, 0x3F7F)));
        assert_eq!(service.network_id[0], 0x1234);
        assert_eq!(service.modified_julian_date, 60000);
        assert_eq!(
            (service.utc_hours, service.utc_minutes, service.utc_seconds),
            (12, 30, 5)
        );
        assert_eq!(decoder.status_display(), "TELETEXT 1");

        decoder.reset();
        assert_eq!(decoder.status_display(), "");
    }

    #[test]
    fn unreceived_btt_entry_resolves_later() {
        let (decoder, rx) = decoder_with_events();

        let mut levels = [0u8; COLUMNS];
        levels[1] = 6;
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x1F0, 0, 0),
                PacketBuilder::nibble_line(1, 1, &levels),
                PacketBuilder::header(0x1F0, 0, 0),
            ],
        );

        // Page 101 is a group, the walk runs into row 2 which is missing
        assert_eq!(
            decoder.next_group(0x101),
            Err(TopTextError::Unreceived { index: 40 })
        );
        assert!(rx.try_iter().all(|event| !matches!(event, DecoderEvent::WaitingPageResolved(_))));

        feed(
            &decoder,
            &[
                PacketBuilder::nibble_line(1, 2, &[0; COLUMNS]),
                PacketBuilder::header(0x1F0, 0, 0),
            ],
        );

        let resolved: Vec<_> = rx
            .try_iter()
            .filter(|event| matches!(event, DecoderEvent::WaitingPageResolved(_)))
            .collect();
        assert_eq!(
            resolved,
            vec![DecoderEvent::WaitingPageResolved(PageCode::new(0x1F0, 0))]
        );
        assert!(decoder.non_visible_page_numbers(10).contains(&0x1F0));
    }

    #[test]
    fn waiting_page_and_header_display() {
        let (decoder, rx) = decoder_with_events();
        decoder.set_waiting_page(0x105, true);
        let text = b"CEEFAX 105  Mon 01 Jan  12:34/56";
        feed(
            &decoder,
            &[
                PacketBuilder::header(0x105, 0, 0).header_text(text),
                PacketBuilder::line(1, 1, b"WAIT"),
                PacketBuilder::header(0x105, 0, 0).header_text(text),
            ],
        );

        let resolved = DecoderEvent::WaitingPageResolved(PageCode::new(0x105, 0));
        assert!(rx.try_iter().any(|event| event == resolved));

        let mut page = Page::default();
        decoder.display_header(&mut page, true);
        assert_eq!(&page.frame[0][32..40], b"12:34/56");
        assert_eq!(page.frame[0][8], b' ');

        decoder.display_header(&mut page, false);
        assert_eq!(&page.frame[0][8..14], b"CEEFAX");
    }
}
