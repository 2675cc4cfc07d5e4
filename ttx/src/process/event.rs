use std::sync::mpsc;

use log::trace;

use crate::structs::page::PageCode;

/// Notifications raised while decoding.
///
/// Events are raised synchronously on the thread calling
/// [`Decoder::decode_packet`](crate::process::decode::Decoder::decode_packet),
/// after every decoder lock has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A usable header for the current page (or a filler header) arrived.
    HeaderUpdate(PageCode),
    /// The current page changed.
    PageUpdate(PageCode),
    /// The current page was received again without changes.
    PageRefresh(PageCode),
    /// The page registered with `set_waiting_page`, or a missing TOP table
    /// carrier, has arrived.
    WaitingPageResolved(PageCode),
}

impl DecoderEvent {
    pub fn page_code(&self) -> PageCode {
        match *self {
            Self::HeaderUpdate(code)
            | Self::PageUpdate(code)
            | Self::PageRefresh(code)
            | Self::WaitingPageResolved(code) => code,
        }
    }
}

/// Receiver of decoder events.
///
/// Implementations run on the decoding thread and must hand work over to
/// other threads themselves.
pub trait EventSink: Send + Sync {
    fn header_update(&self, _code: PageCode) {}

    fn page_update(&self, _code: PageCode) {}

    fn page_refresh(&self, _code: PageCode) {}

    fn waiting_page_resolved(&self, _code: PageCode) {}
}

pub(crate) fn dispatch(sink: &dyn EventSink, event: DecoderEvent) {
    match event {
        DecoderEvent::HeaderUpdate(code) => sink.header_update(code),
        DecoderEvent::PageUpdate(code) => sink.page_update(code),
        DecoderEvent::PageRefresh(code) => sink.page_refresh(code),
        DecoderEvent::WaitingPageResolved(code) => sink.waiting_page_resolved(code),
    }
}

/// Forwards every event into a channel.
impl EventSink for mpsc::Sender<DecoderEvent> {
    fn header_update(&self, code: PageCode) {
        forward(self, DecoderEvent::HeaderUpdate(code));
    }

    fn page_update(&self, code: PageCode) {
        forward(self, DecoderEvent::PageUpdate(code));
    }

    fn page_refresh(&self, code: PageCode) {
        forward(self, DecoderEvent::PageRefresh(code));
    }

    fn waiting_page_resolved(&self, code: PageCode) {
        forward(self, DecoderEvent::WaitingPageResolved(code));
    }
}

fn forward(sender: &mpsc::Sender<DecoderEvent>, event: DecoderEvent) {
    if sender.send(event).is_err() {
        trace!("Event receiver gone, dropping {event:?}");
    }
}

#[test]
fn channel_sink_forwards_events() {
    let (tx, rx) = mpsc::channel();
    let code = PageCode::new(0x100, 0);

    dispatch(&tx, DecoderEvent::PageUpdate(code));
    dispatch(&tx, DecoderEvent::WaitingPageResolved(code));
    drop(tx);

    let events: Vec<_> = rx.iter().collect();
    assert_eq!(
        events,
        vec![
            DecoderEvent::PageUpdate(code),
            DecoderEvent::WaitingPageResolved(code)
        ]
    );
    assert_eq!(events[0].page_code(), code);
}
