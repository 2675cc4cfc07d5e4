#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder for World System Teletext packets according to ETS 300 706.
//!
//! ### Packet Organization
//!
//! **Transport**: 42-byte packets carried in PES data units (EN 300 472) or
//! stored back to back in T42 files.
//! **Addressing**: a Hamming 8/4 protected magazine and row address per
//! packet; rows 0 to 25 build a displayable page, row 0 being the page header.
//!
//! ### Page Reception
//!
//! - Eight magazines, each receiving at most one page at a time
//! - Parallel or serial magazine transmission
//! - Sub-pages addressed by a 13-bit sub-code
//! - FLOF links (packet 27) and character set designation (packets 28/29)
//! - Broadcast Service Data (packet 8/30)
//!
//! ### Caching
//!
//! Pages are cached inside a window around the current page. Rows that
//! failed parity are repaired by later transmissions according to the
//! configured [`CachingControl`](process::store::CachingControl).
//!
//! ## Quick Start
//!
//! Steps for decoding a stream:
//!
//! 1. Extract packets from PES data using [`process::extract::Extractor`]
//! 2. Feed them to a [`process::decode::Decoder`]
//! 3. Query pages and walk their rows with [`process::elements::parse_page_elements`]
//!
//! ```rust,no_run
//! use ttx::process::{decode::Decoder, extract::Extractor};
//! use ttx::structs::page::PageCode;
//!
//! let decoder = Decoder::default();
//! let mut extractor = Extractor::default();
//!
//! let data = std::fs::read("capture.pes")?;
//! extractor.push_bytes(&data);
//!
//! for packet in extractor.by_ref() {
//!     match packet {
//!         Ok(packet) => {
//!             if let Err(e) = decoder.decode_packet(&packet.data) {
//!                 eprintln!("Packet dropped: {e}");
//!             }
//!         }
//!         Err(e) => eprintln!("Extraction error: {e}"),
//!     }
//! }
//!
//! if let Some(page) = decoder.get_display_page(PageCode::any(0x100)) {
//!     for row in 0..24 {
//!         println!("{}", page.row_text(row));
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Packet processing and the page cache.
///
/// 1. **Extraction** ([`process::extract`]): PES demultiplexing into packets.
///
/// 2. **Decoding** ([`process::decode`]): Magazine tracking and page merging.
///
/// 3. **Presentation** ([`process::elements`]): Row attribute interpretation.
///
/// Supporting modules cover the page cache ([`process::store`]), TOP-Text
/// ([`process::toptext`]) and notifications ([`process::event`]).
pub mod process;

/// Data structures representing teletext components.
///
/// - **Pages** ([`structs::page`]): Page codes and cached page frames
/// - **Packets** ([`structs::packet`]): Header, link and service packet fields
/// - **Magazines** ([`structs::magazine`]): In-progress page receptions
/// - **Service Data** ([`structs::service_data`]): Network, time and status
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Hamming Codes** ([`utils::hamming`]): 8/4 and 24/18 decoding, parity
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
