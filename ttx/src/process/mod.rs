/// Teletext packet extraction from PES streams.
///
/// Provides the [`Extractor`](extract::Extractor) for resynchronising on PES
/// start codes and yielding [`TeletextPacket`](extract::TeletextPacket) data
/// units from continuous transport payload.
pub mod extract;

/// Packet decoding into the page cache.
///
/// Provides the [`Decoder`](decode::Decoder) context that tracks magazine
/// receptions, merges completed pages into the cache and answers page
/// queries from other threads.
pub mod decode;

/// Decoder notifications.
pub mod event;

/// Bounded page cache with per-page sub-page buckets.
pub mod store;

/// TOP-Text navigation tables (BTT, MPT, AIT).
pub mod toptext;

/// Row interpreter resolving spacing attributes into per-cell colours and
/// character modes.
pub mod elements;
