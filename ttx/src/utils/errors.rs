/// Returns `$err` when `$level` is at or above the configured fail level,
/// otherwise logs it at `$level` and carries on.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HammingError {
    #[error("Uncorrectable Hamming 8/4 byte: {byte:#04X}")]
    Uncorrectable84 { byte: u8 },

    #[error("Uncorrectable Hamming 24/18 triplet")]
    Uncorrectable24_18,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet address failed Hamming decoding: {0}")]
    Address(HammingError),

    #[error("Designation code failed Hamming decoding: {0}")]
    DesignationCode(HammingError),

    #[error("Page header field failed Hamming decoding: {0}")]
    HeaderField(HammingError),

    #[error("Link field failed Hamming decoding: {0}")]
    LinkField(HammingError),

    #[error("Enhancement triplet failed Hamming decoding: {0}")]
    Enhancement(HammingError),

    #[error("Page {page:#05X} is outside the caching window")]
    OutOfWindow { page: u16 },
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCodeError {
    #[error("Invalid page code: {0:#06X}")]
    InvalidPageCode(u16),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopTextError {
    #[error("TOP table entry {index} has not been received yet")]
    Unreceived { index: usize },

    #[error("Page is not a TOP-Text navigable page")]
    NotTopPage,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Insufficient buffer data for packet extraction")]
    InsufficientData,

    #[error("Invalid PES start code")]
    InvalidStartCode,

    #[error("Unsupported PES stream id: {0:#04X}")]
    UnsupportedStreamId(u8),

    #[error("Invalid EBU data identifier: {0:#04X}")]
    InvalidDataIdentifier(u8),

    #[error("Invalid data unit length: {0:#04X}, expected 0x2C")]
    InvalidDataUnitLength(u8),

    #[error("Invalid framing code: {0:#04X}, expected 0xE4")]
    InvalidFramingCode(u8),
}
