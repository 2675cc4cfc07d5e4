use crate::log_or_err;
use crate::structs::packet::PACKET_SIZE;
use crate::utils::errors::ExtractError;
use crate::utils::hamming::REVERSE;
use bitstream_io::{BigEndian, BitRead, BitReader};
use log::debug;
use std::collections::VecDeque;
use std::io;
use std::io::Cursor;

const PRIVATE_STREAM_1: u8 = 0xBD;
const PADDING_STREAM: u8 = 0xBE;

const DATA_UNIT_NON_SUBTITLE: u8 = 0x02;
const DATA_UNIT_SUBTITLE: u8 = 0x03;
const DATA_UNIT_LENGTH: u8 = 0x2C;
const FRAMING_CODE: u8 = 0xE4;

/// Extracts teletext packets from a PES elementary stream.
///
/// PES packets are located by their start code, and the EBU data field of
/// every `private_stream_1` packet is split into data units. Teletext units
/// are returned as [`TeletextPacket`]s, everything else is skipped.
///
/// # Example
///
/// ```rust,no_run
/// use ttx::process::decode::Decoder;
/// use ttx::process::extract::Extractor;
///
/// let mut extractor = Extractor::default();
/// let decoder = Decoder::default();
///
/// extractor.push_bytes(&std::fs::read("teletext.pes")?);
///
/// for packet in extractor.by_ref() {
///     let Ok(packet) = packet else { break };
///     let _ = decoder.decode_packet(&packet.data);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Extractor {
    buffer: VecDeque<u8>,
    pending: VecDeque<Result<TeletextPacket, ExtractError>>,
    locked: bool,
    io_counter: usize,
    error_count: usize,
    pes_processed: usize,
    fail_level: log::Level,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            buffer: VecDeque::with_capacity(64 * 1024),
            pending: VecDeque::new(),
            locked: false,
            io_counter: 0,
            error_count: 0,
            pes_processed: 0,
            fail_level: log::Level::Error,
        }
    }
}

impl Extractor {
    /// Adds stream data to the internal buffer.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
        self.io_counter += 1;
    }

    /// Sets the failure level for validation errors.
    ///
    /// - `log::Level::Error`: malformed data units are logged and skipped (default)
    /// - `log::Level::Warn`: malformed data units are returned as errors (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Number of times the stream lost PES alignment.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn pes_processed(&self) -> usize {
        self.pes_processed
    }

    fn resync(&mut self) -> Result<(), ExtractError> {
        self.locked = false;

        let found = (0..self.buffer.len().saturating_sub(3)).find(|&i| self.is_start_code(i));
        let Some(offset) = found else {
            let keep = self.buffer.len().min(3);
            self.consume_front(self.buffer.len() - keep);
            return self.insufficient();
        };

        if offset > 0 {
            debug!("Skipped {offset} bytes before PES start code");
        }
        self.consume_front(offset);
        self.locked = true;

        Ok(())
    }

    fn is_start_code(&self, offset: usize) -> bool {
        matches!(
            (
                self.buffer.get(offset),
                self.buffer.get(offset + 1),
                self.buffer.get(offset + 2),
                self.buffer.get(offset + 3),
            ),
            (Some(0x00), Some(0x00), Some(0x01), Some(&stream_id)) if stream_id >= 0xBC
        )
    }

    fn consume_front(&mut self, cnt: usize) {
        self.buffer.drain(..cnt);
    }

    fn pes_packet_length(&self) -> Option<usize> {
        Some(u16::from_be_bytes([*self.buffer.get(4)?, *self.buffer.get(5)?]) as usize)
    }

    fn insufficient(&mut self) -> Result<(), ExtractError> {
        self.io_counter = self.io_counter.saturating_sub(1);
        Err(ExtractError::InsufficientData)
    }

    /// Consumes one PES packet and queues its teletext packets.
    fn next_pes(&mut self) -> Result<(), ExtractError> {
        if !self.locked {
            self.resync()?;
        }

        if self.buffer.len() < 6 {
            return self.insufficient();
        }

        if !self.is_start_code(0) {
            self.error_count += 1;
            self.consume_front(1);
            self.locked = false;
            log_or_err!(self, log::Level::Warn, ExtractError::InvalidStartCode);
            return Ok(());
        }

        let Some(length) = self.pes_packet_length() else {
            return self.insufficient();
        };
        let total = 6 + length;
        if self.buffer.len() < total {
            return self.insufficient();
        }

        let pes = self.buffer.drain(..total).collect::<Vec<_>>();
        self.pes_processed += 1;

        match pes[3] {
            PRIVATE_STREAM_1 => self.parse_pes(&pes),
            PADDING_STREAM => Ok(()),
            stream_id => {
                log_or_err!(self, log::Level::Warn, ExtractError::UnsupportedStreamId(stream_id));
                Ok(())
            }
        }
    }

    fn parse_pes(&mut self, pes: &[u8]) -> Result<(), ExtractError> {
        let Some(payload) = payload_offset(pes).ok().and_then(|offset| pes.get(offset..)) else {
            debug!("PES packet too short for its header");
            return Ok(());
        };

        let Some((&data_identifier, units)) = payload.split_first() else {
            return Ok(());
        };
        if !(0x10..=0x1F).contains(&data_identifier) {
            log_or_err!(
                self,
                log::Level::Warn,
                ExtractError::InvalidDataIdentifier(data_identifier)
            );
            return Ok(());
        }

        let mut reader = BitReader::endian(Cursor::new(units), BigEndian);
        loop {
            let (Ok(data_unit_id), Ok(data_unit_length)) =
                (reader.read_var::<u8>(8), reader.read_var::<u8>(8))
            else {
                break;
            };

            let mut unit = vec![0u8; data_unit_length as usize];
            if reader.read_bytes(&mut unit).is_err() {
                debug!("Data unit {data_unit_id:#04X} truncated");
                break;
            }

            // Strict failures are queued in stream order so the remaining
            // units of this PES are still delivered.
            match self.unit_packet(data_unit_id, &unit) {
                Ok(Some(packet)) => self.pending.push_back(Ok(packet)),
                Ok(None) => {}
                Err(e) => self.pending.push_back(Err(e)),
            }
        }

        Ok(())
    }

    fn unit_packet(
        &mut self,
        data_unit_id: u8,
        unit: &[u8],
    ) -> Result<Option<TeletextPacket>, ExtractError> {
        if !matches!(data_unit_id, DATA_UNIT_NON_SUBTITLE | DATA_UNIT_SUBTITLE) {
            return Ok(None);
        }

        if unit.len() != DATA_UNIT_LENGTH as usize {
            log_or_err!(
                self,
                log::Level::Warn,
                ExtractError::InvalidDataUnitLength(unit.len() as u8)
            );
            return Ok(None);
        }

        let Ok(fields) = UnitFields::parse(unit) else {
            return Ok(None);
        };
        if fields.framing_code != FRAMING_CODE {
            log_or_err!(
                self,
                log::Level::Warn,
                ExtractError::InvalidFramingCode(fields.framing_code)
            );
            return Ok(None);
        }

        Ok(Some(TeletextPacket {
            data: fields.data,
            field_parity: fields.field_parity,
            line_offset: fields.line_offset,
            subtitle: data_unit_id == DATA_UNIT_SUBTITLE,
        }))
    }
}

/// Offset of the PES payload: the fixed 9 header bytes plus
/// `PES_header_data_length`.
fn payload_offset(pes: &[u8]) -> io::Result<usize> {
    let mut reader = BitReader::endian(Cursor::new(pes), BigEndian);
    // start code, stream id, PES_packet_length
    reader.skip(48)?;
    // '10', scrambling, priority, alignment, copyright, original, flags
    reader.skip(16)?;
    let header_data_length = reader.read_var::<u8>(8)?;

    Ok(9 + header_data_length as usize)
}

struct UnitFields {
    field_parity: bool,
    line_offset: u8,
    framing_code: u8,
    data: [u8; PACKET_SIZE],
}

impl UnitFields {
    fn parse(unit: &[u8]) -> io::Result<Self> {
        let mut reader = BitReader::endian(Cursor::new(unit), BigEndian);
        reader.skip(2)?;
        let field_parity = reader.read_bit()?;
        let line_offset = reader.read_var::<u8>(5)?;
        let framing_code = reader.read_var::<u8>(8)?;
        let mut data = [0u8; PACKET_SIZE];
        reader.read_bytes(&mut data)?;

        Ok(Self {
            field_parity,
            line_offset,
            framing_code,
            data,
        })
    }
}

impl Iterator for Extractor {
    type Item = Result<TeletextPacket, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }

            if self.io_counter == 0 {
                return None;
            }

            if let Err(e) = self.next_pes() {
                return Some(Err(e));
            }
        }
    }
}

/// One teletext data unit: a 42-byte packet in PES bit orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeletextPacket {
    pub data: [u8; PACKET_SIZE],
    /// `true` for the first field.
    pub field_parity: bool,
    /// VBI line offset; 0 when unspecified.
    pub line_offset: u8,
    /// Carried in a subtitle data unit.
    pub subtitle: bool,
}

impl AsRef<[u8]> for TeletextPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl TeletextPacket {
    /// Wraps a packet from a T42 file, whose bytes are in transmission bit
    /// order.
    pub fn from_t42(bytes: &[u8; PACKET_SIZE]) -> Self {
        Self {
            data: bytes.map(|b| REVERSE[b as usize]),
            field_parity: false,
            line_offset: 0,
            subtitle: false,
        }
    }
}

#[cfg(test)]
pub(crate) fn pes_packet(units: &[(u8, u8, [u8; PACKET_SIZE])]) -> Vec<u8> {
    let mut payload = vec![0x10];
    for &(id, framing_code, data) in units {
        payload.extend([id, DATA_UNIT_LENGTH, 0xE0 | 0x07, framing_code]);
        payload.extend(data);
    }

    let header_data_length = 0x24;
    let length = 3 + header_data_length + payload.len();
    let mut pes = vec![0x00, 0x00, 0x01, PRIVATE_STREAM_1];
    pes.extend((length as u16).to_be_bytes());
    pes.extend([0x84, 0x00, header_data_length as u8]);
    pes.extend(std::iter::repeat_n(0xFF, header_data_length));
    pes.extend(payload);
    pes
}

#[test]
fn extracts_across_chunks() -> anyhow::Result<()> {
    let first = [0x11; PACKET_SIZE];
    let second = [0x22; PACKET_SIZE];
    let pes = pes_packet(&[
        (DATA_UNIT_NON_SUBTITLE, FRAMING_CODE, first),
        (DATA_UNIT_SUBTITLE, FRAMING_CODE, second),
    ]);

    let mut extractor = Extractor::default();
    extractor.push_bytes(&pes[..50]);
    assert_eq!(extractor.next(), Some(Err(ExtractError::InsufficientData)));
    assert_eq!(extractor.next(), None);

    extractor.push_bytes(&pes[50..]);
    let packet = extractor.next().unwrap()?;
    assert_eq!(packet.data, first);
    assert!(packet.field_parity);
    assert_eq!(packet.line_offset, 7);
    assert!(!packet.subtitle);

    let packet = extractor.next().unwrap()?;
    assert_eq!(packet.data, second);
    assert!(packet.subtitle);

    assert_eq!(extractor.next(), Some(Err(ExtractError::InsufficientData)));
    assert_eq!(extractor.pes_processed(), 1);
    Ok(())
}

#[test]
fn skips_garbage_and_stuffing() {
    let mut stream = vec![0x47, 0x12, 0x00, 0x34];
    stream.extend(pes_packet(&[
        (0xFF, 0xFF, [0xFF; PACKET_SIZE]),
        (DATA_UNIT_NON_SUBTITLE, FRAMING_CODE, [0x33; PACKET_SIZE]),
    ]));
    stream.extend([0x00, 0x00, 0x01, PADDING_STREAM, 0x00, 0x02, 0xFF, 0xFF]);
    stream.extend(pes_packet(&[(
        DATA_UNIT_NON_SUBTITLE,
        FRAMING_CODE,
        [0x44; PACKET_SIZE],
    )]));

    let mut extractor = Extractor::default();
    extractor.push_bytes(&stream);

    let packets: Vec<_> = extractor.by_ref().map_while(Result::ok).collect();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].data, [0x33; PACKET_SIZE]);
    assert_eq!(packets[1].data, [0x44; PACKET_SIZE]);
    assert_eq!(extractor.pes_processed(), 3);
}

#[test]
fn strict_mode_reports_bad_framing() {
    let pes = pes_packet(&[
        (DATA_UNIT_NON_SUBTITLE, 0x27, [0x55; PACKET_SIZE]),
        (DATA_UNIT_NON_SUBTITLE, FRAMING_CODE, [0x66; PACKET_SIZE]),
    ]);

    let mut lenient = Extractor::default();
    lenient.push_bytes(&pes);
    assert_eq!(
        lenient.next().unwrap().unwrap().data,
        [0x66; PACKET_SIZE]
    );

    let mut strict = Extractor::default();
    strict.set_fail_level(log::Level::Warn);
    strict.push_bytes(&pes);
    assert_eq!(
        strict.next(),
        Some(Err(ExtractError::InvalidFramingCode(0x27)))
    );
    // The rest of the PES is not lost
    assert_eq!(strict.next().unwrap().unwrap().data, [0x66; PACKET_SIZE]);
}

#[test]
fn strict_errors_keep_stream_order() {
    let pes = pes_packet(&[
        (DATA_UNIT_SUBTITLE, FRAMING_CODE, [0x11; PACKET_SIZE]),
        (DATA_UNIT_SUBTITLE, 0x00, [0x22; PACKET_SIZE]),
        (DATA_UNIT_SUBTITLE, FRAMING_CODE, [0x33; PACKET_SIZE]),
    ]);

    let mut strict = Extractor::default();
    strict.set_fail_level(log::Level::Warn);
    strict.push_bytes(&pes);

    let items: Vec<_> = strict
        .by_ref()
        .take_while(|item| item != &Err(ExtractError::InsufficientData))
        .map(|item| item.map(|packet| packet.data[0]))
        .collect();
    assert_eq!(
        items,
        vec![
            Ok(0x11),
            Err(ExtractError::InvalidFramingCode(0x00)),
            Ok(0x33)
        ]
    );
}

#[test]
fn t42_packets_are_bit_reversed() {
    let mut t42 = [0u8; PACKET_SIZE];
    t42[0] = 0x01;
    t42[41] = 0x80;

    let packet = TeletextPacket::from_t42(&t42);
    assert_eq!(packet.data[0], 0x80);
    assert_eq!(packet.data[41], 0x01);
}
