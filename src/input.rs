use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;
use ttx::process::extract::{Extractor, TeletextPacket};
use ttx::structs::packet::PACKET_SIZE;
use ttx::utils::errors::ExtractError;

use crate::cli::command::InputFormat;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read + Send>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let reader: Box<dyn Read + Send> = if input_path.as_ref().as_os_str() == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(BufReader::new(File::open(input_path)?))
        };

        Ok(Self { reader })
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = match self.reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if !callback(&buffer[..bytes_read])? {
                break;
            }
        }

        Ok(())
    }
}

/// Turns input chunks into teletext packets for either container format.
pub enum PacketReader {
    Pes(Extractor),
    T42(T42Framer),
}

impl PacketReader {
    pub fn new(format: InputFormat, fail_level: log::Level) -> Self {
        match format {
            InputFormat::Pes => {
                let mut extractor = Extractor::default();
                extractor.set_fail_level(fail_level);
                PacketReader::Pes(extractor)
            }
            InputFormat::T42 => PacketReader::T42(T42Framer::default()),
        }
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        match self {
            PacketReader::Pes(extractor) => extractor.push_bytes(data),
            PacketReader::T42(framer) => framer.push_bytes(data),
        }
    }

    /// Next complete packet; `Ok(None)` once the buffered input is used up.
    pub fn next_packet(&mut self) -> Result<Option<TeletextPacket>, ExtractError> {
        match self {
            PacketReader::Pes(extractor) => match extractor.next() {
                Some(Ok(packet)) => Ok(Some(packet)),
                Some(Err(ExtractError::InsufficientData)) | None => Ok(None),
                Some(Err(e)) => Err(e),
            },
            PacketReader::T42(framer) => Ok(framer.next_packet()),
        }
    }

    /// Bytes left over that do not form a whole packet.
    pub fn trailing_bytes(&self) -> usize {
        match self {
            PacketReader::Pes(_) => 0,
            PacketReader::T42(framer) => framer.buffer.len(),
        }
    }
}

/// Splits a T42 byte stream into 42-byte packets.
#[derive(Debug, Default)]
pub struct T42Framer {
    buffer: VecDeque<u8>,
}

impl T42Framer {
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    pub fn next_packet(&mut self) -> Option<TeletextPacket> {
        if self.buffer.len() < PACKET_SIZE {
            return None;
        }

        let mut bytes = [0u8; PACKET_SIZE];
        for (dst, src) in bytes.iter_mut().zip(self.buffer.drain(..PACKET_SIZE)) {
            *dst = src;
        }
        Some(TeletextPacket::from_t42(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t42_packets_survive_arbitrary_chunking() {
        let stream: Vec<u8> = (0..PACKET_SIZE * 2).map(|i| i as u8).collect();
        let mut reader = PacketReader::new(InputFormat::T42, log::Level::Error);

        reader.push_bytes(&stream[..30]);
        assert_eq!(reader.next_packet().unwrap(), None);

        reader.push_bytes(&stream[30..]);
        let first = reader.next_packet().unwrap().unwrap();
        let second = reader.next_packet().unwrap().unwrap();
        assert_eq!(reader.next_packet().unwrap(), None);

        assert_eq!(first.data[0], 0x00);
        assert_eq!(first.data[1], 0x80);
        assert_eq!(second.data[0], (PACKET_SIZE as u8).reverse_bits());
        assert_eq!(reader.trailing_bytes(), 0);
    }

    #[test]
    fn partial_t42_packet_is_reported() {
        let mut reader = PacketReader::new(InputFormat::T42, log::Level::Error);
        reader.push_bytes(&[0u8; PACKET_SIZE + 5]);

        assert!(reader.next_packet().unwrap().is_some());
        assert_eq!(reader.next_packet().unwrap(), None);
        assert_eq!(reader.trailing_bytes(), 5);
    }
}
