//! Field decoding for individual 42-byte teletext packets.
//!
//! All offsets below refer to a packet that has already been bit-reversed into
//! transmission order.

use log::trace;

use crate::structs::page::{ControlBits, PageCode};
use crate::utils::errors::{HammingError, PacketError};
use crate::utils::hamming::{REVERSE, hamming24_18, unham_two84_lsbf, unham84};

pub const PACKET_SIZE: usize = 42;

/// Offset of the 32 displayable header bytes (columns 8..40 of row 0).
pub const HEADER_OFFSET: usize = 10;
pub const HEADER_SIZE: usize = 32;

/// Offset of the 40 display bytes of packets 1..=25.
pub const LINE_OFFSET: usize = 2;

/// Link-control flags stored alongside the six FLOF link bits.
pub const LINK_SHOW_ROW24: u8 = 0x40;
pub const LINK_HIDE_ROW24: u8 = 0x80;

/// Page-hex base for a 3-bit magazine number, where 0 stands for magazine 8.
#[inline(always)]
pub const fn magazine_base(magazine: u8) -> u16 {
    if magazine == 0 {
        0x800
    } else {
        (magazine as u16) * 0x100
    }
}

/// Magazine and packet number from the packet address group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketAddress {
    /// 0..=7; 0 is magazine 8.
    pub magazine: u8,
    /// 0..=31.
    pub packet: u8,
}

impl PacketAddress {
    pub fn decode(data: &[u8; PACKET_SIZE]) -> Result<Self, PacketError> {
        let mrag = unham_two84_lsbf([data[0], data[1]]).map_err(PacketError::Address)?;

        Ok(Self {
            magazine: mrag & 0x07,
            packet: mrag >> 3,
        })
    }

    /// Packets 26 and above carry a designation code in byte 2.
    pub fn designation_code(&self, data: &[u8; PACKET_SIZE]) -> Result<Option<u8>, PacketError> {
        if self.packet < 26 {
            return Ok(None);
        }

        unham84(data[2])
            .map(Some)
            .map_err(PacketError::DesignationCode)
    }
}

/// Page number, sub-code and control bits of a packet 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub code: PageCode,
    pub control: ControlBits,
}

/// Decodes the S1..S4 sub-code nibbles starting at `data[offset]`.
///
/// Returns the 13-bit sub-code and the 3-bit magazine-XOR carried in S2/S4.
fn decode_subcode(data: &[u8], offset: usize) -> Result<(u16, u8, u8, u8), HammingError> {
    let s1 = unham84(data[offset])?;
    let s2 = unham84(data[offset + 1])?;
    let s3 = unham84(data[offset + 2])?;
    let s4 = unham84(data[offset + 3])?;

    let subcode =
        s1 as u16 | ((s2 & 0x7) as u16) << 4 | (s3 as u16) << 8 | ((s4 & 0x3) as u16) << 12;
    let magazine_bits = (s2 >> 3) | ((s4 & 0xC) >> 1);

    Ok((subcode, magazine_bits, s2, s4))
}

/// Decodes a page reference (page units/tens, S1..S4) at `data[offset]`.
///
/// The magazine of the target is the reference magazine XOR the bits in S2/S4.
pub fn decode_page_link(
    data: &[u8],
    offset: usize,
    magazine: u8,
) -> Result<PageCode, HammingError> {
    let page = unham_two84_lsbf([data[offset], data[offset + 1]])? as u16;
    let (subcode, magazine_bits, _, _) = decode_subcode(data, offset + 2)?;
    let link_magazine = magazine ^ magazine_bits;

    Ok(PageCode::new(page | magazine_base(link_magazine), subcode))
}

impl PageHeader {
    pub fn decode(magazine: u8, data: &[u8; PACKET_SIZE]) -> Result<Self, PacketError> {
        let units_tens = unham_two84_lsbf([data[2], data[3]]).map_err(PacketError::HeaderField)?;
        let (subcode, _, s2, s4) = decode_subcode(data, 4).map_err(PacketError::HeaderField)?;
        let c7_14 = unham_two84_lsbf([data[8], data[9]]).map_err(PacketError::HeaderField)?;

        let control = magazine as u16
            | (s2 & 0x8) as u16
            | ((s4 & 0xC) as u16) << 2
            | (c7_14 as u16) << 6;

        Ok(Self {
            code: PageCode::new(units_tens as u16 | magazine_base(magazine), subcode),
            control: ControlBits(control),
        })
    }
}

/// Packet X/27/0 editorial links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlofLinks {
    pub links: [Option<PageCode>; 6],
    /// `Some(true)` to show row 24, `Some(false)` to hide it.
    pub show_row24: Option<bool>,
}

impl FlofLinks {
    /// Links that fail Hamming decoding are skipped individually.
    pub fn decode(magazine: u8, data: &[u8; PACKET_SIZE]) -> Self {
        let mut links = [None; 6];
        for (n, slot) in links.iter_mut().enumerate() {
            match decode_page_link(data, 6 * n + 3, magazine) {
                Ok(code) => *slot = Some(code),
                Err(e) => trace!("Dropping FLOF link {n}: {}", PacketError::LinkField(e)),
            }
        }

        let show_row24 = unham84(data[39]).ok().map(|control| control & 0x08 != 0);

        Self { links, show_row24 }
    }

    /// Bits 0..5 for received links plus the row-24 show/hide flags.
    pub fn received_mask(&self) -> u8 {
        let mut mask = self
            .links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.is_some())
            .fold(0u8, |acc, (n, _)| acc | (1 << n));

        match self.show_row24 {
            Some(true) => mask |= LINK_SHOW_ROW24,
            Some(false) => mask |= LINK_HIDE_ROW24,
            None => {}
        }

        mask
    }
}

/// Character region from the first triplet of an X/28/0, X/28/4 or M/29 packet.
pub fn decode_character_region(data: &[u8; PACKET_SIZE]) -> Result<u8, HammingError> {
    let triplet = hamming24_18([data[3], data[4], data[5]])?;
    Ok(((triplet >> 10) & 0x0F) as u8)
}

/// Decoded packet 8/30 (Broadcast Service Data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePacket {
    pub initial_page: Option<PageCode>,
    pub format1: Option<Format1Fields>,
    pub status_display: [u8; 20],
}

/// Fields only present in format 1 packets (designation 0 and 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format1Fields {
    pub network_id: u16,
    /// Offset from UTC in half hours.
    pub time_offset: i8,
    pub modified_julian_date: u32,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

/// Digits of 8/30 format 1 dates and times are sent with 1 added.
#[inline(always)]
const fn offset_digit(nibble: u8) -> u32 {
    (nibble.wrapping_sub(1) & 0x0F) as u32
}

#[inline(always)]
const fn offset_bcd(byte: u8) -> u8 {
    (offset_digit(byte >> 4) * 10 + offset_digit(byte & 0x0F)) as u8
}

impl ServicePacket {
    pub fn decode(designation: u8, data: &[u8; PACKET_SIZE]) -> Self {
        let initial_page = match decode_page_link(data, 3, 0) {
            Ok(code) => Some(code),
            Err(e) => {
                trace!("8/30 initial page dropped: {e}");
                None
            }
        };

        let format1 = (designation & 0x2 == 0).then(|| {
            let offset = data[11];
            let half_hours = ((offset >> 1) & 0x1F) as i8;

            Format1Fields {
                network_id: REVERSE[data[10] as usize] as u16
                    | (REVERSE[data[9] as usize] as u16) << 8,
                time_offset: if offset & 0x40 != 0 {
                    -half_hours
                } else {
                    half_hours
                },
                modified_julian_date: offset_digit(data[12] & 0x0F) * 10000
                    + offset_digit(data[13] >> 4) * 1000
                    + offset_digit(data[13] & 0x0F) * 100
                    + offset_digit(data[14] >> 4) * 10
                    + offset_digit(data[14] & 0x0F),
                hours: offset_bcd(data[15]),
                minutes: offset_bcd(data[16]),
                seconds: offset_bcd(data[17]),
            }
        });

        let mut status_display = [0u8; 20];
        status_display.copy_from_slice(&data[22..42]);

        Self {
            initial_page,
            format1,
            status_display,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::builder::PacketBuilder;
    use super::*;
    use crate::utils::hamming::encode84;

    #[test]
    fn address_and_header() {
        let packet = PacketBuilder::header(0x1A3, 0x0102, 0x0080 | 0x0008 | 0x0040 | 0x0400)
            .transmission_order();

        let address = PacketAddress::decode(&packet).unwrap();
        assert_eq!(address, PacketAddress { magazine: 1, packet: 0 });
        assert_eq!(address.designation_code(&packet).unwrap(), None);

        let header = PageHeader::decode(address.magazine, &packet).unwrap();
        assert_eq!(header.code, PageCode::new(0x1A3, 0x0102));
        assert!(header.control.has(ControlBits::UPDATE));
        assert!(header.control.has(ControlBits::ERASE_PAGE));
        assert!(header.control.has(ControlBits::SUPPRESS_HEADER));
        assert!(header.control.has(ControlBits::MAGAZINE_SERIAL));
        assert_eq!(header.control.magazine(), 1);
    }

    #[test]
    fn magazine_eight_header() {
        let packet = PacketBuilder::header(0x899, 0, 0).transmission_order();
        let address = PacketAddress::decode(&packet).unwrap();
        assert_eq!(address.magazine, 0);
        let header = PageHeader::decode(address.magazine, &packet).unwrap();
        assert_eq!(header.code.page, 0x899);
    }

    #[test]
    fn header_field_error() {
        let packet = PacketBuilder::header(0x100, 0, 0)
            .set(5, encode84(3) ^ 0x03)
            .transmission_order();
        assert!(matches!(
            PageHeader::decode(1, &packet),
            Err(PacketError::HeaderField(_))
        ));
    }

    #[test]
    fn flof_links_with_magazine_xor() {
        let packet =
            PacketBuilder::links(2, &[(0x201, 0x3F7F), (0x5A0, 0x0001), (0x899, 0)], true)
                .transmission_order();
        let links = FlofLinks::decode(2, &packet);

        assert_eq!(links.links[0], Some(PageCode::new(0x201, 0x3F7F)));
        assert_eq!(links.links[1], Some(PageCode::new(0x5A0, 0x0001)));
        assert_eq!(links.links[2], Some(PageCode::new(0x899, 0)));
        assert_eq!(links.show_row24, Some(true));
        assert_eq!(links.received_mask() & 0x07, 0x07);
        assert_eq!(links.received_mask() & LINK_SHOW_ROW24, LINK_SHOW_ROW24);
    }

    #[test]
    fn damaged_link_is_skipped() {
        let packet = PacketBuilder::links(1, &[(0x101, 0), (0x102, 0)], false)
            .set(3, 0x01)
            .transmission_order();
        let links = FlofLinks::decode(1, &packet);
        assert_eq!(links.links[0], None);
        assert_eq!(links.links[1], Some(PageCode::new(0x102, 0)));
        assert_eq!(links.show_row24, Some(false));
    }

    #[test]
    fn character_region() {
        let packet = PacketBuilder::region(3, 0x9).transmission_order();
        assert_eq!(decode_character_region(&packet).unwrap(), 0x9);
    }
}
