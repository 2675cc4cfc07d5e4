//! Broadcast Service Data carried by packet 8/30.

use log::info;

use crate::structs::packet::ServicePacket;
use crate::structs::page::PageCode;
use crate::utils::hamming::strip_parity;

/// MJD 45000 is 31 January 1982.
pub const DEFAULT_MJD: u32 = 45000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    pub initial_page: Option<PageCode>,
    /// Current and previous network identification codes.
    pub network_id: [u16; 2],
    /// Offset from UTC in half hours.
    pub time_offset: i8,
    pub modified_julian_date: u32,
    pub utc_hours: u8,
    pub utc_minutes: u8,
    pub utc_seconds: u8,
    pub status_display: [u8; 20],
}

impl Default for ServiceData {
    fn default() -> Self {
        Self {
            initial_page: None,
            network_id: [0; 2],
            time_offset: 0,
            modified_julian_date: DEFAULT_MJD,
            utc_hours: 0,
            utc_minutes: 0,
            utc_seconds: 0,
            status_display: [0x20; 20],
        }
    }
}

impl ServiceData {
    pub fn update(&mut self, packet: &ServicePacket) {
        if packet.initial_page.is_some() {
            self.initial_page = packet.initial_page;
        }

        if let Some(fields) = packet.format1 {
            if fields.network_id != self.network_id[0] {
                info!("Network identification code {:04X}", fields.network_id);
            }
            self.network_id[1] = self.network_id[0];
            self.network_id[0] = fields.network_id;
            self.time_offset = fields.time_offset;
            self.modified_julian_date = fields.modified_julian_date;
            self.utc_hours = fields.hours;
            self.utc_minutes = fields.minutes;
            self.utc_seconds = fields.seconds;
        }

        self.status_display = packet.status_display;
    }

    /// Status display text with parity stripped and trailing spaces removed.
    pub fn status_text(&self) -> String {
        let mut bytes = self.status_display;
        strip_parity(&mut bytes);

        let text: String = bytes
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { ' ' })
            .collect();
        text.trim_end().to_string()
    }
}
