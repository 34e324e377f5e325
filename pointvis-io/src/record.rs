//! Point data records

use byteorder::{ByteOrder, LittleEndian};

use crate::header::Header;
use pointvis_core::Point3d;

/// The per-point fields used for display. Transient: produced one at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,
    /// Packed return bits: number in bits 0-2, count in bits 3-5
    pub flags: u8,
    pub classification: u8,
}

impl PointRecord {
    /// Decode the leading fields shared by formats 0-3
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 16 {
            return None;
        }
        Some(Self {
            x: LittleEndian::read_i32(&bytes[0..4]),
            y: LittleEndian::read_i32(&bytes[4..8]),
            z: LittleEndian::read_i32(&bytes[8..12]),
            intensity: LittleEndian::read_u16(&bytes[12..14]),
            flags: bytes[14],
            classification: bytes[15],
        })
    }

    /// Return number, 0-7
    pub fn return_number(&self) -> u8 {
        self.flags & 0x07
    }

    /// Number of returns of the pulse, 0-7
    pub fn num_returns(&self) -> u8 {
        (self.flags >> 3) & 0x07
    }

    pub fn set_returns(&mut self, return_number: u8, num_returns: u8) {
        self.flags = (self.flags & 0xC0) | (return_number & 0x07) | ((num_returns & 0x07) << 3);
    }

    /// Position after applying the header's scale and offset
    pub fn world_position(&self, header: &Header) -> Point3d {
        header.to_world(self.x, self.y, self.z)
    }
}
