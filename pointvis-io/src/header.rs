//! Public header block of a LAS point cloud file

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use pointvis_core::{Error, Point3d, Result, SourceBounds};

/// File signature
pub const SIGNATURE: &[u8; 4] = b"LASF";

/// Size of the 1.0 - 1.2 header; every later version extends it
pub const MIN_HEADER_SIZE: u16 = 227;
const HEADER_SIZE_1_4: u16 = 375;

/// Point record layouts this reader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFormat {
    /// Core fields only
    Format0,
    /// Core fields + GPS time
    Format1,
    /// Core fields + RGB
    Format2,
    /// Core fields + GPS time + RGB
    Format3,
}

impl PointFormat {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(PointFormat::Format0),
            1 => Some(PointFormat::Format1),
            2 => Some(PointFormat::Format2),
            3 => Some(PointFormat::Format3),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Smallest record length that can hold this format
    pub fn min_record_length(self) -> u16 {
        match self {
            PointFormat::Format0 => 20,
            PointFormat::Format1 => 28,
            PointFormat::Format2 => 26,
            PointFormat::Format3 => 34,
        }
    }
}

/// Parsed, validated header. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub file_source_id: u16,
    pub global_encoding: u16,
    pub version_major: u8,
    pub version_minor: u8,
    pub system_identifier: String,
    pub generating_software: String,
    pub creation_day_of_year: u16,
    pub creation_year: u16,
    pub header_size: u16,
    pub offset_to_point_data: u32,
    pub num_variable_length_records: u32,
    pub point_data_format_id: u8,
    pub point_data_record_length: u16,
    /// Point count; for 1.4 files the 64-bit count when the legacy field is zero
    pub num_point_records: u64,
    pub num_points_by_return: [u64; 5],
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub min: [f64; 3],
    pub max: [f64; 3],
}

fn read_string<R: Read>(r: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).trim_end().to_string())
}

fn read_f64x3<R: Read>(r: &mut R) -> Result<[f64; 3]> {
    Ok([
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
        r.read_f64::<LittleEndian>()?,
    ])
}

fn unsupported(msg: impl Into<String>) -> Error {
    Error::SourceFormatUnsupported(msg.into())
}

impl Header {
    /// Read and validate a header from the start of a stream.
    ///
    /// The stream is left somewhere inside the header; callers seek to
    /// `offset_to_point_data` before reading points.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut signature = [0u8; 4];
        r.read_exact(&mut signature)
            .map_err(|_| unsupported("file too short for a header"))?;
        if &signature != SIGNATURE {
            return Err(unsupported("missing LASF signature"));
        }

        let file_source_id = r.read_u16::<LittleEndian>()?;
        let global_encoding = r.read_u16::<LittleEndian>()?;
        let mut guid = [0u8; 16];
        r.read_exact(&mut guid)?;
        let version_major = r.read_u8()?;
        let version_minor = r.read_u8()?;
        if version_major != 1 || version_minor > 4 {
            return Err(unsupported(format!(
                "version {version_major}.{version_minor} is not supported"
            )));
        }

        let system_identifier = read_string(r, 32)?;
        let generating_software = read_string(r, 32)?;
        let creation_day_of_year = r.read_u16::<LittleEndian>()?;
        let creation_year = r.read_u16::<LittleEndian>()?;
        let header_size = r.read_u16::<LittleEndian>()?;
        let offset_to_point_data = r.read_u32::<LittleEndian>()?;
        let num_variable_length_records = r.read_u32::<LittleEndian>()?;
        let point_data_format_id = r.read_u8()?;
        let point_data_record_length = r.read_u16::<LittleEndian>()?;
        let legacy_point_count = r.read_u32::<LittleEndian>()?;
        let mut num_points_by_return = [0u64; 5];
        for n in num_points_by_return.iter_mut() {
            *n = u64::from(r.read_u32::<LittleEndian>()?);
        }
        let scale = read_f64x3(r)?;
        let offset = read_f64x3(r)?;
        // Stored as max x, min x, max y, min y, max z, min z
        let mut extent = [0.0f64; 6];
        for v in extent.iter_mut() {
            *v = r.read_f64::<LittleEndian>()?;
        }
        let max = [extent[0], extent[2], extent[4]];
        let min = [extent[1], extent[3], extent[5]];

        let mut header = Header {
            file_source_id,
            global_encoding,
            version_major,
            version_minor,
            system_identifier,
            generating_software,
            creation_day_of_year,
            creation_year,
            header_size,
            offset_to_point_data,
            num_variable_length_records,
            point_data_format_id,
            point_data_record_length,
            num_point_records: u64::from(legacy_point_count),
            num_points_by_return,
            scale,
            offset,
            min,
            max,
        };

        if version_minor >= 4 && header_size >= HEADER_SIZE_1_4 {
            // waveform start, first EVLR start, EVLR count
            let _ = r.read_u64::<LittleEndian>()?;
            let _ = r.read_u64::<LittleEndian>()?;
            let _ = r.read_u32::<LittleEndian>()?;
            let point_count = r.read_u64::<LittleEndian>()?;
            if legacy_point_count == 0 {
                header.num_point_records = point_count;
                for n in header.num_points_by_return.iter_mut() {
                    *n = r.read_u64::<LittleEndian>()?;
                }
            }
        }

        header.validate()?;
        Ok(header)
    }

    /// Check the header describes data this reader can stream
    pub fn validate(&self) -> Result<()> {
        if self.header_size < MIN_HEADER_SIZE {
            return Err(unsupported(format!("header size {} is too small", self.header_size)));
        }
        if self.offset_to_point_data < u32::from(self.header_size) {
            return Err(unsupported("point data starts inside the header"));
        }
        let format = self.point_format().ok_or_else(|| {
            unsupported(format!("point data format {} is not supported", self.point_data_format_id))
        })?;
        if self.point_data_record_length < format.min_record_length() {
            return Err(unsupported(format!(
                "record length {} is too short for point format {}",
                self.point_data_record_length, self.point_data_format_id
            )));
        }
        if self.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(unsupported("scale factors must be finite and non-zero"));
        }
        Ok(())
    }

    pub fn point_format(&self) -> Option<PointFormat> {
        PointFormat::from_id(self.point_data_format_id)
    }

    /// `"<day>/<year>"`
    pub fn creation_date(&self) -> String {
        format!("{}/{}", self.creation_day_of_year, self.creation_year)
    }

    /// `"<major>.<minor>"`
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.version_major, self.version_minor)
    }

    /// Declared extent of the point data
    pub fn bounds(&self) -> SourceBounds {
        SourceBounds {
            min: Point3d::new(self.min[0], self.min[1], self.min[2]),
            max: Point3d::new(self.max[0], self.max[1], self.max[2]),
        }
    }

    /// Apply scale and offset to stored integer coordinates
    pub fn to_world(&self, x: i32, y: i32, z: i32) -> Point3d {
        Point3d::new(
            f64::from(x) * self.scale[0] + self.offset[0],
            f64::from(y) * self.scale[1] + self.offset[1],
            f64::from(z) * self.scale[2] + self.offset[2],
        )
    }
}
