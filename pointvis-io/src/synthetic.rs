//! Minimal LAS file generation for fixtures and demos
//!
//! Writes the public header and point records of formats 0-3 with no
//! variable length records. Fields beyond the core set are zero-filled.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::header::{Header, PointFormat, MIN_HEADER_SIZE, SIGNATURE};
use crate::record::PointRecord;
use pointvis_core::Result;

/// Builder for small synthetic point files
#[derive(Debug, Clone)]
pub struct SyntheticCloud {
    pub version: (u8, u8),
    pub format: PointFormat,
    pub record_length: Option<u16>,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub creation: (u16, u16),
    pub points: Vec<PointRecord>,
    /// Overrides the point count written to the header
    pub declared_count: Option<u32>,
}

impl Default for SyntheticCloud {
    fn default() -> Self {
        Self {
            version: (1, 2),
            format: PointFormat::Format0,
            record_length: None,
            scale: [0.01; 3],
            offset: [0.0; 3],
            creation: (1, 2020),
            points: Vec::new(),
            declared_count: None,
        }
    }
}

impl SyntheticCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, major: u8, minor: u8) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn with_format(mut self, format: PointFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_record_length(mut self, len: u16) -> Self {
        self.record_length = Some(len);
        self
    }

    pub fn with_scale_offset(mut self, scale: [f64; 3], offset: [f64; 3]) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_creation(mut self, day: u16, year: u16) -> Self {
        self.creation = (day, year);
        self
    }

    pub fn with_declared_count(mut self, count: u32) -> Self {
        self.declared_count = Some(count);
        self
    }

    /// Append a point given in stored integer units
    pub fn push(&mut self, x: i32, y: i32, z: i32, intensity: u16, return_number: u8, num_returns: u8) {
        let mut p = PointRecord {
            x,
            y,
            z,
            intensity,
            ..Default::default()
        };
        p.set_returns(return_number, num_returns);
        self.points.push(p);
    }

    pub fn with_point(mut self, x: i32, y: i32, z: i32, intensity: u16, return_number: u8, num_returns: u8) -> Self {
        self.push(x, y, z, intensity, return_number, num_returns);
        self
    }

    fn record_length(&self) -> u16 {
        self.record_length.unwrap_or(self.format.min_record_length())
    }

    fn extent(&self) -> ([f64; 3], [f64; 3]) {
        if self.points.is_empty() {
            return ([0.0; 3], [0.0; 3]);
        }
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in &self.points {
            let coords = [p.x, p.y, p.z];
            for axis in 0..3 {
                let v = f64::from(coords[axis]) * self.scale[axis] + self.offset[axis];
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
            }
        }
        (min, max)
    }

    /// Serialize header and records
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let (min, max) = self.extent();
        let count = self.declared_count.unwrap_or(self.points.len() as u32);
        let mut by_return = [0u32; 5];
        for p in &self.points {
            let r = usize::from(p.return_number());
            if (1..=5).contains(&r) {
                by_return[r - 1] += 1;
            }
        }

        w.write_all(SIGNATURE)?;
        w.write_u16::<LittleEndian>(0)?; // file source id
        w.write_u16::<LittleEndian>(0)?; // global encoding
        w.write_all(&[0u8; 16])?; // project guid
        w.write_u8(self.version.0)?;
        w.write_u8(self.version.1)?;
        write_fixed(w, "pointvis")?;
        write_fixed(w, "pointvis synthetic")?;
        w.write_u16::<LittleEndian>(self.creation.0)?;
        w.write_u16::<LittleEndian>(self.creation.1)?;
        w.write_u16::<LittleEndian>(MIN_HEADER_SIZE)?;
        w.write_u32::<LittleEndian>(u32::from(MIN_HEADER_SIZE))?;
        w.write_u32::<LittleEndian>(0)?; // variable length records
        w.write_u8(self.format.id())?;
        w.write_u16::<LittleEndian>(self.record_length())?;
        w.write_u32::<LittleEndian>(count)?;
        for n in by_return {
            w.write_u32::<LittleEndian>(n)?;
        }
        for v in self.scale.iter().chain(self.offset.iter()) {
            w.write_f64::<LittleEndian>(*v)?;
        }
        for axis in 0..3 {
            w.write_f64::<LittleEndian>(max[axis])?;
            w.write_f64::<LittleEndian>(min[axis])?;
        }

        let padding = usize::from(self.record_length()).saturating_sub(16);
        let zeros = vec![0u8; padding];
        for p in &self.points {
            w.write_i32::<LittleEndian>(p.x)?;
            w.write_i32::<LittleEndian>(p.y)?;
            w.write_i32::<LittleEndian>(p.z)?;
            w.write_u16::<LittleEndian>(p.intensity)?;
            w.write_u8(p.flags)?;
            w.write_u8(p.classification)?;
            w.write_all(&zeros)?;
        }
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    /// The header a reader should produce for this cloud
    pub fn expected_header(&self) -> Result<Header> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Header::read_from(&mut bytes.as_slice())
    }
}

fn write_fixed<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let mut buf = [0u8; 32];
    let n = s.len().min(32);
    buf[..n].copy_from_slice(&s.as_bytes()[..n]);
    w.write_all(&buf)?;
    Ok(())
}
