//! Sample primitives stored in render buffers

use bytemuck::{Pod, Zeroable};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// Element layout of a buffer channel, as understood by a draw surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveFormat {
    /// Three 32-bit floats
    Float32x3,
    /// Three unsigned 16-bit integers, normalized to [0, 1] when drawn
    Uint16x3,
}

impl PrimitiveFormat {
    /// Size of one element in bytes
    pub fn byte_size(self) -> usize {
        match self {
            PrimitiveFormat::Float32x3 => 12,
            PrimitiveFormat::Uint16x3 => 6,
        }
    }
}

/// A fixed-width tuple that can live in a buffer channel and be handed to a draw surface
pub trait Primitive: Pod + Send + Sync + std::fmt::Debug {
    const FORMAT: PrimitiveFormat;
}

/// Position of one sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct PositionSample {
    pub xyz: [f32; 3],
}

/// 16-bit RGB colour of one point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct ColorSample {
    pub rgb: [u16; 3],
}

/// Floating point RGB colour, used for filtered texture samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct FloatColorSample {
    pub rgb: [f32; 3],
}

impl Primitive for PositionSample {
    const FORMAT: PrimitiveFormat = PrimitiveFormat::Float32x3;
}

impl Primitive for ColorSample {
    const FORMAT: PrimitiveFormat = PrimitiveFormat::Uint16x3;
}

impl Primitive for FloatColorSample {
    const FORMAT: PrimitiveFormat = PrimitiveFormat::Float32x3;
}

impl PositionSample {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { xyz: [x, y, z] }
    }
}

impl ColorSample {
    pub fn gray(value: u16) -> Self {
        Self { rgb: [value; 3] }
    }
}

impl From<Point3f> for PositionSample {
    fn from(p: Point3f) -> Self {
        Self { xyz: [p.x, p.y, p.z] }
    }
}

impl From<PositionSample> for Point3f {
    fn from(s: PositionSample) -> Self {
        Point3f::new(s.xyz[0], s.xyz[1], s.xyz[2])
    }
}

impl From<Point3d> for PositionSample {
    fn from(p: Point3d) -> Self {
        Self {
            xyz: [p.x as f32, p.y as f32, p.z as f32],
        }
    }
}

impl FloatColorSample {
    /// Build a colour from up to four filtered channels.
    ///
    /// One channel is replicated to gray, two channels leave blue at zero,
    /// and a fourth (alpha) channel is dropped.
    pub fn from_channels(channels: &[f32]) -> Self {
        let rgb = match channels {
            [] => [0.0; 3],
            [l] => [*l; 3],
            [r, g] => [*r, *g, 0.0],
            [r, g, b, ..] => [*r, *g, *b],
        };
        Self { rgb }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_sizes_match_formats() {
        assert_eq!(
            std::mem::size_of::<PositionSample>(),
            PositionSample::FORMAT.byte_size()
        );
        assert_eq!(std::mem::size_of::<ColorSample>(), ColorSample::FORMAT.byte_size());
        assert_eq!(
            std::mem::size_of::<FloatColorSample>(),
            FloatColorSample::FORMAT.byte_size()
        );
    }

    #[test]
    fn test_color_from_channels() {
        assert_eq!(FloatColorSample::from_channels(&[0.5]).rgb, [0.5, 0.5, 0.5]);
        assert_eq!(FloatColorSample::from_channels(&[0.1, 0.2]).rgb, [0.1, 0.2, 0.0]);
        assert_eq!(
            FloatColorSample::from_channels(&[0.1, 0.2, 0.3, 1.0]).rgb,
            [0.1, 0.2, 0.3]
        );
    }
}
