//! Mapping point attributes to 16-bit colours

use log::warn;
use serde::{Deserialize, Serialize};

use pointvis_core::ColorSample;
use pointvis_io::PointRecord;

/// Remaps a 3-bit field onto the full 16-bit range
pub const SCALE_3_TO_16: u16 = u16::MAX / 0x07;

/// Colourization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// Positions only; no colour channel is kept
    #[default]
    None,
    Intensity,
    ReturnNumber,
    ReturnNumberIntensity,
}

impl ColorMode {
    /// Map a host enum index; unknown values disable colour
    pub fn from_index(index: i32) -> Self {
        match index {
            0 => ColorMode::None,
            1 => ColorMode::Intensity,
            2 => ColorMode::ReturnNumber,
            3 => ColorMode::ReturnNumberIntensity,
            other => {
                warn!("Invalid display mode: {} - drawing without colour", other);
                ColorMode::None
            }
        }
    }

    pub fn has_color(self) -> bool {
        self != ColorMode::None
    }
}

/// Computes point colours for one mode and intensity scale.
///
/// Sums saturate at `u16::MAX`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colorizer {
    pub mode: ColorMode,
    pub intensity_scale: f32,
}

impl Colorizer {
    pub fn new(mode: ColorMode, intensity_scale: f32) -> Self {
        Self {
            mode,
            intensity_scale,
        }
    }

    fn scaled_intensity(&self, intensity: u16) -> u16 {
        // float to int casts saturate
        (f32::from(intensity) * self.intensity_scale) as u16
    }

    /// Colour of `p`, or `None` in [`ColorMode::None`]
    pub fn color(&self, p: &PointRecord) -> Option<ColorSample> {
        let ret = u16::from(p.return_number()).saturating_mul(SCALE_3_TO_16);
        let num = u16::from(p.num_returns()).saturating_mul(SCALE_3_TO_16);
        let rgb = match self.mode {
            ColorMode::None => return None,
            ColorMode::Intensity => [self.scaled_intensity(p.intensity); 3],
            ColorMode::ReturnNumber => [ret, num, ret],
            ColorMode::ReturnNumberIntensity => {
                let i = self.scaled_intensity(p.intensity);
                [
                    ret.saturating_add(i),
                    num.saturating_add(i),
                    ret.saturating_add(i),
                ]
            }
        };
        Some(ColorSample { rgb })
    }
}
