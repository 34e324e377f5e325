//! Reconstruction filters evaluated at arbitrary face coordinates

use std::sync::{Arc, Mutex};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::texture::{BorderMode, ProceduralTexture};

/// Reconstruction kernel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    Point,
    Bilinear,
    Box,
    Gaussian,
    Bicubic,
    BSpline,
    CatmullRom,
    Mitchell,
}

impl FilterType {
    pub const ALL: [FilterType; 8] = [
        FilterType::Point,
        FilterType::Bilinear,
        FilterType::Box,
        FilterType::Gaussian,
        FilterType::Bicubic,
        FilterType::BSpline,
        FilterType::CatmullRom,
        FilterType::Mitchell,
    ];

    /// Map a host enum index; unknown values fall back to point sampling
    pub fn from_index(index: i32) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_else(|| {
                warn!("Invalid filter type: {} - defaulting to point filtering", index);
                FilterType::Point
            })
    }

    pub fn index(self) -> i32 {
        self as i32
    }
}

/// Options a filter is created with. Filters are rebuilt when these change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub filter: FilterType,
    /// Filter width in face-normalized units, applied to u and v alike
    pub width: f32,
    /// Bicubic sharpness in [0, 1]
    pub sharpness: f32,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            filter: FilterType::Point,
            width: 0.001,
            sharpness: 0.0,
        }
    }
}

impl FilterOptions {
    pub fn new(filter: FilterType, width: f32) -> Self {
        Self {
            filter,
            width,
            ..Default::default()
        }
    }

    pub fn with_sharpness(mut self, sharpness: f32) -> Self {
        self.sharpness = sharpness.clamp(0.0, 1.0);
        self
    }
}

/// Evaluates a texture at continuous face coordinates
pub trait TextureFilter: Send + Sync {
    /// Filter `face` at `(u, v)` in `[0, 1]` and write up to `out.len()` channels
    fn eval(&self, out: &mut [f32], face: usize, u: f32, v: f32);

    /// Whether concurrent `eval` calls proceed independently
    fn is_thread_safe(&self) -> bool;

    fn options(&self) -> FilterOptions;
}

/// Build the filter selected by `options` over `texture`
pub fn create_filter(
    texture: Arc<dyn ProceduralTexture>,
    options: FilterOptions,
) -> Arc<dyn TextureFilter> {
    match options.filter {
        FilterType::Point => Arc::new(PointFilter { texture, options }),
        other => Arc::new(KernelFilter {
            texture,
            options,
            kernel: Kernel::for_type(other, options.sharpness),
            scratch: Mutex::new(Scratch::default()),
        }),
    }
}

/// Nearest texel lookup
pub struct PointFilter {
    texture: Arc<dyn ProceduralTexture>,
    options: FilterOptions,
}

fn texel_index(coord: f32, res: u32) -> u32 {
    let i = (coord * res as f32).floor();
    if i <= 0.0 {
        0
    } else {
        (i as u32).min(res.saturating_sub(1))
    }
}

impl TextureFilter for PointFilter {
    fn eval(&self, out: &mut [f32], face: usize, u: f32, v: f32) {
        let res = self.texture.face_resolution(face);
        self.texture
            .texel(face, texel_index(u, res.u), texel_index(v, res.v), out);
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn options(&self) -> FilterOptions {
        self.options
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kernel {
    /// Tent over one texel, width ignored
    Bilinear,
    Box,
    Gaussian,
    /// Mitchell-Netravali family
    Cubic { b: f32, c: f32 },
}

impl Kernel {
    fn for_type(filter: FilterType, sharpness: f32) -> Self {
        match filter {
            FilterType::Point | FilterType::Bilinear => Kernel::Bilinear,
            FilterType::Box => Kernel::Box,
            FilterType::Gaussian => Kernel::Gaussian,
            FilterType::Bicubic => {
                let b = 1.0 - sharpness;
                Kernel::Cubic { b, c: (1.0 - b) / 2.0 }
            }
            FilterType::BSpline => Kernel::Cubic { b: 1.0, c: 0.0 },
            FilterType::CatmullRom => Kernel::Cubic { b: 0.0, c: 0.5 },
            FilterType::Mitchell => Kernel::Cubic {
                b: 1.0 / 3.0,
                c: 1.0 / 3.0,
            },
        }
    }

    fn support(self) -> f32 {
        match self {
            Kernel::Bilinear => 1.0,
            Kernel::Box => 0.5,
            Kernel::Gaussian | Kernel::Cubic { .. } => 2.0,
        }
    }

    fn weight(self, t: f32) -> f32 {
        let x = t.abs();
        match self {
            Kernel::Bilinear => (1.0 - x).max(0.0),
            Kernel::Box => {
                if x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Kernel::Gaussian => (-2.0 * x * x).exp(),
            Kernel::Cubic { b, c } => {
                let x2 = x * x;
                let x3 = x2 * x;
                let w = if x < 1.0 {
                    (12.0 - 9.0 * b - 6.0 * c) * x3 + (-18.0 + 12.0 * b + 6.0 * c) * x2
                        + (6.0 - 2.0 * b)
                } else if x < 2.0 {
                    (-b - 6.0 * c) * x3
                        + (6.0 * b + 30.0 * c) * x2
                        + (-12.0 * b - 48.0 * c) * x
                        + (8.0 * b + 24.0 * c)
                } else {
                    0.0
                };
                w / 6.0
            }
        }
    }
}

#[derive(Default)]
struct Scratch {
    u_weights: Vec<(i64, f32)>,
    v_weights: Vec<(i64, f32)>,
    texel: Vec<f32>,
    accum: Vec<f32>,
}

/// Separable kernel filter shared by every non-point filter type
pub struct KernelFilter {
    texture: Arc<dyn ProceduralTexture>,
    options: FilterOptions,
    kernel: Kernel,
    scratch: Mutex<Scratch>,
}

fn resolve(i: i64, res: u32, mode: BorderMode) -> Option<u32> {
    let n = i64::from(res);
    if n == 0 {
        return None;
    }
    match mode {
        BorderMode::Clamp => Some(i.clamp(0, n - 1) as u32),
        BorderMode::Black => (0..n).contains(&i).then_some(i as u32),
        BorderMode::Periodic => Some(i.rem_euclid(n) as u32),
    }
}

impl KernelFilter {
    fn weights(&self, coord: f32, res: u32, out: &mut Vec<(i64, f32)>) {
        out.clear();
        let center = coord * res as f32 - 0.5;
        let scale = match self.kernel {
            Kernel::Bilinear => 1.0,
            _ => (self.options.width * res as f32).max(1.0),
        };
        let radius = self.kernel.support() * scale;
        let first = (center - radius).ceil() as i64;
        let last = (center + radius).floor() as i64;
        let mut total = 0.0;
        for i in first..=last {
            let w = self.kernel.weight((i as f32 - center) / scale);
            if w != 0.0 {
                out.push((i, w));
                total += w;
            }
        }
        if total.abs() <= f32::EPSILON {
            out.clear();
            out.push((center.round() as i64, 1.0));
        } else {
            for (_, w) in out.iter_mut() {
                *w /= total;
            }
        }
    }
}

impl TextureFilter for KernelFilter {
    fn eval(&self, out: &mut [f32], face: usize, u: f32, v: f32) {
        let res = self.texture.face_resolution(face);
        let channels = out.len().min(self.texture.num_channels());
        let (u_mode, v_mode) = (self.texture.u_border_mode(), self.texture.v_border_mode());

        let mut guard = match self.scratch.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Scratch {
            u_weights,
            v_weights,
            texel,
            accum,
        } = &mut *guard;
        self.weights(u, res.u, u_weights);
        self.weights(v, res.v, v_weights);
        texel.resize(channels, 0.0);
        accum.clear();
        accum.resize(channels, 0.0);

        for &(vi, vw) in v_weights.iter() {
            let Some(tv) = resolve(vi, res.v, v_mode) else {
                continue;
            };
            for &(ui, uw) in u_weights.iter() {
                let Some(tu) = resolve(ui, res.u, u_mode) else {
                    continue;
                };
                self.texture.texel(face, tu, tv, texel);
                let w = uw * vw;
                for (a, t) in accum.iter_mut().zip(texel.iter()) {
                    *a += w * t;
                }
            }
        }
        out[..channels].copy_from_slice(accum);
    }

    fn is_thread_safe(&self) -> bool {
        false
    }

    fn options(&self) -> FilterOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{FaceResolution, MemoryTexture};
    use approx::assert_relative_eq;

    fn gradient() -> Arc<dyn ProceduralTexture> {
        Arc::new(MemoryTexture::from_fn(1, &[FaceResolution::new(4, 4)], |_, u, _, c| {
            c[0] = u as f32;
        }))
    }

    #[test]
    fn test_unknown_index_falls_back_to_point() {
        assert_eq!(FilterType::from_index(7), FilterType::Mitchell);
        assert_eq!(FilterType::from_index(8), FilterType::Point);
        assert_eq!(FilterType::from_index(-1), FilterType::Point);
        for f in FilterType::ALL {
            assert_eq!(FilterType::from_index(f.index()), f);
        }
    }

    #[test]
    fn test_point_filter_hits_texels() {
        let f = create_filter(gradient(), FilterOptions::default());
        assert!(f.is_thread_safe());
        let mut out = [0.0];
        f.eval(&mut out, 0, 0.6, 0.1);
        assert_eq!(out[0], 2.0);
        f.eval(&mut out, 0, 1.0, 1.0);
        assert_eq!(out[0], 3.0);
    }

    #[test]
    fn test_bilinear_interpolates_between_centres() {
        let f = create_filter(gradient(), FilterOptions::new(FilterType::Bilinear, 0.0));
        assert!(!f.is_thread_safe());
        let mut out = [0.0];
        // halfway between texel centres 1 and 2
        f.eval(&mut out, 0, 0.5, 0.5);
        assert_relative_eq!(out[0], 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_kernels_preserve_constants() {
        let tex: Arc<dyn ProceduralTexture> =
            Arc::new(MemoryTexture::from_fn(3, &[FaceResolution::new(8, 8)], |_, _, _, c| {
                c.copy_from_slice(&[0.25, 0.5, 0.75]);
            }));
        for ty in FilterType::ALL {
            let f = create_filter(tex.clone(), FilterOptions::new(ty, 0.2));
            let mut out = [0.0; 3];
            f.eval(&mut out, 0, 0.37, 0.81);
            assert_relative_eq!(out[0], 0.25, epsilon = 1e-4);
            assert_relative_eq!(out[2], 0.75, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_cubic_weights() {
        let catmull = Kernel::for_type(FilterType::CatmullRom, 0.0);
        assert_relative_eq!(catmull.weight(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(catmull.weight(1.0), 0.0, epsilon = 1e-6);
        let bspline = Kernel::for_type(FilterType::BSpline, 0.0);
        assert_relative_eq!(bspline.weight(0.0), 2.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_border_resolution() {
        assert_eq!(resolve(-1, 4, BorderMode::Clamp), Some(0));
        assert_eq!(resolve(-1, 4, BorderMode::Black), None);
        assert_eq!(resolve(-1, 4, BorderMode::Periodic), Some(3));
        assert_eq!(resolve(5, 4, BorderMode::Periodic), Some(1));
    }
}
