//! Multi-channel per-face textures

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pointvis_core::{Error, Result};

/// Face topology the texture was authored for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshType {
    Triangle,
    Quad,
}

/// Storage type of the authored texel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int8,
    Int16,
    Half,
    Float,
}

/// What a lookup outside the face returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    #[default]
    Clamp,
    Black,
    Periodic,
}

/// Texel resolution of one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceResolution {
    pub u: u32,
    pub v: u32,
}

impl FaceResolution {
    pub fn new(u: u32, v: u32) -> Self {
        Self { u, v }
    }

    pub fn texel_count(&self) -> usize {
        self.u as usize * self.v as usize
    }
}

/// A texture with one independently sized texel grid per mesh face
pub trait ProceduralTexture: Send + Sync {
    fn num_channels(&self) -> usize;
    fn num_faces(&self) -> usize;
    fn face_resolution(&self, face: usize) -> FaceResolution;
    fn mesh_type(&self) -> MeshType;
    fn data_type(&self) -> DataType;

    /// Index of the alpha channel, if any
    fn alpha_channel(&self) -> Option<usize> {
        None
    }

    fn has_edits(&self) -> bool {
        false
    }

    fn has_mip_maps(&self) -> bool {
        false
    }

    fn u_border_mode(&self) -> BorderMode {
        BorderMode::Clamp
    }

    fn v_border_mode(&self) -> BorderMode {
        BorderMode::Clamp
    }

    fn metadata_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Write the channels of texel `(u, v)` of `face` into `out`.
    ///
    /// Writes at most `out.len()` channels; coordinates are clamped to the face.
    fn texel(&self, face: usize, u: u32, v: u32, out: &mut [f32]);
}

/// One face of a [`MemoryTexture`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureFace {
    pub res: FaceResolution,
    /// Channel-interleaved texels, rows of constant v
    pub data: Vec<f32>,
}

/// Texture held entirely in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryTexture {
    pub num_channels: usize,
    pub mesh_type: MeshType,
    #[serde(default = "default_data_type")]
    pub data_type: DataType,
    #[serde(default)]
    pub alpha_channel: Option<usize>,
    #[serde(default)]
    pub u_border: BorderMode,
    #[serde(default)]
    pub v_border: BorderMode,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub faces: Vec<TextureFace>,
}

fn default_data_type() -> DataType {
    DataType::Float
}

impl MemoryTexture {
    pub fn new(num_channels: usize, mesh_type: MeshType) -> Self {
        Self {
            num_channels,
            mesh_type,
            data_type: DataType::Float,
            alpha_channel: None,
            u_border: BorderMode::Clamp,
            v_border: BorderMode::Clamp,
            metadata: BTreeMap::new(),
            faces: Vec::new(),
        }
    }

    /// Build a texture by evaluating `f(face, u, v, channels)` for every texel
    pub fn from_fn<F>(num_channels: usize, resolutions: &[FaceResolution], mut f: F) -> Self
    where
        F: FnMut(usize, u32, u32, &mut [f32]),
    {
        let mut tex = Self::new(num_channels, MeshType::Triangle);
        for (face, res) in resolutions.iter().enumerate() {
            let mut data = vec![0.0; res.texel_count() * num_channels];
            for v in 0..res.v {
                for u in 0..res.u {
                    let start = (v as usize * res.u as usize + u as usize) * num_channels;
                    f(face, u, v, &mut data[start..start + num_channels]);
                }
            }
            tex.faces.push(TextureFace { res: *res, data });
        }
        tex
    }

    pub fn with_mesh_type(mut self, mesh_type: MeshType) -> Self {
        self.mesh_type = mesh_type;
        self
    }

    pub fn with_border_modes(mut self, u: BorderMode, v: BorderMode) -> Self {
        self.u_border = u;
        self.v_border = v;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Append a face; `data` must hold every texel of `res`
    pub fn add_face(&mut self, res: FaceResolution, data: Vec<f32>) -> Result<()> {
        let expected = res.texel_count() * self.num_channels;
        if data.len() != expected {
            return Err(Error::SourceFormatUnsupported(format!(
                "face {} has {} values, expected {}",
                self.faces.len(),
                data.len(),
                expected
            )));
        }
        self.faces.push(TextureFace { res, data });
        Ok(())
    }

    /// Check every face carries the data its resolution implies
    pub fn validate(&self) -> Result<()> {
        for (i, face) in self.faces.iter().enumerate() {
            if face.data.len() != face.res.texel_count() * self.num_channels {
                return Err(Error::SourceFormatUnsupported(format!(
                    "face {} has {} values, expected {}",
                    i,
                    face.data.len(),
                    face.res.texel_count() * self.num_channels
                )));
            }
        }
        if let Some(alpha) = self.alpha_channel {
            if alpha >= self.num_channels {
                return Err(Error::SourceFormatUnsupported(format!(
                    "alpha channel {alpha} out of range"
                )));
            }
        }
        Ok(())
    }
}

impl ProceduralTexture for MemoryTexture {
    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn num_faces(&self) -> usize {
        self.faces.len()
    }

    fn face_resolution(&self, face: usize) -> FaceResolution {
        self.faces
            .get(face)
            .map_or(FaceResolution::new(0, 0), |f| f.res)
    }

    fn mesh_type(&self) -> MeshType {
        self.mesh_type
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn alpha_channel(&self) -> Option<usize> {
        self.alpha_channel
    }

    fn u_border_mode(&self) -> BorderMode {
        self.u_border
    }

    fn v_border_mode(&self) -> BorderMode {
        self.v_border
    }

    fn metadata_keys(&self) -> Vec<String> {
        self.metadata.keys().cloned().collect()
    }

    fn texel(&self, face: usize, u: u32, v: u32, out: &mut [f32]) {
        let Some(f) = self.faces.get(face) else {
            out.fill(0.0);
            return;
        };
        if f.res.u == 0 || f.res.v == 0 {
            out.fill(0.0);
            return;
        }
        let u = u.min(f.res.u - 1) as usize;
        let v = v.min(f.res.v - 1) as usize;
        let start = (v * f.res.u as usize + u) * self.num_channels;
        let n = out.len().min(self.num_channels);
        out[..n].copy_from_slice(&f.data[start..start + n]);
    }
}
