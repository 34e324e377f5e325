//! Loading textures from files

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::texture::{MemoryTexture, ProceduralTexture};
use pointvis_core::{Error, Result};

/// Opens textures by path
pub trait TextureLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn ProceduralTexture>>;
}

/// Reads [`MemoryTexture`] documents stored as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTextureLoader;

impl JsonTextureLoader {
    pub fn parse(text: &str) -> Result<MemoryTexture> {
        let tex: MemoryTexture = serde_json::from_str(text)
            .map_err(|e| Error::SourceFormatUnsupported(format!("invalid texture document: {e}")))?;
        tex.validate()?;
        Ok(tex)
    }

    pub fn save(texture: &MemoryTexture, path: &Path) -> Result<()> {
        let text = serde_json::to_string(texture)
            .map_err(|e| Error::Config(format!("cannot serialize texture: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }
}

impl TextureLoader for JsonTextureLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn ProceduralTexture>> {
        let text = fs::read_to_string(path).map_err(|e| Error::SourceOpenFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let tex = Self::parse(&text)?;
        info!(
            "Loaded texture {} ({} faces, {} channels)",
            path.display(),
            tex.faces.len(),
            tex.num_channels
        );
        Ok(Arc::new(tex))
    }
}
