use thiserror::Error;

use crate::commands::TextureRef;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(String),
    #[error("Invalid simulation settings: {0}")]
    InvalidSettings(String),
    #[error("LOD index {lod_index} is outside a chain of {lod_count} levels")]
    LodIndexOutOfRange { lod_index: usize, lod_count: usize },
    #[error("No texture backs {0:?}")]
    UnresolvedTexture(TextureRef),
    #[error("Simulation shader is missing entry point `{0}`")]
    MissingShader(&'static str),
}
