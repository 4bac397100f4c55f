//! Decoder seam turning raw bytes into typed payloads

use super::payload::{GeodataTile, MeshAggregate, Payload, TextureData};
use super::resource::ResourceKind;
use crate::map::config::MapConfig;
use crate::tile::MetaTile;
use thiserror::Error;

/// Decode failure, turns the resource into `ErrorLoad`
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {kind} in {name}: {message}")]
    Malformed {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    #[error("no decoder for {0}")]
    Unsupported(ResourceKind),
}

/// Turns downloaded content into a [`Payload`]
///
/// Runs on the render thread, so implementations may upload to the GPU
/// from here.
pub trait Decoder: Send + Sync {
    fn decode(&self, kind: ResourceKind, name: &str, content: &[u8]) -> Result<Payload, DecodeError>;
}

/// JSON decoder for configuration, metadata, meshes and geodata
///
/// Textures pass through encoded; PNG dimensions are read from the header
/// to estimate their GPU footprint.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicDecoder;

impl BasicDecoder {
    fn malformed(kind: ResourceKind, name: &str, e: impl ToString) -> DecodeError {
        DecodeError::Malformed {
            kind,
            name: name.to_string(),
            message: e.to_string(),
        }
    }

    fn png_dimensions(content: &[u8]) -> Option<(u32, u32)> {
        const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        if content.len() < 24 || content[..8] != SIGNATURE || &content[12..16] != b"IHDR" {
            return None;
        }
        let width = u32::from_be_bytes(content[16..20].try_into().ok()?);
        let height = u32::from_be_bytes(content[20..24].try_into().ok()?);
        Some((width, height))
    }

    fn texture(content: &[u8]) -> TextureData {
        let (width, height) = Self::png_dimensions(content).unwrap_or((0, 0));
        let gpu_memory = if width > 0 && height > 0 {
            width as usize * height as usize * 4
        } else {
            content.len()
        };
        TextureData {
            width,
            height,
            encoded: content.to_vec(),
            gpu_memory,
        }
    }
}

impl Decoder for BasicDecoder {
    fn decode(&self, kind: ResourceKind, name: &str, content: &[u8]) -> Result<Payload, DecodeError> {
        match kind {
            ResourceKind::MapConfig => MapConfig::from_json(content, name)
                .map(Payload::MapConfig)
                .map_err(|e| Self::malformed(kind, name, e)),
            ResourceKind::MetaTile => {
                let tile = serde_json::from_slice::<MetaTile>(content).map_err(|e| Self::malformed(kind, name, e))?;
                tile.check_shape().map_err(|e| Self::malformed(kind, name, e))?;
                Ok(Payload::MetaTile(tile))
            }
            ResourceKind::MeshAggregate => serde_json::from_slice::<MeshAggregate>(content)
                .map(Payload::MeshAggregate)
                .map_err(|e| Self::malformed(kind, name, e)),
            ResourceKind::Geodata => serde_json::from_slice::<serde_json::Value>(content)
                .map(|features| {
                    Payload::Geodata(GeodataTile {
                        features,
                        source_len: content.len(),
                    })
                })
                .map_err(|e| Self::malformed(kind, name, e)),
            ResourceKind::Texture => {
                if content.is_empty() {
                    return Err(Self::malformed(kind, name, "empty texture"));
                }
                Ok(Payload::Texture(Self::texture(content)))
            }
        }
    }
}
