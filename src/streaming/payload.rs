//! Decoded resource payloads

use crate::core::types::DMat4;
use crate::map::config::MapConfig;
use crate::tile::MetaTile;
use super::resource::ResourceKind;
use serde::{Deserialize, Serialize};

/// One submesh of a tile mesh aggregate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshPart {
    /// Column-major transform from normalized mesh space to physical space
    #[serde(default = "identity_cols")]
    pub norm_to_phys: [f64; 16],
    /// Has UVs into the surface's own texture
    #[serde(default)]
    pub internal_uv: bool,
    /// Has UVs into bound layer textures
    #[serde(default)]
    pub external_uv: bool,
    /// Numeric id of a bound layer baked into the mesh, 0 for none
    #[serde(default)]
    pub texture_layer: u32,
    /// GPU bytes the uploaded submesh occupies
    #[serde(default)]
    pub gpu_memory: usize,
}

fn identity_cols() -> [f64; 16] {
    DMat4::IDENTITY.to_cols_array()
}

impl MeshPart {
    pub fn model(&self) -> DMat4 {
        DMat4::from_cols_array(&self.norm_to_phys)
    }
}

/// All submeshes of one tile
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshAggregate {
    pub submeshes: Vec<MeshPart>,
}

/// Texture as handed to the renderer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes, decoded by the renderer on upload
    pub encoded: Vec<u8>,
    pub gpu_memory: usize,
}

/// Geodata features of one tile
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeodataTile {
    pub features: serde_json::Value,
    pub source_len: usize,
}

/// Typed result of decoding a resource
#[derive(Debug)]
pub enum Payload {
    MapConfig(MapConfig),
    MetaTile(MetaTile),
    MeshAggregate(MeshAggregate),
    Texture(TextureData),
    Geodata(GeodataTile),
}

impl Payload {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Payload::MapConfig(_) => ResourceKind::MapConfig,
            Payload::MetaTile(_) => ResourceKind::MetaTile,
            Payload::MeshAggregate(_) => ResourceKind::MeshAggregate,
            Payload::Texture(_) => ResourceKind::Texture,
            Payload::Geodata(_) => ResourceKind::Geodata,
        }
    }

    pub fn ram_cost(&self) -> usize {
        match self {
            Payload::MapConfig(_) => std::mem::size_of::<MapConfig>(),
            Payload::MetaTile(tile) => tile.memory_cost(),
            Payload::MeshAggregate(mesh) => {
                std::mem::size_of::<MeshAggregate>()
                    + mesh.submeshes.len() * std::mem::size_of::<MeshPart>()
            }
            Payload::Texture(_) => std::mem::size_of::<TextureData>(),
            Payload::Geodata(geodata) => geodata.source_len,
        }
    }

    pub fn gpu_cost(&self) -> usize {
        match self {
            Payload::MeshAggregate(mesh) => mesh.submeshes.iter().map(|s| s.gpu_memory).sum(),
            Payload::Texture(texture) => texture.gpu_memory,
            _ => 0,
        }
    }

    pub fn as_map_config(&self) -> Option<&MapConfig> {
        match self {
            Payload::MapConfig(config) => Some(config),
            _ => None,
        }
    }

    pub fn as_meta_tile(&self) -> Option<&MetaTile> {
        match self {
            Payload::MetaTile(tile) => Some(tile),
            _ => None,
        }
    }

    pub fn as_mesh_aggregate(&self) -> Option<&MeshAggregate> {
        match self {
            Payload::MeshAggregate(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureData> {
        match self {
            Payload::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_geodata(&self) -> Option<&GeodataTile> {
        match self {
            Payload::Geodata(geodata) => Some(geodata),
            _ => None,
        }
    }
}
