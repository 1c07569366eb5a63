//! Serializable glTF document structs.
//!
//! Entities are keyed by name and key order is deterministic: struct fields
//! serialize in declaration order and maps preserve insertion order. Byte
//! level diff tooling in this ecosystem commonly relies on stable output.
use indexmap::IndexMap;
use serde::Serialize;

use crate::buffer::{Accessor, BufferView, BufferViews};
use crate::error::ExportError;
use crate::technique::{Parameter, States, Technique};

#[derive(Debug, Serialize)]
pub struct Document {
    pub buffers: IndexMap<String, BufferJson>,
    #[serde(rename = "bufferViews")]
    pub buffer_views: IndexMap<String, BufferViewJson>,
    pub accessors: IndexMap<String, AccessorJson>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub meshes: IndexMap<String, MeshJson>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub skins: IndexMap<String, SkinJson>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub animations: IndexMap<String, AnimationJson>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub techniques: IndexMap<String, TechniqueJson>,
}

#[derive(Debug, Serialize)]
pub struct BufferJson {
    #[serde(rename = "byteLength")]
    pub byte_length: u64,
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub struct BufferViewJson {
    pub buffer: String,
    #[serde(rename = "byteLength")]
    pub byte_length: u64,
    #[serde(rename = "byteOffset")]
    pub byte_offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
}

impl BufferViewJson {
    /// Requires the view's global byte offset to be assigned.
    pub fn from_view(view: &BufferView, buffer_name: &str) -> Result<Self, ExportError> {
        let byte_offset = view
            .byte_offset()
            .ok_or_else(|| ExportError::UnpopulatedAccessor {
                name: view.name.clone(),
            })?;
        Ok(Self {
            buffer: buffer_name.to_string(),
            byte_length: view.byte_length() as u64,
            byte_offset,
            target: view.target.map(|t| t as u32),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AccessorJson {
    #[serde(rename = "bufferView")]
    pub buffer_view: String,
    #[serde(rename = "byteOffset")]
    pub byte_offset: u64,
    #[serde(rename = "componentType")]
    pub component_type: u32,
    pub count: u64,
    #[serde(rename = "type")]
    pub element_type: String,
}

impl AccessorJson {
    /// Fails for accessors that were never populated, since referencing an
    /// empty buffer region would produce a corrupt asset.
    pub fn from_accessor(accessor: &Accessor, views: &BufferViews) -> Result<Self, ExportError> {
        if accessor.count == 0 {
            return Err(ExportError::UnpopulatedAccessor {
                name: accessor.name.clone(),
            });
        }
        Ok(Self {
            buffer_view: views.view(accessor.view).name.clone(),
            byte_offset: accessor.byte_offset,
            component_type: accessor.component_type as u32,
            count: accessor.count as u64,
            element_type: accessor.element_type.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MeshJson {
    pub name: String,
    pub primitives: Vec<PrimitiveJson>,
}

#[derive(Debug, Serialize)]
pub struct PrimitiveJson {
    pub attributes: IndexMap<String, String>,
    pub indices: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    /// Always 4 (TRIANGLES).
    pub mode: u32,
}

#[derive(Debug, Serialize)]
pub struct SkinJson {
    #[serde(rename = "bindShapeMatrix")]
    pub bind_shape_matrix: [f32; 16],
    #[serde(rename = "inverseBindMatrices")]
    pub inverse_bind_matrices: String,
    #[serde(rename = "jointNames")]
    pub joint_names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AnimationJson {
    pub channels: Vec<ChannelJson>,
    /// `"TIME"` plus one output parameter per emitted path, each resolving
    /// to an accessor name.
    pub parameters: IndexMap<String, String>,
    pub samplers: IndexMap<String, SamplerJson>,
}

#[derive(Debug, Serialize)]
pub struct ChannelJson {
    pub sampler: String,
    pub target: TargetJson,
}

#[derive(Debug, Serialize)]
pub struct TargetJson {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SamplerJson {
    pub input: String,
    pub interpolation: String,
    pub output: String,
}

#[derive(Debug, Serialize)]
pub struct TechniqueJson {
    pub program: String,
    pub parameters: IndexMap<String, Parameter>,
    pub attributes: IndexMap<String, String>,
    pub uniforms: IndexMap<String, String>,
    pub states: States,
}

impl From<&Technique> for TechniqueJson {
    fn from(technique: &Technique) -> Self {
        Self {
            program: technique.program.clone(),
            parameters: technique
                .parameters
                .iter()
                .map(|p| (p.name.clone(), p.clone()))
                .collect(),
            attributes: technique
                .attributes
                .iter()
                .map(|b| (b.name.clone(), b.parameter.clone()))
                .collect(),
            uniforms: technique
                .uniforms
                .iter()
                .map(|b| (b.name.clone(), b.parameter.clone()))
                .collect(),
            states: technique.states.clone(),
        }
    }
}
