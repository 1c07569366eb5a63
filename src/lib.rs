//! # gltf_export
//! gltf_export converts host scene data like meshes, skeletons, animation
//! clips, and render techniques into a glTF document backed by a single
//! binary buffer.
//!
//! The [Exporter] owns the shared buffer views for one export run. Scene
//! collaborators feed raw arrays, accessors pack them into the views, and
//! [Exporter::finish] emits the JSON graph plus the concatenated binary
//! payload.
//!
//! ```
//! use gltf_export::Exporter;
//! use gltf_export::scene::{MeshData, Submesh};
//! use glam::vec3;
//!
//! let mesh = MeshData {
//!     name: "triangle".to_string(),
//!     positions: vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)],
//!     submeshes: vec![Submesh {
//!         indices: vec![0, 1, 2],
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let mut exporter = Exporter::new("triangle.bin");
//! exporter.add_mesh(&mesh, false).unwrap();
//! let (json, payload) = exporter.finish().unwrap();
//! assert!(!payload.is_empty());
//! # let _ = json;
//! ```
use std::path::Path;

use indexmap::IndexMap;

use crate::animation::Animation;
use crate::attributes::Attributes;
use crate::buffer::{Accessor, BufferViews, ComponentType, ElementType, ViewKind};
use crate::document::{
    AccessorJson, AnimationJson, BufferJson, BufferViewJson, ChannelJson, Document, MeshJson,
    PrimitiveJson, SamplerJson, SkinJson, TargetJson, TechniqueJson,
};
use crate::scene::{AnimationClip, BindPose, MeshData, Node};
use crate::skin::Skin;
use crate::technique::Technique;
use crate::unpack::UnpackContext;

pub use error::{ExportError, SaveGltfError};
pub use transform::Transform;

pub mod animation;
pub mod attributes;
pub mod buffer;
pub mod document;
pub mod error;
pub mod scene;
pub mod skin;
pub mod technique;
mod transform;
pub mod unpack;

/// One exported submesh: its index accessor and material binding.
#[derive(Debug)]
pub struct ExportedPrimitive {
    pub submesh_index: usize,
    pub indices: Accessor,
    pub material: Option<String>,
}

/// A mesh with populated attribute and index accessors.
#[derive(Debug)]
pub struct ExportedMesh {
    pub name: String,
    pub attributes: Attributes,
    pub primitives: Vec<ExportedPrimitive>,
}

/// Collects scene data for one export run and emits the final document.
pub struct Exporter {
    buffer_name: String,
    views: BufferViews,
    meshes: Vec<ExportedMesh>,
    skins: Vec<Skin>,
    animations: Vec<Animation>,
    techniques: Vec<Technique>,
}

impl Exporter {
    /// `buffer_name` is the URI of the binary buffer, like `"scene.bin"`.
    pub fn new(buffer_name: impl Into<String>) -> Self {
        Self {
            buffer_name: buffer_name.into(),
            views: BufferViews::new(),
            meshes: Vec::new(),
            skins: Vec::new(),
            animations: Vec::new(),
            techniques: Vec::new(),
        }
    }

    /// Pack a mesh's vertex attributes and submesh index lists.
    ///
    /// `flip_winding` reorders triangle indices for hosts with a clockwise
    /// front face convention.
    pub fn add_mesh(&mut self, mesh: &MeshData, flip_winding: bool) -> Result<(), ExportError> {
        if mesh.positions.is_empty() {
            return Err(ExportError::MissingPositions {
                name: mesh.name.clone(),
            });
        }

        let mut attributes = Attributes::new(mesh);
        attributes.populate(mesh, &mut self.views)?;

        let mut primitives = Vec::with_capacity(mesh.submeshes.len());
        for (submesh_index, submesh) in mesh.submeshes.iter().enumerate() {
            let mut indices = Accessor::new(
                format!("accessor_indices_{}_{submesh_index}", mesh.name),
                ViewKind::Index,
                ElementType::Scalar,
                ComponentType::UnsignedShort,
            );
            indices.populate_indices(&mut self.views, &submesh.indices, flip_winding)?;
            primitives.push(ExportedPrimitive {
                submesh_index,
                indices,
                material: submesh.material.clone(),
            });
        }

        self.meshes.push(ExportedMesh {
            name: mesh.name.clone(),
            attributes,
            primitives,
        });
        Ok(())
    }

    /// Add a skin with inverse bind matrices computed from the skeleton
    /// hierarchy under `root_bone`.
    pub fn add_skin_from_skeleton(
        &mut self,
        name: impl Into<String>,
        root_bone: &Node,
        root_parent: Option<Transform>,
    ) -> Result<(), ExportError> {
        let skin = Skin::from_skeleton(name, root_bone, root_parent, &mut self.views)?;
        self.skins.push(skin);
        Ok(())
    }

    /// Add a skin using the host's pre-authored inverse bind matrices.
    pub fn add_skin_from_bind_poses(
        &mut self,
        name: impl Into<String>,
        root_bone: &Node,
        root_parent: Option<Transform>,
        bind_poses: &[BindPose],
    ) -> Result<(), ExportError> {
        let skin =
            Skin::from_bind_poses(name, root_bone, root_parent, bind_poses, &mut self.views)?;
        self.skins.push(skin);
        Ok(())
    }

    /// Extract and pack all animated bone paths of `clip`.
    ///
    /// Curve paths resolve against the children of `scene_root`.
    pub fn add_animation(
        &mut self,
        clip: &AnimationClip,
        scene_root: &Node,
    ) -> Result<(), ExportError> {
        let mut animation = Animation::new(&clip.name);
        animation.populate(clip, scene_root, &mut self.views)?;
        self.animations.push(animation);
        Ok(())
    }

    pub fn add_technique(&mut self, technique: Technique) {
        self.techniques.push(technique);
    }

    /// Run the texture unpacking pass over `meshes` and rewrite the UV bytes
    /// of affected primitives in place.
    ///
    /// The returned context maps texture identifiers to crop rectangles for
    /// [UnpackContext::process_texture]. Meshes must already have been added
    /// with [add_mesh](Self::add_mesh) under the same names.
    pub fn unpack_textures(&mut self, meshes: &[MeshData]) -> UnpackContext {
        let mut context = UnpackContext::new();
        for mesh in meshes {
            context.scan_mesh(mesh);
        }
        context.build();

        for mesh in &self.meshes {
            let Some(texcoord0) = &mesh.attributes.texcoords[0] else {
                continue;
            };
            for primitive in &mesh.primitives {
                context.process_mesh(
                    &mesh.name,
                    primitive.submesh_index,
                    &primitive.indices,
                    texcoord0,
                    &mut self.views,
                );
            }
        }

        context
    }

    /// Assign global buffer offsets, validate accessor references, and emit
    /// the JSON document plus the binary payload.
    pub fn finish(mut self) -> Result<(String, Vec<u8>), ExportError> {
        let mut offset = 0u64;
        for view in self.views.in_order_mut() {
            if view.byte_length() > 0 {
                view.assign_byte_offset(offset);
                offset += view.byte_length() as u64;
            }
        }

        let mut payload = Vec::with_capacity(offset as usize);
        for view in self.views.in_order() {
            payload.extend_from_slice(view.bytes());
        }

        let document = self.build_document(payload.len() as u64)?;
        let json = serde_json::to_string_pretty(&document)?;
        Ok((json, payload))
    }

    /// Write `<path>.gltf` and the binary buffer next to it.
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<(), SaveGltfError> {
        let path = path.as_ref();
        let buffer_name = self.buffer_name.clone();
        let (json, payload) = self.finish()?;

        std::fs::write(path.with_extension("gltf"), json)?;
        std::fs::write(path.with_file_name(buffer_name), payload)?;
        Ok(())
    }

    fn build_document(&self, payload_length: u64) -> Result<Document, ExportError> {
        let buffer_key = self
            .buffer_name
            .strip_suffix(".bin")
            .unwrap_or(&self.buffer_name)
            .to_string();

        let mut buffers = IndexMap::new();
        buffers.insert(
            buffer_key.clone(),
            BufferJson {
                byte_length: payload_length,
                uri: self.buffer_name.clone(),
            },
        );

        let mut buffer_views = IndexMap::new();
        for view in self.views.in_order() {
            if view.byte_length() > 0 {
                buffer_views.insert(
                    view.name.clone(),
                    BufferViewJson::from_view(view, &buffer_key)?,
                );
            }
        }

        let mut accessors = IndexMap::new();
        let add_accessor = |accessors: &mut IndexMap<String, AccessorJson>,
                            accessor: &Accessor|
         -> Result<String, ExportError> {
            let json = AccessorJson::from_accessor(accessor, &self.views)?;
            accessors.insert(accessor.name.clone(), json);
            Ok(accessor.name.clone())
        };

        let mut meshes = IndexMap::new();
        for mesh in &self.meshes {
            let mut attributes = IndexMap::new();
            for (semantic, accessor) in mesh.attributes.iter_semantics() {
                attributes.insert(semantic, add_accessor(&mut accessors, accessor)?);
            }

            let mut primitives = Vec::new();
            for primitive in &mesh.primitives {
                primitives.push(PrimitiveJson {
                    attributes: attributes.clone(),
                    indices: add_accessor(&mut accessors, &primitive.indices)?,
                    material: primitive.material.clone(),
                    mode: 4,
                });
            }

            meshes.insert(
                mesh.name.clone(),
                MeshJson {
                    name: mesh.name.clone(),
                    primitives,
                },
            );
        }

        let mut skins = IndexMap::new();
        for skin in &self.skins {
            let inverse_bind_matrices = add_accessor(&mut accessors, &skin.inverse_bind_matrices)?;
            skins.insert(
                skin.name.clone(),
                SkinJson {
                    bind_shape_matrix: skin.bind_shape_matrix.to_cols_array(),
                    inverse_bind_matrices,
                    joint_names: skin.joint_names.clone(),
                },
            );
        }

        let mut animations = IndexMap::new();
        for animation in &self.animations {
            // Clips without any curves never commit a timeline and are omitted.
            if animation.time_accessor().count == 0 {
                continue;
            }
            let time = add_accessor(&mut accessors, animation.time_accessor())?;

            let mut channels = Vec::new();
            let mut parameters = IndexMap::new();
            let mut samplers = IndexMap::new();
            parameters.insert("TIME".to_string(), time);

            for path in animation.emitted_paths() {
                let output = add_accessor(&mut accessors, &path.accessor)?;
                parameters.insert(path.sampler.output.clone(), output);
                samplers.insert(
                    path.sampler.name.clone(),
                    SamplerJson {
                        input: path.sampler.input.clone(),
                        interpolation: "LINEAR".to_string(),
                        output: path.sampler.output.clone(),
                    },
                );
                channels.push(ChannelJson {
                    sampler: path.channel.sampler.clone(),
                    target: TargetJson {
                        id: path.channel.target.node.clone(),
                        path: path.channel.target.path.to_string(),
                    },
                });
            }

            animations.insert(
                animation.name.clone(),
                AnimationJson {
                    channels,
                    parameters,
                    samplers,
                },
            );
        }

        let techniques = self
            .techniques
            .iter()
            .map(|t| (t.name.clone(), TechniqueJson::from(t)))
            .collect();

        Ok(Document {
            buffers,
            buffer_views,
            accessors,
            meshes,
            skins,
            animations,
            techniques,
        })
    }
}
