//! Per-primitive vertex attribute accessors.
use glam::Vec4;

use crate::buffer::{Accessor, BufferViews, ComponentType, ElementType, ViewKind};
use crate::error::ExportError;
use crate::scene::MeshData;

/// The set of vertex attribute accessors for one mesh primitive.
///
/// Optional accessors stay [None] when the mesh lacks the attribute and are
/// omitted from the exported document.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub position: Accessor,
    pub normal: Option<Accessor>,
    pub texcoords: [Option<Accessor>; 4],
    /// Bone indices encoded as float vec4 to match the vertex shader inputs.
    pub joints: Option<Accessor>,
    pub weights: Option<Accessor>,
}

impl Attributes {
    /// Create accessors for every attribute present on `mesh`.
    ///
    /// Accessor names derive from the mesh name so multiple meshes can share
    /// the same buffer views without name collisions.
    pub fn new(mesh: &MeshData) -> Self {
        let name = &mesh.name;
        let vec3_accessor = |suffix: &str| {
            Accessor::new(
                format!("accessor_{suffix}_{name}"),
                ViewKind::Vec3,
                ElementType::Vec3,
                ComponentType::Float,
            )
        };
        let vec4_accessor = |suffix: &str| {
            Accessor::new(
                format!("accessor_{suffix}_{name}"),
                ViewKind::Vec4,
                ElementType::Vec4,
                ComponentType::Float,
            )
        };

        let texcoords = std::array::from_fn(|i| {
            mesh.texcoords[i].as_ref().map(|_| {
                Accessor::new(
                    format!("accessor_uv{i}_{name}"),
                    ViewKind::Vec2,
                    ElementType::Vec2,
                    ComponentType::Float,
                )
            })
        });

        Self {
            position: vec3_accessor("position"),
            normal: mesh.normals.as_ref().map(|_| vec3_accessor("normal")),
            texcoords,
            joints: mesh.influences.as_ref().map(|_| vec4_accessor("joint")),
            weights: mesh.influences.as_ref().map(|_| vec4_accessor("weight")),
        }
    }

    /// Write every present attribute into the shared buffer views.
    pub fn populate(&mut self, mesh: &MeshData, views: &mut BufferViews) -> Result<(), ExportError> {
        self.position.populate_vec3(views, &mesh.positions)?;

        if let (Some(accessor), Some(normals)) = (&mut self.normal, &mesh.normals) {
            accessor.populate_vec3(views, normals)?;
        }

        for (accessor, texcoords) in self.texcoords.iter_mut().zip(&mesh.texcoords) {
            if let (Some(accessor), Some(uvs)) = (accessor, texcoords) {
                accessor.populate_vec2(views, uvs, true)?;
            }
        }

        if let Some(influences) = &mesh.influences {
            let indices: Vec<_> = influences
                .iter()
                .map(|i| {
                    Vec4::new(
                        i.bone_indices[0] as f32,
                        i.bone_indices[1] as f32,
                        i.bone_indices[2] as f32,
                        i.bone_indices[3] as f32,
                    )
                })
                .collect();
            let weights: Vec<_> = influences.iter().map(|i| Vec4::from(i.weights)).collect();

            if let Some(accessor) = &mut self.joints {
                accessor.populate_vec4(views, &indices)?;
            }
            if let Some(accessor) = &mut self.weights {
                accessor.populate_vec4(views, &weights)?;
            }
        }

        Ok(())
    }

    /// All present accessors paired with their glTF attribute semantic,
    /// in the fixed emission order.
    pub fn iter_semantics(&self) -> impl Iterator<Item = (String, &Accessor)> {
        let mut entries = vec![("POSITION".to_string(), &self.position)];
        if let Some(normal) = &self.normal {
            entries.push(("NORMAL".to_string(), normal));
        }
        for (i, texcoord) in self.texcoords.iter().enumerate() {
            if let Some(texcoord) = texcoord {
                entries.push((format!("TEXCOORD_{i}"), texcoord));
            }
        }
        if let Some(joints) = &self.joints {
            entries.push(("JOINT".to_string(), joints));
        }
        if let Some(weights) = &self.weights {
            entries.push(("WEIGHT".to_string(), weights));
        }
        entries.into_iter()
    }
}
