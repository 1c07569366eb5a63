//! Host scene data consumed by the exporter.
//!
//! These types stand in for the host application's scene graph, mesh, and
//! animation interfaces. Conversion from an actual engine or DCC format is
//! the caller's responsibility.
use glam::{Mat4, Vec2, Vec3};

use crate::Transform;

/// Separator for addressing nodes by path like `"hips/spine/head"`.
pub const PATH_SEPARATOR: char = '/';

/// A named node in the transform hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    /// The local transform relative to the parent node.
    pub transform: Transform,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            children: Vec::new(),
        }
    }

    /// Resolve a `'/'` separated path of child names starting below this node.
    ///
    /// Returns [None] if any segment has no matching child.
    pub fn find_path(&self, path: &str) -> Option<&Node> {
        let mut node = self;
        for segment in path.split(PATH_SEPARATOR) {
            node = node.children.iter().find(|c| c.name == segment)?;
        }
        Some(node)
    }

    /// The parent of the node addressed by `path` or [None] for top level paths.
    pub fn find_parent(&self, path: &str) -> Option<&Node> {
        let (parent_path, _) = path.rsplit_once(PATH_SEPARATOR)?;
        self.find_path(parent_path)
    }

    /// `true` if `other` is reachable from this node by child traversal.
    pub fn reaches(&self, name: &str) -> bool {
        self.name == name || self.children.iter().any(|c| c.reaches(name))
    }
}

/// Mesh vertex data as parallel per-vertex arrays.
///
/// Optional attributes left as [None] are omitted from the exported document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub texcoords: [Option<Vec<Vec2>>; 4],
    /// Up to 4 bone influences per vertex, index aligned with positions.
    pub influences: Option<Vec<VertexInfluence>>,
    pub submeshes: Vec<Submesh>,
}

/// One triangle list within a mesh, bound to at most one texture.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Submesh {
    pub indices: Vec<u32>,
    /// The first texture of the submesh material if it has one.
    pub texture: Option<TextureRef>,
    pub material: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexInfluence {
    pub bone_indices: [u16; 4],
    pub weights: [f32; 4],
}

/// Identity and native dimensions of a texture bound to a material.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRef {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

/// A pre-authored inverse bind matrix for a single joint.
#[derive(Debug, Clone, PartialEq)]
pub struct BindPose {
    pub bone_name: String,
    pub inverse_bind: Mat4,
}

/// A named clip of per-property scalar curves.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub curves: Vec<Curve>,
}

/// Samples for a single animated scalar like `"localPosition.x"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    /// `'/'` separated path to the animated node.
    pub node_path: String,
    /// Property name with a `.x`/`.y`/`.z`/`.w` component suffix.
    pub property: String,
    pub keyframes: Vec<CurveKey>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
}

impl Curve {
    /// Sample the curve at `time` with linear interpolation.
    ///
    /// Times outside the keyframe range clamp to the first or last value.
    pub fn evaluate(&self, time: f32) -> f32 {
        let Some(first) = self.keyframes.first() else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }

        for pair in self.keyframes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                let range = b.time - a.time;
                if range <= f32::EPSILON {
                    return b.value;
                }
                let t = (time - a.time) / range;
                return a.value + (b.value - a.value) * t;
            }
        }

        // Past the final keyframe.
        self.keyframes.last().map(|k| k.value).unwrap_or(0.0)
    }
}
