//! Skeleton joint enumeration and inverse bind matrix packing.
use glam::Mat4;
use log::warn;

use crate::Transform;
use crate::buffer::{Accessor, BufferViews, ComponentType, ElementType, ViewKind};
use crate::error::ExportError;
use crate::scene::{BindPose, Node};

/// A skin with its joint ordering and packed inverse bind matrices.
///
/// Index `i` of [joint_names](Self::joint_names) and of the matrix accessor
/// refer to the same joint. This ordering is also the index space used by the
/// bone index vertex attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub name: String,
    pub joint_names: Vec<String>,
    pub bind_shape_matrix: Mat4,
    pub inverse_bind_matrices: Accessor,
    /// Names of skeleton roots. Contains more than one entry only when the
    /// host bone list includes hierarchies disjoint from the declared root.
    pub roots: Vec<String>,
}

impl Skin {
    /// Compute inverse bind matrices by walking the skeleton from `root_bone`.
    ///
    /// The traversal is depth first with parents before children, which also
    /// fixes the joint name ordering. `root_parent` is the local transform of
    /// the root bone's parent and becomes the bind shape matrix.
    pub fn from_skeleton(
        name: impl Into<String>,
        root_bone: &Node,
        root_parent: Option<Transform>,
        views: &mut BufferViews,
    ) -> Result<Self, ExportError> {
        let name = name.into();

        let mut joint_names = Vec::new();
        let mut matrices = Vec::new();
        process_bone(root_bone, Mat4::IDENTITY, &mut joint_names, &mut matrices);

        let mut inverse_bind_matrices = ibm_accessor(&name);
        inverse_bind_matrices.populate_mat4(views, &matrices)?;

        Ok(Self {
            name,
            joint_names,
            bind_shape_matrix: bind_shape(root_parent),
            inverse_bind_matrices,
            roots: vec![root_bone.name.clone()],
        })
    }

    /// Take pre-authored inverse bind matrices in the host's bone order.
    ///
    /// Bones not reachable from `root_bone` by child traversal are registered
    /// as additional independent roots so every joint resolves to some root.
    pub fn from_bind_poses(
        name: impl Into<String>,
        root_bone: &Node,
        root_parent: Option<Transform>,
        bind_poses: &[BindPose],
        views: &mut BufferViews,
    ) -> Result<Self, ExportError> {
        let name = name.into();

        let mut joint_names = Vec::new();
        let mut matrices = Vec::new();
        let mut roots = vec![root_bone.name.clone()];
        for pose in bind_poses {
            joint_names.push(pose.bone_name.clone());
            matrices.push(pose.inverse_bind);

            if !root_bone.reaches(&pose.bone_name) && !roots.contains(&pose.bone_name) {
                warn!(
                    "Bone {} is not reachable from root {} and will be treated as an additional root.",
                    pose.bone_name, root_bone.name
                );
                roots.push(pose.bone_name.clone());
            }
        }

        let mut inverse_bind_matrices = ibm_accessor(&name);
        inverse_bind_matrices.populate_mat4(views, &matrices)?;

        Ok(Self {
            name,
            joint_names,
            bind_shape_matrix: bind_shape(root_parent),
            inverse_bind_matrices,
            roots,
        })
    }
}

fn ibm_accessor(skin_name: &str) -> Accessor {
    Accessor::new(
        format!("accessor_ibm_{skin_name}"),
        ViewKind::Mat4,
        ElementType::Mat4,
        ComponentType::Float,
    )
}

fn bind_shape(root_parent: Option<Transform>) -> Mat4 {
    root_parent
        .map(|t| t.to_matrix())
        .unwrap_or(Mat4::IDENTITY)
}

fn process_bone(bone: &Node, parent: Mat4, joint_names: &mut Vec<String>, matrices: &mut Vec<Mat4>) {
    joint_names.push(bone.name.clone());
    let matrix = parent * bone.transform.to_matrix();
    matrices.push(matrix.inverse());
    for child in &bone.children {
        process_bone(child, matrix, joint_names, matrices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::{Vec3, vec3};

    fn bone(name: &str, translation: Vec3) -> Node {
        Node::new(
            name,
            Transform {
                translation,
                ..Transform::IDENTITY
            },
        )
    }

    #[test]
    fn computed_joint_order_and_count() {
        let mut root = bone("A", Vec3::ZERO);
        root.children.push(bone("B", vec3(0.0, 1.0, 0.0)));
        root.children.push(bone("C", vec3(1.0, 0.0, 0.0)));

        let mut views = BufferViews::new();
        let skin = Skin::from_skeleton("skin_a", &root, None, &mut views).unwrap();

        assert_eq!(vec!["A", "B", "C"], skin.joint_names);
        assert_eq!(3, skin.inverse_bind_matrices.count);
        assert_eq!(skin.joint_names.len(), skin.inverse_bind_matrices.count);
        assert_eq!(Mat4::IDENTITY, skin.bind_shape_matrix);
        assert_eq!(vec!["A"], skin.roots);
    }

    #[test]
    fn computed_matrices_accumulate_parent_transforms() {
        let mut root = bone("A", vec3(0.0, 2.0, 0.0));
        root.children.push(bone("B", vec3(0.0, 1.0, 0.0)));

        let mut views = BufferViews::new();
        let skin = Skin::from_skeleton("skin_a", &root, None, &mut views).unwrap();
        assert_eq!(2, skin.inverse_bind_matrices.count);

        // B accumulates to y = 3, so its inverse bind matrix translates by -3.
        let bytes = views.mat4.bytes();
        let ty_offset = 64 + 13 * 4;
        let ty = f32::from_le_bytes(bytes[ty_offset..ty_offset + 4].try_into().unwrap());
        assert_eq!(-3.0, ty);
    }

    #[test]
    fn bind_shape_uses_root_parent_transform() {
        let root = bone("A", Vec3::ZERO);
        let parent = Transform {
            translation: vec3(5.0, 0.0, 0.0),
            ..Transform::IDENTITY
        };

        let mut views = BufferViews::new();
        let skin = Skin::from_skeleton("skin_a", &root, Some(parent), &mut views).unwrap();

        assert_eq!(Mat4::from_translation(vec3(5.0, 0.0, 0.0)), skin.bind_shape_matrix);
    }

    #[test]
    fn authored_poses_keep_order_and_register_extra_roots() {
        let mut root = bone("A", Vec3::ZERO);
        root.children.push(bone("B", Vec3::ZERO));

        let poses = vec![
            BindPose {
                bone_name: "B".to_string(),
                inverse_bind: Mat4::IDENTITY,
            },
            BindPose {
                bone_name: "A".to_string(),
                inverse_bind: Mat4::from_translation(vec3(0.0, -1.0, 0.0)),
            },
            BindPose {
                bone_name: "Detached".to_string(),
                inverse_bind: Mat4::IDENTITY,
            },
        ];

        let mut views = BufferViews::new();
        let skin = Skin::from_bind_poses("skin_a", &root, None, &poses, &mut views).unwrap();

        assert_eq!(vec!["B", "A", "Detached"], skin.joint_names);
        assert_eq!(3, skin.inverse_bind_matrices.count);
        assert_eq!(vec!["A", "Detached"], skin.roots);
    }
}
