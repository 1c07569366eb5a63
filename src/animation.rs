//! Per-bone animation path extraction.
//!
//! Host animation clips store one scalar curve per property component like
//! `"localPosition.x"`. Curves are resampled against a shared reference
//! timeline and grouped into translation/rotation/scale paths per bone. A
//! path only commits its accessor once every component was observed, so
//! partially written curves never emit malformed half-vectors.
use glam::{Vec3, Vec4};
use indexmap::IndexMap;
use log::warn;

use crate::buffer::{Accessor, BufferViews, ComponentType, ElementType, ViewKind};
use crate::error::ExportError;
use crate::scene::{AnimationClip, Curve, Node};

/// The animated node property of a channel target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TargetPath {
    Translation,
    Rotation,
    Scale,
}

impl TargetPath {
    fn element_type(self) -> ElementType {
        match self {
            TargetPath::Rotation => ElementType::Vec4,
            TargetPath::Translation | TargetPath::Scale => ElementType::Vec3,
        }
    }

    fn view(self) -> ViewKind {
        match self {
            TargetPath::Rotation => ViewKind::Vec4,
            TargetPath::Translation | TargetPath::Scale => ViewKind::Vec3,
        }
    }
}

/// Names the animated node and property for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub node: String,
    pub path: TargetPath,
}

/// Pairs a time input with a value output parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampler {
    pub name: String,
    /// Parameter name for the keyframe times, always `"TIME"`.
    pub input: String,
    /// Parameter name resolving to the value accessor.
    pub output: String,
}

/// Binds a sampler to its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub sampler: String,
    pub target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    X,
    Y,
    Z,
    W,
}

/// Tracks which vector components of a path were written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ComponentMask(u8);

impl ComponentMask {
    fn set(&mut self, component: Component) {
        self.0 |= match component {
            Component::X => 1,
            Component::Y => 2,
            Component::Z => 4,
            Component::W => 8,
        };
    }

    fn is_complete(self, element_type: ElementType) -> bool {
        match element_type {
            ElementType::Vec4 => self.0 == 0b1111,
            _ => self.0 == 0b0111,
        }
    }
}

enum PathValues {
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
}

/// One animated property of one bone with its wiring for emission.
pub struct BoneAnimPath {
    pub channel: Channel,
    pub sampler: Sampler,
    pub accessor: Accessor,
    values: PathValues,
    written: ComponentMask,
}

impl BoneAnimPath {
    fn new(path: TargetPath, anim_name: &str, bone_name: &str, keyframe_count: usize) -> Self {
        let sub_name = format!("{path}_{anim_name}_{bone_name}");
        let sampler = Sampler {
            name: format!("sampler_{sub_name}"),
            input: "TIME".to_string(),
            output: format!("param_{sub_name}"),
        };
        let channel = Channel {
            sampler: sampler.name.clone(),
            target: Target {
                node: bone_name.to_string(),
                path,
            },
        };
        let accessor = Accessor::new(
            format!("accessor_anim_{sub_name}"),
            path.view(),
            path.element_type(),
            ComponentType::Float,
        );
        let values = match path.element_type() {
            ElementType::Vec4 => PathValues::Vec4(vec![Vec4::ZERO; keyframe_count]),
            _ => PathValues::Vec3(vec![Vec3::ZERO; keyframe_count]),
        };

        Self {
            channel,
            sampler,
            accessor,
            values,
            written: ComponentMask::default(),
        }
    }

    /// Resample `curve` at the reference times into one vector component.
    ///
    /// The accessor populates on the transition to a complete component set.
    fn write_component(
        &mut self,
        component: Component,
        curve: &Curve,
        ref_times: &[f32],
        views: &mut BufferViews,
    ) -> Result<(), ExportError> {
        if self.accessor.count != 0 {
            warn!(
                "Ignoring curve {} for already committed path {}.",
                curve.property, self.accessor.name
            );
            return Ok(());
        }

        match &mut self.values {
            PathValues::Vec3(values) => {
                let i = match component {
                    Component::X => 0,
                    Component::Y => 1,
                    Component::Z => 2,
                    // Vector3 paths have no w component.
                    Component::W => return Ok(()),
                };
                for (value, time) in values.iter_mut().zip(ref_times) {
                    value[i] = curve.evaluate(*time);
                }
            }
            PathValues::Vec4(values) => {
                let i = match component {
                    Component::X => 0,
                    Component::Y => 1,
                    Component::Z => 2,
                    Component::W => 3,
                };
                for (value, time) in values.iter_mut().zip(ref_times) {
                    value[i] = curve.evaluate(*time);
                }
            }
        }

        self.written.set(component);
        if self.written.is_complete(self.accessor.element_type) {
            match &self.values {
                PathValues::Vec3(values) => self.accessor.populate_vec3(views, values)?,
                PathValues::Vec4(values) => self.accessor.populate_vec4(views, values)?,
            }
        }
        Ok(())
    }
}

/// The translation, rotation, and scale paths of one bone.
pub struct BoneChannels {
    pub translation: BoneAnimPath,
    pub rotation: BoneAnimPath,
    pub scale: BoneAnimPath,
}

impl BoneChannels {
    fn new(anim_name: &str, bone_name: &str, keyframe_count: usize) -> Self {
        Self {
            translation: BoneAnimPath::new(
                TargetPath::Translation,
                anim_name,
                bone_name,
                keyframe_count,
            ),
            rotation: BoneAnimPath::new(TargetPath::Rotation, anim_name, bone_name, keyframe_count),
            scale: BoneAnimPath::new(TargetPath::Scale, anim_name, bone_name, keyframe_count),
        }
    }

    fn path_mut(&mut self, path: TargetPath) -> &mut BoneAnimPath {
        match path {
            TargetPath::Translation => &mut self.translation,
            TargetPath::Rotation => &mut self.rotation,
            TargetPath::Scale => &mut self.scale,
        }
    }
}

/// One exported animation clip.
pub struct Animation {
    pub name: String,
    /// Bones in first discovery order, which is also the emission order.
    bones: IndexMap<String, BoneChannels>,
    time_accessor: Accessor,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let time_accessor = Accessor::new(
            format!("accessor_anim_time_{name}"),
            ViewKind::Scalar,
            ElementType::Scalar,
            ComponentType::Float,
        );
        Self {
            name,
            bones: IndexMap::new(),
            time_accessor,
        }
    }

    /// Extract all animated bone paths from `clip`.
    ///
    /// Curve paths resolve against `scene_root`'s children. Curves that do
    /// not resolve to a live node are dropped.
    pub fn populate(
        &mut self,
        clip: &AnimationClip,
        scene_root: &Node,
        views: &mut BufferViews,
    ) -> Result<(), ExportError> {
        // The curve with the most keyframes is the reference timeline.
        // Ties keep the first curve encountered.
        let mut ref_curve: Option<&Curve> = None;
        for curve in &clip.curves {
            if ref_curve.is_none_or(|r| curve.keyframes.len() > r.keyframes.len()) {
                ref_curve = Some(curve);
            }
        }
        let Some(ref_curve) = ref_curve else {
            return Ok(());
        };
        let ref_times: Vec<f32> = ref_curve.keyframes.iter().map(|k| k.time).collect();
        self.time_accessor.populate_floats(views, &ref_times)?;

        for curve in &clip.curves {
            let Some(node) = scene_root.find_path(&curve.node_path) else {
                warn!("Dropping curve with unresolvable path {}.", curve.node_path);
                continue;
            };

            let Some(path) = classify_property(&curve.property) else {
                continue;
            };
            let Some(component) = component_suffix(&curve.property) else {
                continue;
            };

            let keyframe_count = ref_times.len();
            let bone = self
                .bones
                .entry(node.name.clone())
                .or_insert_with(|| BoneChannels::new(&self.name, &node.name, keyframe_count));
            bone.path_mut(path)
                .write_component(component, curve, &ref_times, views)?;
        }

        Ok(())
    }

    pub fn time_accessor(&self) -> &Accessor {
        &self.time_accessor
    }

    pub fn bone_channels(&self) -> impl Iterator<Item = (&String, &BoneChannels)> {
        self.bones.iter()
    }

    /// Fully populated paths in emission order: bones in discovery order,
    /// then translation, rotation, scale within each bone.
    pub fn emitted_paths(&self) -> impl Iterator<Item = &BoneAnimPath> {
        self.bones
            .values()
            .flat_map(|b| [&b.translation, &b.rotation, &b.scale])
            .filter(|p| p.accessor.count > 0)
    }
}

fn classify_property(property: &str) -> Option<TargetPath> {
    if property.contains("Position") || property.contains("Translation") {
        Some(TargetPath::Translation)
    } else if property.contains("Rotation") {
        Some(TargetPath::Rotation)
    } else if property.contains("Scale") {
        Some(TargetPath::Scale)
    } else {
        None
    }
}

fn component_suffix(property: &str) -> Option<Component> {
    if property.ends_with(".x") {
        Some(Component::X)
    } else if property.ends_with(".y") {
        Some(Component::Y)
    } else if property.ends_with(".z") {
        Some(Component::Z)
    } else if property.ends_with(".w") {
        Some(Component::W)
    } else {
        None
    }
}
