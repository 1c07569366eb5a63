//! Binary packing of typed arrays into shared buffer views.
//!
//! Each export run owns a [BufferViews] context with one append-only view per
//! semantic category. [Accessor] values describe typed regions inside those
//! views and are populated exactly once each.
use std::io::{Cursor, Seek, Write};

use binrw::{BinResult, BinWrite};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::ExportError;

/// glTF component type constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    UnsignedShort = 5123,
    Float = 5126,
}

impl ComponentType {
    pub fn byte_width(self) -> usize {
        match self {
            ComponentType::UnsignedShort => 2,
            ComponentType::Float => 4,
        }
    }
}

/// Element arity of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ElementType {
    #[strum(serialize = "SCALAR")]
    Scalar,
    #[strum(serialize = "VEC2")]
    Vec2,
    #[strum(serialize = "VEC3")]
    Vec3,
    #[strum(serialize = "VEC4")]
    Vec4,
    #[strum(serialize = "MAT4")]
    Mat4,
}

impl ElementType {
    pub fn component_count(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 => 4,
            ElementType::Mat4 => 16,
        }
    }
}

/// Buffer usage hints from the glTF specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    ArrayBuffer = 34962,
    ElementArrayBuffer = 34963,
}

/// A named append-only region of the final binary payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferView {
    pub name: String,
    pub target: Option<Target>,
    /// Global offset within the concatenated buffer, assigned at finalization.
    byte_offset: Option<u64>,
    bytes: Vec<u8>,
}

impl BufferView {
    pub fn new(name: impl Into<String>, target: Option<Target>) -> Self {
        Self {
            name: name.into(),
            target,
            byte_offset: None,
            bytes: Vec::new(),
        }
    }

    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn byte_offset(&self) -> Option<u64> {
        self.byte_offset
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn assign_byte_offset(&mut self, offset: u64) {
        self.byte_offset = Some(offset);
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub(crate) fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    pub(crate) fn read_vec2(&self, offset: usize) -> Vec2 {
        let u = f32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap());
        let v = f32::from_le_bytes(self.bytes[offset + 4..offset + 8].try_into().unwrap());
        Vec2::new(u, v)
    }

    /// Rewrite a previously written [Vec2] without changing the byte length.
    pub(crate) fn overwrite_vec2(&mut self, offset: usize, value: Vec2) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.x.to_le_bytes());
        self.bytes[offset + 4..offset + 8].copy_from_slice(&value.y.to_le_bytes());
    }
}

/// Selects one of the shared views partitioned by semantic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Index,
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

/// The shared buffer views for a single export run.
#[derive(Debug)]
pub struct BufferViews {
    pub indices: BufferView,
    pub scalars: BufferView,
    pub vec2: BufferView,
    pub vec3: BufferView,
    pub vec4: BufferView,
    pub mat4: BufferView,
}

impl BufferViews {
    pub fn new() -> Self {
        Self {
            indices: BufferView::new("indexBufferView", Some(Target::ElementArrayBuffer)),
            scalars: BufferView::new("floatBufferView", None),
            vec2: BufferView::new("vec2BufferView", Some(Target::ArrayBuffer)),
            vec3: BufferView::new("vec3BufferView", Some(Target::ArrayBuffer)),
            vec4: BufferView::new("vec4BufferView", Some(Target::ArrayBuffer)),
            mat4: BufferView::new("mat4BufferView", None),
        }
    }

    pub fn view(&self, kind: ViewKind) -> &BufferView {
        match kind {
            ViewKind::Index => &self.indices,
            ViewKind::Scalar => &self.scalars,
            ViewKind::Vec2 => &self.vec2,
            ViewKind::Vec3 => &self.vec3,
            ViewKind::Vec4 => &self.vec4,
            ViewKind::Mat4 => &self.mat4,
        }
    }

    pub fn view_mut(&mut self, kind: ViewKind) -> &mut BufferView {
        match kind {
            ViewKind::Index => &mut self.indices,
            ViewKind::Scalar => &mut self.scalars,
            ViewKind::Vec2 => &mut self.vec2,
            ViewKind::Vec3 => &mut self.vec3,
            ViewKind::Vec4 => &mut self.vec4,
            ViewKind::Mat4 => &mut self.mat4,
        }
    }

    /// Views in the fixed order used for the concatenated payload.
    pub fn in_order(&self) -> [&BufferView; 6] {
        [
            &self.indices,
            &self.scalars,
            &self.vec2,
            &self.vec3,
            &self.vec4,
            &self.mat4,
        ]
    }

    pub(crate) fn in_order_mut(&mut self) -> [&mut BufferView; 6] {
        [
            &mut self.indices,
            &mut self.scalars,
            &mut self.vec2,
            &mut self.vec3,
            &mut self.vec4,
            &mut self.mat4,
        ]
    }
}

impl Default for BufferViews {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed region inside one of the shared [BufferViews].
///
/// A `count` of zero means the accessor was never populated and suppresses
/// emission of the corresponding document entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub name: String,
    pub view: ViewKind,
    pub component_type: ComponentType,
    pub element_type: ElementType,
    /// Offset into the owning view, recorded when populated.
    pub byte_offset: u64,
    pub count: usize,
}

impl Accessor {
    pub fn new(
        name: impl Into<String>,
        view: ViewKind,
        element_type: ElementType,
        component_type: ComponentType,
    ) -> Self {
        Self {
            name: name.into(),
            view,
            component_type,
            element_type,
            byte_offset: 0,
            count: 0,
        }
    }

    pub fn element_size(&self) -> usize {
        self.element_type.component_count() * self.component_type.byte_width()
    }

    /// End of the accessor's byte range within its view.
    pub fn byte_end(&self) -> u64 {
        self.byte_offset + (self.count * self.element_size()) as u64
    }

    /// Encode a triangle index list as 16 bit indices.
    ///
    /// `flip_winding` reorders each triangle (a, b, c) to (a, c, b) to switch
    /// between clockwise and counter-clockwise conventions.
    pub fn populate_indices(
        &mut self,
        views: &mut BufferViews,
        indices: &[u32],
        flip_winding: bool,
    ) -> Result<(), ExportError> {
        if let Some(index) = indices.iter().copied().find(|i| *i > u16::MAX as u32) {
            return Err(ExportError::IndexRangeExceeded { index });
        }

        let mut values = Vec::with_capacity(indices.len());
        if flip_winding {
            for triangle in indices.chunks(3) {
                match triangle {
                    [a, b, c] => values.extend([*a as u16, *c as u16, *b as u16]),
                    rest => values.extend(rest.iter().map(|i| *i as u16)),
                }
            }
        } else {
            values.extend(indices.iter().map(|i| *i as u16));
        }

        self.populate(views, &values)
    }

    pub fn populate_floats(
        &mut self,
        views: &mut BufferViews,
        values: &[f32],
    ) -> Result<(), ExportError> {
        self.populate(views, values)
    }

    /// Encode texture coordinates, optionally flipping V for hosts with a
    /// bottom-left UV origin.
    pub fn populate_vec2(
        &mut self,
        views: &mut BufferViews,
        values: &[Vec2],
        flip_v: bool,
    ) -> Result<(), ExportError> {
        if flip_v {
            let flipped: Vec<_> = values.iter().map(|v| Vec2::new(v.x, 1.0 - v.y)).collect();
            self.populate(views, &flipped)
        } else {
            self.populate(views, values)
        }
    }

    pub fn populate_vec3(
        &mut self,
        views: &mut BufferViews,
        values: &[Vec3],
    ) -> Result<(), ExportError> {
        self.populate(views, values)
    }

    pub fn populate_vec4(
        &mut self,
        views: &mut BufferViews,
        values: &[Vec4],
    ) -> Result<(), ExportError> {
        self.populate(views, values)
    }

    pub fn populate_mat4(
        &mut self,
        views: &mut BufferViews,
        values: &[Mat4],
    ) -> Result<(), ExportError> {
        self.populate(views, values)
    }

    fn populate<T: WriteBytes>(
        &mut self,
        views: &mut BufferViews,
        values: &[T],
    ) -> Result<(), ExportError> {
        if self.count != 0 {
            return Err(ExportError::AccessorRepopulated {
                name: self.name.clone(),
            });
        }

        let bytes = write_bytes(values)?;
        let view = views.view_mut(self.view);
        self.byte_offset = view.byte_length() as u64;
        view.extend(&bytes);
        self.count = values.len();
        Ok(())
    }
}

// glTF requires little endian for byte buffers.
// Use a trait instead of bytemuck to control the layout explicitly.
pub trait WriteBytes {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()>;
}

impl WriteBytes for u16 {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        self.write_le(writer)
    }
}

impl WriteBytes for f32 {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        self.write_le(writer)
    }
}

impl WriteBytes for Vec2 {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        self.to_array().write_le(writer)
    }
}

impl WriteBytes for Vec3 {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        self.to_array().write_le(writer)
    }
}

impl WriteBytes for Vec4 {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        self.to_array().write_le(writer)
    }
}

impl WriteBytes for Mat4 {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        // 16 consecutive floats in column-major order.
        self.to_cols_array().write_le(writer)
    }
}

fn write_bytes<T: WriteBytes>(values: &[T]) -> BinResult<Vec<u8>> {
    let mut writer = Cursor::new(Vec::new());
    for v in values {
        v.write(&mut writer)?;
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::{vec2, vec3};

    fn index_accessor(name: &str) -> Accessor {
        Accessor::new(
            name,
            ViewKind::Index,
            ElementType::Scalar,
            ComponentType::UnsignedShort,
        )
    }

    #[test]
    fn populate_indices_byte_length() {
        let mut views = BufferViews::new();
        let mut accessor = index_accessor("a");
        accessor
            .populate_indices(&mut views, &[0, 1, 2, 2, 1, 3], false)
            .unwrap();

        assert_eq!(6, accessor.count);
        assert_eq!(0, accessor.byte_offset);
        assert_eq!(12, views.indices.byte_length());
        assert_eq!(accessor.byte_end(), views.indices.byte_length() as u64);
    }

    #[test]
    fn populate_indices_flipped_winding() {
        let mut flipped_views = BufferViews::new();
        let mut flipped = index_accessor("flipped");
        flipped
            .populate_indices(&mut flipped_views, &[0, 2, 1], true)
            .unwrap();

        let mut views = BufferViews::new();
        let mut unflipped = index_accessor("unflipped");
        unflipped
            .populate_indices(&mut views, &[0, 1, 2], false)
            .unwrap();

        assert_eq!(views.indices.bytes(), flipped_views.indices.bytes());
    }

    #[test]
    fn populate_indices_out_of_range() {
        let mut views = BufferViews::new();
        let mut accessor = index_accessor("a");
        let result = accessor.populate_indices(&mut views, &[0, 1, 70000], false);

        assert!(matches!(
            result,
            Err(ExportError::IndexRangeExceeded { index: 70000 })
        ));
        assert_eq!(0, accessor.count);
        assert_eq!(0, views.indices.byte_length());
    }

    #[test]
    fn populate_twice_fails() {
        let mut views = BufferViews::new();
        let mut accessor = Accessor::new(
            "a",
            ViewKind::Scalar,
            ElementType::Scalar,
            ComponentType::Float,
        );
        accessor.populate_floats(&mut views, &[1.0]).unwrap();

        assert!(matches!(
            accessor.populate_floats(&mut views, &[2.0]),
            Err(ExportError::AccessorRepopulated { .. })
        ));
    }

    #[test]
    fn accessor_offsets_monotonic() {
        let mut views = BufferViews::new();
        let mut first = Accessor::new(
            "first",
            ViewKind::Vec3,
            ElementType::Vec3,
            ComponentType::Float,
        );
        let mut second = Accessor::new(
            "second",
            ViewKind::Vec3,
            ElementType::Vec3,
            ComponentType::Float,
        );
        first
            .populate_vec3(&mut views, &[vec3(0.0, 1.0, 2.0), vec3(3.0, 4.0, 5.0)])
            .unwrap();
        second.populate_vec3(&mut views, &[Vec3::ONE]).unwrap();

        assert_eq!(0, first.byte_offset);
        assert_eq!(first.byte_end(), second.byte_offset);
        assert_eq!(second.byte_end(), views.vec3.byte_length() as u64);
    }

    #[test]
    fn populate_vec2_flips_v() {
        let mut views = BufferViews::new();
        let mut accessor = Accessor::new(
            "uv",
            ViewKind::Vec2,
            ElementType::Vec2,
            ComponentType::Float,
        );
        accessor
            .populate_vec2(&mut views, &[vec2(0.25, 0.25)], true)
            .unwrap();

        assert_eq!(vec2(0.25, 0.75), views.vec2.read_vec2(0));
    }

    #[test]
    fn mat4_column_major_bytes() {
        let mut views = BufferViews::new();
        let mut accessor = Accessor::new(
            "m",
            ViewKind::Mat4,
            ElementType::Mat4,
            ComponentType::Float,
        );
        let matrix = Mat4::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0,
        ]);
        accessor.populate_mat4(&mut views, &[matrix]).unwrap();

        assert_eq!(64, views.mat4.byte_length());
        // The first column is written first.
        assert_eq!(1.0f32.to_le_bytes(), views.mat4.bytes()[0..4]);
        assert_eq!(2.0f32.to_le_bytes(), views.mat4.bytes()[4..8]);
    }

    #[test]
    fn overwrite_vec2_preserves_length() {
        let mut views = BufferViews::new();
        let mut accessor = Accessor::new(
            "uv",
            ViewKind::Vec2,
            ElementType::Vec2,
            ComponentType::Float,
        );
        accessor
            .populate_vec2(&mut views, &[vec2(0.5, 0.5)], false)
            .unwrap();

        let before = views.vec2.byte_length();
        views.vec2.overwrite_vec2(0, vec2(0.1, 0.9));

        assert_eq!(before, views.vec2.byte_length());
        assert_eq!(vec2(0.1, 0.9), views.vec2.read_vec2(0));
    }
}
