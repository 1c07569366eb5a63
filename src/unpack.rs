//! Texture atlas unpacking.
//!
//! Meshes that only reference a small region of a packed texture waste
//! resolution on unused texels. This pass detects tight UV footprints,
//! crops the backing texture to a power-of-two sub-rectangle, and remaps
//! the already exported UV bytes to the cropped space.
//!
//! Only the first texture and first UV channel of each submesh are
//! considered.
use std::collections::BTreeSet;

use glam::{Vec2, vec2};
use image::RgbaImage;
use indexmap::IndexMap;
use log::debug;

use crate::buffer::{Accessor, BufferViews};
use crate::scene::MeshData;

/// UV footprints covering at least this fraction of the unit square on both
/// axes are left packed.
const COVERAGE_THRESHOLD: f32 = 0.9;

/// Offset and scale mapping original UVs into the cropped sub-rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset: Vec2,
    pub scale: Vec2,
}

impl UvTransform {
    /// Apply in host UV space with a bottom-left origin, the space the
    /// transform was computed in.
    pub fn apply(&self, uv: Vec2) -> Vec2 {
        (uv + self.offset) * self.scale
    }

    /// Apply to exported texcoord values, which were V-flipped to a top-left
    /// origin when populated. V is unflipped into host space, transformed,
    /// and flipped back so it stays aligned with the cropped texture.
    pub fn apply_flipped_v(&self, uv: Vec2) -> Vec2 {
        let host = self.apply(vec2(uv.x, 1.0 - uv.y));
        vec2(host.x, 1.0 - host.y)
    }
}

/// Finalized crop rectangle in texel space, power-of-two sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Accumulated texel-space bounds for one texture.
///
/// Bounds merge monotonically: each contributing submesh widens the box via
/// min/max, never shrinks it.
#[derive(Debug)]
struct Entry {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
    tex_width: u32,
    tex_height: u32,
    /// Contributing submesh indices per mesh name.
    submeshes: IndexMap<String, Vec<usize>>,
    rect: Option<CropRect>,
}

/// State for one unpacking run over a scene.
///
/// Construct a fresh context per export; the three phases are
/// [scan_mesh](Self::scan_mesh) for every mesh, one [build](Self::build)
/// call, then [process_mesh](Self::process_mesh) and
/// [process_texture](Self::process_texture) for each consumer.
#[derive(Debug, Default)]
pub struct UnpackContext {
    entries: IndexMap<String, Entry>,
    transforms: IndexMap<String, IndexMap<usize, UvTransform>>,
}

impl UnpackContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record texel bounds for every submesh of `mesh` with a tight UV
    /// footprint.
    pub fn scan_mesh(&mut self, mesh: &MeshData) {
        let Some(uvs) = &mesh.texcoords[0] else {
            return;
        };

        for (submesh_index, submesh) in mesh.submeshes.iter().enumerate() {
            let Some(texture) = &submesh.texture else {
                continue;
            };
            let Some((min, max)) = uv_bounds(uvs, &submesh.indices) else {
                continue;
            };

            let extent = max - min;
            if extent.x >= COVERAGE_THRESHOLD && extent.y >= COVERAGE_THRESHOLD {
                continue;
            }

            let tw = texture.width as f32;
            let th = texture.height as f32;
            let sx = (min.x * tw).floor() as i32;
            let fx = (max.x * tw).ceil() as i32;
            let sy = (min.y * th).floor() as i32;
            let fy = (max.y * th).ceil() as i32;

            let entry = self
                .entries
                .entry(texture.id.clone())
                .and_modify(|e| {
                    e.left = e.left.min(sx);
                    e.right = e.right.max(fx);
                    e.top = e.top.min(sy);
                    e.bottom = e.bottom.max(fy);
                })
                .or_insert(Entry {
                    left: sx,
                    right: fx,
                    top: sy,
                    bottom: fy,
                    tex_width: texture.width,
                    tex_height: texture.height,
                    submeshes: IndexMap::new(),
                    rect: None,
                });

            let submeshes = entry.submeshes.entry(mesh.name.clone()).or_default();
            if !submeshes.contains(&submesh_index) {
                submeshes.push(submesh_index);
            }
        }
    }

    /// Finalize crop rectangles and per-submesh UV transforms.
    ///
    /// Transforms are read-only afterwards.
    pub fn build(&mut self) {
        for entry in self.entries.values_mut() {
            let tex_width = entry.tex_width as i32;
            let tex_height = entry.tex_height as i32;

            let width = next_power_of_two(entry.right - entry.left).min(tex_width);
            let height = next_power_of_two(entry.bottom - entry.top).min(tex_height);

            // Clamp by shifting so the box stays within the texture.
            let mut left = entry.left;
            if left + width - 1 > tex_width - 1 {
                left = tex_width - width;
            }
            let mut top = entry.top;
            if top + height - 1 > tex_height - 1 {
                top = tex_height - height;
            }
            left = left.max(0);
            top = top.max(0);

            let transform = UvTransform {
                offset: vec2(
                    -(left as f32) / entry.tex_width as f32,
                    -(top as f32) / entry.tex_height as f32,
                ),
                scale: vec2(
                    entry.tex_width as f32 / width as f32,
                    entry.tex_height as f32 / height as f32,
                ),
            };
            entry.rect = Some(CropRect {
                left: left as u32,
                top: top as u32,
                width: width as u32,
                height: height as u32,
            });

            for (mesh_name, submeshes) in &entry.submeshes {
                debug!("Unpacking mesh {mesh_name} submeshes {submeshes:?}");
                let mesh_transforms = self.transforms.entry(mesh_name.clone()).or_default();
                for submesh_index in submeshes {
                    mesh_transforms.insert(*submesh_index, transform);
                }
            }
        }
    }

    /// The transform recorded for one submesh, if any.
    pub fn transform_for(&self, mesh_name: &str, submesh_index: usize) -> Option<&UvTransform> {
        self.transforms.get(mesh_name)?.get(&submesh_index)
    }

    /// Rewrite a submesh's already exported texcoord 0 bytes in place.
    ///
    /// The index accessor bytes are re-parsed to find the referenced
    /// vertices; each unique vertex index is transformed exactly once. The
    /// stored values carry a flipped V, so the transform is applied through
    /// [UvTransform::apply_flipped_v] to keep them aligned with the cropped
    /// texture. The byte length of the UV view is unchanged. Submeshes
    /// without a recorded transform pass through untouched.
    pub fn process_mesh(
        &self,
        mesh_name: &str,
        submesh_index: usize,
        indices: &Accessor,
        texcoord0: &Accessor,
        views: &mut BufferViews,
    ) {
        let Some(transform) = self.transform_for(mesh_name, submesh_index) else {
            return;
        };

        let mut seen = BTreeSet::new();
        for i in 0..indices.count {
            let vertex = views
                .view(indices.view)
                .read_u16(indices.byte_offset as usize + i * 2);
            if seen.insert(vertex) {
                let offset = texcoord0.byte_offset as usize + vertex as usize * 8;
                let uv = views.view(texcoord0.view).read_vec2(offset);
                views
                    .view_mut(texcoord0.view)
                    .overwrite_vec2(offset, transform.apply_flipped_v(uv));
            }
        }
    }

    /// Crop `image` to the finalized power-of-two rectangle for `texture_id`.
    ///
    /// The crop reconciles the UV-space top-left origin with the image-space
    /// bottom-left origin by flipping the rectangle vertically. Returns a new
    /// image; the original is untouched. Textures without a recorded entry
    /// return [None].
    pub fn process_texture(&self, texture_id: &str, image: &RgbaImage) -> Option<RgbaImage> {
        let entry = self.entries.get(texture_id)?;
        let rect = entry.rect?;

        let width = rect.width.min(image.width());
        let height = rect.height.min(image.height());
        let x = rect.left.min(image.width() - width);
        let y = (image.height() - height).saturating_sub(rect.top);

        Some(image::imageops::crop_imm(image, x, y, width, height).to_image())
    }
}

fn uv_bounds(uvs: &[Vec2], indices: &[u32]) -> Option<(Vec2, Vec2)> {
    let mut min = Vec2::MAX;
    let mut max = Vec2::MIN;
    for index in indices {
        let uv = *uvs.get(*index as usize)?;
        min = min.min(uv);
        max = max.max(uv);
    }
    (!indices.is_empty()).then_some((min, max))
}

fn next_power_of_two(value: i32) -> i32 {
    (value.max(1) as u32).next_power_of_two() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::buffer::{ComponentType, ElementType, ViewKind};
    use crate::scene::{Submesh, TextureRef};
    use glam::vec2;

    fn texture(id: &str, size: u32) -> TextureRef {
        TextureRef {
            id: id.to_string(),
            width: size,
            height: size,
        }
    }

    fn quad_mesh(name: &str, uvs: Vec<Vec2>, texture: TextureRef) -> MeshData {
        MeshData {
            name: name.to_string(),
            positions: vec![glam::Vec3::ZERO; uvs.len()],
            texcoords: [Some(uvs), None, None, None],
            submeshes: vec![Submesh {
                indices: vec![0, 1, 2, 2, 1, 3],
                texture: Some(texture),
                material: None,
            }],
            ..Default::default()
        }
    }

    fn corner_uvs(min: f32, max: f32) -> Vec<Vec2> {
        vec![
            vec2(min, min),
            vec2(max, min),
            vec2(min, max),
            vec2(max, max),
        ]
    }

    #[test]
    fn scan_skips_full_coverage() {
        let mesh = quad_mesh("a", corner_uvs(0.0, 0.95), texture("tex", 256));
        let mut context = UnpackContext::new();
        context.scan_mesh(&mesh);
        context.build();

        assert!(context.transform_for("a", 0).is_none());
        assert!(context.process_texture("tex", &RgbaImage::new(256, 256)).is_none());
    }

    #[test]
    fn tight_footprint_crops_to_power_of_two() {
        // UVs spanning (0.1, 0.1)-(0.4, 0.4) on a 256x256 texture.
        let mesh = quad_mesh("a", corner_uvs(0.1, 0.4), texture("tex", 256));
        let mut context = UnpackContext::new();
        context.scan_mesh(&mesh);
        context.build();

        let entry = &context.entries["tex"];
        // floor(0.1 * 256) = 25, ceil(0.4 * 256) = 103, span 78 -> 128.
        assert_eq!(
            Some(CropRect {
                left: 25,
                top: 25,
                width: 128,
                height: 128,
            }),
            entry.rect
        );

        let transform = context.transform_for("a", 0).unwrap();
        assert_eq!(vec2(-25.0 / 256.0, -25.0 / 256.0), transform.offset);
        assert_eq!(vec2(2.0, 2.0), transform.scale);

        let cropped = context
            .process_texture("tex", &RgbaImage::new(256, 256))
            .unwrap();
        assert_eq!((128, 128), cropped.dimensions());
    }

    #[test]
    fn overflowing_rect_shifts_instead_of_scaling() {
        // UVs near the right/bottom edge force the pow2 box past the texture.
        let mesh = quad_mesh("a", corner_uvs(0.9, 1.0), texture("tex", 256));
        let mut context = UnpackContext::new();
        context.scan_mesh(&mesh);
        context.build();

        let entry = &context.entries["tex"];
        // floor(0.9 * 256) = 230, span 26 -> 32; 230 + 32 > 256 shifts to 224.
        assert_eq!(
            Some(CropRect {
                left: 224,
                top: 224,
                width: 32,
                height: 32,
            }),
            entry.rect
        );

        let transform = context.transform_for("a", 0).unwrap();
        assert_eq!(vec2(-224.0 / 256.0, -224.0 / 256.0), transform.offset);
        assert_eq!(vec2(8.0, 8.0), transform.scale);
    }

    #[test]
    fn entries_merge_across_submeshes() {
        let tex = texture("tex", 256);
        let a = quad_mesh("a", corner_uvs(0.0, 0.3), tex.clone());
        let b = quad_mesh("b", corner_uvs(0.5, 0.8), tex);

        let mut context = UnpackContext::new();
        context.scan_mesh(&a);
        context.scan_mesh(&b);
        context.build();

        let entry = &context.entries["tex"];
        assert_eq!(0, entry.left);
        assert_eq!(0, entry.top);
        assert_eq!((0.8f32 * 256.0).ceil() as i32, entry.right);
        assert_eq!((0.8f32 * 256.0).ceil() as i32, entry.bottom);

        // Both meshes share the merged transform.
        assert_eq!(
            context.transform_for("a", 0),
            context.transform_for("b", 0)
        );
    }

    #[test]
    fn scan_and_build_are_deterministic() {
        let mesh = quad_mesh("a", corner_uvs(0.1, 0.4), texture("tex", 256));

        let mut first = UnpackContext::new();
        first.scan_mesh(&mesh);
        first.build();

        let mut second = UnpackContext::new();
        second.scan_mesh(&mesh);
        second.build();

        assert_eq!(first.transforms, second.transforms);
    }

    #[test]
    fn process_mesh_touches_each_unique_index_once() {
        let mesh = quad_mesh("a", corner_uvs(0.25, 0.5), texture("tex", 256));
        let mut views = BufferViews::new();

        let mut index_accessor = Accessor::new(
            "indices",
            ViewKind::Index,
            ElementType::Scalar,
            ComponentType::UnsignedShort,
        );
        index_accessor
            .populate_indices(&mut views, &mesh.submeshes[0].indices, false)
            .unwrap();

        let mut uv_accessor = Accessor::new(
            "uv",
            ViewKind::Vec2,
            ElementType::Vec2,
            ComponentType::Float,
        );
        // V flips on export, exactly as mesh attributes are populated.
        uv_accessor
            .populate_vec2(&mut views, mesh.texcoords[0].as_ref().unwrap(), true)
            .unwrap();

        let mut context = UnpackContext::new();
        context.scan_mesh(&mesh);
        context.build();
        let transform = *context.transform_for("a", 0).unwrap();

        context.process_mesh("a", 0, &index_accessor, &uv_accessor, &mut views);

        // 6 indices reference 4 unique vertices; each UV transforms once.
        for (i, uv) in mesh.texcoords[0].as_ref().unwrap().iter().enumerate() {
            let stored = vec2(uv.x, 1.0 - uv.y);
            assert_eq!(
                transform.apply_flipped_v(stored),
                views.vec2.read_vec2(i * 8)
            );
        }
    }

    #[test]
    fn rewritten_texcoords_stay_within_cropped_texture() {
        // Host UVs spanning (0.25, 0.25)-(0.5, 0.5) on a 64x64 texture crop
        // to the texel box (16, 16)-(32, 32).
        let mesh = quad_mesh("a", corner_uvs(0.25, 0.5), texture("tex", 64));
        let mut views = BufferViews::new();

        let mut index_accessor = Accessor::new(
            "indices",
            ViewKind::Index,
            ElementType::Scalar,
            ComponentType::UnsignedShort,
        );
        index_accessor
            .populate_indices(&mut views, &mesh.submeshes[0].indices, false)
            .unwrap();

        let mut uv_accessor = Accessor::new(
            "uv",
            ViewKind::Vec2,
            ElementType::Vec2,
            ComponentType::Float,
        );
        uv_accessor
            .populate_vec2(&mut views, mesh.texcoords[0].as_ref().unwrap(), true)
            .unwrap();

        let mut context = UnpackContext::new();
        context.scan_mesh(&mesh);
        context.build();
        context.process_mesh("a", 0, &index_accessor, &uv_accessor, &mut views);

        for i in 0..uv_accessor.count {
            let uv = views.vec2.read_vec2(i * 8);
            assert!((0.0..=1.0).contains(&uv.x), "u out of range for vertex {i}: {uv:?}");
            assert!((0.0..=1.0).contains(&uv.y), "v out of range for vertex {i}: {uv:?}");
        }

        // The cropped image spans rows 32..48 of the source. The host corner
        // (0.25, 0.25) addressed source row 48, the crop's bottom row, so its
        // rewritten stored V is 1. The opposite corner lands on the top row.
        assert_eq!(vec2(0.0, 1.0), views.vec2.read_vec2(0));
        assert_eq!(vec2(1.0, 0.0), views.vec2.read_vec2(3 * 8));
    }

    #[test]
    fn process_mesh_without_entry_is_identity() {
        let mut views = BufferViews::new();
        let mut uv_accessor = Accessor::new(
            "uv",
            ViewKind::Vec2,
            ElementType::Vec2,
            ComponentType::Float,
        );
        uv_accessor
            .populate_vec2(&mut views, &[vec2(0.5, 0.5)], false)
            .unwrap();
        let index_accessor = Accessor::new(
            "indices",
            ViewKind::Index,
            ElementType::Scalar,
            ComponentType::UnsignedShort,
        );

        let context = UnpackContext::new();
        context.process_mesh("missing", 0, &index_accessor, &uv_accessor, &mut views);

        assert_eq!(vec2(0.5, 0.5), views.vec2.read_vec2(0));
    }

    #[test]
    fn process_texture_flips_vertically() {
        // Mark the texel at UV-space (0, 0), which is the bottom row of the
        // image buffer.
        let mut image = RgbaImage::new(64, 64);
        image.put_pixel(0, 63, image::Rgba([255, 0, 0, 255]));

        let mesh = quad_mesh("a", corner_uvs(0.0, 0.25), texture("tex", 64));
        let mut context = UnpackContext::new();
        context.scan_mesh(&mesh);
        context.build();

        let cropped = context.process_texture("tex", &image).unwrap();
        assert_eq!((16, 16), cropped.dimensions());
        assert_eq!(&image::Rgba([255, 0, 0, 255]), cropped.get_pixel(0, 15));
    }
}
