//! Grid atlas texture baker.
//!
//! Each object of the selection gets one square cell of the atlas holding
//! its source texture (or a flat swatch), and its texture coordinates are
//! squeezed into that cell.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::{debug, warn};
use std::sync::Arc;

use capture::{ObjectId, Scene, ServiceError, ServiceFailure, TextureBaker};

pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Fill for objects without a readable texture.
const SWATCH: Rgb<u8> = Rgb([128, 128, 128]);

/// Normalized UV bounds of one atlas cell; `v` grows upwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasRegion {
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
}

impl AtlasRegion {
    /// Region of cell `(column, row)` in a `cells_per_axis` square grid,
    /// rows counted from the top of the image.
    pub fn from_cell(cell: (u32, u32), cells_per_axis: u32) -> Self {
        let step = 1.0 / cells_per_axis as f32;
        let u_min = cell.0 as f32 * step;
        let v_min = 1.0 - (cell.1 + 1) as f32 * step;
        Self {
            uv_min: [u_min, v_min],
            uv_max: [u_min + step, v_min + step],
        }
    }

    pub fn map(&self, uv: [f32; 2]) -> [f32; 2] {
        let [u, v] = [uv[0].clamp(0.0, 1.0), uv[1].clamp(0.0, 1.0)];
        [
            self.uv_min[0] + u * (self.uv_max[0] - self.uv_min[0]),
            self.uv_min[1] + v * (self.uv_max[1] - self.uv_min[1]),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AtlasBaker {
    /// Edge length of one cell in pixels.
    pub tile_size: u32,
}

impl Default for AtlasBaker {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

/// Smallest square grid holding `count` cells.
fn cells_per_axis(count: usize) -> u32 {
    let mut side = 1u32;
    while (side as usize) * (side as usize) < count {
        side += 1;
    }
    side
}

impl AtlasBaker {
    fn cell_image(&self, scene: &Scene, id: ObjectId) -> RgbImage {
        let texture = scene
            .object(id)
            .and_then(|o| o.material.as_ref())
            .and_then(|m| m.texture.clone());

        let Some(path) = texture else {
            return RgbImage::from_pixel(self.tile_size, self.tile_size, SWATCH);
        };

        match image::open(&path) {
            Ok(img) => imageops::resize(
                &img.to_rgb8(),
                self.tile_size,
                self.tile_size,
                FilterType::Triangle,
            ),
            Err(err) => {
                warn!("{}: {}; using flat swatch", path.display(), err);
                RgbImage::from_pixel(self.tile_size, self.tile_size, SWATCH)
            }
        }
    }
}

impl TextureBaker for AtlasBaker {
    fn bake(
        &mut self,
        scene: &mut Scene,
        selection: &[ObjectId],
        active: ObjectId,
    ) -> Result<RgbImage, ServiceError> {
        if selection.is_empty() || self.tile_size == 0 {
            return Err(ServiceFailure::boxed("nothing to bake"));
        }

        // Active object takes the first cell.
        let mut order: Vec<ObjectId> = Vec::with_capacity(selection.len());
        order.push(active);
        order.extend(selection.iter().copied().filter(|&id| id != active));

        let side = cells_per_axis(order.len());
        let size = side
            .checked_mul(self.tile_size)
            .ok_or_else(|| ServiceFailure::boxed("atlas too large"))?;
        let mut atlas = RgbImage::from_pixel(size, size, SWATCH);

        for (k, &id) in order.iter().enumerate() {
            let cell = (k as u32 % side, k as u32 / side);
            let tile = self.cell_image(scene, id);
            imageops::replace(
                &mut atlas,
                &tile,
                (cell.0 * self.tile_size) as i64,
                (cell.1 * self.tile_size) as i64,
            );

            let region = AtlasRegion::from_cell(cell, side);
            let object = scene
                .object_mut(id)
                .ok_or_else(|| ServiceFailure::boxed(format!("{id} is not in the scene")))?;

            // Never remap a mesh another object still points at.
            if Arc::strong_count(&object.mesh) > 1 {
                let private = object.mesh.read().clone();
                object.mesh = private.into_shared();
            }

            let mut mesh = object.mesh.write();
            let count = mesh.positions.len();
            let uvs = mesh.uvs.get_or_insert_with(|| vec![[0.5, 0.5]; count]);
            for uv in uvs.iter_mut() {
                *uv = region.map(*uv);
            }
        }

        debug!("Baked {} objects into a {}x{} atlas", order.len(), size, size);
        Ok(atlas)
    }
}
