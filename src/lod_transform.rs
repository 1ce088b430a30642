use cgmath::Vector3;

use crate::params::{
    ParamBlock, LOD_PARAMS, LOD_POS_SCALE, LOD_PREV_POS_SCALE, TRANSFORM_SLOT_COUNT,
};

/// Placement of one LOD band in the world, as seen by the simulation passes.
pub trait LodTransformProvider {
    /// World position of the band centre, aligned to its texel grid.
    fn snapped_position(&self) -> Vector3<f32>;

    /// Write the band's placement into transform slot `slot` of `params`: where
    /// it sits this frame and where it sat when its last frame was written.
    fn apply_params(&self, slot: usize, params: &mut ParamBlock);
}

#[derive(Clone, Debug, PartialEq)]
pub struct LodTransform {
    lod_index: usize,
    resolution: u32,
    base_lod_size: f32,
    world_size: f32,
    snapped_position: Vector3<f32>,
    /// Placement before the latest refresh; `None` until the first refresh.
    previous: Option<(Vector3<f32>, f32)>,
    refreshed: bool,
}

/// World width of level `lod_index` at `world_scale`. Each level doubles the previous.
pub fn lod_world_size(base_lod_size: f32, world_scale: f32, lod_index: usize) -> f32 {
    base_lod_size * world_scale * 2f32.powi(lod_index as i32)
}

impl LodTransform {
    pub fn new(lod_index: usize, resolution: u32, base_lod_size: f32) -> Self {
        Self {
            lod_index,
            resolution,
            base_lod_size,
            world_size: lod_world_size(base_lod_size, 1.0, lod_index),
            snapped_position: Vector3::new(0.0, 0.0, 0.0),
            previous: None,
            refreshed: false,
        }
    }

    pub fn lod_index(&self) -> usize {
        self.lod_index
    }

    pub fn world_size(&self) -> f32 {
        self.world_size
    }

    pub fn texel_width(&self) -> f32 {
        self.world_size / self.resolution as f32
    }

    /// Position and world size the band had during the previous frame. Equal
    /// to the current placement on the first frame.
    pub fn previous_placement(&self) -> (Vector3<f32>, f32) {
        self.previous
            .unwrap_or((self.snapped_position, self.world_size))
    }

    /// Re-place the band around `viewer` for this frame's world scale.
    pub fn refresh(&mut self, viewer: Vector3<f32>, world_scale: f32) {
        if self.refreshed {
            self.previous = Some((self.snapped_position, self.world_size));
        }
        self.refreshed = true;
        self.world_size = lod_world_size(self.base_lod_size, world_scale, self.lod_index);
        let texel = self.texel_width();
        self.snapped_position = Vector3::new(
            (viewer.x / texel).floor() * texel,
            0.0,
            (viewer.z / texel).floor() * texel,
        );
    }
}

impl LodTransformProvider for LodTransform {
    fn snapped_position(&self) -> Vector3<f32> {
        self.snapped_position
    }

    fn apply_params(&self, slot: usize, params: &mut ParamBlock) {
        debug_assert!(slot < TRANSFORM_SLOT_COUNT);
        params.set_vector(
            LOD_POS_SCALE[slot],
            [self.snapped_position.x, self.snapped_position.z, self.world_size, 0.0],
        );
        params.set_vector(
            LOD_PARAMS[slot],
            [
                self.texel_width(),
                self.resolution as f32,
                1.0 / self.resolution as f32,
                0.0,
            ],
        );
        let (previous_position, previous_size) = self.previous_placement();
        params.set_vector(
            LOD_PREV_POS_SCALE[slot],
            [previous_position.x, previous_position.z, previous_size, 0.0],
        );
    }
}
