use cgmath::Vector3;

use crate::error::SimError;
use crate::lod_transform::{LodTransform, LodTransformProvider};
use crate::settings::SimSettings;

/// Read access to the LOD levels a stage may pull data from.
///
/// Neighbour lookups are bounded: asking past either end of the chain yields
/// `None` rather than an out-of-range index.
pub trait LodChainAccess {
    type Transform: LodTransformProvider;

    fn lod_count(&self) -> usize;

    fn transform(&self, lod_index: usize) -> Option<&Self::Transform>;

    /// Level `lod_index + 1`, if one exists.
    fn coarser(&self, lod_index: usize) -> Option<(usize, &Self::Transform)> {
        let coarser = lod_index.checked_add(1)?;
        if coarser >= self.lod_count() {
            return None;
        }
        self.transform(coarser).map(|t| (coarser, t))
    }

    /// Level `lod_index - 1`, if one exists.
    fn finer(&self, lod_index: usize) -> Option<(usize, &Self::Transform)> {
        let finer = lod_index.checked_sub(1)?;
        self.transform(finer).map(|t| (finer, t))
    }
}

pub struct LodChain {
    transforms: Vec<LodTransform>,
}

impl LodChain {
    pub fn new(settings: &SimSettings) -> Self {
        let transforms = (0..settings.lod_count)
            .map(|lod| LodTransform::new(lod, settings.resolution, settings.base_lod_size))
            .collect();
        Self { transforms }
    }

    pub fn check_index(&self, lod_index: usize) -> Result<(), SimError> {
        if lod_index < self.transforms.len() {
            Ok(())
        } else {
            Err(SimError::LodIndexOutOfRange {
                lod_index,
                lod_count: self.transforms.len(),
            })
        }
    }

    /// Re-place every level for this frame. Must run before any stage reads a
    /// neighbour's transform.
    pub fn refresh(&mut self, viewer: Vector3<f32>, world_scale: f32) {
        for transform in &mut self.transforms {
            transform.refresh(viewer, world_scale);
        }
    }

}

impl LodChainAccess for LodChain {
    type Transform = LodTransform;

    fn lod_count(&self) -> usize {
        self.transforms.len()
    }

    fn transform(&self, lod_index: usize) -> Option<&LodTransform> {
        self.transforms.get(lod_index)
    }
}

/// World scale for a viewer at `altitude`: the largest power of two not above
/// it, clamped to `[min_scale, max_scale]`.
pub fn viewer_scale(altitude: f32, min_scale: f32, max_scale: f32) -> f32 {
    let altitude = altitude.abs().max(min_scale);
    let scale = altitude.log2().floor().exp2();
    scale.clamp(min_scale, max_scale)
}
