//! Named shader parameters and their packing into uniform blocks.
//!
//! Stages and transform providers write into a [`ParamBlock`] by name; the GPU
//! passes pack a block into the `#[repr(C)]` layouts declared in the WGSL files.

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};

use crate::commands::TextureRef;

pub const POSITION_DELTA: &str = "position_delta";
pub const SIM_DELTA_TIME: &str = "sim_delta_time";
pub const SIM_DELTA_TIME_PREV: &str = "sim_delta_time_prev";
pub const LAST_FRAME_DATA: &str = "last_frame_data";
pub const COPY_SOURCE: &str = "copy_source";

/// Transform slot of the level being written.
pub const TRANSFORM_SLOT_CURRENT: usize = 0;
/// Transform slot of the level the last-frame data is read from.
pub const TRANSFORM_SLOT_SOURCE: usize = 1;
pub const TRANSFORM_SLOT_COUNT: usize = 2;

pub const LOD_POS_SCALE: [&str; TRANSFORM_SLOT_COUNT] = ["lod_pos_scale_0", "lod_pos_scale_1"];
pub const LOD_PARAMS: [&str; TRANSFORM_SLOT_COUNT] = ["lod_params_0", "lod_params_1"];
/// Where the slot's level sat last frame, i.e. the footprint its ping-pong source was written with.
pub const LOD_PREV_POS_SCALE: [&str; TRANSFORM_SLOT_COUNT] =
    ["lod_prev_pos_scale_0", "lod_prev_pos_scale_1"];

pub const MAX_CUSTOM_PARAMS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Vector([f32; 4]),
    Texture(TextureRef),
}

impl ParamValue {
    fn as_vec4(self) -> Option<[f32; 4]> {
        match self {
            ParamValue::Float(v) => Some([v, 0.0, 0.0, 0.0]),
            ParamValue::Vector(v) => Some(v),
            ParamValue::Texture(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamBlock {
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParamBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&mut self, name: &'static str, value: f32) {
        self.values.insert(name, ParamValue::Float(value));
    }

    pub fn set_vector(&mut self, name: &'static str, value: [f32; 4]) {
        self.values.insert(name, ParamValue::Vector(value));
    }

    pub fn set_texture(&mut self, name: &'static str, texture: TextureRef) {
        self.values.insert(name, ParamValue::Texture(texture));
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            ParamValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn vector(&self, name: &str) -> Option<[f32; 4]> {
        match self.get(name)? {
            ParamValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn texture(&self, name: &str) -> Option<TextureRef> {
        match self.get(name)? {
            ParamValue::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn vec4_or_zero(&self, name: &str) -> [f32; 4] {
        self.get(name).and_then(ParamValue::as_vec4).unwrap_or([0.0; 4])
    }

    fn pack_custom(&self, custom_names: &[&'static str]) -> [[f32; 4]; MAX_CUSTOM_PARAMS] {
        let mut custom = [[0.0; 4]; MAX_CUSTOM_PARAMS];
        for (slot, name) in custom.iter_mut().zip(custom_names) {
            *slot = self.vec4_or_zero(name);
        }
        custom
    }
}

/// Mirrors `AdvanceUniforms` in the simulation shaders.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct AdvanceUniforms {
    pub lod_pos_scale: [[f32; 4]; TRANSFORM_SLOT_COUNT],
    pub lod_params: [[f32; 4]; TRANSFORM_SLOT_COUNT],
    pub lod_prev_pos_scale: [[f32; 4]; TRANSFORM_SLOT_COUNT],
    pub position_delta: [f32; 4],
    // x: dt, y: previous dt
    pub time_step: [f32; 4],
    pub custom: [[f32; 4]; MAX_CUSTOM_PARAMS],
}

impl AdvanceUniforms {
    pub fn pack(block: &ParamBlock, custom_names: &[&'static str]) -> Self {
        let mut lod_pos_scale = [[0.0; 4]; TRANSFORM_SLOT_COUNT];
        let mut lod_params = [[0.0; 4]; TRANSFORM_SLOT_COUNT];
        let mut lod_prev_pos_scale = [[0.0; 4]; TRANSFORM_SLOT_COUNT];
        for slot in 0..TRANSFORM_SLOT_COUNT {
            lod_pos_scale[slot] = block.vec4_or_zero(LOD_POS_SCALE[slot]);
            lod_params[slot] = block.vec4_or_zero(LOD_PARAMS[slot]);
            lod_prev_pos_scale[slot] = block.vec4_or_zero(LOD_PREV_POS_SCALE[slot]);
        }
        Self {
            lod_pos_scale,
            lod_params,
            lod_prev_pos_scale,
            position_delta: block.vec4_or_zero(POSITION_DELTA),
            time_step: [
                block.float(SIM_DELTA_TIME).unwrap_or(0.0),
                block.float(SIM_DELTA_TIME_PREV).unwrap_or(0.0),
                0.0,
                0.0,
            ],
            custom: block.pack_custom(custom_names),
        }
    }
}

/// Mirrors `CopyUniforms` in `copy_to_result.wgsl`.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct CopyUniforms {
    pub custom: [[f32; 4]; MAX_CUSTOM_PARAMS],
}

impl CopyUniforms {
    pub fn pack(block: &ParamBlock, custom_names: &[&'static str]) -> Self {
        Self {
            custom: block.pack_custom(custom_names),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_reject_mismatched_kinds() {
        let mut block = ParamBlock::new();
        block.set_float(SIM_DELTA_TIME, 0.02);
        block.set_texture(LAST_FRAME_DATA, TextureRef::Zero);

        assert_eq!(block.float(SIM_DELTA_TIME), Some(0.02));
        assert_eq!(block.vector(SIM_DELTA_TIME), None);
        assert_eq!(block.texture(LAST_FRAME_DATA), Some(TextureRef::Zero));
        assert_eq!(block.float(LAST_FRAME_DATA), None);
    }

    #[test]
    fn advance_uniforms_pick_up_wire_names_and_custom_slots() {
        let mut block = ParamBlock::new();
        block.set_vector(POSITION_DELTA, [1.0, 0.0, -2.0, 0.0]);
        block.set_float(SIM_DELTA_TIME, 1.0 / 30.0);
        block.set_float(SIM_DELTA_TIME_PREV, 1.0 / 60.0);
        block.set_vector(LOD_POS_SCALE[TRANSFORM_SLOT_SOURCE], [4.0, 8.0, 32.0, 0.0]);
        block.set_vector(LOD_PREV_POS_SCALE[TRANSFORM_SLOT_SOURCE], [2.0, 8.0, 16.0, 0.0]);
        block.set_float("damping", 0.25);
        block.set_vector("disturbance", [1.0, 2.0, 3.0, 4.0]);

        let packed = AdvanceUniforms::pack(&block, &["disturbance", "missing", "damping"]);

        assert_eq!(packed.position_delta, [1.0, 0.0, -2.0, 0.0]);
        assert_eq!(packed.time_step[0], 1.0 / 30.0);
        assert_eq!(packed.time_step[1], 1.0 / 60.0);
        assert_eq!(packed.lod_pos_scale[0], [0.0; 4]);
        assert_eq!(packed.lod_pos_scale[1], [4.0, 8.0, 32.0, 0.0]);
        assert_eq!(packed.lod_prev_pos_scale[0], [0.0; 4]);
        assert_eq!(packed.lod_prev_pos_scale[1], [2.0, 8.0, 16.0, 0.0]);
        assert_eq!(packed.custom[0], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(packed.custom[1], [0.0; 4]);
        assert_eq!(packed.custom[2], [0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn uniform_layouts_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<AdvanceUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<CopyUniforms>() % 16, 0);
    }
}
