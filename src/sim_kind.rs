//! Concrete kinds of persistent simulation and their extra shader parameters.

use cgmath::Vector3;

use crate::error::SimError;
use crate::params::ParamBlock;

pub const VERTEX_ENTRY_POINT: &str = "vs_main";
pub const FRAGMENT_ENTRY_POINT: &str = "fs_main";

/// Hook for a simulation kind to publish parameters beyond the common set.
pub trait AdditionalParameterBinder {
    fn bind_advance_params(&self, _lod_index: usize, _params: &mut ParamBlock) {}

    fn bind_copy_params(&self, _lod_index: usize, _params: &mut ParamBlock) {}
}

pub struct NoAdditionalParams;

impl AdditionalParameterBinder for NoAdditionalParams {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyBlend {
    Replace,
    Additive,
}

pub trait SimKind: AdditionalParameterBinder {
    fn name(&self) -> &'static str;

    /// WGSL with `vs_main`/`fs_main` entry points reading `AdvanceUniforms`.
    fn shader_source(&self) -> &'static str;

    /// Parameter names packed, in order, into the advance pass custom slots.
    fn advance_custom_params(&self) -> &'static [&'static str] {
        &[]
    }

    fn copy_custom_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// How the result is copied into the level's result texture. `None` means
    /// the kind has no copy pass and its ping-pong target is the published data.
    fn copy_blend(&self) -> Option<CopyBlend>;
}

pub fn check_entry_points(source: &str) -> Result<(), SimError> {
    for entry_point in [VERTEX_ENTRY_POINT, FRAGMENT_ENTRY_POINT] {
        if !source.contains(&format!("fn {}(", entry_point)) {
            return Err(SimError::MissingShader(entry_point));
        }
    }
    Ok(())
}

/// A moving circular source injected into the simulated field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Disturbance {
    pub position: Vector3<f32>,
    pub radius: f32,
    pub strength: f32,
}

impl Disturbance {
    fn as_vec4(&self) -> [f32; 4] {
        [self.position.x, self.position.z, self.radius, self.strength]
    }
}

impl Default for Disturbance {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            radius: 1.0,
            strength: 0.0,
        }
    }
}

const WAVE_PARAMS: &str = "wave_params";
const WAVE_DISTURBANCE: &str = "wave_disturbance";
const COPY_WEIGHT: &str = "copy_weight";

/// Height/velocity wave equation, added on top of the displacement result.
pub struct DynamicWaves {
    pub damping: f32,
    pub gravity: f32,
    pub copy_weight: f32,
    pub disturbance: Disturbance,
}

impl Default for DynamicWaves {
    fn default() -> Self {
        Self {
            damping: 0.05,
            gravity: 9.81,
            copy_weight: 1.0,
            disturbance: Disturbance::default(),
        }
    }
}

impl AdditionalParameterBinder for DynamicWaves {
    fn bind_advance_params(&self, _lod_index: usize, params: &mut ParamBlock) {
        params.set_vector(WAVE_PARAMS, [self.damping, self.gravity, 0.0, 0.0]);
        params.set_vector(WAVE_DISTURBANCE, self.disturbance.as_vec4());
    }

    fn bind_copy_params(&self, _lod_index: usize, params: &mut ParamBlock) {
        params.set_float(COPY_WEIGHT, self.copy_weight);
    }
}

impl SimKind for DynamicWaves {
    fn name(&self) -> &'static str {
        "dynamic_waves"
    }

    fn shader_source(&self) -> &'static str {
        include_str!("sim_dynamic_waves.wgsl")
    }

    fn advance_custom_params(&self) -> &'static [&'static str] {
        &[WAVE_PARAMS, WAVE_DISTURBANCE]
    }

    fn copy_custom_params(&self) -> &'static [&'static str] {
        &[COPY_WEIGHT]
    }

    fn copy_blend(&self) -> Option<CopyBlend> {
        Some(CopyBlend::Additive)
    }
}

const FOAM_PARAMS: &str = "foam_params";
const FOAM_SOURCE: &str = "foam_source";

/// Foam coverage that accumulates under a source and fades exponentially.
pub struct Foam {
    /// Fraction of foam lost per second.
    pub fade_rate: f32,
    pub source: Disturbance,
}

impl Default for Foam {
    fn default() -> Self {
        Self {
            fade_rate: 0.8,
            source: Disturbance::default(),
        }
    }
}

impl AdditionalParameterBinder for Foam {
    fn bind_advance_params(&self, _lod_index: usize, params: &mut ParamBlock) {
        params.set_vector(FOAM_PARAMS, [self.fade_rate, 0.0, 0.0, 0.0]);
        params.set_vector(FOAM_SOURCE, self.source.as_vec4());
    }
}

impl SimKind for Foam {
    fn name(&self) -> &'static str {
        "foam"
    }

    fn shader_source(&self) -> &'static str {
        include_str!("sim_foam.wgsl")
    }

    fn advance_custom_params(&self) -> &'static [&'static str] {
        &[FOAM_PARAMS, FOAM_SOURCE]
    }

    fn copy_blend(&self) -> Option<CopyBlend> {
        None
    }
}
