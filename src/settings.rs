use crate::error::SimError;

/// Upper bound on the time step handed to the advance pass.
pub const MAX_SIM_DELTA_TIME: f32 = 1.0 / 30.0;
/// Time step assumed for the frame before the first update.
pub const INITIAL_SIM_DELTA_TIME: f32 = 1.0 / 60.0;

/// Most levels a chain may hold; each level doubles the world size of the last.
pub const MAX_LOD_COUNT: usize = 16;

const DEFAULT_LOD_COUNT: usize = 6;
const DEFAULT_RESOLUTION: u32 = 256;
const DEFAULT_BASE_LOD_SIZE: f32 = 16.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SimSettings {
    pub lod_count: usize,
    /// Texels per side of every LOD texture.
    pub resolution: u32,
    /// World-space width covered by LOD 0 at a world scale of 1.
    pub base_lod_size: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub max_sim_delta_time: f32,
    pub initial_sim_delta_time: f32,
    pub texture_format: wgpu::TextureFormat,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            lod_count: DEFAULT_LOD_COUNT,
            resolution: DEFAULT_RESOLUTION,
            base_lod_size: DEFAULT_BASE_LOD_SIZE,
            min_scale: 1.0,
            max_scale: 128.0,
            max_sim_delta_time: MAX_SIM_DELTA_TIME,
            initial_sim_delta_time: INITIAL_SIM_DELTA_TIME,
            texture_format: wgpu::TextureFormat::Rgba16Float,
        }
    }
}

impl SimSettings {
    pub fn with_lod_count(mut self, lod_count: usize) -> Self {
        self.lod_count = lod_count;
        self
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_base_lod_size(mut self, base_lod_size: f32) -> Self {
        self.base_lod_size = base_lod_size;
        self
    }

    pub fn with_scale_range(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.lod_count == 0 || self.lod_count > MAX_LOD_COUNT {
            return Err(SimError::InvalidSettings(format!(
                "lod_count must be between 1 and {}, got {}",
                MAX_LOD_COUNT, self.lod_count
            )));
        }
        if self.resolution == 0 || self.resolution % 2 != 0 {
            return Err(SimError::InvalidSettings(format!(
                "resolution must be a positive even number, got {}",
                self.resolution
            )));
        }
        if !(self.base_lod_size > 0.0) {
            return Err(SimError::InvalidSettings("base_lod_size must be positive".into()));
        }
        if !(self.min_scale > 0.0) || self.max_scale < self.min_scale {
            return Err(SimError::InvalidSettings(format!(
                "scale range [{}, {}] is empty or non-positive",
                self.min_scale, self.max_scale
            )));
        }
        if !(self.max_sim_delta_time > 0.0) || !(self.initial_sim_delta_time > 0.0) {
            return Err(SimError::InvalidSettings("time steps must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SimSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_sim_delta_time, 1.0 / 30.0);
        assert_eq!(settings.initial_sim_delta_time, 1.0 / 60.0);
    }

    #[test]
    fn rejects_empty_chain_and_odd_resolution() {
        assert!(SimSettings::default().with_lod_count(0).validate().is_err());
        assert!(SimSettings::default().with_resolution(255).validate().is_err());
        assert!(SimSettings::default().with_resolution(0).validate().is_err());
    }

    #[test]
    fn rejects_chains_longer_than_the_level_limit() {
        assert!(SimSettings::default().with_lod_count(MAX_LOD_COUNT).validate().is_ok());
        let settings = SimSettings::default().with_lod_count(65);
        assert!(matches!(settings.validate(), Err(SimError::InvalidSettings(_))));
    }

    #[test]
    fn rejects_inverted_scale_range() {
        let settings = SimSettings::default().with_scale_range(8.0, 2.0);
        assert!(matches!(settings.validate(), Err(SimError::InvalidSettings(_))));
    }
}
