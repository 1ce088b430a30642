//! Per-level persistent simulation update.
//!
//! Every frame a stage publishes its parameters for the advance pass, decides
//! where last frame's data comes from (its own ping-pong, a neighbour's after a
//! world scale change, or zero at the chain boundary), and re-records its copy
//! sequence.

use cgmath::{Vector3, Zero};
use log::{debug, info, trace, warn};

use crate::chain::LodChainAccess;
use crate::commands::{Command, CommandSequence, PipelineEvent, TextureRef};
use crate::error::SimError;
use crate::lod_transform::LodTransformProvider;
use crate::params::{
    ParamBlock, COPY_SOURCE, LAST_FRAME_DATA, POSITION_DELTA, SIM_DELTA_TIME,
    SIM_DELTA_TIME_PREV, TRANSFORM_SLOT_CURRENT, TRANSFORM_SLOT_SOURCE,
};
use crate::settings::SimSettings;
use crate::sim_kind::AdditionalParameterBinder;

/// Where the advance pass reads last frame's data from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastFrameSource {
    SameLevel,
    /// World scale grew; data handed down from level `lod_index + 1`.
    FromCoarser(usize),
    /// World scale shrank; data handed up from level `lod_index - 1`.
    FromFiner(usize),
    /// Scale changed with no neighbour in that direction; restart from zero.
    Zero,
}

/// Inputs for one frame, supplied by the frame driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
    /// Real time since the previous frame, in seconds.
    pub elapsed: f32,
    pub world_scale: f32,
}

/// The level's ping-pong pair, resolved once when the stage initializes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPongRef {
    pub source: TextureRef,
    pub target: TextureRef,
}

struct StageResources {
    advance: CommandSequence,
    copy: CommandSequence,
    ping_pong: PingPongRef,
}

enum Lifecycle {
    Uninitialized,
    Initialized(StageResources),
}

pub struct SimulationStage {
    lod_index: usize,
    lod_count: usize,
    has_copy_pass: bool,
    max_sim_delta_time: f32,
    last_observed_scale: Option<f32>,
    prev_sim_delta_time: f32,
    last_snapped_position: Option<Vector3<f32>>,
    advance_params: ParamBlock,
    copy_params: ParamBlock,
    last_source: Option<LastFrameSource>,
    lifecycle: Lifecycle,
}

impl SimulationStage {
    pub fn new(
        lod_index: usize,
        lod_count: usize,
        settings: &SimSettings,
        has_copy_pass: bool,
    ) -> Result<Self, SimError> {
        if lod_index >= lod_count {
            return Err(SimError::LodIndexOutOfRange {
                lod_index,
                lod_count,
            });
        }
        Ok(Self {
            lod_index,
            lod_count,
            has_copy_pass,
            max_sim_delta_time: settings.max_sim_delta_time,
            last_observed_scale: None,
            prev_sim_delta_time: settings.initial_sim_delta_time,
            last_snapped_position: None,
            advance_params: ParamBlock::new(),
            copy_params: ParamBlock::new(),
            last_source: None,
            lifecycle: Lifecycle::Uninitialized,
        })
    }

    pub fn lod_index(&self) -> usize {
        self.lod_index
    }

    pub fn last_observed_scale(&self) -> Option<f32> {
        self.last_observed_scale
    }

    pub fn prev_sim_delta_time(&self) -> f32 {
        self.prev_sim_delta_time
    }

    /// Source chosen by the most recent update.
    pub fn last_source(&self) -> Option<LastFrameSource> {
        self.last_source
    }

    pub fn advance_params(&self) -> &ParamBlock {
        &self.advance_params
    }

    pub fn copy_params(&self) -> &ParamBlock {
        &self.copy_params
    }

    pub fn advance_sequence(&self) -> Option<&CommandSequence> {
        match &self.lifecycle {
            Lifecycle::Initialized(resources) => Some(&resources.advance),
            Lifecycle::Uninitialized => None,
        }
    }

    pub fn copy_sequence(&self) -> Option<&CommandSequence> {
        match &self.lifecycle {
            Lifecycle::Initialized(resources) => Some(&resources.copy),
            Lifecycle::Uninitialized => None,
        }
    }

    /// Create the command sequences and resolve the ping-pong pair. Only the
    /// first call has any effect; later calls return the cached pair.
    pub fn ensure_initialized(&mut self) -> PingPongRef {
        if let Lifecycle::Initialized(resources) = &self.lifecycle {
            return resources.ping_pong;
        }

        let lod = self.lod_index;
        let mut advance = CommandSequence::new(format!("lod{} advance", lod), PipelineEvent::Simulate);
        // The advance draw never changes; only its parameters do.
        advance.record([Command::Advance { lod }]);
        let copy = CommandSequence::new(format!("lod{} copy", lod), PipelineEvent::Composite);
        let ping_pong = PingPongRef {
            source: TextureRef::PingPongSource(lod),
            target: TextureRef::PingPongTarget(lod),
        };

        info!(
            "lod {}/{}: created command sequences {:?} (advance) and {:?} (copy)",
            lod,
            self.lod_count,
            advance.id(),
            copy.id()
        );
        self.lifecycle = Lifecycle::Initialized(StageResources {
            advance,
            copy,
            ping_pong,
        });
        ping_pong
    }

    /// Run this level's update for one frame. The chain's transforms must
    /// already be refreshed for the frame.
    ///
    /// Fails only when `chain` has no transform for this level, i.e. it is not
    /// the chain the stage was built for.
    pub fn update<C: LodChainAccess>(
        &mut self,
        chain: &C,
        frame: &FrameContext,
        binder: &dyn AdditionalParameterBinder,
    ) -> Result<LastFrameSource, SimError> {
        let ping_pong = self.ensure_initialized();
        let lod = self.lod_index;
        let own = chain.transform(lod).ok_or(SimError::LodIndexOutOfRange {
            lod_index: lod,
            lod_count: chain.lod_count(),
        })?;

        let snapped = own.snapped_position();
        let delta = match self.last_snapped_position {
            Some(last) => snapped - last,
            None => Vector3::zero(),
        };
        self.advance_params
            .set_vector(POSITION_DELTA, [delta.x, delta.y, delta.z, 0.0]);
        self.last_snapped_position = Some(snapped);

        let dt = frame.elapsed.min(self.max_sim_delta_time);
        trace!("lod {}: dt {:.5} (prev {:.5})", lod, dt, self.prev_sim_delta_time);
        self.advance_params.set_float(SIM_DELTA_TIME, dt);
        self.advance_params
            .set_float(SIM_DELTA_TIME_PREV, self.prev_sim_delta_time);
        self.prev_sim_delta_time = dt;

        own.apply_params(TRANSFORM_SLOT_CURRENT, &mut self.advance_params);
        let source = self.bind_last_frame_data(chain, own, ping_pong, frame.world_scale);
        self.last_source = Some(source);

        binder.bind_advance_params(lod, &mut self.advance_params);

        if let (true, Lifecycle::Initialized(resources)) = (self.has_copy_pass, &mut self.lifecycle) {
            self.copy_params.set_texture(COPY_SOURCE, ping_pong.target);
            binder.bind_copy_params(lod, &mut self.copy_params);
            resources.copy.clear();
            resources.copy.record([Command::Blit {
                lod,
                dest: TextureRef::Result(lod),
            }]);
            trace!("lod {}: copy sequence recorded {} times", lod, resources.copy.recordings());
        }

        Ok(source)
    }

    fn bind_last_frame_data<C: LodChainAccess>(
        &mut self,
        chain: &C,
        own: &C::Transform,
        ping_pong: PingPongRef,
        current_scale: f32,
    ) -> LastFrameSource {
        let lod = self.lod_index;
        let last_scale = match self.last_observed_scale {
            Some(last) => last,
            None => {
                self.last_observed_scale = Some(current_scale);
                current_scale
            }
        };

        if current_scale == last_scale {
            self.advance_params
                .set_texture(LAST_FRAME_DATA, ping_pong.source);
            own.apply_params(TRANSFORM_SLOT_SOURCE, &mut self.advance_params);
            return LastFrameSource::SameLevel;
        }

        let neighbour = if current_scale > last_scale {
            chain
                .coarser(lod)
                .map(|(index, transform)| (LastFrameSource::FromCoarser(index), index, transform))
        } else {
            chain
                .finer(lod)
                .map(|(index, transform)| (LastFrameSource::FromFiner(index), index, transform))
        };

        let source = match neighbour {
            Some((source, index, transform)) => {
                debug!(
                    "lod {}: scale {} -> {}, reading last frame from lod {}",
                    lod, last_scale, current_scale, index
                );
                self.advance_params
                    .set_texture(LAST_FRAME_DATA, TextureRef::PingPongSource(index));
                transform.apply_params(TRANSFORM_SLOT_SOURCE, &mut self.advance_params);
                source
            }
            None => {
                warn!(
                    "lod {}: scale {} -> {} with no neighbour to read from, restarting from zero",
                    lod, last_scale, current_scale
                );
                self.advance_params.set_texture(LAST_FRAME_DATA, TextureRef::Zero);
                own.apply_params(TRANSFORM_SLOT_SOURCE, &mut self.advance_params);
                LastFrameSource::Zero
            }
        };
        self.last_observed_scale = Some(current_scale);
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::LodChain;
    use crate::params::{LOD_POS_SCALE, LOD_PREV_POS_SCALE};
    use crate::sim_kind::NoAdditionalParams;

    const FRAME: f32 = 1.0 / 60.0;

    struct TestRng(u64);

    impl TestRng {
        fn next_u64(&mut self) -> u64 {
            // SplitMix64 for deterministic, repeatable test vectors.
            self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = self.0;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        }
    }

    struct Harness {
        chain: LodChain,
        stage: SimulationStage,
        viewer: Vector3<f32>,
    }

    impl Harness {
        fn new(lod_index: usize, lod_count: usize) -> Self {
            let settings = SimSettings::default().with_lod_count(lod_count);
            Self {
                chain: LodChain::new(&settings),
                stage: SimulationStage::new(lod_index, lod_count, &settings, true).unwrap(),
                viewer: Vector3::new(0.0, 0.0, 0.0),
            }
        }

        fn step_with(&mut self, elapsed: f32, world_scale: f32) -> LastFrameSource {
            self.chain.refresh(self.viewer, world_scale);
            let frame = FrameContext {
                elapsed,
                world_scale,
            };
            self.stage
                .update(&self.chain, &frame, &NoAdditionalParams)
                .unwrap()
        }

        fn step(&mut self, world_scale: f32) -> LastFrameSource {
            self.step_with(FRAME, world_scale)
        }

        fn source_world_size(&self) -> f32 {
            self.stage
                .advance_params()
                .vector(LOD_POS_SCALE[TRANSFORM_SLOT_SOURCE])
                .unwrap()[2]
        }

        fn level_world_size(&self, lod: usize) -> f32 {
            self.chain.transform(lod).unwrap().world_size()
        }

        /// Footprint the bound last-frame data was written with.
        fn source_written_size(&self) -> f32 {
            self.stage
                .advance_params()
                .vector(LOD_PREV_POS_SCALE[TRANSFORM_SLOT_SOURCE])
                .unwrap()[2]
        }
    }

    #[test]
    fn scale_sequence_hands_data_between_neighbours() {
        let mut h = Harness::new(1, 3);
        let mut sources = Vec::new();
        let mut observed = Vec::new();
        for scale in [1.0, 1.0, 2.0, 2.0, 1.0] {
            sources.push(h.step(scale));
            observed.push(h.stage.last_observed_scale().unwrap());
        }

        assert_eq!(
            sources,
            vec![
                LastFrameSource::SameLevel,
                LastFrameSource::SameLevel,
                LastFrameSource::FromCoarser(2),
                LastFrameSource::SameLevel,
                LastFrameSource::FromFiner(0),
            ]
        );
        assert_eq!(observed, vec![1.0, 1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn last_observed_scale_tracks_last_change_only() {
        let mut rng = TestRng(7);
        let scales = [1.0, 2.0, 4.0, 8.0];
        for lod_index in 0..4 {
            let mut h = Harness::new(lod_index, 4);
            let mut expected: Option<f32> = None;
            for _ in 0..200 {
                // Bias towards repeats so no-change frames dominate.
                let roll = rng.next_u64();
                let scale = if roll % 3 == 0 {
                    scales[(roll / 3 % 4) as usize]
                } else {
                    expected.unwrap_or(1.0)
                };
                h.step(scale);
                if expected != Some(scale) {
                    expected = Some(scale);
                }
                assert_eq!(h.stage.last_observed_scale(), expected);
            }
        }
    }

    #[test]
    fn time_step_is_clamped() {
        let mut h = Harness::new(0, 2);
        assert_eq!(h.stage.prev_sim_delta_time(), 1.0 / 60.0);

        h.step_with(0.5, 1.0);
        let params = h.stage.advance_params();
        assert_eq!(params.float(SIM_DELTA_TIME), Some(1.0 / 30.0));
        assert_eq!(params.float(SIM_DELTA_TIME_PREV), Some(1.0 / 60.0));

        h.step_with(0.01, 1.0);
        let params = h.stage.advance_params();
        assert_eq!(params.float(SIM_DELTA_TIME), Some(0.01));
        assert_eq!(params.float(SIM_DELTA_TIME_PREV), Some(1.0 / 30.0));
        assert_eq!(h.stage.prev_sim_delta_time(), 0.01);

        h.step_with(1.0 / 30.0, 1.0);
        assert_eq!(h.stage.advance_params().float(SIM_DELTA_TIME), Some(1.0 / 30.0));
    }

    #[test]
    fn finest_level_zooming_in_restarts_from_zero() {
        let mut h = Harness::new(0, 4);
        h.step(4.0);
        assert_eq!(h.step(2.0), LastFrameSource::Zero);
        assert_eq!(
            h.stage.advance_params().texture(LAST_FRAME_DATA),
            Some(TextureRef::Zero)
        );
        assert_eq!(h.source_world_size(), h.level_world_size(0));
        assert_eq!(h.stage.last_observed_scale(), Some(2.0));
    }

    #[test]
    fn coarsest_level_zooming_out_restarts_from_zero() {
        let mut h = Harness::new(3, 4);
        h.step(1.0);
        assert_eq!(h.step(2.0), LastFrameSource::Zero);
        assert_eq!(
            h.stage.advance_params().texture(LAST_FRAME_DATA),
            Some(TextureRef::Zero)
        );
        assert_eq!(h.source_world_size(), h.level_world_size(3));
    }

    #[test]
    fn zooming_out_reads_coarser_buffer_and_transform() {
        let mut h = Harness::new(1, 4);
        h.step(1.0);
        assert_eq!(h.step(2.0), LastFrameSource::FromCoarser(2));
        assert_eq!(
            h.stage.advance_params().texture(LAST_FRAME_DATA),
            Some(TextureRef::PingPongSource(2))
        );
        assert_eq!(h.source_world_size(), h.level_world_size(2));
    }

    #[test]
    fn transferred_data_is_sampled_with_the_footprint_it_was_written_with() {
        let mut h = Harness::new(1, 4);
        h.viewer = Vector3::new(5.3, 2.0, -7.9);
        h.step(1.0);
        let coarser_written = h.chain.transform(2).unwrap().snapped_position();
        let coarser_written_size = h.level_world_size(2);

        assert_eq!(h.step(2.0), LastFrameSource::FromCoarser(2));
        // Level 2's data is from the scale 1 frame; its transform has moved on.
        assert_eq!(coarser_written_size, 64.0);
        assert_eq!(h.source_world_size(), 128.0);
        assert_eq!(h.source_written_size(), coarser_written_size);
        assert_eq!(h.level_world_size(1), coarser_written_size);
        let written = h
            .stage
            .advance_params()
            .vector(LOD_PREV_POS_SCALE[TRANSFORM_SLOT_SOURCE])
            .unwrap();
        assert_eq!([written[0], written[1]], [coarser_written.x, coarser_written.z]);
    }

    #[test]
    fn same_level_reads_own_previous_footprint() {
        let mut h = Harness::new(0, 2);
        h.step(1.0);
        let before = h.chain.transform(0).unwrap().snapped_position();
        h.viewer = Vector3::new(3.0, 0.0, 1.0);
        assert_eq!(h.step(1.0), LastFrameSource::SameLevel);
        let params = h.stage.advance_params();
        let written = params.vector(LOD_PREV_POS_SCALE[TRANSFORM_SLOT_SOURCE]).unwrap();
        let current = params.vector(LOD_POS_SCALE[TRANSFORM_SLOT_CURRENT]).unwrap();
        let delta = params.vector(POSITION_DELTA).unwrap();
        assert_eq!([written[0], written[1]], [before.x, before.z]);
        assert_eq!([current[0] - written[0], current[1] - written[1]], [delta[0], delta[2]]);
    }

    #[test]
    fn zooming_in_reads_finer_buffer_and_transform() {
        let mut h = Harness::new(2, 4);
        h.step(8.0);
        assert_eq!(h.step(4.0), LastFrameSource::FromFiner(1));
        assert_eq!(
            h.stage.advance_params().texture(LAST_FRAME_DATA),
            Some(TextureRef::PingPongSource(1))
        );
        assert_eq!(h.source_world_size(), h.level_world_size(1));
    }

    #[test]
    fn first_update_never_transfers() {
        for scale in [0.5, 1.0, 64.0] {
            let mut h = Harness::new(1, 3);
            assert_eq!(h.stage.last_observed_scale(), None);
            assert_eq!(h.step(scale), LastFrameSource::SameLevel);
            assert_eq!(
                h.stage.advance_params().texture(LAST_FRAME_DATA),
                Some(TextureRef::PingPongSource(1))
            );
            assert_eq!(h.stage.last_observed_scale(), Some(scale));
        }
    }

    #[test]
    fn sequences_are_created_once_and_copy_rerecorded_every_frame() {
        let mut h = Harness::new(0, 2);
        assert!(h.stage.advance_sequence().is_none());

        h.step(1.0);
        let advance_id = h.stage.advance_sequence().unwrap().id();
        let copy_id = h.stage.copy_sequence().unwrap().id();

        for scale in [1.0, 2.0, 2.0, 1.0] {
            h.step(scale);
            h.stage.ensure_initialized();
        }

        let advance = h.stage.advance_sequence().unwrap();
        let copy = h.stage.copy_sequence().unwrap();
        assert_eq!(advance.id(), advance_id);
        assert_eq!(copy.id(), copy_id);
        assert_eq!(advance.recordings(), 1);
        assert_eq!(advance.commands(), &[Command::Advance { lod: 0 }]);
        assert_eq!(copy.recordings(), 5);
        assert_eq!(
            copy.commands(),
            &[Command::Blit {
                lod: 0,
                dest: TextureRef::Result(0),
            }]
        );
        assert_eq!(
            h.stage.copy_params().texture(COPY_SOURCE),
            Some(TextureRef::PingPongTarget(0))
        );
    }

    #[test]
    fn stage_without_copy_pass_leaves_copy_sequence_empty() {
        let settings = SimSettings::default().with_lod_count(2);
        let mut chain = LodChain::new(&settings);
        chain.refresh(Vector3::new(0.0, 0.0, 0.0), 1.0);
        let mut stage = SimulationStage::new(1, 2, &settings, false).unwrap();
        let frame = FrameContext {
            elapsed: FRAME,
            world_scale: 1.0,
        };
        for _ in 0..3 {
            stage.update(&chain, &frame, &NoAdditionalParams).unwrap();
        }
        let copy = stage.copy_sequence().unwrap();
        assert!(copy.commands().is_empty());
        assert_eq!(copy.recordings(), 0);
        assert!(stage.copy_params().is_empty());
    }

    #[test]
    fn position_delta_follows_snapped_position() {
        let mut h = Harness::new(0, 2);
        h.step(1.0);
        assert_eq!(
            h.stage.advance_params().vector(POSITION_DELTA),
            Some([0.0, 0.0, 0.0, 0.0])
        );

        // LOD 0 texels are 16/256 world units wide; move by whole texels.
        h.viewer = Vector3::new(1.0, 3.0, -0.5);
        h.step(1.0);
        assert_eq!(
            h.stage.advance_params().vector(POSITION_DELTA),
            Some([1.0, 0.0, -0.5, 0.0])
        );

        h.step(1.0);
        assert_eq!(
            h.stage.advance_params().vector(POSITION_DELTA),
            Some([0.0, 0.0, 0.0, 0.0])
        );
    }

    #[test]
    fn binder_hooks_run_each_frame() {
        struct Marker;
        impl AdditionalParameterBinder for Marker {
            fn bind_advance_params(&self, lod_index: usize, params: &mut ParamBlock) {
                params.set_float("marker", lod_index as f32 + 0.5);
            }
            fn bind_copy_params(&self, _lod_index: usize, params: &mut ParamBlock) {
                params.set_float("copy_marker", 2.0);
            }
        }

        let settings = SimSettings::default().with_lod_count(3);
        let mut chain = LodChain::new(&settings);
        chain.refresh(Vector3::new(0.0, 0.0, 0.0), 1.0);
        let mut stage = SimulationStage::new(2, 3, &settings, true).unwrap();
        let frame = FrameContext {
            elapsed: FRAME,
            world_scale: 1.0,
        };
        stage.update(&chain, &frame, &Marker).unwrap();
        assert_eq!(stage.advance_params().float("marker"), Some(2.5));
        assert_eq!(stage.copy_params().float("copy_marker"), Some(2.0));
    }

    #[test]
    fn update_against_a_shorter_chain_fails() {
        let settings = SimSettings::default().with_lod_count(2);
        let mut chain = LodChain::new(&settings);
        chain.refresh(Vector3::new(0.0, 0.0, 0.0), 1.0);
        let mut stage = SimulationStage::new(3, 4, &settings, false).unwrap();
        let frame = FrameContext {
            elapsed: FRAME,
            world_scale: 1.0,
        };
        assert!(matches!(
            stage.update(&chain, &frame, &NoAdditionalParams),
            Err(SimError::LodIndexOutOfRange { lod_index: 3, lod_count: 2 })
        ));
    }

    #[test]
    fn ensure_initialized_returns_the_cached_pair() {
        let mut h = Harness::new(2, 3);
        let first = h.stage.ensure_initialized();
        assert_eq!(
            first,
            PingPongRef {
                source: TextureRef::PingPongSource(2),
                target: TextureRef::PingPongTarget(2),
            }
        );
        let id = h.stage.advance_sequence().unwrap().id();
        assert_eq!(h.stage.ensure_initialized(), first);
        assert_eq!(h.stage.advance_sequence().unwrap().id(), id);
    }

    #[test]
    fn constructing_outside_chain_fails() {
        let settings = SimSettings::default();
        assert!(matches!(
            SimulationStage::new(4, 4, &settings, true),
            Err(SimError::LodIndexOutOfRange { lod_index: 4, lod_count: 4 })
        ));
    }
}
