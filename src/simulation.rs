//! The simulation chain: one stage per LOD level plus the GPU resources their
//! recorded sequences run against.

use cgmath::Vector3;
use log::{debug, info};

use crate::advance_pass::AdvancePass;
use crate::chain::LodChain;
use crate::commands::{Command, CommandSequence, PipelineEvent, TextureRef};
use crate::copy_pass::CopyPass;
use crate::error::SimError;
use crate::gpu_context::GpuContext;
use crate::lod_textures::{LodTextures, SimTexture};
use crate::params::{COPY_SOURCE, LAST_FRAME_DATA};
use crate::settings::SimSettings;
use crate::sim_kind::SimKind;
use crate::stage::{FrameContext, LastFrameSource, SimulationStage};

/// Per-frame input from the application's frame loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInput {
    /// Real seconds since the previous frame.
    pub elapsed: f32,
    pub world_scale: f32,
    pub viewer_position: Vector3<f32>,
}

pub struct LodSimulation<K: SimKind> {
    settings: SimSettings,
    kind: K,
    chain: LodChain,
    stages: Vec<SimulationStage>,
    textures: LodTextures,
    advance_pass: AdvancePass,
    copy_pass: Option<CopyPass>,
    frame_index: u64,
}

impl<K: SimKind> LodSimulation<K> {
    pub fn new(device: &wgpu::Device, settings: SimSettings, kind: K) -> Result<Self, SimError> {
        settings.validate()?;
        let lod_count = settings.lod_count;

        let advance_pass = AdvancePass::new(device, &kind, settings.texture_format, lod_count)?;
        let copy_pass = CopyPass::new(device, &kind, settings.texture_format, lod_count);
        let has_copy_pass = copy_pass.is_some();
        let textures = LodTextures::new(device, &settings, has_copy_pass);
        let chain = LodChain::new(&settings);
        let stages = (0..lod_count)
            .map(|lod| {
                chain.check_index(lod)?;
                SimulationStage::new(lod, lod_count, &settings, has_copy_pass)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "{} simulation: {} levels of {}x{}, copy pass {}",
            kind.name(),
            lod_count,
            settings.resolution,
            settings.resolution,
            if has_copy_pass { "enabled" } else { "disabled" }
        );

        Ok(Self {
            settings,
            kind,
            chain,
            stages,
            textures,
            advance_pass,
            copy_pass,
            frame_index: 0,
        })
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn kind_mut(&mut self) -> &mut K {
        &mut self.kind
    }

    pub fn stages(&self) -> &[SimulationStage] {
        &self.stages
    }

    /// Sources chosen by each level during the last update, finest first.
    pub fn last_sources(&self) -> Vec<LastFrameSource> {
        self.stages
            .iter()
            .filter_map(SimulationStage::last_source)
            .collect()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The texture other systems should read for `lod_index` after an update:
    /// the result texture when there is a copy pass, otherwise the ping-pong target.
    pub fn published(&self, lod_index: usize) -> Option<&SimTexture> {
        if self.copy_pass.is_some() {
            self.textures.result(lod_index)
        } else {
            self.textures.resolve(TextureRef::PingPongTarget(lod_index))
        }
    }

    /// Advance every level by one step and record the GPU work into `encoder`.
    pub fn encode_frame(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameInput,
    ) -> Result<(), SimError> {
        // Last frame's targets become this frame's sources for every level
        // before any level reads a neighbour.
        self.textures.swap_all();
        self.chain.refresh(frame.viewer_position, frame.world_scale);

        let context = FrameContext {
            elapsed: frame.elapsed,
            world_scale: frame.world_scale,
        };
        for stage in &mut self.stages {
            stage.update(&self.chain, &context, &self.kind)?;
        }
        debug!(
            "frame {}: scale {} sources {:?}",
            self.frame_index,
            frame.world_scale,
            self.last_sources()
        );

        for stage in &self.stages {
            self.advance_pass
                .write_params(&ctx.queue, stage.lod_index(), stage.advance_params());
            if let Some(copy_pass) = &self.copy_pass {
                copy_pass.write_params(&ctx.queue, stage.lod_index(), stage.copy_params());
            }
        }

        let mut sequences: Vec<&CommandSequence> = self
            .stages
            .iter()
            .flat_map(|stage| stage.advance_sequence().into_iter().chain(stage.copy_sequence()))
            .collect();
        // Stable: levels keep their finest-first order within an event.
        sequences.sort_by_key(|sequence| sequence.event());

        let mut results_cleared = false;
        for sequence in sequences {
            if sequence.event() == PipelineEvent::Composite && !results_cleared {
                self.clear_results(encoder);
                results_cleared = true;
            }
            for command in sequence.commands() {
                self.encode_command(&ctx.device, encoder, sequence.label(), command)?;
            }
        }

        self.frame_index += 1;
        Ok(())
    }

    /// `encode_frame` into a fresh encoder, then submit it.
    pub fn step(&mut self, ctx: &GpuContext, frame: &FrameInput) -> Result<(), SimError> {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("LOD Simulation Encoder"),
            });
        self.encode_frame(ctx, &mut encoder, frame)?;
        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn resolve(&self, texture: TextureRef) -> Result<&SimTexture, SimError> {
        self.textures
            .resolve(texture)
            .ok_or(SimError::UnresolvedTexture(texture))
    }

    fn clear_results(&self, encoder: &mut wgpu::CommandEncoder) {
        for result in self.textures.results() {
            let _ = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Result"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &result.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
    }

    fn encode_command(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        command: &Command,
    ) -> Result<(), SimError> {
        let out_of_range = |lod_index| SimError::LodIndexOutOfRange {
            lod_index,
            lod_count: self.stages.len(),
        };
        match *command {
            Command::Advance { lod } => {
                let stage = self.stages.get(lod).ok_or_else(|| out_of_range(lod))?;
                let input = stage
                    .advance_params()
                    .texture(LAST_FRAME_DATA)
                    .unwrap_or(TextureRef::Zero);
                let input = self.resolve(input)?;
                let target = self.resolve(TextureRef::PingPongTarget(lod))?;
                let bind_group = self
                    .advance_pass
                    .bind(device, lod, &input.view)
                    .ok_or_else(|| out_of_range(lod))?;

                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                self.advance_pass.record(&mut rpass, &bind_group);
            }
            Command::Blit { lod, dest } => {
                let Some(copy_pass) = &self.copy_pass else {
                    return Ok(());
                };
                let stage = self.stages.get(lod).ok_or_else(|| out_of_range(lod))?;
                let source = stage
                    .copy_params()
                    .texture(COPY_SOURCE)
                    .unwrap_or(TextureRef::PingPongTarget(lod));
                let source = self.resolve(source)?;
                let dest = self.resolve(dest)?;
                let bind_group = copy_pass
                    .bind(device, lod, &source.view)
                    .ok_or_else(|| out_of_range(lod))?;

                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dest.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                copy_pass.record(&mut rpass, &bind_group);
            }
        }
        Ok(())
    }
}
