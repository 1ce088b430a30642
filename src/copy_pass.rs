use std::borrow::Cow;

use crate::advance_pass::{
    create_clamped_sampler, create_textured_pass_layout, create_uniform_buffers, SAMPLER_IDX,
    TEXTURE_IDX, UNIFORM_IDX,
};
use crate::params::{CopyUniforms, ParamBlock};
use crate::sim_kind::{CopyBlend, SimKind, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};

/// The copy material: draws a level's simulated data into its result texture.
pub struct CopyPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffers: Vec<wgpu::Buffer>,
    custom_params: &'static [&'static str],
}

fn blend_state(blend: CopyBlend) -> wgpu::BlendState {
    match blend {
        CopyBlend::Replace => wgpu::BlendState::REPLACE,
        CopyBlend::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState { color: add, alpha: add }
        }
    }
}

impl CopyPass {
    /// Returns `None` for kinds without a copy pass.
    pub fn new(
        device: &wgpu::Device,
        kind: &dyn SimKind,
        format: wgpu::TextureFormat,
        lod_count: usize,
    ) -> Option<Self> {
        let blend = kind.copy_blend()?;

        let bind_group_layout = create_textured_pass_layout(device, "Copy Bind Group Layout");
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Copy Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Copy To Result"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("copy_to_result.wgsl"))),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Copy Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(VERTEX_ENTRY_POINT),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(FRAGMENT_ENTRY_POINT),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blend_state(blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: Default::default(),
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: Default::default(),
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Some(Self {
            pipeline,
            bind_group_layout,
            sampler: create_clamped_sampler(device, "Copy Source Sampler"),
            uniform_buffers: create_uniform_buffers::<CopyUniforms>(device, "Copy Uniforms", lod_count),
            custom_params: kind.copy_custom_params(),
        })
    }

    pub fn write_params(&self, queue: &wgpu::Queue, lod_index: usize, params: &ParamBlock) {
        if let Some(buffer) = self.uniform_buffers.get(lod_index) {
            let uniforms = CopyUniforms::pack(params, self.custom_params);
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }
    }

    pub fn bind(
        &self,
        device: &wgpu::Device,
        lod_index: usize,
        source: &wgpu::TextureView,
    ) -> Option<wgpu::BindGroup> {
        let uniform_buffer = self.uniform_buffers.get(lod_index)?;
        Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Copy Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
            wgpu::BindGroupEntry {
                binding: UNIFORM_IDX,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: TEXTURE_IDX,
                resource: wgpu::BindingResource::TextureView(source),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_IDX,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            }],
        }))
    }

    pub fn record(&self, rpass: &mut wgpu::RenderPass<'_>, bind_group: &wgpu::BindGroup) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}
