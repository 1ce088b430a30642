use std::borrow::Cow;

use wgpu::util::DeviceExt;

use crate::error::SimError;
use crate::params::{AdvanceUniforms, ParamBlock};
use crate::sim_kind::{check_entry_points, SimKind, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};

pub(crate) const UNIFORM_IDX: u32 = 0;
pub(crate) const TEXTURE_IDX: u32 = 1;
pub(crate) const SAMPLER_IDX: u32 = 2;

/// Layout shared by the advance and copy passes: one uniform block, one
/// sampled texture and its sampler.
pub(crate) fn create_textured_pass_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
        wgpu::BindGroupLayoutEntry { // Parameters
            binding: UNIFORM_IDX,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry { // Input texture
            binding: TEXTURE_IDX,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry { // Input sampler
            binding: SAMPLER_IDX,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }],
    })
}

pub(crate) fn create_clamped_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

pub(crate) fn create_uniform_buffers<T: bytemuck::Pod + Default>(
    device: &wgpu::Device,
    label: &str,
    count: usize,
) -> Vec<wgpu::Buffer> {
    (0..count)
        .map(|lod| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} {}", label, lod)),
                contents: bytemuck::cast_slice(&[T::default()]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        })
        .collect()
}

/// The simulation material: draws one level's quad into its ping-pong target.
pub struct AdvancePass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffers: Vec<wgpu::Buffer>,
    custom_params: &'static [&'static str],
}

impl AdvancePass {
    pub fn new(
        device: &wgpu::Device,
        kind: &dyn SimKind,
        format: wgpu::TextureFormat,
        lod_count: usize,
    ) -> Result<Self, SimError> {
        let source = kind.shader_source();
        check_entry_points(source)?;

        let bind_group_layout = create_textured_pass_layout(device, "Advance Bind Group Layout");
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Advance Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.name()),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Advance Pipeline"),
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
                    blend: None,
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

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler: create_clamped_sampler(device, "Last Frame Data Sampler"),
            uniform_buffers: create_uniform_buffers::<AdvanceUniforms>(
                device,
                "Advance Uniforms",
                lod_count,
            ),
            custom_params: kind.advance_custom_params(),
        })
    }

    pub fn write_params(&self, queue: &wgpu::Queue, lod_index: usize, params: &ParamBlock) {
        if let Some(buffer) = self.uniform_buffers.get(lod_index) {
            let uniforms = AdvanceUniforms::pack(params, self.custom_params);
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }
    }

    pub fn bind(
        &self,
        device: &wgpu::Device,
        lod_index: usize,
        last_frame_data: &wgpu::TextureView,
    ) -> Option<wgpu::BindGroup> {
        let uniform_buffer = self.uniform_buffers.get(lod_index)?;
        Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Advance Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
            wgpu::BindGroupEntry {
                binding: UNIFORM_IDX,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: TEXTURE_IDX,
                resource: wgpu::BindingResource::TextureView(last_frame_data),
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
