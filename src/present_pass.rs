use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct PresentUniforms {
    pub channel_weights: [f32; 4],
    pub bias: [f32; 4],
}

/// Draws LOD textures side by side onto the swapchain image.
pub struct PresentPass {
    pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

impl PresentPass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, uniforms: PresentUniforms) -> Self {
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Present: Bind Group Layout"),
                entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                }],
            });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::include_wgsl!("present.wgsl"));
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main_quad"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(format.into())],
            }),
            primitive: wgpu::PrimitiveState {
                topology: Default::default(),
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
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Present Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Present Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            pipeline,
            sampler,
            uniform_buffer,
        }
    }
}

pub struct PresentBindings {
    lod_textures: Vec<wgpu::BindGroup>,
}

impl PresentBindings {
    pub fn new(device: &wgpu::Device, pass: &PresentPass, views: &[&wgpu::TextureView]) -> Self {
        let mut bindings = Self {
            lod_textures: Vec::new(),
        };
        bindings.update_textures(device, pass, views);
        bindings
    }

    /// Rebind after the published textures change, e.g. after a ping-pong swap.
    pub fn update_textures(
        &mut self,
        device: &wgpu::Device,
        PresentPass {
            pipeline,
            sampler,
            uniform_buffer,
        }: &PresentPass,
        views: &[&wgpu::TextureView],
    ) {
        self.lod_textures = views
            .iter()
            .map(|view| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Present: LOD Texture Bind Group"),
                    layout: &pipeline.get_bind_group_layout(0),
                    entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    }],
                })
            })
            .collect();
    }
}

impl PresentPass {
    /// One square tile per LOD, finest on the left, across a `width` x `height` target.
    pub fn record(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        bindings: &PresentBindings,
        width: u32,
        height: u32,
    ) {
        let count = bindings.lod_textures.len().max(1) as f32;
        let tile = (width as f32 / count).min(height as f32);
        let top = (height as f32 - tile) * 0.5;

        rpass.set_pipeline(&self.pipeline);
        for (i, bind_group) in bindings.lod_textures.iter().enumerate() {
            rpass.set_viewport(i as f32 * tile, top, tile, tile, 0.0, 1.0);
            rpass.set_bind_group(0, bind_group, &[]);
            rpass.draw(0..6, 0..1);
        }
    }
}
