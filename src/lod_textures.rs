use crate::commands::TextureRef;
use crate::settings::SimSettings;

pub struct SimTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

pub fn create_sim_texture(
    device: &wgpu::Device,
    label: &str,
    size: u32,
    format: wgpu::TextureFormat,
) -> SimTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    SimTexture { texture, view }
}

/// Two render targets for one level. `source` holds last frame's result,
/// `target` receives this frame's.
pub struct PingPongTextures {
    textures: [SimTexture; 2],
    source_index: usize,
}

impl PingPongTextures {
    pub fn new(device: &wgpu::Device, lod_index: usize, settings: &SimSettings) -> Self {
        let textures = [0, 1].map(|i| {
            create_sim_texture(
                device,
                &format!("LOD {} Ping Pong {}", lod_index, i),
                settings.resolution,
                settings.texture_format,
            )
        });
        Self {
            textures,
            source_index: 0,
        }
    }

    pub fn source(&self) -> &SimTexture {
        &self.textures[self.source_index]
    }

    pub fn target(&self) -> &SimTexture {
        &self.textures[1 - self.source_index]
    }

    pub fn swap(&mut self) {
        self.source_index = 1 - self.source_index;
    }
}

/// Every texture a recorded sequence can address.
pub struct LodTextures {
    ping_pongs: Vec<PingPongTextures>,
    results: Vec<SimTexture>,
    zero: SimTexture,
}

impl LodTextures {
    /// Result textures are only allocated when the simulation has a copy pass.
    pub fn new(device: &wgpu::Device, settings: &SimSettings, with_results: bool) -> Self {
        let ping_pongs = (0..settings.lod_count)
            .map(|lod| PingPongTextures::new(device, lod, settings))
            .collect();
        let results = if with_results {
            (0..settings.lod_count)
                .map(|lod| {
                    create_sim_texture(
                        device,
                        &format!("LOD {} Result", lod),
                        settings.resolution,
                        settings.texture_format,
                    )
                })
                .collect()
        } else {
            Vec::new()
        };
        // wgpu zero-initialises textures, so this stays black.
        let zero = create_sim_texture(device, "Zero Texture", 1, settings.texture_format);
        Self {
            ping_pongs,
            results,
            zero,
        }
    }

    pub fn result(&self, lod_index: usize) -> Option<&SimTexture> {
        self.results.get(lod_index)
    }

    pub fn results(&self) -> &[SimTexture] {
        &self.results
    }

    pub fn resolve(&self, texture: TextureRef) -> Option<&SimTexture> {
        match texture {
            TextureRef::PingPongSource(lod) => self.ping_pongs.get(lod).map(PingPongTextures::source),
            TextureRef::PingPongTarget(lod) => self.ping_pongs.get(lod).map(PingPongTextures::target),
            TextureRef::Result(lod) => self.results.get(lod),
            TextureRef::Zero => Some(&self.zero),
        }
    }

    pub fn swap_all(&mut self) {
        for ping_pong in &mut self.ping_pongs {
            ping_pong.swap();
        }
    }
}
