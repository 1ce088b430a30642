pub mod advance_pass;
pub mod chain;
pub mod commands;
pub mod copy_pass;
pub mod error;
pub mod gpu_context;
pub mod lod_textures;
pub mod lod_transform;
pub mod params;
mod present_pass;
pub mod settings;
pub mod sim_kind;
pub mod simulation;
pub mod stage;

#[cfg(target_arch="wasm32")]
use wasm_bindgen::prelude::*;

use cgmath::Vector3;
use web_time::Instant;
use winit::{
    event::{Event, WindowEvent},
    event_loop::EventLoop,
};
use winit::window::WindowBuilder;
use crate::chain::viewer_scale;
use crate::gpu_context::GpuContext;
use crate::present_pass::{PresentBindings, PresentPass, PresentUniforms};
use crate::settings::SimSettings;
use crate::sim_kind::{Disturbance, DynamicWaves};
use crate::simulation::{FrameInput, LodSimulation};

pub use crate::error::SimError;
pub use crate::stage::{FrameContext, LastFrameSource, SimulationStage};

const VIEWER_ORBIT_RADIUS: f32 = 20.0;
const VIEWER_MIN_ALTITUDE: f32 = 1.0;
const VIEWER_ALTITUDE_SWING: f32 = 10.0;

/// Viewer path for the demo: a slow orbit whose altitude swings enough to
/// cross several power-of-two world scales.
fn demo_viewer(time: f32) -> Vector3<f32> {
    let altitude = VIEWER_MIN_ALTITUDE + VIEWER_ALTITUDE_SWING * 0.5 * (1.0 - (time * 0.3).cos());
    Vector3::new(
        VIEWER_ORBIT_RADIUS * (time * 0.2).cos(),
        altitude,
        VIEWER_ORBIT_RADIUS * (time * 0.2).sin(),
    )
}

async fn arun() -> Result<(), Box<dyn std::error::Error>> {

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            console_log::init_with_level(log::Level::Debug).expect("Couldn't initialize logger");
        } else {
            env_logger::init();
        }
    }

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("ocean-lod-sim")
        .build(&event_loop)?;

    #[cfg(target_arch = "wasm32")]
    {
        // Winit prevents sizing with CSS, so we have to set
        // the size manually when on web.
        use winit::dpi::PhysicalSize;
        let _ = window.request_inner_size(PhysicalSize::new(900, 300));

        use winit::platform::web::WindowExtWebSys;
        web_sys::window()
            .and_then(|win| win.document())
            .and_then(|doc| {
                let dst = doc.get_element_by_id("wasm-example")?;
                let canvas = web_sys::Element::from(window.canvas()?);
                dst.append_child(&canvas).ok()?;
                Some(())
            })
            .expect("Couldn't append canvas to document body.");
    }

    let size = window.inner_size();

    let instance = wgpu::Instance::default();
    let surface = instance.create_surface(&window)?;
    let ctx = GpuContext::request(&instance, Some(&surface)).await?;

    let settings = SimSettings::default();
    let mut simulation = LodSimulation::new(&ctx.device, settings, DynamicWaves::default())?;

    let mut config = surface
        .get_default_config(&ctx.adapter, size.width.max(1), size.height.max(1))
        .ok_or("surface is not supported by the adapter")?;
    surface.configure(&ctx.device, &config);

    let present_pass = PresentPass::new(
        &ctx.device,
        config.format,
        PresentUniforms {
            channel_weights: [0.0, 2.0, 0.0, 0.0],
            bias: [0.5, 0.5, 0.5, 0.0],
        },
    );
    let mut present_bindings = PresentBindings::new(&ctx.device, &present_pass, &[]);

    let start_time = Instant::now();
    let mut last_frame_time = start_time;

    let window = &window;

    event_loop
        .run(move |event, target| {
            if let Event::AboutToWait = event {
                let now = Instant::now();
                let elapsed = (now - last_frame_time).as_secs_f32();
                last_frame_time = now;
                let time = (now - start_time).as_secs_f32();

                let viewer = demo_viewer(time);
                let sim_settings = simulation.settings();
                let world_scale = viewer_scale(viewer.y, sim_settings.min_scale, sim_settings.max_scale);
                simulation.kind_mut().disturbance = Disturbance {
                    position: Vector3::new(viewer.x + 2.0 * (time * 1.7).cos(), 0.0, viewer.z + 2.0 * (time * 1.3).sin()),
                    radius: 1.5,
                    strength: 6.0 * (time * 5.0).sin(),
                };

                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(err) => {
                        log::warn!("dropping frame: {}", err);
                        surface.configure(&ctx.device, &config);
                        return;
                    }
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let mut encoder =
                ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: None,
                });

                let frame_input = FrameInput {
                    elapsed,
                    world_scale,
                    viewer_position: viewer,
                };
                if let Err(err) = simulation.encode_frame(&ctx, &mut encoder, &frame_input) {
                    log::error!("simulation frame failed: {}", err);
                    target.exit();
                    return;
                }
                if simulation.frame_index() % 600 == 0 {
                    log::info!(
                        "frame {}: world scale {}, sources {:?}",
                        simulation.frame_index(),
                        world_scale,
                        simulation.last_sources()
                    );
                }

                let published: Vec<&wgpu::TextureView> = (0..simulation.settings().lod_count)
                    .filter_map(|lod| simulation.published(lod))
                    .map(|texture| &texture.view)
                    .collect();
                present_bindings.update_textures(&ctx.device, &present_pass, &published);

                {
                    let mut rpass =
                        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: None,
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                    store: wgpu::StoreOp::Store,
                                },
                            })],
                            depth_stencil_attachment: None,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                    present_pass.record(&mut rpass, &present_bindings, config.width, config.height);
                }
                ctx.queue.submit(Some(encoder.finish()));
                frame.present();

                window.request_redraw();
            };

            if let Event::WindowEvent {
                window_id: _,
                event,
            } = event
            {
                match event {
                    WindowEvent::Resized(new_size) => {
                        // Reconfigure the surface with the new size
                        config.width = new_size.width.max(1);
                        config.height = new_size.height.max(1);
                        surface.configure(&ctx.device, &config);
                        // On macos the window needs to be redrawn manually after resizing
                        window.request_redraw();
                    }
                    WindowEvent::RedrawRequested => {},
                    WindowEvent::CloseRequested => target.exit(),
                    _ => {}
                };
            }
        })?;
    Ok(())
}

#[cfg_attr(target_arch="wasm32", wasm_bindgen(start))]
pub fn run() {

    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(err) = pollster::block_on(arun()) {
            log::error!("{}", err);
        }
    }
    #[cfg(target_arch = "wasm32")]
    {
        wasm_bindgen_futures::spawn_local(async {
            if let Err(err) = arun().await {
                log::error!("{}", err);
            }
        });
    }
}
