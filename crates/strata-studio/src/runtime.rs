use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use strata_batch::coords::Viewport;
use strata_batch::renderer::Strategy;

use crate::clock::FrameClock;
use crate::demo::Demo;
use crate::gpu::{Gpu, GpuInit, SurfaceErrorAction};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.025,
    b: 0.035,
    a: 1.0,
};

/// Frames between two stats lines in the log.
const STATS_EVERY: u64 = 240;

/// Window and renderer configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// `None` picks the best strategy the device supports.
    pub strategy: Option<Strategy>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "strata studio".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            strategy: None,
        }
    }
}

pub struct Runtime;

impl Runtime {
    pub fn run(config: RuntimeConfig, gpu_init: GpuInit) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            gpu_init,
            studio: None,
            failure: None,
        };
        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

/// The open window. `demo` is declared first so it is dropped (and releases
/// its textures) before the surface goes away.
struct Studio {
    demo: Demo,
    entry: WindowEntry,
}

struct AppState {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    studio: Option<Studio>,
    /// First fatal error; returned from `Runtime::run`.
    failure: Option<anyhow::Error>,
}

impl AppState {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<Studio> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = event_loop.create_window(attrs).context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryTryBuilder {
            clock: FrameClock::new(),
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()
        .context("GPU initialization failed")?;

        let demo = entry.with_gpu(|gpu| Demo::new(gpu, self.config.strategy))?;
        entry.with_window(|w| w.set_title(&format!("{} [{}]", self.config.title, demo.strategy())));
        Ok(Studio { demo, entry })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.studio = None;
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<bool> {
        let Some(Studio { demo, entry }) = self.studio.as_mut() else {
            return Ok(true);
        };

        entry.with_mut(|fields| {
            let time = fields.clock.tick();
            let size = fields.gpu.size();
            if size.width == 0 || size.height == 0 {
                return Ok(true);
            }

            let frame = match fields.gpu.begin_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    log::debug!("surface error: {err}");
                    return Ok(fields.gpu.handle_surface_error(err) != SurfaceErrorAction::Fatal);
                }
            };

            let scale = fields.window.scale_factor() as f32;
            let viewport = Viewport::new(size.width as f32 / scale, size.height as f32 / scale).with_scale(scale);

            fields.gpu.clear(&frame, CLEAR_COLOR);
            let stats = demo.draw(frame.view.clone(), viewport, &time)?;
            fields.gpu.present(frame);

            if time.frame_index % STATS_EVERY == 0 {
                log::info!(
                    "frame {}: {:.0} fps, {} flush(es) ({} internal), {} primitive(s), {} texture bind(s)",
                    time.frame_index,
                    fields.clock.fps(),
                    stats.flushes,
                    stats.internal_flushes(),
                    stats.primitives,
                    stats.texture_binds
                );
            }
            Ok(true)
        })
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.studio.is_some() {
            return;
        }
        match self.open(event_loop) {
            Ok(studio) => {
                studio.entry.with_window(|w| w.request_redraw());
                self.studio = Some(studio);
            }
            Err(err) => self.fail(event_loop, err.context("failed to open the studio window")),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(studio) = &self.studio {
            studio.entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.studio = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                if let Some(studio) = self.studio.as_mut() {
                    studio.entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(studio) = self.studio.as_mut() {
                    let size = studio.entry.with_window(|w| w.inner_size());
                    studio.entry.with_gpu_mut(|gpu| gpu.resize(size));
                }
            }

            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(true) => {}
                Ok(false) => self.fail(event_loop, anyhow::anyhow!("surface is out of memory")),
                Err(err) => self.fail(event_loop, err.context("frame failed")),
            },

            _ => {}
        }
    }
}
