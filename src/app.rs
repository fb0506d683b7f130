//! Interactive window: one tick and one frame per redraw.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use crate::config::SimulationConfig;
use crate::device::select_compute_device;
use crate::error::{SimError, SimResult};
use crate::init::InitialState;
use crate::input::{fps_title, window_to_lattice, FpsCounter, InputState};
use crate::render::FrameRenderer;
use crate::session::SimulationSession;
use crate::stepper::KernelCursor;

struct Gfx {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    session: SimulationSession,
    renderer: FrameRenderer,
    fps: FpsCounter,
}

impl Gfx {
    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(self.session.device(), &self.surface_config);
    }
}

pub struct App {
    config: SimulationConfig,
    init: InitialState,
    input: InputState,
    gfx: Option<Gfx>,
    error: Option<SimError>,
}

impl App {
    pub fn new(config: SimulationConfig, init: InitialState) -> Self {
        Self {
            config,
            init,
            input: InputState::default(),
            gfx: None,
            error: None,
        }
    }

    fn setup(&self, el: &ActiveEventLoop) -> SimResult<Gfx> {
        let dims = self.init.dims;
        let attrs = Window::default_attributes()
            .with_title("LBM")
            .with_inner_size(PhysicalSize::new(dims.width, dims.height));
        let window = Arc::new(
            el.create_window(attrs)
                .map_err(|e| SimError::Surface(format!("create_window: {e}")))?,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| SimError::Surface(format!("create_surface: {e}")))?;
        let adapter = select_compute_device(&instance, Some(&surface), &self.config.preferred_vendors)?;
        let session = SimulationSession::new(&adapter, &self.config, &self.init)?;

        let size = window.inner_size();
        let mut surface_config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| SimError::Surface("surface is not supported by the adapter".into()))?;
        surface_config.present_mode = if self.config.vsync {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(session.device(), &surface_config);

        let renderer = FrameRenderer::new(session.device(), session.store(), surface_config.format)?;
        log::info!(
            "Render loop started on {} ({}x{}, vsync {})",
            session.adapter_name(),
            dims.width,
            dims.height,
            self.config.vsync
        );

        Ok(Gfx {
            window,
            surface,
            surface_config,
            session,
            renderer,
            fps: FpsCounter::new(self.config.fps_interval_secs, Instant::now()),
        })
    }

    /// Returns false once the loop should stop.
    fn frame(&mut self) -> SimResult<bool> {
        let Some(gfx) = self.gfx.as_mut() else {
            return Ok(true);
        };
        let signals = self.input.poll_input();
        if signals.should_quit {
            return Ok(false);
        }

        let dims = gfx.session.dims();
        let window_size = (gfx.surface_config.width, gfx.surface_config.height);
        let cursor = self
            .input
            .cursor_position()
            .map(|pos| window_to_lattice(pos, window_size, dims));
        gfx.session
            .step(signals.should_reset, KernelCursor::from_window(cursor, dims.height))?;

        let frame = match gfx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = gfx.window.inner_size();
                gfx.resize(size);
                return Ok(true);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface acquire timed out; skipping frame");
                return Ok(true);
            }
            Err(e) => return Err(SimError::Surface(e.to_string())),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        gfx.session.render(&gfx.renderer, &view)?;
        gfx.window.pre_present_notify();
        frame.present();

        if let Some(fps) = gfx.fps.tick(Instant::now()) {
            gfx.window.set_title(&fps_title(fps));
        }
        Ok(true)
    }

    fn fail(&mut self, el: &ActiveEventLoop, err: SimError) {
        log::error!("{err}");
        self.error = Some(err);
        el.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, el: &ActiveEventLoop) {
        if self.gfx.is_some() {
            return;
        }
        match self.setup(el) {
            Ok(gfx) => {
                gfx.window.request_redraw();
                self.gfx = Some(gfx);
            }
            Err(err) => self.fail(el, err),
        }
    }

    fn window_event(&mut self, el: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.input.request_quit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.input.key(code, event.state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => self.input.mouse_button(button, state),
            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor_moved(position.x, position.y)
            }
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::Resized(size) => {
                if let Some(gfx) = self.gfx.as_mut() {
                    gfx.resize(size);
                }
            }
            WindowEvent::RedrawRequested => match self.frame() {
                Ok(true) => {}
                Ok(false) => el.exit(),
                Err(err) => self.fail(el, err),
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _el: &ActiveEventLoop) {
        if let Some(gfx) = &self.gfx {
            gfx.window.request_redraw();
        }
    }
}

/// Opens the window and runs until quit or the first fatal error.
pub fn run(config: SimulationConfig, init: InitialState) -> SimResult<()> {
    let event_loop =
        EventLoop::new().map_err(|e| SimError::Surface(format!("event loop: {e}")))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, init);
    event_loop
        .run_app(&mut app)
        .map_err(|e| SimError::Surface(format!("event loop: {e}")))?;

    if let Some(err) = app.error.take() {
        return Err(err);
    }
    log::info!("Successfully terminated!");
    Ok(())
}
