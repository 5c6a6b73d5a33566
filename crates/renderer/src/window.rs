use std::sync::Arc;

use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use framestats::FpsHistory;

use crate::frame::{FrameOutcome, RenderSession};
use crate::gpu::{GpuState, ScenePipeline};
use crate::notify::{notifier_for, CompileNotifier};
use crate::clock::WallClock;
use crate::scenes::SceneLabel;
use crate::types::{RendererConfig, RendererError};

/// Opens the preview window and renders until it is closed.
pub(crate) fn run_window(config: RendererConfig) -> Result<(), RendererError> {
    let event_loop =
        EventLoop::new().map_err(|err| RendererError::WindowInit(err.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = PreviewApp::new(config);
    event_loop
        .run_app(&mut app)
        .map_err(|err| RendererError::WindowInit(err.to_string()))?;

    match app.fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Running {
    gpu: GpuState,
    session: RenderSession<ScenePipeline>,
}

struct PreviewApp {
    config: RendererConfig,
    notifier: Box<dyn CompileNotifier>,
    running: Option<Running>,
    fatal: Option<RendererError>,
}

impl PreviewApp {
    fn new(config: RendererConfig) -> Self {
        let notifier = notifier_for(config.notifier);
        Self {
            config,
            notifier,
            running: None,
            fatal: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running, RendererError> {
        let (width, height) = self.config.surface_size;
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(width, height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|err| RendererError::WindowInit(err.to_string()))?;
        let window = Arc::new(window);

        let gpu = GpuState::new(window, &self.config)?;
        let registry = gpu.build_scenes(&self.config, self.notifier.as_ref())?;
        info!(
            scenes = registry.len(),
            degraded = registry
                .iter()
                .filter(|(_, program)| program.is_degraded())
                .count(),
            "scenes ready"
        );

        let session = RenderSession::new(
            registry,
            FpsHistory::new(self.config.history_capacity),
            Box::new(WallClock::start()),
        );
        Ok(Running { gpu, session })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RendererError) {
        error!(error = %err, "renderer stopped");
        self.fatal = Some(err);
        if let Some(running) = self.running.as_mut() {
            running.session.request_close();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for PreviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() || self.fatal.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.gpu.window().request_redraw();
                self.running = Some(running);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.gpu.window().id() != window_id {
            return;
        }

        running.gpu.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                running.session.request_close();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => running.gpu.resize(new_size),
            WindowEvent::RedrawRequested => {
                match running.session.frame(&mut running.gpu) {
                    Ok(FrameOutcome::Rendered { .. } | FrameOutcome::Skipped) => {}
                    Err(err) => self.fail(event_loop, RendererError::Frame(err)),
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            if running.session.is_running() {
                running.gpu.window().request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.take() {
            info!(frames = running.session.frames(), "window closed");
        }
    }
}
