//! egui integration: winit input in, one render pass over the frame out.
//!
//! Per frame the state goes `run` (input, UI build, tessellation) then
//! `paint` (texture and buffer upload, render pass on top of the scene).

use winit::event::WindowEvent;
use winit::window::Window;

pub(crate) struct Overlay {
    context: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    primitives: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    screen: egui_wgpu::ScreenDescriptor,
}

impl Overlay {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, window: &Window) -> Self {
        let size = window.inner_size();
        let context = egui::Context::default();
        let viewport = context.viewport_id();
        let state = egui_winit::State::new(context.clone(), viewport, window, None, None, None);
        let renderer =
            egui_wgpu::Renderer::new(device, format, egui_wgpu::RendererOptions::default());

        Self {
            context,
            state,
            renderer,
            primitives: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
            screen: egui_wgpu::ScreenDescriptor {
                size_in_pixels: [size.width, size.height],
                pixels_per_point: window.scale_factor() as f32,
            },
        }
    }

    /// Forwards a window event. Returns true when egui consumed it.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f32) {
        self.screen.size_in_pixels = [width, height];
        self.screen.pixels_per_point = scale_factor;
    }

    /// Runs one egui pass with `build` and keeps the tessellated output for
    /// [`Overlay::paint`].
    pub fn run<R>(&mut self, window: &Window, build: impl FnOnce(&egui::Context) -> R) -> R {
        let input = self.state.take_egui_input(window);
        self.context.begin_pass(input);
        let result = build(&self.context);
        let egui::FullOutput {
            shapes,
            textures_delta,
            platform_output,
            ..
        } = self.context.end_pass();

        self.state.handle_platform_output(window, platform_output);
        self.textures_delta.set.extend(textures_delta.set);
        self.textures_delta.free.extend(textures_delta.free);
        self.primitives = self
            .context
            .tessellate(shapes, self.context.pixels_per_point());
        result
    }

    /// Uploads pending UI resources and draws the last tessellated pass over
    /// `target`.
    pub fn paint(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
    ) {
        for (id, delta) in &self.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("overlay encoder"),
        });
        let extra = self.renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &self.primitives,
            &self.screen,
        );

        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("overlay pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                })
                .forget_lifetime();
            self.renderer
                .render(&mut pass, &self.primitives, &self.screen);
        }

        queue.submit(extra.into_iter().chain(Some(encoder.finish())));

        for id in &self.textures_delta.free {
            self.renderer.free_texture(id);
        }
        self.textures_delta.set.clear();
        self.textures_delta.free.clear();
    }
}
