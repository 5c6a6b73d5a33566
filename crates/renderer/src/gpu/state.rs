use std::sync::Arc;

use wgpu::CurrentSurfaceTexture;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::clock::TimeSample;
use crate::frame::{FrameBackend, FrameError, OverlayView, SurfaceStatus};
use crate::notify::CompileNotifier;
use crate::scenes::{SceneId, SceneRegistry};
use crate::timing::{ElapsedNanos, GpuTimer, TimerToken, TimingError, TimestampDevice};
use crate::types::{RendererConfig, RendererError};
use crate::ui;

use super::context::GpuContext;
use super::overlay::Overlay;
use super::pipeline::{build_scene_registry, PipelineLayouts, QuadGeometry, ScenePipeline};
use super::timer::WgpuTimestamps;
use super::uniforms::SceneUniforms;

enum Acquired {
    Frame {
        texture: wgpu::SurfaceTexture,
        suboptimal: bool,
    },
    Skip {
        reconfigure: bool,
    },
    Failed,
}

fn acquired(current: CurrentSurfaceTexture) -> Acquired {
    match current {
        CurrentSurfaceTexture::Success(texture) => Acquired::Frame {
            texture,
            suboptimal: false,
        },
        CurrentSurfaceTexture::Suboptimal(texture) => Acquired::Frame {
            texture,
            suboptimal: true,
        },
        CurrentSurfaceTexture::Lost | CurrentSurfaceTexture::Outdated => {
            Acquired::Skip { reconfigure: true }
        }
        CurrentSurfaceTexture::Timeout | CurrentSurfaceTexture::Occluded => {
            Acquired::Skip { reconfigure: false }
        }
        CurrentSurfaceTexture::Validation => Acquired::Failed,
    }
}

/// Surface texture acquired by `clear` and handed back in `present`.
struct FrameTarget {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    /// The surface should be reconfigured once this frame is presented.
    suboptimal: bool,
}

pub(crate) struct GpuState {
    window: Arc<Window>,
    context: GpuContext,
    layouts: PipelineLayouts,
    quad: QuadGeometry,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: SceneUniforms,
    timer: GpuTimer<WgpuTimestamps>,
    overlay: Overlay,
    frame: Option<FrameTarget>,
    clear_color: wgpu::Color,
}

impl GpuState {
    pub(crate) fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self, RendererError> {
        let context = GpuContext::new(window.clone())?;
        let device = &context.device;

        let layouts = PipelineLayouts::new(device);
        let quad = QuadGeometry::new(device);
        let uniforms = SceneUniforms::new(context.size);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene uniforms"),
            size: std::mem::size_of::<SceneUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        context
            .queue
            .write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let timer = GpuTimer::new(
            WgpuTimestamps::new(device, &context.queue, context.timestamps),
            config.timer_poll_limit,
        );
        let overlay = Overlay::new(device, context.format(), &window);

        Ok(Self {
            window,
            context,
            layouts,
            quad,
            uniform_buffer,
            uniform_bind_group,
            uniforms,
            timer,
            overlay,
            frame: None,
            clear_color: wgpu::Color::BLACK,
        })
    }

    /// Compiles and links every configured scene for this device.
    pub(crate) fn build_scenes(
        &self,
        config: &RendererConfig,
        notifier: &dyn CompileNotifier,
    ) -> Result<SceneRegistry<ScenePipeline>, RendererError> {
        build_scene_registry(
            &self.context.device,
            &self.layouts,
            self.context.format(),
            config,
            notifier,
        )
    }

    pub(crate) fn window(&self) -> &Window {
        &self.window
    }

    /// Lets the overlay see the event first. Returns true when it was consumed.
    pub(crate) fn handle_event(&mut self, event: &WindowEvent) -> bool {
        self.overlay.handle_event(&self.window, event)
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.context.resize(new_size);
        self.uniforms.set_resolution(new_size);
        self.overlay.resize(
            new_size.width,
            new_size.height,
            self.window.scale_factor() as f32,
        );
        tracing::debug!(width = new_size.width, height = new_size.height, "surface resized");
    }
}

impl FrameBackend for GpuState {
    type Program = ScenePipeline;

    fn clear(&mut self, color: [f64; 4]) -> Result<SurfaceStatus, FrameError> {
        let (texture, suboptimal) = match acquired(self.context.surface.get_current_texture()) {
            Acquired::Frame {
                texture,
                suboptimal,
            } => (texture, suboptimal),
            Acquired::Skip { reconfigure: true } => {
                tracing::warn!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                return Ok(SurfaceStatus::Unavailable);
            }
            Acquired::Skip { reconfigure: false } => {
                tracing::trace!("surface texture not available this frame");
                return Ok(SurfaceStatus::Unavailable);
            }
            Acquired::Failed => {
                return Err(FrameError::Surface(
                    "validation error while acquiring the surface texture".into(),
                ));
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(FrameTarget {
            texture,
            view,
            suboptimal,
        });
        let [r, g, b, a] = color;
        self.clear_color = wgpu::Color { r, g, b, a };
        Ok(SurfaceStatus::Ready)
    }

    fn begin_timer(&mut self) -> Result<TimerToken, TimingError> {
        self.timer.begin()
    }

    fn draw(&mut self, program: &ScenePipeline, time: TimeSample) -> Result<(), FrameError> {
        let Some(frame) = &self.frame else {
            return Err(FrameError::Surface("draw without an acquired frame".into()));
        };

        self.uniforms.update_time(time);
        self.context.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms),
        );

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("scene encoder"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: self.timer.device().pass_writes(),
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad.vertex_buffer.slice(..));
            pass.set_index_buffer(self.quad.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..self.quad.index_count, 0, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        tracing::trace!(scene = %program.name, time = time.seconds, "scene drawn");
        Ok(())
    }

    fn end_timer(&mut self, token: TimerToken) -> Result<ElapsedNanos, TimingError> {
        self.timer.end(token)
    }

    fn overlay(&mut self, view: OverlayView<'_, ScenePipeline>) -> Option<SceneId> {
        let timer = self.timer.device().label();
        self.overlay
            .run(&self.window, |ctx| ui::draw_overlay(ctx, &view, timer))
    }

    fn present(&mut self) -> Result<(), FrameError> {
        let Some(frame) = self.frame.take() else {
            return Err(FrameError::Surface("present without an acquired frame".into()));
        };
        self.overlay
            .paint(&self.context.device, &self.context.queue, &frame.view);
        self.window.pre_present_notify();
        frame.texture.present();
        if frame.suboptimal {
            tracing::debug!("surface suboptimal; reconfiguring");
            self.context.reconfigure();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_textures_skip_the_frame() {
        for (current, reconfigure) in [
            (CurrentSurfaceTexture::Outdated, true),
            (CurrentSurfaceTexture::Lost, true),
            (CurrentSurfaceTexture::Timeout, false),
            (CurrentSurfaceTexture::Occluded, false),
        ] {
            match acquired(current) {
                Acquired::Skip { reconfigure: got } => assert_eq!(got, reconfigure),
                _ => panic!("expected the frame to be skipped"),
            }
        }
        assert!(matches!(
            acquired(CurrentSurfaceTexture::Validation),
            Acquired::Failed
        ));
    }
}
