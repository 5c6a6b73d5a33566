//! wgpu side of the preview.
//!
//! - `context` owns the surface, device and queue and reconfigures the
//!   swapchain on resize.
//! - `pipeline` holds the quad geometry, links scene programs and builds the
//!   scene registry at start-up.
//! - `uniforms` mirrors the prelude's uniform block.
//! - `timer` implements frame timing with timestamp queries or a submission
//!   clock.
//! - `overlay` hosts egui.
//! - `state` glues everything together as the session's frame backend.

mod context;
mod overlay;
mod pipeline;
mod state;
mod timer;
mod uniforms;

pub(crate) use pipeline::ScenePipeline;
pub(crate) use state::GpuState;
