use bytemuck::{Pod, Zeroable};
use winit::dpi::PhysicalSize;

use crate::clock::TimeSample;

/// CPU mirror of the `SceneParams` std140 block declared by the fragment
/// prelude.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SceneUniforms {
    pub i_resolution: [f32; 3],
    pub i_time: f32,
    pub i_time_delta: f32,
    pub i_frame: i32,
    pub i_padding0: [f32; 2],
}

unsafe impl Zeroable for SceneUniforms {}
unsafe impl Pod for SceneUniforms {}

impl SceneUniforms {
    pub fn new(size: PhysicalSize<u32>) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.set_resolution(size);
        uniforms
    }

    pub fn set_resolution(&mut self, size: PhysicalSize<u32>) {
        self.i_resolution = [size.width.max(1) as f32, size.height.max(1) as f32, 1.0];
    }

    /// Advances to `sample`. The delta is measured against the previous
    /// sample and never goes negative.
    pub fn update_time(&mut self, sample: TimeSample) {
        self.i_time_delta = if sample.frame_index == 0 {
            0.0
        } else {
            (sample.seconds - self.i_time).max(0.0)
        };
        self.i_time = sample.seconds;
        self.i_frame = sample.frame_index.min(i32::MAX as u64) as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 32);
        assert_eq!(std::mem::offset_of!(SceneUniforms, i_time), 12);
        assert_eq!(std::mem::offset_of!(SceneUniforms, i_frame), 20);
        assert_eq!(std::mem::offset_of!(SceneUniforms, i_padding0), 24);
    }

    #[test]
    fn time_delta_tracks_previous_sample() {
        let mut uniforms = SceneUniforms::new(PhysicalSize::new(1200, 700));
        assert_eq!(uniforms.i_resolution, [1200.0, 700.0, 1.0]);

        uniforms.update_time(TimeSample::new(0.5, 0));
        assert_eq!(uniforms.i_time_delta, 0.0);
        uniforms.update_time(TimeSample::new(0.75, 1));
        assert_eq!(uniforms.i_time_delta, 0.25);
        assert_eq!(uniforms.i_frame, 1);

        uniforms.update_time(TimeSample::new(0.25, 2));
        assert_eq!(uniforms.i_time_delta, 0.0);
    }

    #[test]
    fn frame_counter_saturates() {
        let mut uniforms = SceneUniforms::new(PhysicalSize::new(0, 0));
        uniforms.update_time(TimeSample::new(1.0, u64::MAX));
        assert_eq!(uniforms.i_frame, i32::MAX);
        assert_eq!(uniforms.i_resolution[..2], [1.0, 1.0]);
    }
}
