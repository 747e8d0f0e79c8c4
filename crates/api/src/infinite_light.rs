use glam::{Vec3, Vec4};
use wavecore_geom::{IntersectionPoint, Ray, SpectralBlob};

#[derive(Debug, Clone, Copy)]
pub struct InfiniteLightEvalInput<'a> {
    pub point: Option<&'a IntersectionPoint>,
    pub ray: Ray,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InfiniteLightEvalOutput {
    pub radiance: SpectralBlob,
    pub pdf_s: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct InfiniteLightSampleInput<'a> {
    pub rnd: Vec4,
    pub wavelength_nm: SpectralBlob,
    pub point: Option<&'a IntersectionPoint>,
    pub sample_position: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InfiniteLightSampleOutput {
    pub radiance: SpectralBlob,
    pub pdf_s: f32,
    pub position: Vec3,
    pub outgoing: Vec3,
}

pub trait InfiniteLight: Send + Sync {
    fn has_delta_distribution(&self) -> bool {
        false
    }

    fn eval(&self, input: &InfiniteLightEvalInput) -> InfiniteLightEvalOutput;

    fn sample_dir(&self, input: &InfiniteLightSampleInput) -> InfiniteLightSampleOutput {
        self.sample_pos_dir(input)
    }

    fn sample_pos_dir(&self, input: &InfiniteLightSampleInput) -> InfiniteLightSampleOutput;

    /// Average power in W/m^2.
    fn power(&self) -> f32;
}
