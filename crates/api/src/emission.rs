use glam::{Vec2, Vec3};
use wavecore_geom::{IntersectionPoint, RayFlags, SpectralBlob};

/// Mirrors `EmissionSampleContext`/`EmissionEvalContext`: no view vector is
/// given to an emitter, unlike `Material`.
#[derive(Debug, Clone, Copy)]
pub struct EmissionSampleContext {
    pub position: Vec3,
    pub uv: Vec2,
    pub primitive_id: u32,
    pub ray_flags: RayFlags,
}

impl EmissionSampleContext {
    pub fn from_intersection(ip: &IntersectionPoint) -> Self {
        let surface = ip.surface().expect("emission context requires a surface hit");
        Self {
            position: surface.position,
            uv: surface.uv,
            primitive_id: surface.primitive_id,
            ray_flags: ip.ray.flags,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmissionEvalContext {
    pub base: EmissionSampleContext,
    /// Outgoing light direction, in shading space.
    pub light: Vec3,
    pub wavelength_nm: SpectralBlob,
}

impl EmissionEvalContext {
    pub fn ndotl(&self) -> f32 {
        self.light.z
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmissionEvalOutput {
    pub radiance: SpectralBlob,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmissionSampleOutput {
    pub radiance: SpectralBlob,
    pub pdf_s: f32,
    pub direction: Vec3,
}

pub trait Emission: Send + Sync {
    fn eval(&self, ctx: &EmissionEvalContext) -> EmissionEvalOutput;
    fn sample(&self, ctx: &EmissionSampleContext, u: Vec2) -> EmissionSampleOutput;
}
