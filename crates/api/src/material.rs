use glam::{Vec2, Vec3};
use wavecore_geom::rng::Rng;
use wavecore_geom::{IntersectionPoint, SpectralBlob};

/// The normal is always `(0,0,1)` in shading space — fields mirror
/// `MaterialSampleContext`/`MaterialEvalContext` in the original source.
#[derive(Debug, Clone, Copy)]
pub struct MaterialSampleContext {
    pub position: Vec3,
    /// Outgoing (not incident) view direction, in shading space.
    pub view: Vec3,
    pub uv: Vec2,
    pub primitive_id: u32,
    pub wavelength_nm: SpectralBlob,
    pub is_inside: bool,
}

impl MaterialSampleContext {
    pub fn ndotv(&self) -> f32 {
        self.view.z
    }

    pub fn from_intersection(ip: &IntersectionPoint, view_shading: Vec3) -> Self {
        let surface = ip.surface().expect("material context requires a surface hit");
        Self {
            position: surface.position,
            view: view_shading,
            uv: surface.uv,
            primitive_id: surface.primitive_id,
            wavelength_nm: ip.ray.wavelengths,
            is_inside: ip.is_inside(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaterialEvalContext {
    pub base: MaterialSampleContext,
    /// Outgoing light direction, in shading space.
    pub light: Vec3,
    pub half: Vec3,
}

impl MaterialEvalContext {
    pub fn from_sample(base: MaterialSampleContext, light: Vec3) -> Self {
        let half = (base.view + light).normalize();
        Self { base, light, half }
    }

    pub fn ndotl(&self) -> f32 {
        self.light.z
    }

    pub fn ndoth(&self) -> f32 {
        self.half.z
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialEvalOutput {
    pub weight: SpectralBlob,
    pub pdf_s: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialSampleOutput {
    pub weight: SpectralBlob,
    pub pdf_s: f32,
    pub direction: Vec3,
    pub is_specular: bool,
}

/// Capability-set trait replacing the original's `IMaterial` virtual
/// hierarchy (spec.md §9 — "inheritance becomes trait objects").
pub trait Material: Send + Sync {
    fn eval(&self, ctx: &MaterialEvalContext) -> MaterialEvalOutput;
    fn sample(&self, ctx: &MaterialSampleContext, rng: &mut Rng) -> MaterialSampleOutput;
    fn pdf(&self, ctx: &MaterialEvalContext) -> f32;
}
