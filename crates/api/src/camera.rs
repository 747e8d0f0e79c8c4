use glam::{UVec2, Vec2, Vec3};
use wavecore_geom::SpectralBlob;

/// Input to `Camera::construct_ray`, assembled by the stream pipeline from
/// the tile's AA/lens/time/spectral samplers (spec.md §4.1 step a).
#[derive(Debug, Clone, Copy)]
pub struct CameraSample {
    pub sensor_size: UVec2,
    pub pixel: Vec2,
    pub lens: Vec2,
    pub pixel_index: u32,
    pub time: f32,
    pub blend_weight: f32,
    pub importance: SpectralBlob,
    pub wavelength_nm: SpectralBlob,
    pub wavelength_pdf: SpectralBlob,
}

/// Output of a camera, consumed to build the initial `Ray` (spec.md §4.1).
/// Zero/negative `blend_weight`, `importance`, `wavelength_nm` or
/// `wavelength_pdf` mean "carry the sample's value over" (spec.md step a,
/// "Default fields ... are carried over from the sample if the camera
/// returned zeros").
#[derive(Debug, Clone, Copy)]
pub struct CameraRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
    pub is_monochrome: bool,
    pub blend_weight: f32,
    pub importance: SpectralBlob,
    pub wavelength_nm: SpectralBlob,
    pub wavelength_pdf: SpectralBlob,
    pub time: f32,
}

pub trait Camera: Send + Sync {
    fn construct_ray(&self, sample: &CameraSample) -> Option<CameraRay>;
}
