//! Ray, vector and RNG primitives shared by the rest of the wavecore
//! workspace. Kept dependency-free except for `glam`/`bitflags` so every
//! other crate in the workspace can sit on top of it.

mod blob;
mod intersection;
mod ray;
pub mod rng;

pub use blob::SpectralBlob;
pub use intersection::{
    IntersectionPoint, IntersectionVariant, MediumPoint, ShadingFrame, SurfacePoint,
};
pub use ray::{FeedbackBits, Ray, RayFlags};

pub use glam::{IVec2, UVec2, Vec2, Vec3};

/// Number of wavelengths carried by a single ray (`PR_SPECTRAL_BLOB_SIZE` in
/// the original source).
pub const SPECTRAL_BLOB_SIZE: usize = 4;

/// Sentinel used throughout the stream pipeline for "no entity"/"no hit".
pub const INVALID_ID: u32 = u32::MAX;

/// Axis-aligned rectangle on the image plane, in pixel coordinates.
/// `start` is inclusive, `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2i {
    pub start: IVec2,
    pub end: IVec2,
}

impl Rect2i {
    pub fn new(start: IVec2, end: IVec2) -> Self {
        debug_assert!(start.x <= end.x && start.y <= end.y);
        Self { start, end }
    }

    pub fn view_size(&self) -> UVec2 {
        UVec2::new(
            (self.end.x - self.start.x) as u32,
            (self.end.y - self.start.y) as u32,
        )
    }

    pub fn area(&self) -> u64 {
        let s = self.view_size();
        s.x as u64 * s.y as u64
    }

    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= self.start.x && p.x < self.end.x && p.y >= self.start.y && p.y < self.end.y
    }

    /// Splits along the longer dimension into two halves that exactly
    /// partition `self`. Used by the adaptive tile scheduler.
    pub fn split_longer_dim(&self) -> (Rect2i, Rect2i) {
        let size = self.view_size();
        if size.x >= size.y {
            let mid = self.start.x + (size.x / 2) as i32;
            (
                Rect2i::new(self.start, IVec2::new(mid, self.end.y)),
                Rect2i::new(IVec2::new(mid, self.start.y), self.end),
            )
        } else {
            let mid = self.start.y + (size.y / 2) as i32;
            (
                Rect2i::new(self.start, IVec2::new(self.end.x, mid)),
                Rect2i::new(IVec2::new(self.start.x, mid), self.end),
            )
        }
    }
}

/// Absolute-tolerance helper for the approximate-equality assertions used
/// across the test suites (no `approx` dependency in the teacher or pack).
pub fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}
