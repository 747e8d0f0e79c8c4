use crate::SpectralBlob;
use bitflags::bitflags;
use glam::Vec3;

bitflags! {
    /// Per-ray classification bits. `INVALID` is not part of the
    /// distilled spec but is needed to represent the `BadRay` local
    /// recovery path concretely: rather than dropping the ray from the
    /// stream (which would shift indices), it is kept and marked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RayFlags: u32 {
        const CAMERA      = 1 << 0;
        const LIGHT       = 1 << 1;
        const BOUNCE      = 1 << 2;
        const SHADOW      = 1 << 3;
        const MONOCHROME  = 1 << 4;
        const INSIDE      = 1 << 5;
        const INVALID     = 1 << 6;
    }
}

bitflags! {
    /// Bits recorded in the `Feedback` counter AOV (spec.md §3/§7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FeedbackBits: u32 {
        const NAN      = 1 << 0;
        const INF      = 1 << 1;
        const NEGATIVE = 1 << 2;
    }
}

/// A single ray in the stream pipeline.
///
/// Directions are normalized on construction/insertion (see
/// `RayStream::add_ray`); this struct itself does not re-normalize, so
/// callers building a `Ray` directly (e.g. in tests) must pass a unit
/// direction or go through `Ray::new` which normalizes.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
    pub depth: u16,
    pub pixel_index: u32,
    pub ray_group_id: u32,
    pub flags: RayFlags,
    pub wavelengths: SpectralBlob,
    pub importance: SpectralBlob,
    pub time: f32,
}

impl Ray {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        origin: Vec3,
        direction: Vec3,
        min_t: f32,
        max_t: f32,
        pixel_index: u32,
        ray_group_id: u32,
        flags: RayFlags,
        wavelengths: SpectralBlob,
        importance: SpectralBlob,
        time: f32,
    ) -> Self {
        let len = direction.length();
        let (direction, flags) = if len.is_finite() && len > 1e-8 {
            (direction / len, flags)
        } else {
            (Vec3::Z, flags | RayFlags::INVALID)
        };
        Self {
            origin,
            direction,
            min_t,
            max_t,
            depth: 0,
            pixel_index,
            ray_group_id,
            flags,
            wavelengths,
            importance,
            time,
        }
    }

    /// §8 invariant 1: after insertion, direction must be unit-length and
    /// every component finite.
    pub fn is_direction_valid(&self) -> bool {
        self.direction.is_finite()
            && crate::approx_eq(self.direction.length(), 1.0, 1e-5)
    }

    pub fn is_origin_valid(&self) -> bool {
        self.origin.is_finite()
    }

    pub fn is_invalid(&self) -> bool {
        self.flags.contains(RayFlags::INVALID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_direction() {
        let r = Ray::new(
            Vec3::ZERO,
            Vec3::new(3.0, 0.0, 0.0),
            0.0,
            f32::INFINITY,
            0,
            0,
            RayFlags::CAMERA,
            SpectralBlob::ZERO,
            SpectralBlob::splat(1.0),
            0.0,
        );
        assert!(r.is_direction_valid());
    }

    #[test]
    fn zero_direction_is_flagged_invalid() {
        let r = Ray::new(
            Vec3::ZERO,
            Vec3::ZERO,
            0.0,
            1.0,
            0,
            0,
            RayFlags::CAMERA,
            SpectralBlob::ZERO,
            SpectralBlob::splat(1.0),
            0.0,
        );
        assert!(r.is_invalid());
    }

    #[test]
    fn nan_direction_is_flagged_invalid() {
        let r = Ray::new(
            Vec3::ZERO,
            Vec3::new(f32::NAN, 0.0, 0.0),
            0.0,
            1.0,
            0,
            0,
            RayFlags::CAMERA,
            SpectralBlob::ZERO,
            SpectralBlob::splat(1.0),
            0.0,
        );
        assert!(r.is_invalid());
    }
}
