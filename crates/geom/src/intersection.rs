use crate::{Ray, RayFlags};
use glam::{Vec2, Vec3};

/// Shading frame at a surface hit: `(N, Nx, Ny)` is always oriented so
/// `NdotV >= 0` (spec.md §3). If the incoming ray approached the back
/// side, the frame is flipped and `INSIDE` is set on the returned flags.
#[derive(Debug, Clone, Copy)]
pub struct ShadingFrame {
    pub n: Vec3,
    pub nx: Vec3,
    pub ny: Vec3,
}

impl ShadingFrame {
    /// Builds an orthonormal frame from a geometric normal and the
    /// outgoing (toward-viewer) direction, flipping if necessary.
    pub fn oriented(geometric_normal: Vec3, view_dir: Vec3) -> (ShadingFrame, bool) {
        let n = geometric_normal.normalize();
        let (n, inside) = if n.dot(view_dir) < 0.0 {
            (-n, true)
        } else {
            (n, false)
        };
        let nx = if n.x.abs() > n.z.abs() {
            Vec3::new(-n.y, n.x, 0.0)
        } else {
            Vec3::new(0.0, -n.z, n.y)
        }
        .normalize();
        let ny = n.cross(nx);
        (ShadingFrame { n, nx, ny }, inside)
    }

    pub fn ndotv(&self, view_dir: Vec3) -> f32 {
        self.n.dot(view_dir)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub frame: ShadingFrame,
    pub uv: Vec2,
    pub primitive_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MediumPoint {
    pub medium_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum IntersectionVariant {
    Surface(SurfacePoint),
    Medium(MediumPoint),
}

/// Point at which a ray stopped: either a surface or a participating
/// medium event (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct IntersectionPoint {
    pub position: Vec3,
    pub variant: IntersectionVariant,
    pub ray: Ray,
    pub depth2: f32,
    pub flags: RayFlags,
}

impl IntersectionPoint {
    pub fn new_surface(ray: Ray, position: Vec3, geometric_normal: Vec3, uv: Vec2, primitive_id: u32) -> Self {
        let view_dir = -ray.direction;
        let (frame, inside) = ShadingFrame::oriented(geometric_normal, view_dir);
        let mut flags = ray.flags;
        if inside {
            flags |= RayFlags::INSIDE;
        }
        let depth2 = (position - ray.origin).length_squared();
        Self {
            position,
            variant: IntersectionVariant::Surface(SurfacePoint {
                position,
                frame,
                uv,
                primitive_id,
            }),
            ray,
            depth2,
            flags,
        }
    }

    pub fn new_medium(ray: Ray, position: Vec3, medium_id: u32) -> Self {
        let depth2 = (position - ray.origin).length_squared();
        Self {
            position,
            variant: IntersectionVariant::Medium(MediumPoint { medium_id }),
            ray,
            depth2,
            flags: ray.flags,
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self.variant, IntersectionVariant::Surface(_))
    }

    pub fn is_inside(&self) -> bool {
        self.flags.contains(RayFlags::INSIDE)
    }

    pub fn surface(&self) -> Option<&SurfacePoint> {
        match &self.variant {
            IntersectionVariant::Surface(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpectralBlob;

    fn test_ray(dir: Vec3) -> Ray {
        Ray::new(
            Vec3::ZERO,
            dir,
            0.0,
            f32::INFINITY,
            0,
            0,
            RayFlags::CAMERA,
            SpectralBlob::ZERO,
            SpectralBlob::splat(1.0),
            0.0,
        )
    }

    #[test]
    fn frame_faces_viewer_when_hit_from_front() {
        let ray = test_ray(Vec3::new(0.0, 0.0, -1.0));
        let ip = IntersectionPoint::new_surface(ray, Vec3::Z, Vec3::Z, Vec2::ZERO, 0);
        assert!(!ip.is_inside());
        assert!(ip.surface().unwrap().frame.ndotv(-ray.direction) >= 0.0);
    }

    #[test]
    fn frame_flips_when_hit_from_behind() {
        let ray = test_ray(Vec3::new(0.0, 0.0, 1.0));
        // Geometric normal still points toward +Z; the ray approaches
        // from behind it, so the shading frame must flip and INSIDE set.
        let ip = IntersectionPoint::new_surface(ray, Vec3::Z, Vec3::Z, Vec2::ZERO, 0);
        assert!(ip.is_inside());
        assert!(ip.surface().unwrap().frame.ndotv(-ray.direction) >= 0.0);
    }
}
