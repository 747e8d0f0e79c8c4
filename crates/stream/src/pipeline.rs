use crate::hit_stream::{HitEntry, HitStream, ShadingGroup};
use crate::ray_stream::RayStream;
use wavecore_api::{Camera, CameraSample, Scene};
use wavecore_geom::rng::Rng;
use wavecore_geom::{Ray, RayFlags, Rect2i, SpectralBlob};

/// Interleaves the low 16 bits of `x` and `y` into a Morton (Z-order) code,
/// used to pick the camera-ray fill order within a tile (spec.md §4.1:
/// "camera rays are generated in Morton order within the tile to keep
/// nearby rays coherent in the stream").
fn morton_encode(x: u32, y: u32) -> u64 {
    fn spread(mut v: u64) -> u64 {
        v &= 0xffffffff;
        v = (v | (v << 16)) & 0x0000ffff0000ffff;
        v = (v | (v << 8)) & 0x00ff00ff00ff00ff;
        v = (v | (v << 4)) & 0x0f0f0f0f0f0f0f0f;
        v = (v | (v << 2)) & 0x3333333333333333;
        v = (v | (v << 1)) & 0x5555555555555555;
        v
    }
    spread(x as u64) | (spread(y as u64) << 1)
}

/// One unit of camera-sample work still to be generated: a pixel plus
/// which sample-per-pixel index it is.
#[derive(Debug, Clone, Copy)]
struct PixelSample {
    pixel: glam::IVec2,
    pixel_index: u32,
    sample: u32,
}

/// The outcome of one `run_round`: the shading groups ready to be shaded,
/// plus any rays that missed geometry entirely (for infinite-light/AOV
/// bookkeeping by the caller).
pub struct RoundOutput {
    pub groups: Vec<ShadingGroup>,
    pub hits: HitStream,
}

/// Drives one tile's wavefront loop: generate/consume a bounded ray
/// stream, trace it through the scene, sort hits into shading groups, and
/// accept newly spawned bounce/shadow/light rays for the next round
/// (spec.md §4.1).
pub struct StreamPipeline {
    capacity: usize,
    current: RayStream,
    next: RayStream,
    hits: HitStream,
    tile: Rect2i,
    work: Vec<PixelSample>,
    cursor: usize,
    rng: Rng,
}

impl StreamPipeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            current: RayStream::new(capacity),
            next: RayStream::new(capacity),
            hits: HitStream::with_capacity(capacity),
            tile: Rect2i::new(glam::IVec2::ZERO, glam::IVec2::ZERO),
            work: Vec::new(),
            cursor: 0,
            rng: Rng::new(0),
        }
    }

    /// Starts a fresh tile: clears both ray streams and rebuilds the
    /// Morton-ordered work list of `(pixel, sample)` pairs still owed.
    pub fn reset(&mut self, tile: Rect2i, samples_per_pixel: u32, seed: u64) {
        self.current.reset();
        self.next.reset();
        self.hits.reset();
        self.tile = tile;
        self.rng = Rng::new(seed);
        self.cursor = 0;

        let size = tile.view_size();
        let mut pixels: Vec<(u64, glam::IVec2, u32)> =
            Vec::with_capacity(size.x as usize * size.y as usize);
        for ly in 0..size.y {
            for lx in 0..size.x {
                let pixel = tile.start + glam::IVec2::new(lx as i32, ly as i32);
                let linear = ly * size.x + lx;
                pixels.push((morton_encode(lx, ly), pixel, linear));
            }
        }
        pixels.sort_by_key(|(code, _, _)| *code);

        self.work.clear();
        self.work.reserve(pixels.len() * samples_per_pixel as usize);
        for sample in 0..samples_per_pixel {
            for (_, pixel, linear) in &pixels {
                self.work.push(PixelSample {
                    pixel: *pixel,
                    pixel_index: *linear,
                    sample,
                });
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.work.len() && self.current.is_empty() && self.next.is_empty()
    }

    /// Tops up `next` with freshly generated camera rays until it is full
    /// or the work list is exhausted.
    fn fill_camera_rays(&mut self, camera: &dyn Camera) {
        while self.cursor < self.work.len() && self.next.enough_space(1) {
            let item = self.work[self.cursor];
            self.cursor += 1;
            let lens = self.rng.next_2d();
            let sample = CameraSample {
                sensor_size: self.tile.view_size(),
                pixel: item.pixel.as_vec2() + self.rng.next_2d(),
                lens,
                pixel_index: item.pixel_index,
                time: self.rng.next_f32(),
                blend_weight: 1.0,
                importance: SpectralBlob::splat(1.0),
                wavelength_nm: SpectralBlob::splat(550.0),
                wavelength_pdf: SpectralBlob::splat(1.0),
            };
            let Some(cr) = camera.construct_ray(&sample) else {
                continue;
            };
            let flags = if cr.is_monochrome {
                RayFlags::CAMERA | RayFlags::MONOCHROME
            } else {
                RayFlags::CAMERA
            };
            let ray = Ray::new(
                cr.origin,
                cr.direction,
                cr.min_t,
                cr.max_t,
                item.pixel_index,
                0,
                flags,
                cr.wavelength_nm,
                cr.importance * cr.blend_weight,
                cr.time,
            );
            // add_ray only fails when full, which `enough_space` precludes.
            let _ = self.next.add_ray(ray);
        }
    }

    /// Runs one wavefront round: swaps `next` into `current`, refills
    /// `next` with camera rays if there is remaining work, traces
    /// `current` through `scene`, and returns the sorted shading groups.
    pub fn run_round(&mut self, camera: &dyn Camera, scene: &dyn Scene) -> RoundOutput {
        let _span = tracing::trace_span!("run_round", tile = ?self.tile, cursor = self.cursor).entered();
        RayStream::swap(&mut self.current, &mut self.next);
        self.next.reset();
        self.fill_camera_rays(camera);

        self.hits.reset();
        let mut id = 0usize;
        while let Some(span) = self.current.next_span(self.current.len().max(1), true) {
            let rays = self.current.rays_in_span(span);
            let offset = span.offset;
            scene.trace_rays(&rays, &mut |local, handle, t| {
                let ray_index = (offset + local) as u32;
                match handle {
                    Some(entity) => self.hits.push(HitEntry {
                        ray_index,
                        entity_id: entity.entity_id,
                        material_id: entity.material_id,
                        primitive_id: 0,
                        param: [t, 0.0, 0.0],
                        flags: 0,
                    }),
                    None => self.hits.push(HitEntry::background(ray_index)),
                }
            });
            id += rays.len();
        }
        debug_assert_eq!(id, self.current.len());
        self.hits.sort();

        let groups: Vec<ShadingGroup> = self.hits.shading_groups().collect();
        tracing::trace!(rays = id, groups = groups.len(), "round traced");

        RoundOutput {
            groups,
            hits: std::mem::replace(&mut self.hits, HitStream::with_capacity(self.capacity)),
        }
    }

    pub fn ray(&self, ray_index: u32) -> Ray {
        self.current.get_ray(ray_index as usize)
    }

    pub fn enqueue_bounce_ray(&mut self, ray: Ray) -> Result<(), crate::ray_stream::StreamFull> {
        self.next.add_ray(ray)
    }

    pub fn enqueue_shadow_ray(&mut self, ray: Ray) -> Result<(), crate::ray_stream::StreamFull> {
        self.next.add_ray(ray)
    }

    pub fn enqueue_light_ray(&mut self, ray: Ray) -> Result<(), crate::ray_stream::StreamFull> {
        self.next.add_ray(ray)
    }

    pub fn has_pending_work(&self) -> bool {
        self.cursor < self.work.len() || !self.next.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morton_encode_is_zero_at_origin() {
        assert_eq!(morton_encode(0, 0), 0);
    }

    #[test]
    fn morton_encode_interleaves_bits() {
        assert_eq!(morton_encode(1, 0), 1);
        assert_eq!(morton_encode(0, 1), 2);
        assert_eq!(morton_encode(1, 1), 3);
    }

    #[test]
    fn reset_builds_work_list_sized_to_tile_times_spp() {
        let mut p = StreamPipeline::new(64);
        let tile = Rect2i::new(glam::IVec2::new(0, 0), glam::IVec2::new(4, 4));
        p.reset(tile, 2, 1);
        assert_eq!(p.work.len(), 4 * 4 * 2);
        assert!(!p.is_finished());
    }
}
