use wavecore_geom::{Ray, RayFlags, SpectralBlob, SPECTRAL_BLOB_SIZE};

/// Structure-of-arrays storage for a bounded batch of rays. Capacity is
/// fixed at construction (spec.md §3's "capacity fixed at construction,
/// typically a few thousand"); `write_pos`/`read_pos` are independent so a
/// stream can be drained by `next_span` while still being written to by
/// `add_ray` in the same round, matching `RayStream`/`RayGroup` in the
/// original source.
pub struct RayStream {
    origin: [Vec<f32>; 3],
    direction: [Vec<f32>; 3],
    min_t: Vec<f32>,
    max_t: Vec<f32>,
    pixel_index: Vec<u32>,
    ray_group_id: Vec<u32>,
    depth: Vec<u16>,
    time: Vec<f32>,
    flags: Vec<u32>,
    wavelengths: [Vec<f32>; SPECTRAL_BLOB_SIZE],
    importance: [Vec<f32>; SPECTRAL_BLOB_SIZE],

    capacity: usize,
    write_pos: usize,
    read_pos: usize,
}

/// Error raised when `add_ray` is attempted on a full stream. Spec.md §4.1:
/// "a full write stream when an enqueue is attempted is fatal".
#[derive(Debug, thiserror::Error)]
#[error("ray stream is full (capacity {capacity})")]
pub struct StreamFull {
    pub capacity: usize,
}

/// Read-only contiguous view into a `RayStream` (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct RaySpan {
    pub offset: usize,
    pub size: usize,
    /// Hint for traversal: true if rays in this span are expected to be
    /// directionally coherent (e.g. a freshly generated camera-ray batch).
    pub coherent: bool,
}

impl RayStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            origin: [
                Vec::with_capacity(capacity),
                Vec::with_capacity(capacity),
                Vec::with_capacity(capacity),
            ],
            direction: [
                Vec::with_capacity(capacity),
                Vec::with_capacity(capacity),
                Vec::with_capacity(capacity),
            ],
            min_t: Vec::with_capacity(capacity),
            max_t: Vec::with_capacity(capacity),
            pixel_index: Vec::with_capacity(capacity),
            ray_group_id: Vec::with_capacity(capacity),
            depth: Vec::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            wavelengths: std::array::from_fn(|_| Vec::with_capacity(capacity)),
            importance: std::array::from_fn(|_| Vec::with_capacity(capacity)),
            capacity,
            write_pos: 0,
            read_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    pub fn is_full(&self) -> bool {
        self.write_pos >= self.capacity
    }

    pub fn enough_space(&self, requested: usize) -> bool {
        self.write_pos + requested <= self.capacity
    }

    pub fn has_next_span(&self) -> bool {
        self.read_pos < self.write_pos
    }

    /// §8 invariant 1: direction is (re-)normalized on insertion; non-finite
    /// or zero-length directions are flagged `INVALID` rather than
    /// rejected (`BadRay` local recovery, spec.md §7).
    pub fn add_ray(&mut self, mut ray: Ray) -> Result<(), StreamFull> {
        if self.is_full() {
            return Err(StreamFull {
                capacity: self.capacity,
            });
        }
        if !ray.is_direction_valid() || !ray.is_origin_valid() {
            ray.flags |= RayFlags::INVALID;
        }

        let i = self.write_pos;
        self.origin[0].push(ray.origin.x);
        self.origin[1].push(ray.origin.y);
        self.origin[2].push(ray.origin.z);
        self.direction[0].push(ray.direction.x);
        self.direction[1].push(ray.direction.y);
        self.direction[2].push(ray.direction.z);
        self.min_t.push(ray.min_t);
        self.max_t.push(ray.max_t);
        self.pixel_index.push(ray.pixel_index);
        self.ray_group_id.push(ray.ray_group_id);
        self.depth.push(ray.depth);
        self.time.push(ray.time);
        self.flags.push(ray.flags.bits());
        for k in 0..SPECTRAL_BLOB_SIZE {
            self.wavelengths[k].push(ray.wavelengths[k]);
            self.importance[k].push(ray.importance[k]);
        }
        debug_assert_eq!(self.origin[0].len(), i + 1);
        self.write_pos += 1;
        Ok(())
    }

    pub fn get_ray(&self, id: usize) -> Ray {
        let mut wavelengths = [0.0; SPECTRAL_BLOB_SIZE];
        let mut importance = [0.0; SPECTRAL_BLOB_SIZE];
        for k in 0..SPECTRAL_BLOB_SIZE {
            wavelengths[k] = self.wavelengths[k][id];
            importance[k] = self.importance[k][id];
        }
        Ray {
            origin: glam::Vec3::new(self.origin[0][id], self.origin[1][id], self.origin[2][id]),
            direction: glam::Vec3::new(
                self.direction[0][id],
                self.direction[1][id],
                self.direction[2][id],
            ),
            min_t: self.min_t[id],
            max_t: self.max_t[id],
            depth: self.depth[id],
            pixel_index: self.pixel_index[id],
            ray_group_id: self.ray_group_id[id],
            flags: RayFlags::from_bits_truncate(self.flags[id]),
            wavelengths: SpectralBlob(wavelengths),
            importance: SpectralBlob(importance),
            time: self.time[id],
        }
    }

    pub fn reset(&mut self) {
        for c in self.origin.iter_mut() {
            c.clear();
        }
        for c in self.direction.iter_mut() {
            c.clear();
        }
        self.min_t.clear();
        self.max_t.clear();
        self.pixel_index.clear();
        self.ray_group_id.clear();
        self.depth.clear();
        self.time.clear();
        self.flags.clear();
        for c in self.wavelengths.iter_mut() {
            c.clear();
        }
        for c in self.importance.iter_mut() {
            c.clear();
        }
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Pops the next contiguous span of up to `max_len` rays from the read
    /// cursor. Used by `Scene::trace_rays` to hand a batch to traversal.
    pub fn next_span(&mut self, max_len: usize, coherent: bool) -> Option<RaySpan> {
        if !self.has_next_span() {
            return None;
        }
        let offset = self.read_pos;
        let size = max_len.min(self.write_pos - offset);
        self.read_pos += size;
        Some(RaySpan {
            offset,
            size,
            coherent,
        })
    }

    pub fn rays_in_span(&self, span: RaySpan) -> Vec<Ray> {
        (span.offset..span.offset + span.size)
            .map(|i| self.get_ray(i))
            .collect()
    }

    /// `O(1)` swap of two streams' storage, matching spec.md §4.1 step b.
    pub fn swap(a: &mut RayStream, b: &mut RayStream) {
        std::mem::swap(a, b);
    }

    pub fn memory_usage_bytes(&self) -> usize {
        let per_ray = 3 * 4 + 3 * 4 + 4 + 4 + 4 + 4 + 2 + 4 + 1 + SPECTRAL_BLOB_SIZE * 4 * 2;
        per_ray * self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavecore_geom::Ray;

    fn ray() -> Ray {
        Ray::new(
            glam::Vec3::ZERO,
            glam::Vec3::new(0.0, 0.0, -1.0),
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
    fn add_and_get_round_trips() {
        let mut s = RayStream::new(4);
        s.add_ray(ray()).unwrap();
        let got = s.get_ray(0);
        assert_eq!(got.pixel_index, 0);
        assert!(got.is_direction_valid());
    }

    #[test]
    fn full_stream_rejects_enqueue() {
        let mut s = RayStream::new(1);
        s.add_ray(ray()).unwrap();
        assert!(s.add_ray(ray()).is_err());
    }

    #[test]
    fn reset_clears_counters() {
        let mut s = RayStream::new(4);
        s.add_ray(ray()).unwrap();
        s.reset();
        assert!(s.is_empty());
        assert!(!s.has_next_span());
    }

    #[test]
    fn reset_idempotent() {
        let mut s = RayStream::new(4);
        s.add_ray(ray()).unwrap();
        s.reset();
        s.reset();
        assert_eq!(s.len(), 0);
        assert_eq!(s.capacity(), 4);
    }

    #[test]
    fn swap_is_cheap_and_exchanges_contents() {
        let mut write = RayStream::new(4);
        let mut read = RayStream::new(4);
        write.add_ray(ray()).unwrap();
        RayStream::swap(&mut write, &mut read);
        assert_eq!(read.len(), 1);
        assert_eq!(write.len(), 0);
    }

    #[test]
    fn next_span_advances_read_cursor() {
        let mut s = RayStream::new(4);
        for _ in 0..3 {
            s.add_ray(ray()).unwrap();
        }
        let span = s.next_span(2, true).unwrap();
        assert_eq!((span.offset, span.size), (0, 2));
        let span2 = s.next_span(2, true).unwrap();
        assert_eq!((span2.offset, span2.size), (2, 1));
        assert!(s.next_span(2, true).is_none());
    }
}
