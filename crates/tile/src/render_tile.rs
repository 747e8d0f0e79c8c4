use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use wavecore_geom::Rect2i;

/// Smallest tile dimension the adaptive splitter will still cut (spec.md
/// §4.2: "Tiles with a view-size dimension ≤ MIN_TILE_SIZE are not split").
pub const MIN_TILE_SIZE: i32 = 8;

/// A tile's lifecycle state, stored as a `u32` so `next_tile()` can CAS it
/// directly.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Idle = 0,
    Working = 1,
    Done = 2,
}

impl TileState {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => TileState::Idle,
            1 => TileState::Working,
            _ => TileState::Done,
        }
    }
}

/// One unit of schedulable image-plane work (spec.md §4.2). Per-tile
/// counters are atomics so `RenderTileMap::statistics()` can sum them
/// without locking individual tiles.
pub struct RenderTile {
    pub rect: Rect2i,
    pub seed: u64,
    state: AtomicU32,
    pub samples_done: AtomicU64,
    pub samples_max: AtomicU64,
    pub iteration_count: AtomicU64,
    pub accumulated_work_time_us: AtomicU64,
    pub last_work_time_us: AtomicU64,
}

impl RenderTile {
    pub fn new(rect: Rect2i, seed: u64, samples_max: u64) -> Self {
        Self {
            rect,
            seed,
            state: AtomicU32::new(TileState::Idle as u32),
            samples_done: AtomicU64::new(0),
            samples_max: AtomicU64::new(samples_max),
            iteration_count: AtomicU64::new(0),
            accumulated_work_time_us: AtomicU64::new(0),
            last_work_time_us: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> TileState {
        TileState::from_u32(self.state.load(Ordering::Acquire))
    }

    /// Attempts `IDLE -> WORKING`. Returns `true` on success.
    pub fn try_acquire(&self) -> bool {
        self.state
            .compare_exchange(
                TileState::Idle as u32,
                TileState::Working as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Records a completed round of work and releases the tile back to
    /// `DONE` (or `IDLE` if there is remaining sample budget).
    pub fn release(&self, samples_rendered: u64, work_time_us: u64) {
        self.samples_done
            .fetch_add(samples_rendered, Ordering::Relaxed);
        self.iteration_count.fetch_add(1, Ordering::Relaxed);
        self.accumulated_work_time_us
            .fetch_add(work_time_us, Ordering::Relaxed);
        self.last_work_time_us
            .store(work_time_us, Ordering::Relaxed);

        let next = if self.samples_done.load(Ordering::Relaxed) >= self.samples_max.load(Ordering::Relaxed)
        {
            TileState::Done
        } else {
            TileState::Idle
        };
        self.state.store(next as u32, Ordering::Release);
    }

    pub fn is_splittable(&self, min_time_spent_us: u64, avg_work_time_us: f64) -> bool {
        let size = self.rect.view_size();
        if size.x <= MIN_TILE_SIZE as u32 || size.y <= MIN_TILE_SIZE as u32 {
            return false;
        }
        self.state() == TileState::Done
            && self.last_work_time_us.load(Ordering::Relaxed) as f64
                > min_time_spent_us.max((2.0 * avg_work_time_us) as u64) as f64
    }

    /// Splits along the longer dimension; the returned halves inherit half
    /// of this tile's cumulative statistics (spec.md §4.2 step 3).
    pub fn split(&self) -> (RenderTile, RenderTile) {
        let (a, b) = self.rect.split_longer_dim();
        let done = self.samples_done.load(Ordering::Relaxed);
        let max = self.samples_max.load(Ordering::Relaxed);
        let iters = self.iteration_count.load(Ordering::Relaxed);
        let work = self.accumulated_work_time_us.load(Ordering::Relaxed);

        let make = |rect: Rect2i, seed: u64| RenderTile {
            rect,
            seed,
            state: AtomicU32::new(TileState::Idle as u32),
            samples_done: AtomicU64::new(done / 2),
            samples_max: AtomicU64::new(max),
            iteration_count: AtomicU64::new(iters / 2),
            accumulated_work_time_us: AtomicU64::new(work / 2),
            last_work_time_us: AtomicU64::new(0),
        };
        (make(a, self.seed ^ 0x9E37), make(b, self.seed ^ 0x79B9))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    fn tile() -> RenderTile {
        RenderTile::new(Rect2i::new(IVec2::ZERO, IVec2::new(32, 32)), 1, 16)
    }

    #[test]
    fn try_acquire_transitions_idle_to_working() {
        let t = tile();
        assert!(t.try_acquire());
        assert_eq!(t.state(), TileState::Working);
        assert!(!t.try_acquire());
    }

    #[test]
    fn release_marks_done_once_sample_budget_met() {
        let t = tile();
        t.try_acquire();
        t.release(16, 100);
        assert_eq!(t.state(), TileState::Done);
    }

    #[test]
    fn release_reopens_tile_with_remaining_budget() {
        let t = tile();
        t.try_acquire();
        t.release(4, 100);
        assert_eq!(t.state(), TileState::Idle);
    }

    #[test]
    fn split_halves_the_rect_and_inherits_stats() {
        let t = tile();
        t.try_acquire();
        t.release(16, 1000);
        let (a, b) = t.split();
        assert_eq!(a.rect.area() + b.rect.area(), t.rect.area());
        assert_eq!(a.samples_done.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn small_tile_is_not_splittable() {
        let t = RenderTile::new(Rect2i::new(IVec2::ZERO, IVec2::new(4, 4)), 1, 16);
        t.try_acquire();
        t.release(16, 10_000_000);
        assert!(!t.is_splittable(0, 0.0));
    }
}
