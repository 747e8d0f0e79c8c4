use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use glam::UVec2;
use rayon::prelude::*;

use crate::render_tile::{RenderTile, TileState};
use crate::tile_map::{RenderTileMap, TileMode};

/// Aggregated counters across all tiles (spec.md §4.2's
/// `RenderTileStatistics`), summed with `rayon` rather than a manual loop
/// once the tile count gets large.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTileStatistics {
    pub pixel_samples_rendered: u64,
    pub pixel_samples_max: u64,
    pub iteration_count: u64,
    pub accumulated_work_time_us: u64,
}

impl RenderTileStatistics {
    pub fn percentage(&self) -> f64 {
        if self.pixel_samples_max == 0 {
            return 1.0;
        }
        self.pixel_samples_rendered as f64 / self.pixel_samples_max as f64
    }
}

/// Tunables for the adaptive splitting behaviour (spec.md §4.2).
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub adaptive: bool,
    pub min_time_spent_us: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            min_time_spent_us: 50_000,
        }
    }
}

/// Distributes image-plane work across worker threads with CAS-based tile
/// acquisition and optional adaptive re-splitting (spec.md §4.2).
pub struct TileScheduler {
    map: RenderTileMap,
    config: SchedulerConfig,
    iteration: AtomicU64,
    should_stop: AtomicBool,
    barrier: Mutex<()>,
    iteration_cv: Condvar,
}

impl TileScheduler {
    pub fn new(
        view_size: UVec2,
        tx: u32,
        ty: u32,
        mode: TileMode,
        samples_max: u64,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            map: RenderTileMap::new(view_size, tx, ty, mode, samples_max, 0x1234_5678),
            config,
            iteration: AtomicU64::new(0),
            should_stop: AtomicBool::new(false),
            barrier: Mutex::new(()),
            iteration_cv: Condvar::new(),
        }
    }

    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
        self.iteration_cv.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.map
            .snapshot()
            .iter()
            .all(|t| t.state() == TileState::Done)
    }

    /// Scans the tile map and returns the first tile this call manages to
    /// CAS `IDLE -> WORKING`. Blocks on the iteration barrier if adaptive
    /// scheduling is enabled and no tile is currently idle; returns `None`
    /// once the render is finished or a stop was requested.
    pub fn next_tile(&self) -> Option<Arc<RenderTile>> {
        let _span = tracing::trace_span!("next_tile").entered();
        loop {
            if let Some(tile) = self.try_acquire_any() {
                tracing::trace!(tile = ?tile.rect, "tile acquired");
                return Some(tile);
            }
            if self.should_stop.load(Ordering::SeqCst) {
                tracing::debug!("next_tile: stop requested, returning None");
                return None;
            }
            if self.is_finished() {
                tracing::debug!("next_tile: render finished, returning None");
                return None;
            }
            if !self.config.adaptive {
                return None;
            }
            if self.try_adaptive_split() {
                continue;
            }
            let guard = self.barrier.lock().unwrap();
            let _ = self
                .iteration_cv
                .wait_timeout(guard, Duration::from_millis(50))
                .unwrap();
        }
    }

    fn try_acquire_any(&self) -> Option<Arc<RenderTile>> {
        self.map.snapshot().into_iter().find(|t| t.try_acquire())
    }

    /// Implements spec.md §4.2 steps 1-4: locate an over-long `DONE` tile
    /// and halve it. Returns whether a split happened (the caller retries
    /// acquisition either way).
    fn try_adaptive_split(&self) -> bool {
        let tiles = self.map.snapshot();
        let (sum_time, count): (u64, u64) = tiles
            .iter()
            .filter(|t| t.samples_done.load(Ordering::Relaxed) > 0)
            .fold((0u64, 0u64), |(s, c), t| {
                (s + t.accumulated_work_time_us.load(Ordering::Relaxed), c + 1)
            });
        let avg = if count > 0 {
            sum_time as f64 / count as f64
        } else {
            0.0
        };

        let candidate = tiles
            .iter()
            .find(|t| t.is_splittable(self.config.min_time_spent_us, avg));

        let Some(candidate) = candidate else {
            return false;
        };
        let (a, b) = candidate.split();
        self.map.replace_with_split(candidate, a, b);
        self.iteration.fetch_add(1, Ordering::SeqCst);
        self.iteration_cv.notify_all();
        true
    }

    pub fn statistics(&self) -> RenderTileStatistics {
        let tiles = self.map.snapshot();
        tiles
            .par_iter()
            .map(|t| RenderTileStatistics {
                pixel_samples_rendered: t.samples_done.load(Ordering::Relaxed),
                pixel_samples_max: t.samples_max.load(Ordering::Relaxed),
                iteration_count: t.iteration_count.load(Ordering::Relaxed),
                accumulated_work_time_us: t.accumulated_work_time_us.load(Ordering::Relaxed),
            })
            .reduce(RenderTileStatistics::default, |mut acc, t| {
                acc.pixel_samples_rendered += t.pixel_samples_rendered;
                acc.pixel_samples_max += t.pixel_samples_max;
                acc.iteration_count += t.iteration_count;
                acc.accumulated_work_time_us += t.accumulated_work_time_us;
                acc
            })
    }

    pub fn tile_count(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec2;

    #[test]
    fn acquires_distinct_tiles_until_exhausted() {
        let s = TileScheduler::new(
            UVec2::new(16, 16),
            2,
            2,
            TileMode::Linear,
            4,
            SchedulerConfig {
                adaptive: false,
                min_time_spent_us: 0,
            },
        );
        let mut acquired = 0;
        for _ in 0..s.tile_count() {
            let t = s.next_tile().expect("tile should be available");
            acquired += 1;
            t.release(4, 10);
        }
        assert_eq!(acquired, 4);
        assert!(s.is_finished());
    }

    #[test]
    fn stop_request_unblocks_waiting_workers() {
        let s = TileScheduler::new(
            UVec2::new(8, 8),
            1,
            1,
            TileMode::Linear,
            1_000_000,
            SchedulerConfig {
                adaptive: true,
                min_time_spent_us: 0,
            },
        );
        let only = s.next_tile().unwrap();
        only.release(1, 10);
        let reacquired = s.next_tile().unwrap();
        s.request_stop();
        assert!(s.is_stopping());
        let _ = reacquired;
    }

    #[test]
    fn statistics_sum_across_tiles() {
        let s = TileScheduler::new(
            UVec2::new(16, 16),
            2,
            2,
            TileMode::Linear,
            4,
            SchedulerConfig::default(),
        );
        for _ in 0..4 {
            if let Some(t) = s.next_tile() {
                t.release(4, 25);
            }
        }
        let stats = s.statistics();
        assert_eq!(stats.pixel_samples_rendered, 16);
        assert!((stats.percentage() - 1.0).abs() < 1e-9);
    }
}
