//! The worker pool driving tiles through the stream pipeline. Grounded on
//! `rhyolite::dho::DeferredOperationTaskPool`: a fixed set of threads drain
//! work (here, tiles from a `TileScheduler` rather than a channel) until a
//! shared `terminate` flag is raised, joined in `Drop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use glam::UVec2;

use wavecore_api::{Camera, Scene};
use wavecore_geom::rng::Rng;
use wavecore_output::{
    EnabledChannels, FeedbackEntry, GlobalOutputDevice, LocalOutputDevice, LocalOutputQueue,
    SpectralEntry,
};
use wavecore_spectral::TristimulusMapper;
use wavecore_stream::{RoundOutput, StreamPipeline};
use wavecore_tile::{RenderTileStatistics, SchedulerConfig, TileMode, TileScheduler};

use crate::context::RenderConfig;

/// The seam where actual path-tracing policy lives: shading-group
/// dispatch, material/emission evaluation and bounce-ray generation are an
/// integrator's job, not the stream pipeline's (spec.md §1's "integrator
/// policy" Non-goal) — this crate only drives the mechanics of getting a
/// round's shading groups to one.
pub trait Integrator: Send + Sync {
    /// Consumes one wavefront round: evaluate shading groups against
    /// `scene`, push spectral/shading-point/feedback contributions into
    /// `queue`, and enqueue any bounce/shadow/light rays back onto
    /// `pipeline` for the next round.
    #[allow(clippy::too_many_arguments)]
    fn integrate(
        &self,
        round: &RoundOutput,
        pipeline: &mut StreamPipeline,
        scene: &dyn Scene,
        queue: &mut LocalOutputQueue,
        local: &mut LocalOutputDevice,
        rng: &mut Rng,
    );
}

type SpectralCallback = Arc<dyn Fn(&SpectralEntry) + Send + Sync>;
type FeedbackCallback = Arc<dyn Fn(&FeedbackEntry) + Send + Sync>;

struct WorkerShared {
    scheduler: Arc<TileScheduler>,
    scene: Arc<dyn Scene>,
    camera: Arc<dyn Camera>,
    integrator: Arc<dyn Integrator>,
    global: Arc<GlobalOutputDevice>,
    filter: Arc<wavecore_output::FilterCache>,
    mapper: Arc<TristimulusMapper>,
    config: RenderConfig,
    enabled: EnabledChannels,
    hard_stop: Arc<AtomicBool>,
    spectral_callbacks: Vec<SpectralCallback>,
    feedback_callbacks: Vec<FeedbackCallback>,
}

fn worker_loop(shared: Arc<WorkerShared>) {
    let mut pipeline = StreamPipeline::new(shared.config.max_parallel_rays);
    loop {
        if shared.hard_stop.load(Ordering::Relaxed) {
            return;
        }
        let Some(tile) = shared.scheduler.next_tile() else {
            return;
        };

        let mut local = LocalOutputDevice::new(
            tile.rect,
            shared.filter.clone(),
            shared.mapper.clone(),
            shared.enabled,
        );
        let mut queue = LocalOutputQueue::new(shared.config.local_queue_threshold);
        for cb in &shared.spectral_callbacks {
            queue.register_spectral_callback(cb.clone());
        }
        for cb in &shared.feedback_callbacks {
            queue.register_feedback_callback(cb.clone());
        }

        let mut rng = Rng::new(tile.seed);
        pipeline.reset(tile.rect, shared.config.samples_per_round, tile.seed);
        let started = Instant::now();

        while !pipeline.is_finished() {
            if shared.hard_stop.load(Ordering::Relaxed) {
                tracing::debug!(tile = ?tile.rect, "hard stop mid-tile, dropping partial frame");
                return;
            }
            let round = pipeline.run_round(shared.camera.as_ref(), shared.scene.as_ref());
            shared.integrator.integrate(
                &round,
                &mut pipeline,
                shared.scene.as_ref(),
                &mut queue,
                &mut local,
                &mut rng,
            );
        }

        queue.commit_and_flush(&mut local);
        let elapsed_us = started.elapsed().as_micros() as u64;
        let samples = tile.rect.area() * shared.config.samples_per_round as u64;
        shared.global.merge(&mut local);
        tile.release(samples, elapsed_us);
    }
}

/// Owns the worker threads for one `start()`..`stop()` render lifetime.
pub struct RenderSession {
    scheduler: Arc<TileScheduler>,
    hard_stop: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl RenderSession {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        view_size: UVec2,
        initial_tiles_x: u32,
        initial_tiles_y: u32,
        samples_max: u64,
        scheduler_config: SchedulerConfig,
        scene: Arc<dyn Scene>,
        camera: Arc<dyn Camera>,
        integrator: Arc<dyn Integrator>,
        output: Arc<GlobalOutputDevice>,
        config: RenderConfig,
        enabled: EnabledChannels,
        thread_hint: usize,
        spectral_callbacks: Vec<SpectralCallback>,
        feedback_callbacks: Vec<FeedbackCallback>,
    ) -> Self {
        let scheduler = Arc::new(TileScheduler::new(
            view_size,
            initial_tiles_x,
            initial_tiles_y,
            TileMode::ZOrder,
            samples_max,
            scheduler_config,
        ));
        let filter = Arc::new(wavecore_output::FilterCache::new(
            config.filter_kind,
            config.filter_radius,
        ));
        let mapper = Arc::new(TristimulusMapper::new(config.primaries));
        let hard_stop = Arc::new(AtomicBool::new(false));

        let shared = Arc::new(WorkerShared {
            scheduler: scheduler.clone(),
            scene,
            camera,
            integrator,
            global: output,
            filter,
            mapper,
            config,
            enabled,
            hard_stop: hard_stop.clone(),
            spectral_callbacks,
            feedback_callbacks,
        });

        let count = if thread_hint == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            thread_hint
        };

        let threads = (0..count)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || worker_loop(shared))
            })
            .collect();

        Self {
            scheduler,
            hard_stop,
            threads: Mutex::new(threads),
        }
    }

    pub fn request_stop(&self, hard: bool) {
        if hard {
            self.hard_stop.store(true, Ordering::Relaxed);
        }
        self.scheduler.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn statistics(&self) -> RenderTileStatistics {
        self.scheduler.statistics()
    }

    pub fn join(self) {
        let mut threads = self.threads.lock().expect("worker thread list mutex poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.hard_stop.store(true, Ordering::Relaxed);
        self.scheduler.request_stop();
        if let Ok(mut threads) = self.threads.lock() {
            for handle in threads.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
