//! `RenderContext`: the glue object a host owns. Registration calls
//! (`enable_*_channel`, `register_*`) configure the render before `start`;
//! afterwards they are no-ops, since the global frame's channel layout is
//! fixed once worker threads are spawned.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use glam::UVec2;

use wavecore_api::{Camera, Scene};
use wavecore_output::{
    ChannelKind, EnabledChannels, FeedbackEntry, GlobalOutputDevice, LpeExpr, LpeParseError,
    SpectralEntry,
};
use wavecore_spectral::RgbPrimaries;
use wavecore_tile::SchedulerConfig;

use crate::error::RenderError;
use crate::session::{Integrator, RenderSession};

/// Parametrizes a render beyond the `(tx, ty, thread_hint)` `start()`
/// arguments (absent as a named type from the distilled spec, required in
/// practice — grounded on `original_source/RenderSettings.h`).
#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    pub max_iterations: u64,
    pub samples_per_round: u32,
    pub max_parallel_rays: usize,
    pub adaptive: bool,
    pub min_time_spent_us: u64,
    pub filter_kind: wavecore_output::FilterKind,
    pub filter_radius: i32,
    pub primaries: RgbPrimaries,
    pub variance_estimation: bool,
    pub local_queue_threshold: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_iterations: u64::MAX,
            samples_per_round: 8,
            max_parallel_rays: 1 << 16,
            adaptive: true,
            min_time_spent_us: 50_000,
            filter_kind: wavecore_output::FilterKind::Triangle,
            filter_radius: 1,
            primaries: RgbPrimaries::Srgb,
            variance_estimation: true,
            local_queue_threshold: 4096,
        }
    }
}

/// An open, `original_source/RenderStatus.h`-derived status field. Reduced
/// from the original's scripting-oriented `Variant` to this closed enum
/// since wavecore has no scripting layer needing an open variant type.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusField {
    F64(f64),
    U64(u64),
    Bool(bool),
    Str(String),
}

/// Snapshot returned by `RenderContext::status()`.
#[derive(Debug, Clone, Default)]
pub struct RenderStatus {
    pub percentage: f64,
    pub fields: HashMap<String, StatusField>,
}

type SpectralCallback = Arc<dyn Fn(&SpectralEntry) + Send + Sync>;
type FeedbackCallback = Arc<dyn Fn(&FeedbackEntry) + Send + Sync>;

/// Everything a host needs to drive a render: the two external
/// collaborators (`Scene`, `Camera`), the registration API (callable only
/// before `start`), and once started, the worker pool + shared output.
pub struct RenderContext {
    scene: Arc<dyn Scene>,
    camera: Arc<dyn Camera>,
    integrator: Arc<dyn Integrator>,
    view_size: UVec2,
    config: RenderConfig,

    enabled: EnabledChannels,
    custom_channels: Vec<(u32, ChannelKind)>,
    lpe_channels: Vec<(u32, ChannelKind, LpeExpr)>,
    next_channel_id: u32,
    spectral_callbacks: Vec<SpectralCallback>,
    feedback_callbacks: Vec<FeedbackCallback>,

    output: Arc<GlobalOutputDevice>,
    session: Mutex<Option<RenderSession>>,
}

impl RenderContext {
    pub fn new(
        scene: Arc<dyn Scene>,
        camera: Arc<dyn Camera>,
        integrator: Arc<dyn Integrator>,
        view_size: UVec2,
        config: RenderConfig,
    ) -> Self {
        let output = Arc::new(GlobalOutputDevice::new(
            view_size.x,
            view_size.y,
            EnabledChannels::empty(),
        ));
        Self {
            scene,
            camera,
            integrator,
            view_size,
            config,
            enabled: EnabledChannels::empty(),
            custom_channels: Vec::new(),
            lpe_channels: Vec::new(),
            next_channel_id: 0,
            spectral_callbacks: Vec::new(),
            feedback_callbacks: Vec::new(),
            output,
            session: Mutex::new(None),
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        id
    }

    /// `enable_{1d,counter,3d,spectral}_channel(tag)` from spec.md §6,
    /// collapsed to one method dispatching on the named-channel tag. An
    /// unrecognized tag is logged and ignored rather than treated as fatal
    /// — registration mistakes should not abort a render.
    pub fn enable_channel(&mut self, tag: &str) {
        let bit = match tag {
            "online_mean" => EnabledChannels::ONLINE_MEAN,
            "online_variance" => EnabledChannels::ONLINE_VARIANCE,
            "position" => EnabledChannels::POSITION,
            "normal" => EnabledChannels::NORMAL,
            "normal_g" => EnabledChannels::NORMAL_G,
            "tangent" => EnabledChannels::TANGENT,
            "bitangent" => EnabledChannels::BITANGENT,
            "view" => EnabledChannels::VIEW,
            "uvw" => EnabledChannels::UVW,
            "entity_id" => EnabledChannels::ENTITY_ID,
            "material_id" => EnabledChannels::MATERIAL_ID,
            "emission_id" => EnabledChannels::EMISSION_ID,
            "displace_id" => EnabledChannels::DISPLACE_ID,
            "depth" => EnabledChannels::DEPTH,
            "pixel_weight" => EnabledChannels::PIXEL_WEIGHT,
            "sample_count" => EnabledChannels::SAMPLE_COUNT,
            "pixel_contribution_count" => EnabledChannels::PIXEL_CONTRIBUTION_COUNT,
            "feedback" => EnabledChannels::FEEDBACK,
            other => {
                tracing::warn!(tag = other, "unknown channel tag, ignored");
                return;
            }
        };
        self.enabled |= bit;
    }

    pub fn register_custom_channel(&mut self, kind: ChannelKind) -> u32 {
        let id = self.alloc_id();
        self.custom_channels.push((id, kind));
        id
    }

    pub fn register_lpe_channel(&mut self, kind: ChannelKind, expr: &str) -> Result<u32, LpeParseError> {
        let compiled = LpeExpr::compile(expr)?;
        let id = self.alloc_id();
        self.lpe_channels.push((id, kind, compiled));
        Ok(id)
    }

    pub fn register_spectral_callback(&mut self, cb: SpectralCallback) {
        self.spectral_callbacks.push(cb);
    }

    pub fn register_feedback_callback(&mut self, cb: FeedbackCallback) {
        self.feedback_callbacks.push(cb);
    }

    /// Spawns the fixed-size worker pool and begins streaming tiles
    /// (spec.md §6/§9; worker loop grounded on
    /// `rhyolite::dho::DeferredOperationTaskPool::new`).
    pub fn start(
        &mut self,
        initial_tiles_x: u32,
        initial_tiles_y: u32,
        thread_hint: usize,
    ) -> Result<(), RenderError> {
        let mut guard = self.session.lock().expect("render session mutex poisoned");
        if guard.is_some() {
            return Ok(());
        }

        for (id, kind) in &self.custom_channels {
            self.output.register_custom(*id, *kind);
        }
        for (id, kind, expr) in &self.lpe_channels {
            self.output.register_lpe(*id, *kind, expr.clone());
        }

        let scheduler_config = SchedulerConfig {
            adaptive: self.config.adaptive,
            min_time_spent_us: self.config.min_time_spent_us,
        };
        let samples_max = self.config.max_iterations.saturating_mul(self.config.samples_per_round as u64);

        let session = RenderSession::spawn(
            self.view_size,
            initial_tiles_x,
            initial_tiles_y,
            samples_max,
            scheduler_config,
            self.scene.clone(),
            self.camera.clone(),
            self.integrator.clone(),
            self.output.clone(),
            self.config,
            self.enabled,
            thread_hint,
            self.spectral_callbacks.clone(),
            self.feedback_callbacks.clone(),
        );
        *guard = Some(session);
        Ok(())
    }

    /// `hard = true` aborts in-flight tiles without merging their partial
    /// local frame; `hard = false` lets the current round on every worker
    /// drain and commit before the threads exit (spec.md §5 "Cancellation
    /// and timeouts").
    pub fn stop(&self, hard: bool) {
        let guard = self.session.lock().expect("render session mutex poisoned");
        if let Some(session) = guard.as_ref() {
            session.request_stop(hard);
        }
    }

    pub fn is_finished(&self) -> bool {
        let guard = self.session.lock().expect("render session mutex poisoned");
        match guard.as_ref() {
            Some(session) => session.is_finished(),
            None => false,
        }
    }

    pub fn status(&self) -> RenderStatus {
        let guard = self.session.lock().expect("render session mutex poisoned");
        let Some(session) = guard.as_ref() else {
            return RenderStatus::default();
        };
        let stats = session.statistics();
        let mut fields = HashMap::new();
        fields.insert(
            "iteration_count".to_string(),
            StatusField::U64(stats.iteration_count),
        );
        fields.insert(
            "pixel_samples_rendered".to_string(),
            StatusField::U64(stats.pixel_samples_rendered),
        );
        fields.insert(
            "accumulated_work_time_us".to_string(),
            StatusField::U64(stats.accumulated_work_time_us),
        );
        RenderStatus {
            percentage: stats.percentage(),
            fields,
        }
    }

    pub fn output(&self) -> &GlobalOutputDevice {
        &self.output
    }

    /// Blocks until every worker thread has exited. Call after
    /// `stop`/completion before reading final AOV buffers if you need the
    /// threads to have joined rather than merely finished their tiles.
    pub fn join(&self) {
        let mut guard = self.session.lock().expect("render session mutex poisoned");
        if let Some(session) = guard.take() {
            session.join();
        }
    }
}

fn _assert_send_sync<T: Send + Sync>() {}
const _: fn() = || {
    _assert_send_sync::<RenderContext>;
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let cfg = RenderConfig::default();
        assert!(cfg.samples_per_round > 0);
        assert!(cfg.max_parallel_rays > 0);
    }
}
