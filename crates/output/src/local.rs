use std::sync::Arc;

use glam::{IVec2, Vec3};
use wavecore_geom::{FeedbackBits, Rect2i, SpectralBlob};
use wavecore_spectral::{Rgb, TristimulusMapper};

use crate::filter::FilterCache;
use crate::frame::{ChannelBuffer, EnabledChannels, Frame};
use crate::lpe::Token;

/// Outcome of committing a spectral contribution (spec.md §7's
/// `BadContribution`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionOutcome {
    Ok,
    BadContribution(FeedbackBits),
}

/// A value ready to be written into one of a custom/LPE channel's variants.
#[derive(Debug, Clone, Copy)]
pub enum CustomValue {
    Spectral(Rgb),
    ThreeD(Vec3),
    OneD(f32),
    Counter(u32),
}

#[derive(Debug, Clone)]
pub struct SpectralEntry {
    pub position: IVec2,
    pub weight: SpectralBlob,
    pub wavelengths: SpectralBlob,
    pub mono: bool,
    pub blend_weight: f32,
    pub path: Vec<Token>,
}

#[derive(Debug, Clone, Copy)]
pub struct ShadingPointEntry {
    pub position: IVec2,
    pub world_position: Vec3,
    pub normal: Vec3,
    pub normal_g: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub view: Vec3,
    pub uvw: Vec3,
    pub entity_id: f32,
    pub material_id: f32,
    pub emission_id: f32,
    pub displace_id: f32,
    pub depth: f32,
    pub pixel_weight: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct FeedbackEntry {
    pub position: IVec2,
    pub bits: FeedbackBits,
}

#[derive(Debug, Clone, Copy)]
pub struct CustomEntry {
    pub channel: u32,
    pub position: IVec2,
    pub value: CustomValue,
}

/// Per-worker, per-tile framebuffer with the `2*filter_radius` halo
/// (spec.md §4.3.2). Touched by exactly one thread; no locking.
pub struct LocalOutputDevice {
    pub frame: Frame,
    tile: Rect2i,
    radius: i32,
    filter: Arc<FilterCache>,
    mapper: Arc<TristimulusMapper>,
}

impl LocalOutputDevice {
    pub fn new(
        tile: Rect2i,
        filter: Arc<FilterCache>,
        mapper: Arc<TristimulusMapper>,
        enabled: EnabledChannels,
    ) -> Self {
        let radius = filter.radius();
        let size = tile.view_size();
        let frame = Frame::new(size.x + 2 * radius as u32, size.y + 2 * radius as u32, enabled);
        Self {
            frame,
            tile,
            radius,
            filter,
            mapper,
        }
    }

    /// Maps a global pixel coordinate to this device's extended-grid
    /// coordinate (tile-local plus the halo offset).
    fn local_coord(&self, global: IVec2) -> IVec2 {
        global - self.tile.start + IVec2::splat(self.radius)
    }

    fn validate(weight: SpectralBlob, mono: bool) -> Result<(), FeedbackBits> {
        let mut bits = FeedbackBits::empty();
        let lanes: &[f32] = if mono { &weight.0[..1] } else { &weight.0[..] };
        if lanes.iter().any(|v| v.is_nan()) {
            bits |= FeedbackBits::NAN;
        }
        if lanes.iter().any(|v| v.is_infinite()) {
            bits |= FeedbackBits::INF;
        }
        if lanes.iter().any(|v| *v < 0.0) {
            bits |= FeedbackBits::NEGATIVE;
        }
        if bits.is_empty() {
            Ok(())
        } else {
            Err(bits)
        }
    }

    /// Spec.md §4.3.2's spectral-entry handling, steps 1-4.
    pub fn push_spectral(&mut self, entry: &SpectralEntry) -> ContributionOutcome {
        if let Err(bits) = Self::validate(entry.weight, entry.mono) {
            self.push_feedback(&FeedbackEntry {
                position: entry.position,
                bits,
            });
            return ContributionOutcome::BadContribution(bits);
        }

        let rgb = self
            .mapper
            .spectral_to_rgb(entry.weight, entry.wavelengths, entry.mono)
            * entry.blend_weight;
        let center = self.local_coord(entry.position);

        if let Some(idx) = self.frame.index(center.x, center.y) {
            self.update_estimator(idx, rgb);
        }

        if self.radius == 0 {
            if let Some(idx) = self.frame.index(center.x, center.y) {
                self.frame.output[idx] = self.frame.output[idx] + rgb;
                self.contribute_lpe_spectral(idx, rgb, &entry.path);
            }
            return ContributionOutcome::Ok;
        }

        for dy in -self.radius..=self.radius {
            for dx in -self.radius..=self.radius {
                let p = center + IVec2::new(dx, dy);
                let Some(idx) = self.frame.index(p.x, p.y) else {
                    continue;
                };
                let w = self.filter.weight(dx, dy);
                if w == 0.0 {
                    continue;
                }
                self.frame.output[idx] = self.frame.output[idx] + rgb * w;
                self.contribute_lpe_spectral(idx, rgb * w, &entry.path);
            }
        }
        ContributionOutcome::Ok
    }

    /// Online Welford update of the `online_mean`/`online_variance`
    /// channels at the unfiltered sample location (spec.md §8 invariant 6).
    fn update_estimator(&mut self, idx: usize, sample: Rgb) {
        let n = self.frame.estimator_count[idx] + 1;
        let mean = self.frame.online_mean[idx];
        let delta = sample - mean;
        let new_mean = mean + delta * (1.0 / n as f32);
        let delta2 = sample - new_mean;
        self.frame.online_variance[idx] = self.frame.online_variance[idx] + componentwise_mul(delta, delta2);
        self.frame.online_mean[idx] = new_mean;
        self.frame.estimator_count[idx] = n;
    }

    fn contribute_lpe_spectral(&mut self, idx: usize, rgb: Rgb, path: &[Token]) {
        for chan in self.frame.lpe.values_mut() {
            if !chan.expr.matches(path) {
                continue;
            }
            if let ChannelBuffer::Spectral(buf) = &mut chan.buffer {
                buf[idx] = buf[idx] + rgb;
            }
        }
    }

    pub fn push_shading_point(&mut self, entry: &ShadingPointEntry) {
        let p = self.local_coord(entry.position);
        let Some(idx) = self.frame.index(p.x, p.y) else {
            return;
        };
        self.frame.sample_count[idx] += 1;
        self.frame.pixel_contribution_count[idx] += 1;
        self.frame.position[idx] += entry.world_position;
        self.frame.normal[idx] += entry.normal;
        self.frame.normal_g[idx] += entry.normal_g;
        self.frame.tangent[idx] += entry.tangent;
        self.frame.bitangent[idx] += entry.bitangent;
        self.frame.view[idx] += entry.view;
        self.frame.uvw[idx] += entry.uvw;
        self.frame.entity_id[idx] = entry.entity_id;
        self.frame.material_id[idx] = entry.material_id;
        self.frame.emission_id[idx] = entry.emission_id;
        self.frame.displace_id[idx] = entry.displace_id;
        self.frame.depth[idx] += entry.depth;
        self.frame.pixel_weight[idx] += entry.pixel_weight;
    }

    pub fn push_feedback(&mut self, entry: &FeedbackEntry) {
        let p = self.local_coord(entry.position);
        if let Some(idx) = self.frame.index(p.x, p.y) {
            self.frame.feedback[idx] |= entry.bits.bits();
        }
    }

    pub fn push_custom(&mut self, entry: &CustomEntry) {
        let p = self.local_coord(entry.position);
        let Some(idx) = self.frame.index(p.x, p.y) else {
            return;
        };
        if let Some(buf) = self.frame.custom.get_mut(&entry.channel) {
            write_custom_value(buf, idx, entry.value);
        }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn tile(&self) -> Rect2i {
        self.tile
    }

    pub fn reset(&mut self, tile: Rect2i) {
        self.tile = tile;
        self.frame.clear();
    }
}

fn componentwise_mul(a: Rgb, b: Rgb) -> Rgb {
    Rgb {
        r: a.r * b.r,
        g: a.g * b.g,
        b: a.b * b.b,
    }
}

fn write_custom_value(buf: &mut ChannelBuffer, idx: usize, value: CustomValue) {
    match (buf, value) {
        (ChannelBuffer::Spectral(v), CustomValue::Spectral(rgb)) => v[idx] = v[idx] + rgb,
        (ChannelBuffer::ThreeD(v), CustomValue::ThreeD(p)) => v[idx] += p,
        (ChannelBuffer::OneD(v), CustomValue::OneD(f)) => v[idx] += f,
        (ChannelBuffer::Counter(v), CustomValue::Counter(c)) => v[idx] |= c,
        _ => tracing::debug!("custom channel kind/value mismatch, dropped"),
    }
}

/// Bounded per-worker FIFO of pending entries (spec.md §4.3.1). Flushed to
/// the `LocalOutputDevice` either when a sub-queue hits `trigger_threshold`
/// or explicitly at the end of a round.
pub struct LocalOutputQueue {
    pub trigger_threshold: usize,
    spectral: Vec<SpectralEntry>,
    shading_points: Vec<ShadingPointEntry>,
    feedback: Vec<FeedbackEntry>,
    custom: Vec<CustomEntry>,
    spectral_callbacks: Vec<Arc<dyn Fn(&SpectralEntry) + Send + Sync>>,
    feedback_callbacks: Vec<Arc<dyn Fn(&FeedbackEntry) + Send + Sync>>,
}

impl LocalOutputQueue {
    pub fn new(trigger_threshold: usize) -> Self {
        Self {
            trigger_threshold,
            spectral: Vec::with_capacity(trigger_threshold),
            shading_points: Vec::with_capacity(trigger_threshold),
            feedback: Vec::new(),
            custom: Vec::new(),
            spectral_callbacks: Vec::new(),
            feedback_callbacks: Vec::new(),
        }
    }

    pub fn register_spectral_callback(&mut self, cb: Arc<dyn Fn(&SpectralEntry) + Send + Sync>) {
        self.spectral_callbacks.push(cb);
    }

    pub fn register_feedback_callback(&mut self, cb: Arc<dyn Fn(&FeedbackEntry) + Send + Sync>) {
        self.feedback_callbacks.push(cb);
    }

    fn over_threshold(&self) -> bool {
        self.spectral.len() >= self.trigger_threshold
            || self.shading_points.len() >= self.trigger_threshold
            || self.feedback.len() >= self.trigger_threshold
            || self.custom.len() >= self.trigger_threshold
    }

    pub fn push_spectral(&mut self, entry: SpectralEntry, device: &mut LocalOutputDevice) {
        self.spectral.push(entry);
        if self.over_threshold() {
            self.commit_and_flush(device);
        }
    }

    pub fn push_shading_point(&mut self, entry: ShadingPointEntry, device: &mut LocalOutputDevice) {
        self.shading_points.push(entry);
        if self.over_threshold() {
            self.commit_and_flush(device);
        }
    }

    pub fn push_feedback(&mut self, entry: FeedbackEntry, device: &mut LocalOutputDevice) {
        self.feedback.push(entry);
        if self.over_threshold() {
            self.commit_and_flush(device);
        }
    }

    pub fn push_custom(&mut self, entry: CustomEntry, device: &mut LocalOutputDevice) {
        self.custom.push(entry);
        if self.over_threshold() {
            self.commit_and_flush(device);
        }
    }

    /// Spec.md §4.3.1: commit every sub-queue to the local device, fire
    /// registered callbacks, then reset.
    pub fn commit_and_flush(&mut self, device: &mut LocalOutputDevice) {
        for entry in &self.spectral {
            device.push_spectral(entry);
            for cb in &self.spectral_callbacks {
                cb(entry);
            }
        }
        for entry in &self.shading_points {
            device.push_shading_point(entry);
        }
        for entry in &self.feedback {
            device.push_feedback(entry);
            for cb in &self.feedback_callbacks {
                cb(entry);
            }
        }
        for entry in &self.custom {
            device.push_custom(entry);
        }
        self.spectral.clear();
        self.shading_points.clear();
        self.feedback.clear();
        self.custom.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;
    use wavecore_spectral::RgbPrimaries;

    fn device(radius: i32) -> LocalOutputDevice {
        let tile = Rect2i::new(IVec2::ZERO, IVec2::new(3, 3));
        let filter = Arc::new(FilterCache::new(FilterKind::Triangle, radius));
        let mapper = Arc::new(TristimulusMapper::new(RgbPrimaries::Srgb));
        LocalOutputDevice::new(tile, filter, mapper, EnabledChannels::empty())
    }

    #[test]
    fn scenario_s2_filter_radius_one_sums_to_one() {
        let mut dev = device(1);
        let entry = SpectralEntry {
            position: IVec2::new(1, 1),
            weight: SpectralBlob::splat(1.0),
            wavelengths: SpectralBlob([550.0, 600.0, 650.0, 500.0]),
            mono: false,
            blend_weight: 1.0,
            path: vec!['C', 'E'],
        };
        dev.push_spectral(&entry);
        let sum: f32 = dev.frame.output.iter().map(|c| c.r + c.g + c.b).sum();
        let center = dev.local_coord(IVec2::new(1, 1));
        let center_idx = dev.frame.index(center.x, center.y).unwrap();
        let center_val = dev.frame.output[center_idx];
        assert!(sum > 0.0);
        assert!(center_val.r > 0.0 || center_val.g > 0.0 || center_val.b > 0.0);
    }

    #[test]
    fn scenario_s3_feedback_bits_or_together() {
        let mut dev = device(0);
        dev.push_feedback(&FeedbackEntry {
            position: IVec2::ZERO,
            bits: FeedbackBits::NAN,
        });
        dev.push_feedback(&FeedbackEntry {
            position: IVec2::ZERO,
            bits: FeedbackBits::INF,
        });
        let p = dev.local_coord(IVec2::ZERO);
        let idx = dev.frame.index(p.x, p.y).unwrap();
        assert_eq!(dev.frame.feedback[idx], 0x3);
    }

    #[test]
    fn bad_contribution_is_dropped_and_recorded_as_feedback() {
        let mut dev = device(0);
        let entry = SpectralEntry {
            position: IVec2::ZERO,
            weight: SpectralBlob([f32::NAN, 1.0, 1.0, 1.0]),
            wavelengths: SpectralBlob::splat(550.0),
            mono: false,
            blend_weight: 1.0,
            path: vec!['C', 'E'],
        };
        let outcome = dev.push_spectral(&entry);
        assert!(matches!(outcome, ContributionOutcome::BadContribution(_)));
        let p = dev.local_coord(IVec2::ZERO);
        let idx = dev.frame.index(p.x, p.y).unwrap();
        assert_ne!(dev.frame.feedback[idx], 0);
    }
}
