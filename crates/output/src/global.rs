use std::sync::Mutex;

use glam::IVec2;
use wavecore_spectral::Rgb;

use crate::frame::{ChannelBuffer, EnabledChannels, Frame};
use crate::local::LocalOutputDevice;

/// Parallel (batch) Welford merge of two running mean/variance
/// accumulators, used both standalone (tests) and by
/// [`GlobalOutputDevice::merge`] (spec.md §8 invariant 6: merging two
/// sample batches must agree with consuming them as one batch).
pub fn welford_merge(
    count_a: u64,
    mean_a: f32,
    m2_a: f32,
    count_b: u64,
    mean_b: f32,
    m2_b: f32,
) -> (u64, f32, f32) {
    if count_b == 0 {
        return (count_a, mean_a, m2_a);
    }
    if count_a == 0 {
        return (count_b, mean_b, m2_b);
    }
    let count = count_a + count_b;
    let delta = mean_b - mean_a;
    let mean = mean_a + delta * (count_b as f32 / count as f32);
    let m2 = m2_a + m2_b + delta * delta * (count_a as f32 * count_b as f32 / count as f32);
    (count, mean, m2)
}

/// A single running mean/variance accumulator (one scalar channel of an
/// `online_mean`/`online_variance` pair).
#[derive(Debug, Clone, Copy, Default)]
pub struct VarianceEstimator {
    pub count: u64,
    pub mean: f32,
    pub m2: f32,
}

impl VarianceEstimator {
    pub fn push(&mut self, sample: f32) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f32;
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn merge(&mut self, other: VarianceEstimator) {
        let (count, mean, m2) =
            welford_merge(self.count, self.mean, self.m2, other.count, other.mean, other.m2);
        self.count = count;
        self.mean = mean;
        self.m2 = m2;
    }

    /// Sample variance (Bessel-corrected); zero for fewer than two samples.
    pub fn variance(&self) -> f32 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f32
        } else {
            0.0
        }
    }
}

/// The single shared framebuffer every worker thread merges its
/// [`LocalOutputDevice`] into at the end of a tile round (spec.md §4.3.3).
/// Exactly one mutex guards the whole frame: contention is bounded by the
/// number of in-flight tiles, not per-pixel traffic.
pub struct GlobalOutputDevice {
    frame: Mutex<Frame>,
}

impl GlobalOutputDevice {
    pub fn new(width: u32, height: u32, enabled: EnabledChannels) -> Self {
        Self {
            frame: Mutex::new(Frame::new(width, height, enabled)),
        }
    }

    pub fn with_frame<R>(&self, f: impl FnOnce(&Frame) -> R) -> R {
        let guard = self.frame.lock().expect("global frame mutex poisoned");
        f(&guard)
    }

    pub fn register_custom(&self, id: u32, kind: crate::frame::ChannelKind) {
        self.frame
            .lock()
            .expect("global frame mutex poisoned")
            .register_custom(id, kind);
    }

    pub fn register_lpe(&self, id: u32, kind: crate::frame::ChannelKind, expr: crate::lpe::LpeExpr) {
        self.frame
            .lock()
            .expect("global frame mutex poisoned")
            .register_lpe(id, kind, expr);
    }

    /// Folds `local`'s extended grid into the global frame at its tile
    /// origin, then zeroes `local` for reuse (spec.md §4.3.3 steps 1-4).
    pub fn merge(&self, local: &mut LocalOutputDevice) {
        let _span = tracing::trace_span!("merge_local", tile = ?local.tile()).entered();
        let tile = local.tile();
        let radius = local.radius();
        let mut global = self.frame.lock().expect("global frame mutex poisoned");

        let size = tile.view_size();
        for ly in 0..size.y {
            for lx in 0..size.x {
                let global_pos = tile.start + IVec2::new(lx as i32, ly as i32);
                let Some(gidx) = global.index(global_pos.x, global_pos.y) else {
                    continue;
                };
                let local_pos = IVec2::new(lx as i32 + radius, ly as i32 + radius);
                let Some(lidx) = local.frame.index(local_pos.x, local_pos.y) else {
                    continue;
                };

                // spec.md §4.3.3: Output (and LPE spectral channels) merge
                // as a running mean over iterations, not a running sum —
                // merging a pass of 2 then a pass of 4 must read back 3.
                let iter = global.merge_count[gidx] + 1;
                let iter_f = iter as f32;
                global.output[gidx] = global.output[gidx] * ((iter_f - 1.0) / iter_f)
                    + local.frame.output[lidx] * (1.0 / iter_f);
                merge_estimator(&mut global, gidx, &local.frame, lidx);

                global.position[gidx] += local.frame.position[lidx];
                global.normal[gidx] += local.frame.normal[lidx];
                global.normal_g[gidx] += local.frame.normal_g[lidx];
                global.tangent[gidx] += local.frame.tangent[lidx];
                global.bitangent[gidx] += local.frame.bitangent[lidx];
                global.view[gidx] += local.frame.view[lidx];
                global.uvw[gidx] += local.frame.uvw[lidx];
                global.depth[gidx] += local.frame.depth[lidx];
                global.pixel_weight[gidx] += local.frame.pixel_weight[lidx];
                if local.frame.pixel_contribution_count[lidx] > 0 {
                    global.entity_id[gidx] = local.frame.entity_id[lidx];
                    global.material_id[gidx] = local.frame.material_id[lidx];
                    global.emission_id[gidx] = local.frame.emission_id[lidx];
                    global.displace_id[gidx] = local.frame.displace_id[lidx];
                }

                global.sample_count[gidx] += local.frame.sample_count[lidx];
                global.pixel_contribution_count[gidx] += local.frame.pixel_contribution_count[lidx];
                global.feedback[gidx] |= local.frame.feedback[lidx];

                merge_channel_map(&mut global.custom, &local.frame.custom, gidx, lidx);
                for (id, lchan) in &local.frame.lpe {
                    if let Some(gchan) = global.lpe.get_mut(id) {
                        merge_lpe_buffer(&mut gchan.buffer, &lchan.buffer, gidx, lidx, iter);
                    }
                }

                global.merge_count[gidx] = iter;
            }
        }
        drop(global);
        local.reset(tile);
    }

    /// Normalizes accumulated AOVs by sample count for export (spec.md
    /// §4.3.3: "1D/3D AOVs [are] normalized by SampleCount on export").
    /// `Output` and the LPE spectral channels are already a running mean
    /// over merged iterations (see `merge`), so they need no further
    /// division here.
    pub fn export_normalized(&self) -> Frame {
        let mut out = self.frame.lock().expect("global frame mutex poisoned").clone();
        for idx in 0..out.position.len() {
            let n = out.sample_count[idx].max(1) as f32;
            out.position[idx] /= n;
            out.normal[idx] /= n;
            out.normal_g[idx] /= n;
            out.tangent[idx] /= n;
            out.bitangent[idx] /= n;
            out.view[idx] /= n;
            out.uvw[idx] /= n;
            out.depth[idx] /= n;
            out.pixel_weight[idx] /= n;
        }
        out
    }
}

fn merge_estimator(global: &mut Frame, gidx: usize, local: &Frame, lidx: usize) {
    let merge_channel = |g_mean: f32, g_m2: f32, g_n: u64, l_mean: f32, l_m2: f32, l_n: u64| {
        welford_merge(g_n, g_mean, g_m2, l_n, l_mean, l_m2)
    };
    let g_n = global.estimator_count[gidx] as u64;
    let l_n = local.estimator_count[lidx] as u64;

    let (rn, rmean, rm2) = merge_channel(
        global.online_mean[gidx].r,
        global.online_variance[gidx].r,
        g_n,
        local.online_mean[lidx].r,
        local.online_variance[lidx].r,
        l_n,
    );
    let (_, gmean, gm2) = merge_channel(
        global.online_mean[gidx].g,
        global.online_variance[gidx].g,
        g_n,
        local.online_mean[lidx].g,
        local.online_variance[lidx].g,
        l_n,
    );
    let (_, bmean, bm2) = merge_channel(
        global.online_mean[gidx].b,
        global.online_variance[gidx].b,
        g_n,
        local.online_mean[lidx].b,
        local.online_variance[lidx].b,
        l_n,
    );

    global.online_mean[gidx] = Rgb {
        r: rmean,
        g: gmean,
        b: bmean,
    };
    global.online_variance[gidx] = Rgb {
        r: rm2,
        g: gm2,
        b: bm2,
    };
    global.estimator_count[gidx] = rn as u32;
}

fn merge_channel_map(
    global: &mut std::collections::HashMap<u32, ChannelBuffer>,
    local: &std::collections::HashMap<u32, ChannelBuffer>,
    gidx: usize,
    lidx: usize,
) {
    for (id, lbuf) in local {
        if let Some(gbuf) = global.get_mut(id) {
            merge_buffer(gbuf, lbuf, gidx, lidx);
        }
    }
}

fn merge_buffer(global: &mut ChannelBuffer, local: &ChannelBuffer, gidx: usize, lidx: usize) {
    match (global, local) {
        (ChannelBuffer::Spectral(g), ChannelBuffer::Spectral(l)) => g[gidx] = g[gidx] + l[lidx],
        (ChannelBuffer::ThreeD(g), ChannelBuffer::ThreeD(l)) => g[gidx] += l[lidx],
        (ChannelBuffer::OneD(g), ChannelBuffer::OneD(l)) => g[gidx] += l[lidx],
        (ChannelBuffer::Counter(g), ChannelBuffer::Counter(l)) => g[gidx] |= l[lidx],
        _ => tracing::debug!("channel buffer kind mismatch during merge, dropped"),
    }
}

/// Like [`merge_buffer`], but an LPE channel carrying spectral radiance
/// merges as the same running mean as `Output` rather than a sum —
/// otherwise an LPE-gated AOV would disagree with `Output` on scale.
fn merge_lpe_buffer(
    global: &mut ChannelBuffer,
    local: &ChannelBuffer,
    gidx: usize,
    lidx: usize,
    iter: u32,
) {
    if let (ChannelBuffer::Spectral(g), ChannelBuffer::Spectral(l)) = (&mut *global, local) {
        let iter_f = iter as f32;
        g[gidx] = g[gidx] * ((iter_f - 1.0) / iter_f) + l[lidx] * (1.0 / iter_f);
        return;
    }
    merge_buffer(global, local, gidx, lidx);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_single_batch_matches_two_merged_batches() {
        let samples = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];

        let mut whole = VarianceEstimator::default();
        for &s in &samples {
            whole.push(s);
        }

        let mut a = VarianceEstimator::default();
        let mut b = VarianceEstimator::default();
        for &s in &samples[..3] {
            a.push(s);
        }
        for &s in &samples[3..] {
            b.push(s);
        }
        a.merge(b);

        assert!((whole.mean - a.mean).abs() < 1e-5);
        assert!((whole.variance() - a.variance()).abs() < 1e-3);
    }

    #[test]
    fn merge_into_empty_estimator_is_identity() {
        let mut a = VarianceEstimator::default();
        let mut b = VarianceEstimator::default();
        b.push(3.0);
        b.push(5.0);
        a.merge(b);
        assert_eq!(a.count, 2);
        assert!((a.mean - 4.0).abs() < 1e-6);
    }
}
