use std::collections::HashMap;

use glam::Vec3;
use wavecore_geom::FeedbackBits;
use wavecore_spectral::Rgb;

use crate::lpe::LpeExpr;

bitflags::bitflags! {
    /// Which named AOV channels were registered before `start()` (spec.md
    /// §6's `enable_{1d,counter,3d,spectral}_channel`). `Output` is
    /// implicit and always on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnabledChannels: u32 {
        const ONLINE_MEAN                = 1 << 0;
        const ONLINE_VARIANCE            = 1 << 1;
        const POSITION                   = 1 << 2;
        const NORMAL                     = 1 << 3;
        const NORMAL_G                   = 1 << 4;
        const TANGENT                    = 1 << 5;
        const BITANGENT                  = 1 << 6;
        const VIEW                       = 1 << 7;
        const UVW                        = 1 << 8;
        const ENTITY_ID                  = 1 << 9;
        const MATERIAL_ID                = 1 << 10;
        const EMISSION_ID                = 1 << 11;
        const DISPLACE_ID                = 1 << 12;
        const DEPTH                      = 1 << 13;
        const PIXEL_WEIGHT                = 1 << 14;
        const SAMPLE_COUNT               = 1 << 15;
        const PIXEL_CONTRIBUTION_COUNT   = 1 << 16;
        const FEEDBACK                   = 1 << 17;
    }
}

/// Kind tag for custom and LPE-gated channels (spec.md §6's
/// `register_custom_channel(kind, name)` / `register_lpe_channel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Spectral,
    ThreeD,
    OneD,
    Counter,
}

/// A dynamically registered channel's backing storage, one variant per
/// `ChannelKind`.
#[derive(Debug, Clone)]
pub enum ChannelBuffer {
    Spectral(Vec<Rgb>),
    ThreeD(Vec<Vec3>),
    OneD(Vec<f32>),
    Counter(Vec<u32>),
}

impl ChannelBuffer {
    fn new(kind: ChannelKind, len: usize) -> Self {
        match kind {
            ChannelKind::Spectral => ChannelBuffer::Spectral(vec![Rgb::default(); len]),
            ChannelKind::ThreeD => ChannelBuffer::ThreeD(vec![Vec3::ZERO; len]),
            ChannelKind::OneD => ChannelBuffer::OneD(vec![0.0; len]),
            ChannelKind::Counter => ChannelBuffer::Counter(vec![0; len]),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelBuffer::Spectral(_) => ChannelKind::Spectral,
            ChannelBuffer::ThreeD(_) => ChannelKind::ThreeD,
            ChannelBuffer::OneD(_) => ChannelKind::OneD,
            ChannelBuffer::Counter(_) => ChannelKind::Counter,
        }
    }
}

/// A channel gated by a Light Path Expression (spec.md §6): contributions
/// are only merged into `buffer` if their path token sequence matches
/// `expr`.
#[derive(Debug, Clone)]
pub struct LpeChannel {
    pub expr: LpeExpr,
    pub buffer: ChannelBuffer,
}

/// The fixed-size 2D channel container backing both local (per-thread,
/// extended by the filter halo) and global framebuffers (spec.md §3's
/// "Frame (output container)").
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub enabled: EnabledChannels,

    pub output: Vec<Rgb>,
    pub online_mean: Vec<Rgb>,
    pub online_variance: Vec<Rgb>,
    /// Welford sample count backing `online_mean`/`online_variance`,
    /// distinct from `sample_count` (which tracks shading-point hits).
    pub estimator_count: Vec<u32>,
    /// Number of times `output` (and the LPE spectral channels) have been
    /// merged into this pixel, backing the running-mean merge of spec.md
    /// §4.3.3 (only meaningful on the global frame).
    pub merge_count: Vec<u32>,

    pub position: Vec<Vec3>,
    pub normal: Vec<Vec3>,
    pub normal_g: Vec<Vec3>,
    pub tangent: Vec<Vec3>,
    pub bitangent: Vec<Vec3>,
    pub view: Vec<Vec3>,
    pub uvw: Vec<Vec3>,

    pub entity_id: Vec<f32>,
    pub material_id: Vec<f32>,
    pub emission_id: Vec<f32>,
    pub displace_id: Vec<f32>,
    pub depth: Vec<f32>,
    pub pixel_weight: Vec<f32>,

    pub sample_count: Vec<u32>,
    pub pixel_contribution_count: Vec<u32>,
    pub feedback: Vec<u32>,

    pub custom: HashMap<u32, ChannelBuffer>,
    pub lpe: HashMap<u32, LpeChannel>,
}

impl Frame {
    pub fn new(width: u32, height: u32, enabled: EnabledChannels) -> Self {
        let n = (width as usize) * (height as usize);
        Self {
            width,
            height,
            enabled,
            output: vec![Rgb::default(); n],
            online_mean: vec![Rgb::default(); n],
            online_variance: vec![Rgb::default(); n],
            estimator_count: vec![0; n],
            merge_count: vec![0; n],
            position: vec![Vec3::ZERO; n],
            normal: vec![Vec3::ZERO; n],
            normal_g: vec![Vec3::ZERO; n],
            tangent: vec![Vec3::ZERO; n],
            bitangent: vec![Vec3::ZERO; n],
            view: vec![Vec3::ZERO; n],
            uvw: vec![Vec3::ZERO; n],
            entity_id: vec![0.0; n],
            material_id: vec![0.0; n],
            emission_id: vec![0.0; n],
            displace_id: vec![0.0; n],
            depth: vec![0.0; n],
            pixel_weight: vec![0.0; n],
            sample_count: vec![0; n],
            pixel_contribution_count: vec![0; n],
            feedback: vec![0; n],
            custom: HashMap::new(),
            lpe: HashMap::new(),
        }
    }

    pub fn register_custom(&mut self, id: u32, kind: ChannelKind) {
        let len = (self.width as usize) * (self.height as usize);
        self.custom.insert(id, ChannelBuffer::new(kind, len));
    }

    pub fn register_lpe(&mut self, id: u32, kind: ChannelKind, expr: LpeExpr) {
        let len = (self.width as usize) * (self.height as usize);
        self.lpe.insert(
            id,
            LpeChannel {
                expr,
                buffer: ChannelBuffer::new(kind, len),
            },
        );
    }

    #[inline]
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            None
        } else {
            Some(y as usize * self.width as usize + x as usize)
        }
    }

    /// Resets every channel buffer to its zero value, keeping allocation
    /// (spec.md §4.3.3: "after merge the local device is reset to zero").
    pub fn clear(&mut self) {
        self.output.fill(Rgb::default());
        self.online_mean.fill(Rgb::default());
        self.online_variance.fill(Rgb::default());
        self.estimator_count.fill(0);
        self.merge_count.fill(0);
        self.position.fill(Vec3::ZERO);
        self.normal.fill(Vec3::ZERO);
        self.normal_g.fill(Vec3::ZERO);
        self.tangent.fill(Vec3::ZERO);
        self.bitangent.fill(Vec3::ZERO);
        self.view.fill(Vec3::ZERO);
        self.uvw.fill(Vec3::ZERO);
        self.entity_id.fill(0.0);
        self.material_id.fill(0.0);
        self.emission_id.fill(0.0);
        self.displace_id.fill(0.0);
        self.depth.fill(0.0);
        self.pixel_weight.fill(0.0);
        self.sample_count.fill(0);
        self.pixel_contribution_count.fill(0);
        self.feedback.fill(0);
        for buf in self.custom.values_mut() {
            clear_buffer(buf);
        }
        for lpe in self.lpe.values_mut() {
            clear_buffer(&mut lpe.buffer);
        }
    }
}

fn clear_buffer(buf: &mut ChannelBuffer) {
    match buf {
        ChannelBuffer::Spectral(v) => v.fill(Rgb::default()),
        ChannelBuffer::ThreeD(v) => v.fill(Vec3::ZERO),
        ChannelBuffer::OneD(v) => v.fill(0.0),
        ChannelBuffer::Counter(v) => v.fill(0),
    }
}

/// Converts `FeedbackBits` to/from the raw `u32` stored in `Frame::feedback`.
pub fn feedback_bits(raw: u32) -> FeedbackBits {
    FeedbackBits::from_bits_truncate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_rejects_out_of_bounds_coordinates() {
        let f = Frame::new(4, 4, EnabledChannels::empty());
        assert_eq!(f.index(0, 0), Some(0));
        assert_eq!(f.index(3, 3), Some(15));
        assert_eq!(f.index(4, 0), None);
        assert_eq!(f.index(-1, 0), None);
    }

    #[test]
    fn clear_zeroes_every_channel_including_custom() {
        let mut f = Frame::new(2, 2, EnabledChannels::empty());
        f.register_custom(7, ChannelKind::OneD);
        f.output[0] = Rgb {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        };
        if let Some(ChannelBuffer::OneD(v)) = f.custom.get_mut(&7) {
            v[0] = 5.0;
        }
        f.clear();
        assert_eq!(f.output[0].r, 0.0);
        if let Some(ChannelBuffer::OneD(v)) = f.custom.get(&7) {
            assert_eq!(v[0], 0.0);
        } else {
            panic!("custom channel missing");
        }
    }
}
