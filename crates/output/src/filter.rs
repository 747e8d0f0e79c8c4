/// Pixel-reconstruction filter family (spec.md §4.4), ported from
/// `original_source/src/plugins/main/filter/*.cpp`'s formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    Block,
    Triangle,
    Gaussian { alpha: f32 },
    MitchellNetravali { b: f32, c: f32 },
    Lanczos { tau: f32 },
}

fn unweighted(kind: FilterKind, x: f32, radius: f32) -> f32 {
    let x = x.abs();
    match kind {
        FilterKind::Block => 1.0,
        FilterKind::Triangle => (radius - x).max(0.0) / radius.max(1e-6),
        FilterKind::Gaussian { alpha } => {
            let g = |d: f32| (-alpha * d * d).exp();
            (g(x) - g(radius)).max(0.0)
        }
        FilterKind::MitchellNetravali { b, c } => {
            let x = (x / radius.max(1e-6)).min(2.0);
            if x < 1.0 {
                ((12.0 - 9.0 * b - 6.0 * c) * x.powi(3)
                    + (-18.0 + 12.0 * b + 6.0 * c) * x.powi(2)
                    + (6.0 - 2.0 * b))
                    / 6.0
            } else {
                ((-b - 6.0 * c) * x.powi(3)
                    + (6.0 * b + 30.0 * c) * x.powi(2)
                    + (-12.0 * b - 48.0 * c) * x
                    + (8.0 * b + 24.0 * c))
                    / 6.0
            }
        }
        FilterKind::Lanczos { tau } => {
            if x < 1e-6 {
                1.0
            } else if x >= radius {
                0.0
            } else {
                let sinc = |v: f32| (std::f32::consts::PI * v).sin() / (std::f32::consts::PI * v);
                sinc(x) * sinc(x / tau)
            }
        }
    }
}

/// Precomputed `(2r+1)x(2r+1)` separable-looking (but stored dense) weight
/// table, normalized so the support sums to 1 (spec.md §8 invariant 4).
pub struct FilterCache {
    kind: FilterKind,
    radius: i32,
    table: Vec<f32>,
    side: usize,
}

impl FilterCache {
    pub fn new(kind: FilterKind, radius: i32) -> Self {
        let side = (2 * radius + 1) as usize;
        let mut table = vec![0.0f32; side * side];
        let r = radius.max(1) as f32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let w = unweighted(kind, dx as f32, r) * unweighted(kind, dy as f32, r);
                table[((dy + radius) as usize) * side + (dx + radius) as usize] = w;
            }
        }
        let sum: f32 = table.iter().sum();
        if sum > 1e-8 {
            for w in table.iter_mut() {
                *w /= sum;
            }
        } else if side == 1 {
            table[0] = 1.0;
        }
        Self {
            kind,
            radius,
            table,
            side,
        }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// `O(1)` lookup; out-of-support offsets clamp to the nearest edge per
    /// spec.md §4.4.
    pub fn weight(&self, dx: i32, dy: i32) -> f32 {
        let cx = (dx.clamp(-self.radius, self.radius) + self.radius) as usize;
        let cy = (dy.clamp(-self.radius, self.radius) + self.radius) as usize;
        self.table[cy * self.side + cx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavecore_geom::approx_eq;

    #[test]
    fn every_filter_sums_to_one_over_its_support() {
        for kind in [
            FilterKind::Block,
            FilterKind::Triangle,
            FilterKind::Gaussian { alpha: 2.0 },
            FilterKind::MitchellNetravali { b: 1.0 / 3.0, c: 1.0 / 3.0 },
            FilterKind::Lanczos { tau: 2.0 },
        ] {
            let f = FilterCache::new(kind, 2);
            let sum: f32 = (-2..=2)
                .flat_map(|dy| (-2..=2).map(move |dx| (dx, dy)))
                .map(|(dx, dy)| f.weight(dx, dy))
                .sum();
            assert!(approx_eq(sum, 1.0, 1e-4), "{kind:?} sum={sum}");
        }
    }

    #[test]
    fn isotropic_filters_are_symmetric() {
        let f = FilterCache::new(FilterKind::Gaussian { alpha: 1.5 }, 3);
        for dx in -3..=3 {
            for dy in -3..=3 {
                assert!(approx_eq(f.weight(dx, dy), f.weight(-dx, dy), 1e-6));
                assert!(approx_eq(f.weight(dx, dy), f.weight(dx, -dy), 1e-6));
            }
        }
    }

    #[test]
    fn radius_zero_block_filter_is_a_single_unit_weight() {
        let f = FilterCache::new(FilterKind::Block, 0);
        assert!(approx_eq(f.weight(0, 0), 1.0, 1e-6));
    }
}
