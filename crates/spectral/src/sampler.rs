use crate::cie::CieTables;
use wavecore_geom::rng::Rng;

/// Pluggable hero-wavelength sampler (spec.md §4.5). `sample` draws a
/// wavelength and its pdf given a uniform variate; `pdf` evaluates the
/// density at an arbitrary wavelength for MIS bookkeeping by the
/// integrator.
pub trait WavelengthSampler: Send + Sync {
    fn sample(&self, u: f32) -> (f32, f32);
    fn pdf(&self, wavelength: f32) -> f32;
}

/// Uniform sampling over `[start, end]` ("random" in the original's
/// `plugins/main/spectralmapper/random.cpp`).
pub struct RandomSampler {
    pub start: f32,
    pub end: f32,
}

impl RandomSampler {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    pub fn draw(&self, rng: &mut Rng) -> (f32, f32) {
        self.sample(rng.next_f32())
    }
}

impl WavelengthSampler for RandomSampler {
    fn sample(&self, u: f32) -> (f32, f32) {
        let span = self.end - self.start;
        (self.start + u * span, 1.0 / span)
    }

    fn pdf(&self, wavelength: f32) -> f32 {
        if wavelength >= self.start && wavelength <= self.end {
            1.0 / (self.end - self.start)
        } else {
            0.0
        }
    }
}

/// Importance-samples wavelengths proportional to the CIE `y_bar`
/// luminosity curve (`plugins/main/spectralmapper/cie.cpp`'s `sample_y`).
/// The density is built once from the same discrete `CieTables` grid used
/// for tristimulus conversion: a piecewise-constant histogram over the 95
/// wavelength bins, inverted via its CDF.
pub struct CieYSampler {
    start: f32,
    end: f32,
    bin_width: f32,
    cdf: Vec<f32>,
    pdf_density: Vec<f32>,
}

impl CieYSampler {
    pub fn new(tables: &CieTables) -> Self {
        let n = crate::cie::CIE_SAMPLE_COUNT;
        let mut weights = vec![0.0f32; n];
        for i in 0..n {
            let lambda =
                crate::cie::CIE_WAVELENGTH_START + i as f32 * crate::cie::CIE_WAVELENGTH_DELTA;
            weights[i] = tables.eval_single(lambda).y.max(0.0);
        }
        let total: f32 = weights.iter().sum();
        let total = if total > 0.0 { total } else { 1.0 };

        let mut cdf = vec![0.0f32; n + 1];
        for i in 0..n {
            cdf[i + 1] = cdf[i] + weights[i] / total;
        }
        let span = crate::cie::CIE_WAVELENGTH_END - crate::cie::CIE_WAVELENGTH_START;
        let bin_width = span / n as f32;
        let pdf_density: Vec<f32> = weights.iter().map(|w| w / total / bin_width).collect();

        Self {
            start: crate::cie::CIE_WAVELENGTH_START,
            end: crate::cie::CIE_WAVELENGTH_END,
            bin_width,
            cdf,
            pdf_density,
        }
    }

    fn bin_of(&self, wavelength: f32) -> usize {
        let f = (wavelength - self.start) / self.bin_width;
        (f as usize).min(self.pdf_density.len() - 1)
    }
}

impl WavelengthSampler for CieYSampler {
    fn sample(&self, u: f32) -> (f32, f32) {
        // Binary search the CDF for the bin containing `u`.
        let mut lo = 0usize;
        let mut hi = self.cdf.len() - 1;
        while lo + 1 < hi {
            let mid = (lo + hi) / 2;
            if self.cdf[mid] <= u {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let bin = lo.min(self.pdf_density.len() - 1);
        let bin_lo_cdf = self.cdf[bin];
        let bin_hi_cdf = self.cdf[bin + 1].max(bin_lo_cdf + 1e-8);
        let t = ((u - bin_lo_cdf) / (bin_hi_cdf - bin_lo_cdf)).clamp(0.0, 1.0);
        let wavelength = self.start + (bin as f32 + t) * self.bin_width;
        (wavelength, self.pdf_density[bin].max(1e-8))
    }

    fn pdf(&self, wavelength: f32) -> f32 {
        if wavelength < self.start || wavelength > self.end {
            return 0.0;
        }
        self.pdf_density[self.bin_of(wavelength)].max(1e-8)
    }
}

/// Samples uniformly within a narrower truncated sub-range of the full
/// CIE-visible span, falling back to zero density outside it.
pub struct TruncatedCieSampler {
    inner: RandomSampler,
}

impl TruncatedCieSampler {
    pub fn new(start: f32, end: f32) -> Self {
        Self {
            inner: RandomSampler::new(
                start.max(crate::cie::CIE_WAVELENGTH_START),
                end.min(crate::cie::CIE_WAVELENGTH_END),
            ),
        }
    }
}

impl WavelengthSampler for TruncatedCieSampler {
    fn sample(&self, u: f32) -> (f32, f32) {
        self.inner.sample(u)
    }

    fn pdf(&self, wavelength: f32) -> f32 {
        self.inner.pdf(wavelength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_sampler_pdf_integrates_to_one() {
        let s = RandomSampler::new(360.0, 830.0);
        let (_, pdf) = s.sample(0.5);
        assert!(wavecore_geom::approx_eq(pdf * (830.0 - 360.0), 1.0, 1e-4));
    }

    #[test]
    fn cie_y_sampler_stays_in_range() {
        let tables = CieTables::new();
        let sampler = CieYSampler::new(&tables);
        for i in 0..20 {
            let u = (i as f32 + 0.5) / 20.0;
            let (lambda, pdf) = sampler.sample(u);
            assert!((360.0..=830.0).contains(&lambda));
            assert!(pdf > 0.0);
        }
    }

    #[test]
    fn truncated_sampler_respects_bounds() {
        let s = TruncatedCieSampler::new(500.0, 600.0);
        let (lambda, _) = s.sample(0.0);
        assert!(lambda >= 500.0);
        let (lambda, _) = s.sample(1.0);
        assert!(lambda <= 600.0 + 1e-3);
    }
}
