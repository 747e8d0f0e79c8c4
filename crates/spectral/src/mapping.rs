use crate::cie::{CieTables, CieTriplet};
use wavecore_geom::SpectralBlob;

/// RGB primaries the tristimulus-to-RGB matrix is built for. sRGB is the
/// configured default (spec.md §4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RgbPrimaries {
    Srgb,
}

/// Plain linear RGB triple (no gamma applied — that is a downstream image
/// I/O concern, out of scope here).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl std::ops::Add for Rgb {
    type Output = Rgb;
    fn add(self, rhs: Rgb) -> Rgb {
        Rgb {
            r: self.r + rhs.r,
            g: self.g + rhs.g,
            b: self.b + rhs.b,
        }
    }
}

impl std::ops::Sub for Rgb {
    type Output = Rgb;
    fn sub(self, rhs: Rgb) -> Rgb {
        Rgb {
            r: self.r - rhs.r,
            g: self.g - rhs.g,
            b: self.b - rhs.b,
        }
    }
}

impl std::ops::Mul<f32> for Rgb {
    type Output = Rgb;
    fn mul(self, rhs: f32) -> Rgb {
        Rgb {
            r: self.r * rhs,
            g: self.g * rhs,
            b: self.b * rhs,
        }
    }
}

/// sRGB (D65-referenced) linear XYZ-to-RGB matrix, row-major.
const SRGB_XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.2406, -1.5372, -0.4986],
    [-0.9689, 1.8758, 0.0415],
    [0.0557, -0.2040, 1.0570],
];

/// Converts spectral contributions to tristimulus (CIE XYZ) and then to
/// RGB, as spec.md §4.3.2 step 2 requires.
///
/// The conversion matrix is white-balanced against the equal-energy (CIE
/// E) illuminant rather than used as-is: a flat unit spectrum integrated
/// over the full visible range must map to RGB `(1,1,1)` (invariant #10 /
/// scenario S10), so each matrix row is rescaled by the reciprocal of its
/// dot product with the normalized equal-energy white point at
/// construction time. This mirrors how the original normalizes luminance
/// by `PR_CIE_Y_SUM` before image export, just folded into the matrix.
pub struct TristimulusMapper {
    tables: CieTables,
    norm: f32,
    matrix: [[f32; 3]; 3],
}

impl TristimulusMapper {
    pub fn new(primaries: RgbPrimaries) -> Self {
        let tables = CieTables::new();
        let norm = 1.0 / tables.y_sum;

        let base = match primaries {
            RgbPrimaries::Srgb => SRGB_XYZ_TO_RGB,
        };

        // Equal-energy white point: summing the table directly (no
        // wavelength-delta weighting) mirrors the per-sample CIE::eval
        // formula used for actual ray contributions, so the same matrix
        // is correct for both the white-point derivation and real use.
        let mut white = CieTriplet::default();
        for i in 0..crate::cie::CIE_SAMPLE_COUNT {
            let lambda =
                crate::cie::CIE_WAVELENGTH_START + i as f32 * crate::cie::CIE_WAVELENGTH_DELTA;
            white = white + tables.eval_single(lambda);
        }
        white = white * norm;

        let mut matrix = base;
        for row in matrix.iter_mut() {
            let raw = row[0] * white.x + row[1] * white.y + row[2] * white.z;
            if raw.abs() > 1e-8 {
                let scale = 1.0 / raw;
                row[0] *= scale;
                row[1] *= scale;
                row[2] *= scale;
            }
        }

        Self {
            tables,
            norm,
            matrix,
        }
    }

    pub fn xyz_to_rgb(&self, xyz: CieTriplet) -> Rgb {
        Rgb {
            r: self.matrix[0][0] * xyz.x + self.matrix[0][1] * xyz.y + self.matrix[0][2] * xyz.z,
            g: self.matrix[1][0] * xyz.x + self.matrix[1][1] * xyz.y + self.matrix[1][2] * xyz.z,
            b: self.matrix[2][0] * xyz.x + self.matrix[2][1] * xyz.y + self.matrix[2][2] * xyz.z,
        }
    }

    /// Full spectral-entry conversion: weighted wavelengths -> tristimulus
    /// (normalized by the equal-energy luminance sum) -> RGB. `mono`
    /// restricts the contribution to the hero lane only (spec.md §4.3.2).
    pub fn spectral_to_rgb(&self, weight: SpectralBlob, wavelengths: SpectralBlob, mono: bool) -> Rgb {
        let weight = if mono {
            weight * SpectralBlob::hero_only_mask()
        } else {
            weight
        };
        let xyz = self.tables.eval_blob(&weight, &wavelengths) * self.norm;
        self.xyz_to_rgb(xyz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_energy_spectrum_maps_to_white() {
        let mapper = TristimulusMapper::new(RgbPrimaries::Srgb);
        // Sample the full table at its own grid points with unit weight,
        // approximating the continuous CIE-E integral.
        let mut xyz = CieTriplet::default();
        for i in 0..crate::cie::CIE_SAMPLE_COUNT {
            let lambda =
                crate::cie::CIE_WAVELENGTH_START + i as f32 * crate::cie::CIE_WAVELENGTH_DELTA;
            xyz = xyz + mapper.tables.eval_single(lambda);
        }
        xyz = xyz * mapper.norm;
        let rgb = mapper.xyz_to_rgb(xyz);
        assert!(wavecore_geom::approx_eq(rgb.r, 1.0, 1e-3));
        assert!(wavecore_geom::approx_eq(rgb.g, 1.0, 1e-3));
        assert!(wavecore_geom::approx_eq(rgb.b, 1.0, 1e-3));
    }

    #[test]
    fn mono_flag_isolates_hero_lane() {
        let mapper = TristimulusMapper::new(RgbPrimaries::Srgb);
        let weights = SpectralBlob::splat(1.0);
        let wavelengths = SpectralBlob([550.0, 600.0, 650.0, 500.0]);
        let full = mapper.spectral_to_rgb(weights, wavelengths, false);
        let mono = mapper.spectral_to_rgb(weights, wavelengths, true);
        assert_ne!(full.g, mono.g);
    }
}
