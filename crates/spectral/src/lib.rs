//! Wavelength sampling and spectral-to-tristimulus-to-RGB mapping
//! (spec.md §4.5). Built on top of `wavecore-geom`'s `SpectralBlob`.

pub mod cie;
pub mod mapping;
pub mod sampler;

pub use cie::{CieTables, CieTriplet};
pub use mapping::{Rgb, RgbPrimaries, TristimulusMapper};
pub use sampler::{CieYSampler, RandomSampler, TruncatedCieSampler, WavelengthSampler};
