//! Error kinds, one enum per row of spec.md §7's table (not an
//! undifferentiated `Box<dyn Error>`), mirroring how `dust-vox`/`dust-pbr`
//! each carry a single `thiserror` enum.

use wavecore_geom::{FeedbackBits, RayFlags};

/// Fatal-to-the-render conditions (spec.md §7: `StreamFull`,
/// `StopRequested`). Everything else is a local-recovery outcome returned
/// alongside a continuation rather than an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("ray stream capacity ({capacity}) exceeded in one round")]
    StreamFull { capacity: usize },
    #[error("stop requested")]
    StopRequested,
}

/// Outcome of inserting a ray into a stream (spec.md §7 `BadRay`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Ok,
    BadRay(RayFlags),
}

/// Outcome of committing a spectral contribution, re-exported from
/// `wavecore-output` so callers that only depend on the root crate don't
/// need an extra crate import.
pub use wavecore_output::ContributionOutcome;

/// CAS-acquisition failure (spec.md §7 `InvalidTileState`); local recovery,
/// the scheduler simply retries the next tile.
#[derive(Debug, thiserror::Error)]
pub enum TileAcquireError {
    #[error("tile was not idle at acquisition time")]
    InvalidTileState,
}

/// Push to an AOV id that was never registered (spec.md §7
/// `ChannelNotRegistered`): silently dropped in release builds, asserted
/// in debug.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("channel {0} was not registered before use")]
    ChannelNotRegistered(u32),
}

#[allow(dead_code)]
fn feedback_from_stream_outcome(outcome: StreamOutcome) -> FeedbackBits {
    match outcome {
        StreamOutcome::Ok => FeedbackBits::empty(),
        StreamOutcome::BadRay(flags) => {
            let mut bits = FeedbackBits::empty();
            if flags.contains(RayFlags::INVALID) {
                bits |= FeedbackBits::NAN;
            }
            bits
        }
    }
}
