//! Framebuffer/AOV output system (spec.md §4.3): per-worker local
//! accumulation into [`local::LocalOutputDevice`], merged through
//! [`global::GlobalOutputDevice`] into the single exported [`frame::Frame`].
//! Reconstruction filtering lives in [`filter`]; Light Path Expression
//! gating for AOV multiplexing lives in [`lpe`].

mod filter;
mod frame;
mod global;
mod local;
mod lpe;

pub use filter::{FilterCache, FilterKind};
pub use frame::{feedback_bits, ChannelBuffer, ChannelKind, EnabledChannels, Frame, LpeChannel};
pub use global::{welford_merge, GlobalOutputDevice, VarianceEstimator};
pub use local::{
    ContributionOutcome, CustomEntry, CustomValue, FeedbackEntry, LocalOutputDevice,
    LocalOutputQueue, ShadingPointEntry, SpectralEntry,
};
pub use lpe::{LpeExpr, LpeParseError, Token};
