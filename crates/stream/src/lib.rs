//! SoA ray/hit streams, shading-group dispatch and the per-tile wavefront
//! pipeline (spec.md §3/§4.1).

mod hit_stream;
mod pipeline;
mod ray_stream;

pub use hit_stream::{HitEntry, HitStream, ShadingGroup, ShadingGroupIter};
pub use pipeline::{RoundOutput, StreamPipeline};
pub use ray_stream::{RaySpan, RayStream, StreamFull};
