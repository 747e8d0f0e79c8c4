//! Adaptive tile scheduler: distributes image-plane work across worker
//! threads, CAS-acquired, with optional re-splitting of slow tiles
//! (spec.md §4.2).

mod render_tile;
mod scheduler;
mod tile_map;

pub use render_tile::{RenderTile, TileState, MIN_TILE_SIZE};
pub use scheduler::{RenderTileStatistics, SchedulerConfig, TileScheduler};
pub use tile_map::{RenderTileMap, TileMode};
