use std::sync::{Arc, RwLock};

use glam::{IVec2, UVec2};
use wavecore_geom::Rect2i;

use crate::render_tile::RenderTile;

/// Order in which the initial tile grid is handed out (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    Linear,
    TileInterleaved,
    Spiral,
    ZOrder,
}

fn morton2(x: u32, y: u32) -> u64 {
    fn spread(mut v: u64) -> u64 {
        v &= 0xffffffff;
        v = (v | (v << 16)) & 0x0000ffff0000ffff;
        v = (v | (v << 8)) & 0x00ff00ff00ff00ff;
        v = (v | (v << 4)) & 0x0f0f0f0f0f0f0f0f;
        v = (v | (v << 2)) & 0x3333333333333333;
        v = (v | (v << 1)) & 0x5555555555555555;
        v
    }
    spread(x) | (spread(y) << 1)
}

/// Orders the `tx * ty` grid cell coordinates according to `mode`.
fn grid_order(tx: u32, ty: u32, mode: TileMode) -> Vec<(u32, u32)> {
    let mut cells: Vec<(u32, u32)> = (0..ty).flat_map(|y| (0..tx).map(move |x| (x, y))).collect();
    match mode {
        TileMode::Linear => {}
        TileMode::TileInterleaved => {
            // Interleave by a 2x2 block phase so adjacent cells in the
            // output list land in different coarse regions of the image.
            cells.sort_by_key(|&(x, y)| ((y % 2, x % 2), y, x));
        }
        TileMode::ZOrder => {
            cells.sort_by_key(|&(x, y)| morton2(x, y));
        }
        TileMode::Spiral => {
            let cx = (tx as f32 - 1.0) / 2.0;
            let cy = (ty as f32 - 1.0) / 2.0;
            cells.sort_by(|&(ax, ay), &(bx, by)| {
                let da = ((ax as f32 - cx).powi(2) + (ay as f32 - cy).powi(2)).sqrt();
                let db = ((bx as f32 - cx).powi(2) + (by as f32 - cy).powi(2)).sqrt();
                da.partial_cmp(&db).unwrap()
            });
        }
    }
    cells
}

/// The scheduler's ordered collection of tiles. Reads are lock-free (the
/// lock is shared) except while an adaptive split is in progress, which
/// takes the write half (grounded on `dust_vdb::immutable`'s
/// `Mutex`-guarded shared-tree-info pattern, generalized here to an
/// `RwLock` since most accesses are read-only scans).
pub struct RenderTileMap {
    tiles: RwLock<Vec<Arc<RenderTile>>>,
}

impl RenderTileMap {
    pub fn new(
        view_size: UVec2,
        tx: u32,
        ty: u32,
        mode: TileMode,
        samples_max: u64,
        seed_base: u64,
    ) -> Self {
        let tile_w = (view_size.x + tx - 1) / tx;
        let tile_h = (view_size.y + ty - 1) / ty;

        let order = grid_order(tx, ty, mode);
        let tiles = order
            .into_iter()
            .enumerate()
            .map(|(i, (gx, gy))| {
                let start = IVec2::new((gx * tile_w) as i32, (gy * tile_h) as i32);
                let end = IVec2::new(
                    (start.x + tile_w as i32).min(view_size.x as i32),
                    (start.y + tile_h as i32).min(view_size.y as i32),
                );
                Arc::new(RenderTile::new(
                    Rect2i::new(start, end),
                    seed_base.wrapping_add(i as u64),
                    samples_max,
                ))
            })
            .collect();

        Self {
            tiles: RwLock::new(tiles),
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<RenderTile>> {
        self.tiles.read().unwrap().clone()
    }

    /// Replaces `old` with its two split halves. No-op if `old` is no
    /// longer present (already split by a racing thread).
    pub fn replace_with_split(&self, old: &Arc<RenderTile>, a: RenderTile, b: RenderTile) {
        let mut tiles = self.tiles.write().unwrap();
        if let Some(pos) = tiles.iter().position(|t| Arc::ptr_eq(t, old)) {
            tiles.splice(pos..pos + 1, [Arc::new(a), Arc::new(b)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_grid_covers_view_without_gaps() {
        let map = RenderTileMap::new(UVec2::new(64, 48), 4, 3, TileMode::Linear, 8, 0);
        let tiles = map.snapshot();
        assert_eq!(tiles.len(), 12);
        let total: u64 = tiles.iter().map(|t| t.rect.area()).sum();
        assert_eq!(total, 64 * 48);
    }

    #[test]
    fn zorder_and_linear_cover_the_same_area() {
        let linear = RenderTileMap::new(UVec2::new(32, 32), 4, 4, TileMode::Linear, 8, 0);
        let z = RenderTileMap::new(UVec2::new(32, 32), 4, 4, TileMode::ZOrder, 8, 0);
        let sum_l: u64 = linear.snapshot().iter().map(|t| t.rect.area()).sum();
        let sum_z: u64 = z.snapshot().iter().map(|t| t.rect.area()).sum();
        assert_eq!(sum_l, sum_z);
    }

    #[test]
    fn replace_with_split_keeps_total_area() {
        let map = RenderTileMap::new(UVec2::new(16, 16), 1, 1, TileMode::Linear, 8, 0);
        let tiles = map.snapshot();
        let only = tiles[0].clone();
        let (a, b) = only.split();
        map.replace_with_split(&only, a, b);
        let after = map.snapshot();
        assert_eq!(after.len(), 2);
        let total: u64 = after.iter().map(|t| t.rect.area()).sum();
        assert_eq!(total, 16 * 16);
    }
}
