use smallvec::SmallVec;
use wavecore_geom::INVALID_ID;

/// Most shading groups (a tile's hits sharing one entity+material) are a
/// few dozen rays at most; inlining avoids a heap allocation per group.
type GroupIndices = SmallVec<[u32; 16]>;

/// A single traversal result (spec.md §3). `entity_id == INVALID_ID` marks
/// a background (miss) hit.
#[derive(Debug, Clone, Copy)]
pub struct HitEntry {
    pub ray_index: u32,
    pub entity_id: u32,
    pub material_id: u32,
    pub primitive_id: u32,
    /// Barycentric-or-surface parameter.
    pub param: [f32; 3],
    pub flags: u32,
}

impl HitEntry {
    pub fn background(ray_index: u32) -> Self {
        Self {
            ray_index,
            entity_id: INVALID_ID,
            material_id: INVALID_ID,
            primitive_id: INVALID_ID,
            param: [0.0; 3],
            flags: 0,
        }
    }

    pub fn is_background(&self) -> bool {
        self.entity_id == INVALID_ID
    }
}

/// SoA storage for hits produced in the current iteration, sortable by
/// `(entity_id, material_id)` (spec.md §3/§4.1 step d).
#[derive(Default)]
pub struct HitStream {
    entries: Vec<HitEntry>,
    /// Permutation of `entries` by sort key; populated by `sort()`.
    order: Vec<u32>,
}

impl HitStream {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: HitEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn entry(&self, i: usize) -> &HitEntry {
        &self.entries[i]
    }

    /// Key used for grouping: background hits sort last into one
    /// distinguished group, matching spec.md §4.1 step d.
    fn sort_key(e: &HitEntry) -> (bool, u32, u32) {
        (e.is_background(), e.entity_id, e.material_id)
    }

    /// Stable sort of hits by `(entity_id, material_id)`. A simple LSD
    /// radix-by-material-then-entity would suffice at scale; a stable
    /// comparison sort is used here since hit batches are a few thousand
    /// entries at most and `sort_by_key` is already stable.
    pub fn sort(&mut self) {
        let mut order: Vec<u32> = (0..self.entries.len() as u32).collect();
        order.sort_by_key(|&i| Self::sort_key(&self.entries[i as usize]));
        self.order = order;
    }

    /// Iterates contiguous runs sharing the same `(entity_id, material_id)`
    /// key, in sorted order. Must be called after `sort()`.
    pub fn shading_groups(&self) -> ShadingGroupIter<'_> {
        ShadingGroupIter {
            stream: self,
            cursor: 0,
        }
    }
}

/// A contiguous run of hits sharing `(entity, material)` (spec.md
/// GLOSSARY). `indices` are indices into the owning `HitStream`'s
/// `entries`, in the stream's sorted order.
#[derive(Debug, Clone)]
pub struct ShadingGroup {
    pub entity_id: u32,
    pub material_id: u32,
    pub indices: GroupIndices,
}

impl ShadingGroup {
    pub fn is_background(&self) -> bool {
        self.entity_id == INVALID_ID
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

pub struct ShadingGroupIter<'a> {
    stream: &'a HitStream,
    cursor: usize,
}

impl<'a> Iterator for ShadingGroupIter<'a> {
    type Item = ShadingGroup;

    fn next(&mut self) -> Option<ShadingGroup> {
        if self.cursor >= self.stream.order.len() {
            return None;
        }
        let start = self.cursor;
        let first = &self.stream.entries[self.stream.order[start] as usize];
        let key = HitStream::sort_key(first);
        let mut end = start + 1;
        while end < self.stream.order.len() {
            let e = &self.stream.entries[self.stream.order[end] as usize];
            if HitStream::sort_key(e) != key {
                break;
            }
            end += 1;
        }
        self.cursor = end;
        Some(ShadingGroup {
            entity_id: key.1,
            material_id: key.2,
            indices: self.stream.order[start..end].iter().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(entity: u32, material: u32, ray_index: u32) -> HitEntry {
        HitEntry {
            ray_index,
            entity_id: entity,
            material_id: material,
            primitive_id: 0,
            param: [0.0; 3],
            flags: 0,
        }
    }

    #[test]
    fn groups_contiguous_runs_by_key() {
        let mut s = HitStream::with_capacity(8);
        s.push(hit(2, 0, 0));
        s.push(hit(1, 0, 1));
        s.push(hit(2, 0, 2));
        s.push(HitEntry::background(3));
        s.sort();
        let groups: Vec<_> = s.shading_groups().collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].entity_id, 1);
        assert_eq!(groups[1].entity_id, 2);
        assert_eq!(groups[1].len(), 2);
        assert!(groups[2].is_background());
    }

    #[test]
    fn background_group_sorts_last() {
        let mut s = HitStream::with_capacity(4);
        s.push(HitEntry::background(0));
        s.push(hit(5, 0, 1));
        s.sort();
        let groups: Vec<_> = s.shading_groups().collect();
        assert!(!groups[0].is_background());
        assert!(groups[1].is_background());
    }

    #[test]
    fn reset_clears_entries_and_order() {
        let mut s = HitStream::with_capacity(4);
        s.push(hit(1, 0, 0));
        s.sort();
        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.shading_groups().count(), 0);
    }
}
