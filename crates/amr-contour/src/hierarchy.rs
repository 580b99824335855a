//! AMR block hierarchy consumed by the contour pass.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

use crate::voxel::VoxelArray;

/// Named cell arrays of one block.
#[derive(Debug, Clone, Default)]
pub struct CellData {
    arrays: HashMap<String, VoxelArray>,
}

impl CellData {
    /// Create an empty set of arrays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an array.
    pub fn insert(&mut self, name: impl Into<String>, array: impl Into<VoxelArray>) {
        self.arrays.insert(name.into(), array.into());
    }

    /// Look up an array by name.
    pub fn get(&self, name: &str) -> Option<&VoxelArray> {
        self.arrays.get(name)
    }

    /// Array names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Number of arrays.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// True when no arrays are present.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// One block of the hierarchy.
///
/// The block covers `dims` cells starting at `origin` (the low corner of its
/// first non-ghost cell). Its arrays, when present, additionally carry
/// `ghost[axis][side]` layers on each side (side 0 = low, 1 = high).
#[derive(Debug, Clone)]
pub struct AmrBlock {
    /// Globally unique block id, used as polygon provenance.
    pub id: usize,

    /// Refinement level, 0 = coarsest.
    pub level: u32,

    /// Rank that owns the block's data.
    pub owner: usize,

    /// Low corner of the first non-ghost cell.
    pub origin: Point3<f64>,

    /// Cell size along each axis.
    pub spacing: Vector3<f64>,

    /// Non-ghost cell counts.
    pub dims: [usize; 3],

    /// Ghost layers present in the arrays, per axis and side.
    pub ghost: [[usize; 2]; 3],

    /// Cell arrays. `None` for blocks owned by another rank.
    pub cell_data: Option<CellData>,
}

impl AmrBlock {
    /// Create a block on rank 0 with no ghost layers and no arrays.
    pub fn new(
        id: usize,
        level: u32,
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        dims: [usize; 3],
    ) -> Self {
        Self {
            id,
            level,
            owner: 0,
            origin,
            spacing,
            dims,
            ghost: [[0; 2]; 3],
            cell_data: None,
        }
    }

    /// Set the owning rank.
    pub fn with_owner(mut self, owner: usize) -> Self {
        self.owner = owner;
        self
    }

    /// Declare the ghost layers carried by the arrays.
    pub fn with_ghost_layers(mut self, ghost: [[usize; 2]; 3]) -> Self {
        self.ghost = ghost;
        self
    }

    /// Attach a cell array.
    pub fn with_array(mut self, name: impl Into<String>, array: impl Into<VoxelArray>) -> Self {
        self.cell_data
            .get_or_insert_with(CellData::new)
            .insert(name, array);
        self
    }

    /// Drop the arrays, as seen from a rank that does not own the block.
    pub fn without_data(mut self) -> Self {
        self.cell_data = None;
        self
    }

    /// Array extent per axis, ghost layers included.
    #[inline]
    pub fn array_dims(&self) -> [usize; 3] {
        [
            self.dims[0] + self.ghost[0][0] + self.ghost[0][1],
            self.dims[1] + self.ghost[1][0] + self.ghost[1][1],
            self.dims[2] + self.ghost[2][0] + self.ghost[2][1],
        ]
    }

    /// Number of values an array of this block must hold.
    #[inline]
    pub fn array_len(&self) -> usize {
        let d = self.array_dims();
        d[0] * d[1] * d[2]
    }

    /// Linear array index of non-ghost cell `cell` (ghost cells use negative
    /// or out-of-range coordinates within the ghost layers).
    #[inline]
    pub fn array_index(&self, cell: [i64; 3]) -> Option<usize> {
        let d = self.array_dims();
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let shifted = cell[axis] + self.ghost[axis][0] as i64;
            if shifted < 0 || shifted >= d[axis] as i64 {
                return None;
            }
            idx[axis] = shifted as usize;
        }
        Some(idx[0] + d[0] * (idx[1] + d[1] * idx[2]))
    }

    /// Fetch an array by name.
    pub fn array(&self, name: &str) -> Option<&VoxelArray> {
        self.cell_data.as_ref().and_then(|data| data.get(name))
    }

    /// True when this rank holds the block's data.
    #[inline]
    pub fn is_local(&self, rank: usize) -> bool {
        self.owner == rank
    }

    /// Physical bounds of the non-ghost cells.
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        let extent = Vector3::new(
            self.dims[0] as f64 * self.spacing.x,
            self.dims[1] as f64 * self.spacing.y,
            self.dims[2] as f64 * self.spacing.z,
        );
        (self.origin, self.origin + extent)
    }
}

/// The set of blocks of one AMR dataset, as seen by one rank.
///
/// Every rank lists every block; only blocks owned by the rank carry arrays.
#[derive(Debug, Clone, Default)]
pub struct AmrHierarchy {
    blocks: Vec<AmrBlock>,
}

impl AmrHierarchy {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hierarchy from a list of blocks.
    pub fn from_blocks(blocks: Vec<AmrBlock>) -> Self {
        Self { blocks }
    }

    /// Append a block.
    pub fn push(&mut self, block: AmrBlock) {
        self.blocks.push(block);
    }

    /// All blocks, in insertion order.
    pub fn blocks(&self) -> &[AmrBlock] {
        &self.blocks
    }

    /// Number of blocks across all levels.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when the hierarchy has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of levels (highest level + 1).
    pub fn number_of_levels(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.level as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// The view of this hierarchy from `rank`: arrays of blocks owned by
    /// other ranks are dropped.
    pub fn view_for_rank(&self, rank: usize) -> AmrHierarchy {
        let blocks = self
            .blocks
            .iter()
            .map(|b| {
                if b.owner == rank {
                    b.clone()
                } else {
                    b.clone().without_data()
                }
            })
            .collect();
        AmrHierarchy { blocks }
    }
}

impl FromIterator<AmrBlock> for AmrHierarchy {
    fn from_iter<I: IntoIterator<Item = AmrBlock>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> AmrBlock {
        AmrBlock::new(3, 1, Point3::origin(), Vector3::repeat(0.5), [4, 4, 4])
    }

    #[test]
    fn test_array_index_with_ghosts() {
        let b = block().with_ghost_layers([[1, 1], [0, 0], [0, 2]]);
        assert_eq!(b.array_dims(), [6, 4, 6]);
        assert_eq!(b.array_len(), 144);
        assert_eq!(b.array_index([0, 0, 0]), Some(1));
        assert_eq!(b.array_index([-1, 0, 0]), Some(0));
        assert_eq!(b.array_index([-2, 0, 0]), None);
        assert_eq!(b.array_index([0, 0, 5]), Some(5 * 24 + 1));
        assert_eq!(b.array_index([0, 0, 6]), None);
    }

    #[test]
    fn test_view_for_rank_strips_remote_data() {
        let hierarchy = AmrHierarchy::from_blocks(vec![
            block().with_array("f", vec![0.0f64; 64]),
            block().with_owner(1).with_array("f", vec![0.0f64; 64]),
        ]);
        let view = hierarchy.view_for_rank(1);
        assert!(view.blocks()[0].cell_data.is_none());
        assert!(view.blocks()[1].array("f").is_some());
        assert_eq!(view.number_of_levels(), 2);
    }

    #[test]
    fn test_bounds() {
        let (lo, hi) = block().bounds();
        assert_eq!(lo, Point3::origin());
        assert_eq!(hi, Point3::new(2.0, 2.0, 2.0));
    }
}
