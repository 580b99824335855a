//! Block adjacency for an AMR hierarchy spread over several levels and ranks.
//!
//! The helper validates the hierarchy, places every block on its level's block
//! lattice, resolves the 26 neighbors of each block across levels and derives
//! [`RegionBits`] and [`BoundaryBits`]. It also pads local blocks to exactly one
//! ghost layer and fills those ghosts from local and remote neighbors (see
//! [`ghost`]).
//!
//! All decisions use only block metadata that every rank knows, so every rank
//! computes identical ownership without communicating.

pub mod ghost;
pub mod region;

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{ContourError, ContourResult};
use crate::hierarchy::{AmrBlock, AmrHierarchy};

pub use ghost::{ExchangeBuffer, GhostRecord, PaddedBlock};
pub use region::{
    direction_index, direction_of, region_index, AxisClass, BoundaryBits, Coverage, Face,
    RegionBits, CENTER, DIRECTION_COUNT,
};

/// Relative tolerance when checking spacings and origins against the lattice.
const LATTICE_TOLERANCE: f64 = 1e-6;

/// What lies next to a block in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    /// The block itself (direction 0,0,0).
    Center,
    /// A block on the same level.
    Same(usize),
    /// A block `diff` levels coarser covering the neighbor position.
    Coarser { block: usize, diff: u32 },
    /// The neighbor position is refined further.
    Finer,
    /// Nothing at any level: outside the domain.
    None,
}

/// Where a global cell index of some level lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Index of the block in the hierarchy.
    pub block: usize,
    /// Level of that block.
    pub level: u32,
    /// Non-ghost cell index within the block.
    pub cell: [i64; 3],
}

/// Shared coordinate frame of all levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelGeometry {
    pub root_spacing: Vector3<f64>,
    pub global_origin: Point3<f64>,
    pub block_dims: [usize; 3],
}

impl LevelGeometry {
    /// Cell size at `level` (root spacing / 2^level).
    #[inline]
    pub fn spacing(&self, level: u32) -> Vector3<f64> {
        self.root_spacing / (1u64 << level) as f64
    }

    /// Center of global cell `cell` at `level`.
    #[inline]
    pub fn cell_center(&self, level: u32, cell: [i64; 3]) -> Point3<f64> {
        let h = self.spacing(level);
        Point3::new(
            self.global_origin.x + (cell[0] as f64 + 0.5) * h.x,
            self.global_origin.y + (cell[1] as f64 + 0.5) * h.y,
            self.global_origin.z + (cell[2] as f64 + 0.5) * h.z,
        )
    }

    /// Position of a dual point of `level`, snapped `diff` levels coarser.
    ///
    /// With `diff == 0` this is the cell center itself; otherwise it is the
    /// center of the coarser cell containing `cell`.
    #[inline]
    pub fn snapped_center(&self, level: u32, cell: [i64; 3], diff: u32) -> Point3<f64> {
        let diff = diff.min(level);
        self.cell_center(
            level - diff,
            [cell[0] >> diff, cell[1] >> diff, cell[2] >> diff],
        )
    }

    /// Snap a position inside level `level` onto the center of the containing
    /// cell `diff` levels coarser.
    pub fn snap_position(&self, level: u32, position: &Point3<f64>, diff: u32) -> Point3<f64> {
        let h = self.spacing(level);
        let rel = position - self.global_origin;
        let cell = [
            (rel.x / h.x).floor() as i64,
            (rel.y / h.y).floor() as i64,
            (rel.z / h.z).floor() as i64,
        ];
        self.snapped_center(level, cell, diff)
    }
}

/// Derived placement and adjacency of one block.
#[derive(Debug, Clone)]
pub struct BlockMeta {
    pub id: usize,
    pub level: u32,
    pub owner: usize,
    /// Position on the level's block lattice.
    pub grid_index: [i64; 3],
    /// Global cell index of the first non-ghost cell.
    pub origin_index: [i64; 3],
    /// Neighbors by direction index.
    pub neighbors: [Neighbor; DIRECTION_COUNT],
    pub region_bits: RegionBits,
    pub boundary_bits: BoundaryBits,
    /// Nearby lattice positions holding data, used to find capped faces.
    pub coverage: Coverage,
}

/// Adjacency and ghost handling for one contour pass.
pub struct BlockAdjacencyHelper<'a> {
    hierarchy: &'a AmrHierarchy,
    rank: usize,
    geometry: LevelGeometry,
    metas: Vec<BlockMeta>,
    levels: Vec<HashMap<[i64; 3], usize>>,
    refined: HashSet<(u32, [i64; 3])>,
    adjacency_computed: bool,
}

impl<'a> BlockAdjacencyHelper<'a> {
    /// Validate the hierarchy and place every block in the shared frame.
    ///
    /// # Errors
    /// - [`ContourError::InvalidInput`] when the hierarchy is empty or not a
    ///   valid block-structured hierarchy.
    /// - [`ContourError::MissingArray`] when a block owned by `rank` lacks
    ///   `array_name`.
    pub fn initialize(
        hierarchy: &'a AmrHierarchy,
        array_name: &str,
        rank: usize,
    ) -> ContourResult<Self> {
        let blocks = hierarchy.blocks();
        let first = blocks
            .first()
            .ok_or_else(|| ContourError::invalid_input("hierarchy has no blocks"))?;

        let block_dims = first.dims;
        if block_dims.iter().any(|&d| d == 0) {
            return Err(ContourError::invalid_input(format!(
                "block {} has zero cell dimensions {:?}",
                first.id, block_dims
            )));
        }

        let mut ids = HashSet::with_capacity(blocks.len());
        for block in blocks {
            if block.dims != block_dims {
                return Err(ContourError::invalid_input(format!(
                    "block {} has dimensions {:?}, expected {:?}",
                    block.id, block.dims, block_dims
                )));
            }
            if !block.spacing.iter().all(|&h| h.is_finite() && h > 0.0) {
                return Err(ContourError::invalid_input(format!(
                    "block {} has invalid spacing {:?}",
                    block.id,
                    block.spacing.as_slice()
                )));
            }
            if !block.origin.coords.iter().all(|c| c.is_finite()) {
                return Err(ContourError::invalid_input(format!(
                    "block {} has a non-finite origin",
                    block.id
                )));
            }
            if block.level > 62 {
                return Err(ContourError::invalid_input(format!(
                    "block {} has level {}",
                    block.id, block.level
                )));
            }
            if !ids.insert(block.id) {
                return Err(ContourError::invalid_input(format!(
                    "block id {} is used twice",
                    block.id
                )));
            }
        }

        let root_spacing = first.spacing * (1u64 << first.level) as f64;
        for block in blocks {
            let expected = root_spacing / (1u64 << block.level) as f64;
            for axis in 0..3 {
                let rel = (block.spacing[axis] - expected[axis]).abs() / expected[axis];
                if rel > LATTICE_TOLERANCE {
                    return Err(ContourError::invalid_input(format!(
                        "block {} at level {} has spacing {} on axis {}, expected {}",
                        block.id, block.level, block.spacing[axis], axis, expected[axis]
                    )));
                }
            }
        }

        let global_origin = Self::find_global_origin(blocks);
        let geometry = LevelGeometry {
            root_spacing,
            global_origin,
            block_dims,
        };

        let number_of_levels = hierarchy.number_of_levels();
        let mut levels: Vec<HashMap<[i64; 3], usize>> = vec![HashMap::new(); number_of_levels];
        let mut metas = Vec::with_capacity(blocks.len());

        for (index, block) in blocks.iter().enumerate() {
            let (origin_index, grid_index) = Self::place_block(&geometry, block)?;
            if let Some(&other) = levels[block.level as usize].get(&grid_index) {
                return Err(ContourError::invalid_input(format!(
                    "blocks {} and {} occupy the same position {:?} on level {}",
                    blocks[other].id, block.id, grid_index, block.level
                )));
            }
            levels[block.level as usize].insert(grid_index, index);
            metas.push(BlockMeta {
                id: block.id,
                level: block.level,
                owner: block.owner,
                grid_index,
                origin_index,
                neighbors: [Neighbor::None; DIRECTION_COUNT],
                region_bits: RegionBits::empty(),
                boundary_bits: BoundaryBits::empty(),
                coverage: Coverage::empty(),
            });
        }

        let mut refined = HashSet::new();
        for meta in &metas {
            for k in 1..=meta.level {
                let ancestor = shift_down(meta.grid_index, k);
                if let Some(&coarse) = levels[(meta.level - k) as usize].get(&ancestor) {
                    return Err(ContourError::invalid_input(format!(
                        "block {} on level {} overlaps coarser block {}",
                        meta.id, meta.level, blocks[coarse].id
                    )));
                }
                refined.insert((meta.level - k, ancestor));
            }
        }

        for block in blocks.iter().filter(|b| b.is_local(rank)) {
            let array = block
                .array(array_name)
                .ok_or_else(|| ContourError::missing_array(array_name, block.id))?;
            if array.len() != block.array_len() {
                return Err(ContourError::invalid_input(format!(
                    "array '{}' on block {} has {} values, expected {}",
                    array_name,
                    block.id,
                    array.len(),
                    block.array_len()
                )));
            }
        }

        debug!(
            blocks = blocks.len(),
            levels = number_of_levels,
            rank = rank,
            root_spacing = format!("{:?}", root_spacing.as_slice()),
            "Initialized block adjacency helper"
        );

        Ok(Self {
            hierarchy,
            rank,
            geometry,
            metas,
            levels,
            refined,
            adjacency_computed: false,
        })
    }

    /// Minimum origin of the level-0 blocks, or of all blocks when level 0 is
    /// empty.
    fn find_global_origin(blocks: &[AmrBlock]) -> Point3<f64> {
        let has_root = blocks.iter().any(|b| b.level == 0);
        blocks
            .iter()
            .filter(|b| !has_root || b.level == 0)
            .fold(Point3::from([f64::INFINITY; 3]), |acc, b| {
                Point3::new(
                    acc.x.min(b.origin.x),
                    acc.y.min(b.origin.y),
                    acc.z.min(b.origin.z),
                )
            })
    }

    fn place_block(
        geometry: &LevelGeometry,
        block: &AmrBlock,
    ) -> ContourResult<([i64; 3], [i64; 3])> {
        let h = geometry.spacing(block.level);
        let mut origin_index = [0i64; 3];
        let mut grid_index = [0i64; 3];
        for axis in 0..3 {
            let exact = (block.origin[axis] - geometry.global_origin[axis]) / h[axis];
            let rounded = exact.round();
            if (exact - rounded).abs() > LATTICE_TOLERANCE * exact.abs().max(1.0) {
                return Err(ContourError::invalid_input(format!(
                    "block {} origin is not on the level {} cell lattice",
                    block.id, block.level
                )));
            }
            let n = geometry.block_dims[axis] as i64;
            origin_index[axis] = rounded as i64;
            if origin_index[axis].rem_euclid(n) != 0 {
                return Err(ContourError::invalid_input(format!(
                    "block {} origin index {} is not a multiple of the block size {} on axis {}",
                    block.id, origin_index[axis], n, axis
                )));
            }
            grid_index[axis] = origin_index[axis].div_euclid(n);
        }
        Ok((origin_index, grid_index))
    }

    /// Resolve neighbors and derive region and boundary bits for all blocks.
    pub fn compute_adjacency(&mut self) {
        for index in 0..self.metas.len() {
            let mut neighbors = [Neighbor::None; DIRECTION_COUNT];
            for (dir, slot) in neighbors.iter_mut().enumerate() {
                *slot = if dir == CENTER {
                    Neighbor::Center
                } else {
                    self.resolve_neighbor(index, direction_of(dir))
                };
            }
            self.metas[index].neighbors = neighbors;
            self.metas[index].coverage = self.resolve_coverage(index);
        }

        for index in 0..self.metas.len() {
            let (region_bits, boundary_bits) = self.derive_bits(index);
            let meta = &mut self.metas[index];
            meta.region_bits = region_bits;
            meta.boundary_bits = boundary_bits;
        }
        self.adjacency_computed = true;

        let boundary_faces: usize = self
            .metas
            .iter()
            .map(|m| m.boundary_bits.bits().count_ones() as usize)
            .sum();
        let degenerate_blocks = self
            .metas
            .iter()
            .filter(|m| m.region_bits.has_degenerate_neighbors())
            .count();
        debug!(
            blocks = self.metas.len(),
            boundary_faces = boundary_faces,
            degenerate_blocks = degenerate_blocks,
            "Computed block adjacency"
        );
    }

    fn resolve_neighbor(&self, index: usize, d: [i64; 3]) -> Neighbor {
        let meta = &self.metas[index];
        let n = [
            meta.grid_index[0] + d[0],
            meta.grid_index[1] + d[1],
            meta.grid_index[2] + d[2],
        ];

        if let Some(&same) = self.levels[meta.level as usize].get(&n) {
            return Neighbor::Same(same);
        }
        for diff in 1..=meta.level {
            let coarse = shift_down(n, diff);
            if let Some(&block) = self.levels[(meta.level - diff) as usize].get(&coarse) {
                return Neighbor::Coarser { block, diff };
            }
        }
        if self.refined.contains(&(meta.level, n)) {
            return Neighbor::Finer;
        }
        Neighbor::None
    }

    /// Lattice positions up to [`Coverage::REACH`] steps away that hold data
    /// at any level. The 26 direct neighbors are already resolved.
    fn resolve_coverage(&self, index: usize) -> Coverage {
        let meta = &self.metas[index];
        let reach = Coverage::REACH;
        let mut coverage = Coverage::empty();
        for dz in -reach..=reach {
            for dy in -reach..=reach {
                for dx in -reach..=reach {
                    let d = [dx, dy, dz];
                    let present = if d.iter().all(|c| c.abs() <= 1) {
                        meta.neighbors[direction_index(d)] != Neighbor::None
                    } else {
                        self.resolve_neighbor(index, d) != Neighbor::None
                    };
                    if present {
                        coverage.insert(d);
                    }
                }
            }
        }
        coverage
    }

    fn derive_bits(&self, index: usize) -> (RegionBits, BoundaryBits) {
        let meta = &self.metas[index];
        let mut region_bits = RegionBits::empty();

        for region in 0..DIRECTION_COUNT {
            let classes = direction_of(region).map(|c| match c {
                -1 => AxisClass::Low,
                0 => AxisClass::Interior,
                _ => AxisClass::High,
            });

            let mut owned = true;
            'dirs: for &dx in classes[0].directions() {
                for &dy in classes[1].directions() {
                    for &dz in classes[2].directions() {
                        if dx == 0 && dy == 0 && dz == 0 {
                            continue;
                        }
                        match meta.neighbors[direction_index([dx, dy, dz])] {
                            Neighbor::Finer | Neighbor::None => {
                                owned = false;
                                break 'dirs;
                            }
                            Neighbor::Same(other) => {
                                if self.metas[other].grid_index < meta.grid_index {
                                    owned = false;
                                    break 'dirs;
                                }
                            }
                            Neighbor::Coarser { .. } | Neighbor::Center => {}
                        }
                    }
                }
            }
            region_bits.set_owned(region, owned);

            if let Neighbor::Coarser { diff, .. } = meta.neighbors[region] {
                region_bits.set_level_diff(region, diff);
            }
        }

        let mut boundary_bits = BoundaryBits::empty();
        for face in Face::ALL {
            if meta.neighbors[face.direction()] == Neighbor::None {
                boundary_bits.insert(face);
            }
        }

        (region_bits, boundary_bits)
    }

    /// Find the block holding global cell `cell` of `level`.
    ///
    /// Tries the same level first, then coarser levels (the containing cell),
    /// then finer levels (the first sub-cell).
    pub fn locate(&self, level: u32, cell: [i64; 3]) -> Option<Located> {
        let n = self.geometry.block_dims.map(|d| d as i64);
        let lookup = |lvl: u32, c: [i64; 3]| {
            let grid = [
                c[0].div_euclid(n[0]),
                c[1].div_euclid(n[1]),
                c[2].div_euclid(n[2]),
            ];
            self.levels
                .get(lvl as usize)
                .and_then(|blocks| blocks.get(&grid))
                .map(|&block| Located {
                    block,
                    level: lvl,
                    cell: [
                        c[0] - grid[0] * n[0],
                        c[1] - grid[1] * n[1],
                        c[2] - grid[2] * n[2],
                    ],
                })
        };

        for diff in 0..=level {
            if let Some(found) = lookup(level - diff, shift_down(cell, diff)) {
                return Some(found);
            }
        }
        for finer in (level + 1)..self.levels.len() as u32 {
            let k = finer - level;
            let sub = cell.map(|c| c * (1i64 << k));
            if let Some(found) = lookup(finer, sub) {
                return Some(found);
            }
        }
        None
    }

    // ==================== Accessors ====================

    /// Block at `grid_index` on `level`.
    pub fn block(&self, level: u32, grid_index: [i64; 3]) -> Option<&'a AmrBlock> {
        let hierarchy = self.hierarchy;
        self.levels
            .get(level as usize)
            .and_then(|blocks| blocks.get(&grid_index))
            .map(|&index| &hierarchy.blocks()[index])
    }

    /// Number of blocks on `level`.
    pub fn number_of_blocks_in_level(&self, level: u32) -> usize {
        self.levels.get(level as usize).map_or(0, |blocks| blocks.len())
    }

    /// Number of levels in the hierarchy.
    pub fn number_of_levels(&self) -> usize {
        self.levels.len()
    }

    /// Cell size of level 0.
    pub fn root_spacing(&self) -> Vector3<f64> {
        self.geometry.root_spacing
    }

    /// Origin shared by all levels.
    pub fn global_origin(&self) -> Point3<f64> {
        self.geometry.global_origin
    }

    /// Cell size of `level`.
    pub fn level_spacing(&self, level: u32) -> Vector3<f64> {
        self.geometry.spacing(level)
    }

    /// The shared coordinate frame.
    pub fn geometry(&self) -> &LevelGeometry {
        &self.geometry
    }

    /// Derived data of the block at hierarchy index `index`.
    pub fn meta(&self, index: usize) -> &BlockMeta {
        &self.metas[index]
    }

    /// Derived data of all blocks, in hierarchy order.
    pub fn metas(&self) -> &[BlockMeta] {
        &self.metas
    }

    /// The hierarchy this helper was built from.
    pub fn hierarchy(&self) -> &'a AmrHierarchy {
        self.hierarchy
    }

    /// Rank this helper works for.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// True once [`compute_adjacency`](Self::compute_adjacency) has run.
    pub fn has_adjacency(&self) -> bool {
        self.adjacency_computed
    }

    /// Hierarchy indices of the blocks owned by this rank.
    pub fn local_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.metas
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.owner == self.rank)
            .map(|(i, _)| i)
    }

    /// Finest level spacing present in the hierarchy.
    pub fn finest_spacing(&self) -> Vector3<f64> {
        self.geometry
            .spacing(self.levels.len().saturating_sub(1) as u32)
    }
}

/// Arithmetic right shift of every component.
#[inline]
fn shift_down(v: [i64; 3], k: u32) -> [i64; 3] {
    [v[0] >> k, v[1] >> k, v[2] >> k]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_block(id: usize, level: u32, grid: [i64; 3], n: usize) -> AmrBlock {
        let h = 1.0 / (1u64 << level) as f64;
        let origin = Point3::new(
            grid[0] as f64 * n as f64 * h,
            grid[1] as f64 * n as f64 * h,
            grid[2] as f64 * n as f64 * h,
        );
        let len = n * n * n;
        AmrBlock::new(id, level, origin, Vector3::repeat(h), [n, n, n])
            .with_array("f", vec![0.0f64; len])
    }

    fn grid_hierarchy(counts: [i64; 3], n: usize) -> AmrHierarchy {
        let mut blocks = Vec::new();
        for z in 0..counts[2] {
            for y in 0..counts[1] {
                for x in 0..counts[0] {
                    blocks.push(uniform_block(blocks.len(), 0, [x, y, z], n));
                }
            }
        }
        AmrHierarchy::from_blocks(blocks)
    }

    /// Level 0: 2×2×2 blocks, the one at (1,1,1) refined into 8 level-1 blocks.
    fn two_level_hierarchy(n: usize) -> AmrHierarchy {
        let mut blocks = Vec::new();
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    if [x, y, z] != [1, 1, 1] {
                        blocks.push(uniform_block(blocks.len(), 0, [x, y, z], n));
                    }
                }
            }
        }
        for z in 2..4 {
            for y in 2..4 {
                for x in 2..4 {
                    blocks.push(uniform_block(blocks.len(), 1, [x, y, z], n));
                }
            }
        }
        AmrHierarchy::from_blocks(blocks)
    }

    /// Like [`two_level_hierarchy`], with the lowest level-1 block refined
    /// once more. Level-2 blocks then see level-0 blocks two levels up.
    fn three_level_hierarchy(n: usize) -> AmrHierarchy {
        let mut blocks: Vec<AmrBlock> = two_level_hierarchy(n)
            .blocks()
            .iter()
            .filter(|b| !(b.level == 1 && b.origin == Point3::new(4.0, 4.0, 4.0)))
            .cloned()
            .collect();
        for z in 4..6 {
            for y in 4..6 {
                for x in 4..6 {
                    blocks.push(uniform_block(100 + blocks.len(), 2, [x, y, z], n));
                }
            }
        }
        AmrHierarchy::from_blocks(blocks)
    }

    /// Every dual cell of every level is owned by exactly one block when all
    /// its corners hold data at that level or a coarser one, and by none
    /// otherwise.
    fn assert_one_owner_per_dual_cell(helper: &BlockAdjacencyHelper<'_>) {
        let n = helper.geometry().block_dims.map(|d| d as i64);
        let classify = |p: i64, n: i64| {
            if p == 0 {
                AxisClass::Low
            } else if p == n {
                AxisClass::High
            } else {
                AxisClass::Interior
            }
        };

        let mut owners: HashMap<(u32, [i64; 3]), usize> = HashMap::new();
        for meta in helper.metas() {
            for z in 0..=n[2] {
                for y in 0..=n[1] {
                    for x in 0..=n[0] {
                        let p = [x, y, z];
                        let lower = [
                            meta.origin_index[0] + x - 1,
                            meta.origin_index[1] + y - 1,
                            meta.origin_index[2] + z - 1,
                        ];
                        let entry = owners.entry((meta.level, lower)).or_insert(0);
                        let classes = [0, 1, 2].map(|a| classify(p[a], n[a]));
                        if meta.region_bits.is_owned(region_index(classes)) {
                            *entry += 1;
                        }
                    }
                }
            }
        }

        for ((level, lower), owned) in owners {
            let complete = (0..8).all(|c| {
                let corner = [
                    lower[0] + (c & 1),
                    lower[1] + ((c >> 1) & 1),
                    lower[2] + ((c >> 2) & 1),
                ];
                helper
                    .locate(level, corner)
                    .is_some_and(|found| found.level <= level)
            });
            assert_eq!(
                owned,
                usize::from(complete),
                "dual cell {:?} on level {}",
                lower,
                level
            );
        }
    }

    #[test]
    fn test_empty_hierarchy_rejected() {
        let hierarchy = AmrHierarchy::new();
        let err = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0)
            .err()
            .unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidInput);
    }

    #[test]
    fn test_missing_array_rejected() {
        let hierarchy = AmrHierarchy::from_blocks(vec![uniform_block(0, 0, [0, 0, 0], 4)]);
        let err = BlockAdjacencyHelper::initialize(&hierarchy, "g", 0)
            .err()
            .unwrap();
        assert_eq!(err.code(), crate::error::ErrorCode::MissingArray);
    }

    #[test]
    fn test_remote_blocks_need_no_array() {
        let hierarchy = AmrHierarchy::from_blocks(vec![
            uniform_block(0, 0, [0, 0, 0], 4),
            uniform_block(1, 0, [1, 0, 0], 4).with_owner(1).without_data(),
        ]);
        assert!(BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).is_ok());
    }

    #[test]
    fn test_invalid_layouts_rejected() {
        let cases = vec![
            // mismatched dimensions
            vec![
                uniform_block(0, 0, [0, 0, 0], 4),
                uniform_block(1, 0, [1, 0, 0], 2),
            ],
            // same position twice
            vec![
                uniform_block(0, 0, [0, 0, 0], 4),
                uniform_block(1, 0, [0, 0, 0], 4),
            ],
            // duplicate id
            vec![
                uniform_block(0, 0, [0, 0, 0], 4),
                uniform_block(0, 0, [1, 0, 0], 4),
            ],
            // fine block on top of a coarse one
            vec![
                uniform_block(0, 0, [0, 0, 0], 4),
                uniform_block(1, 1, [1, 1, 1], 4),
            ],
            // spacing does not halve
            vec![
                uniform_block(0, 0, [0, 0, 0], 4),
                AmrBlock::new(
                    1,
                    1,
                    Point3::new(4.0, 0.0, 0.0),
                    Vector3::repeat(0.3),
                    [4, 4, 4],
                )
                .with_array("f", vec![0.0f64; 64]),
            ],
            // origin off the block lattice
            vec![
                uniform_block(0, 0, [0, 0, 0], 4),
                AmrBlock::new(
                    1,
                    0,
                    Point3::new(5.0, 0.0, 0.0),
                    Vector3::repeat(1.0),
                    [4, 4, 4],
                )
                .with_array("f", vec![0.0f64; 64]),
            ],
            // wrong array length
            vec![uniform_block(0, 0, [0, 0, 0], 4).with_array("f", vec![0.0f64; 10])],
        ];

        for (i, blocks) in cases.into_iter().enumerate() {
            let hierarchy = AmrHierarchy::from_blocks(blocks);
            let result = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0);
            assert!(result.is_err(), "case {} should be rejected", i);
            assert_eq!(
                result.err().unwrap().code(),
                crate::error::ErrorCode::InvalidInput,
                "case {}",
                i
            );
        }
    }

    #[test]
    fn test_accessors() {
        let hierarchy = two_level_hierarchy(4);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();

        assert_eq!(helper.number_of_levels(), 2);
        assert_eq!(helper.number_of_blocks_in_level(0), 7);
        assert_eq!(helper.number_of_blocks_in_level(1), 8);
        assert_eq!(helper.number_of_blocks_in_level(2), 0);
        assert_eq!(helper.root_spacing(), Vector3::repeat(1.0));
        assert_eq!(helper.level_spacing(1), Vector3::repeat(0.5));
        assert_eq!(helper.global_origin(), Point3::origin());
        assert_eq!(helper.block(1, [3, 2, 2]).map(|b| b.level), Some(1));
        assert!(helper.block(0, [1, 1, 1]).is_none());
    }

    #[test]
    fn test_single_block_boundary_bits() {
        let hierarchy = grid_hierarchy([1, 1, 1], 4);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let meta = helper.meta(0);
        assert_eq!(meta.boundary_bits, BoundaryBits::ALL);
        // only the interior region survives when every side is open
        assert_eq!(meta.region_bits.owned_count(), 1);
        assert!(meta.region_bits.is_owned(CENTER));
    }

    #[test]
    fn test_neighbor_resolution_across_levels() {
        let hierarchy = two_level_hierarchy(4);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();

        let fine = helper
            .metas()
            .iter()
            .position(|m| m.level == 1 && m.grid_index == [2, 2, 2])
            .unwrap();
        let meta = helper.meta(fine);
        assert!(matches!(
            meta.neighbors[direction_index([-1, 0, 0])],
            Neighbor::Coarser { diff: 1, .. }
        ));
        assert!(matches!(
            meta.neighbors[direction_index([1, 0, 0])],
            Neighbor::Same(_)
        ));
        assert_eq!(meta.region_bits.level_diff(direction_index([-1, 0, 0])), 1);
        assert_eq!(meta.region_bits.level_diff(direction_index([1, 0, 0])), 0);

        let coarse = helper
            .metas()
            .iter()
            .position(|m| m.level == 0 && m.grid_index == [0, 1, 1])
            .unwrap();
        let meta = helper.meta(coarse);
        assert_eq!(meta.neighbors[direction_index([1, 0, 0])], Neighbor::Finer);
        // the finer side owns the transition
        assert!(!meta.region_bits.is_owned(direction_index([1, 0, 0])));
        assert!(
            helper
                .meta(fine)
                .region_bits
                .is_owned(direction_index([-1, 0, 0]))
        );
    }

    #[test]
    fn test_every_shared_region_has_one_owner() {
        let hierarchy = grid_hierarchy([3, 3, 3], 4);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();

        // A region is identified by the lattice positions it touches.
        let mut owners: HashMap<Vec<[i64; 3]>, (usize, usize)> = HashMap::new();
        for meta in helper.metas() {
            for region in 0..DIRECTION_COUNT {
                let classes = direction_of(region);
                let mut key = Vec::new();
                let mut complete = true;
                for dx in AxisClass::directions(to_class(classes[0])) {
                    for dy in AxisClass::directions(to_class(classes[1])) {
                        for dz in AxisClass::directions(to_class(classes[2])) {
                            let d = [*dx, *dy, *dz];
                            if meta.neighbors[direction_index(d)] == Neighbor::None {
                                complete = false;
                            }
                            key.push([
                                meta.grid_index[0] + dx,
                                meta.grid_index[1] + dy,
                                meta.grid_index[2] + dz,
                            ]);
                        }
                    }
                }
                key.sort_unstable();
                let entry = owners.entry(key).or_insert((0, 0));
                if meta.region_bits.is_owned(region) {
                    entry.0 += 1;
                }
                if complete {
                    entry.1 = 1;
                }
            }
        }

        for (key, (owned, complete)) in owners {
            assert_eq!(owned, complete, "region {:?}", key);
        }
    }

    #[test]
    fn test_every_dual_cell_has_one_owner_across_levels() {
        for hierarchy in [
            grid_hierarchy([3, 2, 2], 4),
            grid_hierarchy([3, 3, 3], 1),
            two_level_hierarchy(4),
            three_level_hierarchy(4),
        ] {
            let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
            helper.compute_adjacency();
            assert_one_owner_per_dual_cell(&helper);
        }
    }

    #[test]
    fn test_level_jump_of_two() {
        let hierarchy = three_level_hierarchy(4);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        assert_eq!(helper.number_of_levels(), 3);

        let finest = helper
            .metas()
            .iter()
            .position(|m| m.level == 2 && m.grid_index == [4, 4, 4])
            .unwrap();
        let meta = helper.meta(finest);
        assert!(matches!(
            meta.neighbors[direction_index([-1, 0, 0])],
            Neighbor::Coarser { diff: 2, .. }
        ));
        assert_eq!(meta.region_bits.level_diff(direction_index([-1, 0, 0])), 2);
        assert!(meta.region_bits.is_owned(direction_index([-1, 0, 0])));
    }

    #[test]
    fn test_coverage_reaches_two_blocks() {
        let hierarchy = grid_hierarchy([3, 1, 1], 1);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();

        let coverage = helper.meta(0).coverage;
        assert!(coverage.contains([0, 0, 0]));
        assert!(coverage.contains([1, 0, 0]));
        assert!(coverage.contains([2, 0, 0]));
        assert!(!coverage.contains([-1, 0, 0]));
        assert!(!coverage.contains([1, 1, 0]));

        // refined positions count as covered
        let hierarchy = two_level_hierarchy(4);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let corner = helper
            .metas()
            .iter()
            .position(|m| m.level == 0 && m.grid_index == [0, 0, 0])
            .unwrap();
        let coverage = helper.meta(corner).coverage;
        assert!(coverage.contains([1, 1, 1]));
        assert!(!coverage.contains([2, 0, 0]));
    }

    fn to_class(c: i64) -> AxisClass {
        match c {
            -1 => AxisClass::Low,
            0 => AxisClass::Interior,
            _ => AxisClass::High,
        }
    }

    #[test]
    fn test_locate_across_levels() {
        let hierarchy = two_level_hierarchy(4);
        let helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();

        // level-1 cell (7, 8, 8) lives in the coarse block at grid (0, 1, 1)
        let found = helper.locate(1, [7, 8, 8]).unwrap();
        assert_eq!(found.level, 0);
        assert_eq!(found.cell, [3, 0, 0]);
        assert_eq!(helper.meta(found.block).grid_index, [0, 1, 1]);

        // level-0 cell (4, 4, 4) is refined: first sub-cell (8, 8, 8)
        let found = helper.locate(0, [4, 4, 4]).unwrap();
        assert_eq!(found.level, 1);
        assert_eq!(found.cell, [0, 0, 0]);

        assert!(helper.locate(0, [-1, 0, 0]).is_none());
        assert!(helper.locate(0, [8, 0, 0]).is_none());
    }

    #[test]
    fn test_snap_is_idempotent() {
        let geometry = LevelGeometry {
            root_spacing: Vector3::new(1.0, 0.5, 2.0),
            global_origin: Point3::new(-1.0, 3.0, 0.25),
            block_dims: [4, 4, 4],
        };
        for cell in [[0, 0, 0], [5, 6, 7], [-3, 2, 9], [11, -1, 4]] {
            for diff in 0..3 {
                let once = geometry.snapped_center(3, cell, diff);
                let twice = geometry.snap_position(3, &once, diff);
                assert!((once - twice).norm() < 1e-12, "{:?} diff {}", cell, diff);
            }
        }
    }
}
