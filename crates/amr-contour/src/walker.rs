//! Dual grid walker.
//!
//! Visits every dual cell of a padded block, skips cells in regions the block
//! does not own, builds the marching-cubes case and hands the cell to the
//! triangulator and, on the domain boundary, to the capper.
//!
//! A face of an owned dual cell lies on the domain boundary when the dual cell
//! across it has a corner with no data at any level. The owning block's face
//! need not be open for this, e.g. at concave corners of the domain.

use tracing::{trace, warn};

use crate::cap::CapCount;
use crate::error::ContourWarning;
use crate::helper::{
    region_index, AxisClass, BlockMeta, Coverage, Face, LevelGeometry, PaddedBlock,
};
use crate::mesh::MeshBuilder;
use crate::triangulate::{case_index, CellEmitter, DualCell};
use crate::voxel::Voxel;
use crate::with_voxel_slice;

/// Switches of the walker taken from the contour parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub enable_capping: bool,
    pub enable_degenerate_cells: bool,
    pub triangulate_cap: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            enable_capping: true,
            enable_degenerate_cells: true,
            triangulate_cap: true,
        }
    }
}

/// Counters of one block walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub cells_visited: usize,
    pub cells_skipped_unowned: usize,
    pub cells_contoured: usize,
    pub triangles: usize,
    pub cap_polygons: usize,
    pub points: usize,
}

impl BlockStats {
    /// Add the counters of another walk.
    pub fn accumulate(&mut self, other: &BlockStats) {
        self.cells_visited += other.cells_visited;
        self.cells_skipped_unowned += other.cells_skipped_unowned;
        self.cells_contoured += other.cells_contoured;
        self.triangles += other.triangles;
        self.cap_polygons += other.cap_polygons;
        self.points += other.points;
    }
}

/// Geometry produced by one block.
#[derive(Debug, Clone)]
pub struct BlockOutput {
    pub block_id: usize,
    pub builder: MeshBuilder,
    pub stats: BlockStats,
    pub warning: Option<ContourWarning>,
}

/// Contour one padded block at `iso_value`.
///
/// The scalar type is resolved once here; an unsupported type yields an empty
/// output carrying a [`ContourWarning`].
pub fn walk_block(
    block: &PaddedBlock,
    meta: &BlockMeta,
    geometry: &LevelGeometry,
    array_name: &str,
    iso_value: f64,
    options: WalkOptions,
) -> BlockOutput {
    let emitter = CellEmitter::new(
        block,
        meta,
        geometry,
        iso_value,
        options.enable_degenerate_cells,
    );

    with_voxel_slice!(
        block.scalar(),
        |values| walk_typed(emitter, values, meta, iso_value, options),
        {
            let type_name = block.scalar().type_name().to_string();
            warn!(
                block_id = block.id,
                array = array_name,
                type_name = %type_name,
                "Unsupported voxel type, block skipped"
            );
            BlockOutput {
                block_id: block.id,
                builder: MeshBuilder::new(block.attributes().len()),
                stats: BlockStats::default(),
                warning: Some(ContourWarning::UnsupportedScalarType {
                    block_id: block.id,
                    array: array_name.to_string(),
                    type_name,
                }),
            }
        }
    )
}

fn classify(p: usize, dims: usize) -> AxisClass {
    if p == 0 {
        AxisClass::Low
    } else if p == dims - 2 {
        AxisClass::High
    } else {
        AxisClass::Interior
    }
}

/// Faces of dual cell `p` that lie on the domain boundary.
///
/// `cells` is the block size without ghosts. The lattice points just past a
/// face are turned into block cell indices and then into block lattice
/// offsets checked against `coverage`.
pub(crate) fn open_faces(p: [usize; 3], cells: [i64; 3], coverage: Coverage) -> u8 {
    let mut faces = 0u8;
    for (bit, face) in Face::ALL.iter().enumerate() {
        let axis = face.axis();
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let past = if face.is_high() {
            p[axis] as i64 + 1
        } else {
            p[axis] as i64 - 2
        };

        let open = (0..4i64).any(|corner| {
            let mut cell = [0i64; 3];
            cell[axis] = past;
            cell[u] = p[u] as i64 - 1 + (corner & 1);
            cell[v] = p[v] as i64 - 1 + (corner >> 1);
            let offset = [
                cell[0].div_euclid(cells[0]),
                cell[1].div_euclid(cells[1]),
                cell[2].div_euclid(cells[2]),
            ];
            !coverage.contains(offset)
        });
        if open {
            faces |= 1 << bit;
        }
    }
    faces
}

/// Walk all dual cells of a block whose scalar has voxel type `T`.
pub(crate) fn walk_typed<T: Voxel>(
    mut emitter: CellEmitter<'_>,
    values: &[T],
    meta: &BlockMeta,
    iso_value: f64,
    options: WalkOptions,
) -> BlockOutput {
    let dims = emitter.dims();
    let sx = 1;
    let sy = dims[0];
    let sz = dims[0] * dims[1];
    let strides = [0, sx, sy, sx + sy, sz, sz + sx, sz + sy, sz + sy + sx];
    let cells = dims.map(|d| d as i64 - 2);

    let mut stats = BlockStats::default();
    let mut caps = CapCount::default();

    for z in 0..dims[2] - 1 {
        let cz = classify(z, dims[2]);
        for y in 0..dims[1] - 1 {
            let cy = classify(y, dims[1]);
            for x in 0..dims[0] - 1 {
                stats.cells_visited += 1;
                let cx = classify(x, dims[0]);
                if !meta.region_bits.is_owned(region_index([cx, cy, cz])) {
                    stats.cells_skipped_unowned += 1;
                    continue;
                }

                let base = x + sy * y + sz * z;
                let mut corner_values = [0.0f64; 8];
                for (value, stride) in corner_values.iter_mut().zip(strides) {
                    *value = values[base + stride].as_();
                }
                let case = case_index(&corner_values, iso_value);
                if case == 0 {
                    continue;
                }

                let p = [x, y, z];
                let faces = if options.enable_capping {
                    open_faces(p, cells, meta.coverage)
                } else {
                    0
                };
                if case == 255 && faces == 0 {
                    continue;
                }

                stats.cells_contoured += 1;
                let mut cell = DualCell::new(p, case, corner_values);
                emitter.triangulate(&mut cell);
                if faces != 0 {
                    let count = emitter.cap(&mut cell, faces, options.triangulate_cap);
                    caps.polygons += count.polygons;
                    caps.triangles += count.triangles;
                }
            }
        }
    }

    stats.triangles = emitter.triangles + caps.triangles;
    stats.cap_polygons = caps.polygons;
    stats.points = emitter.builder.point_count();

    trace!(
        block_id = emitter.block_id(),
        level = meta.level,
        cells = stats.cells_visited,
        unowned = stats.cells_skipped_unowned,
        contoured = stats.cells_contoured,
        triangles = stats.triangles,
        cap_polygons = stats.cap_polygons,
        "Walked block"
    );

    BlockOutput {
        block_id: emitter.block_id(),
        builder: emitter.builder,
        stats,
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::BlockAdjacencyHelper;
    use crate::hierarchy::{AmrBlock, AmrHierarchy};
    use crate::voxel::VoxelArray;
    use nalgebra::{Point3, Vector3};

    fn single_block(n: usize, values: impl Into<VoxelArray>) -> AmrHierarchy {
        AmrHierarchy::from_blocks(vec![AmrBlock::new(
            0,
            0,
            Point3::origin(),
            Vector3::repeat(1.0),
            [n, n, n],
        )
        .with_array("f", values)])
    }

    fn walk(hierarchy: &AmrHierarchy, iso: f64, options: WalkOptions) -> BlockOutput {
        let mut helper = BlockAdjacencyHelper::initialize(hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let padded = helper.pad_local_blocks(&["f"], false).unwrap();
        walk_block(
            &padded[0],
            helper.meta(0),
            helper.geometry(),
            "f",
            iso,
            options,
        )
    }

    #[test]
    fn test_open_faces_on_lone_block() {
        let mut coverage = Coverage::empty();
        coverage.insert([0, 0, 0]);
        // hull cells run from 1 to 3 in a 4-cell block
        assert_eq!(open_faces([1, 2, 3], [4, 4, 4], coverage), 0b10_0001);
        assert_eq!(open_faces([2, 2, 2], [4, 4, 4], coverage), 0);
    }

    #[test]
    fn test_open_face_at_concave_corner() {
        // the block's low x neighbor exists, the diagonal (-1, 1, 0) does not
        let mut coverage = Coverage::empty();
        for d in [[0, 0, 0], [-1, 0, 0], [0, 1, 0]] {
            coverage.insert(d);
        }
        assert_eq!(open_faces([1, 4, 2], [4, 4, 4], coverage), 0b00_0001);
    }

    #[test]
    fn test_open_face_past_thin_neighbor() {
        // one cell per block: the cell across +x lies two blocks away
        let mut coverage = Coverage::empty();
        for dz in -2..=2 {
            for dy in -2..=2 {
                for dx in -2..=1 {
                    coverage.insert([dx, dy, dz]);
                }
            }
        }
        assert_eq!(open_faces([1, 1, 1], [1, 1, 1], coverage), 0b00_0010);
        assert_eq!(open_faces([0, 1, 1], [1, 1, 1], coverage), 0);
    }

    #[test]
    fn test_full_block_caps_into_six_quads() {
        let hierarchy = single_block(2, vec![1.0f64; 8]);
        let options = WalkOptions {
            triangulate_cap: false,
            ..WalkOptions::default()
        };
        let output = walk(&hierarchy, 0.5, options);
        let mesh = output.builder.finish(0.5, &[]);

        assert_eq!(output.stats.cells_contoured, 1);
        assert_eq!(output.stats.cap_polygons, 6);
        assert_eq!(output.stats.triangles, 0);
        assert_eq!(mesh.polygon_count(), 6);
        assert!(mesh.polygons().all(|p| p.len() == 4));
        assert!(mesh.is_watertight());
    }

    #[test]
    fn test_only_hull_cells_are_owned() {
        let hierarchy = single_block(4, vec![0.0f64; 64]);
        let output = walk(&hierarchy, 0.5, WalkOptions::default());
        // 5^3 dual cells, 3^3 inside the hull of cell centers
        assert_eq!(output.stats.cells_visited, 125);
        assert_eq!(output.stats.cells_skipped_unowned, 125 - 27);
        assert_eq!(output.stats.cells_contoured, 0);
        assert_eq!(output.builder.polygon_count(), 0);
    }

    #[test]
    fn test_capping_disabled_leaves_no_caps() {
        let hierarchy = single_block(2, vec![1.0f64; 8]);
        let options = WalkOptions {
            enable_capping: false,
            ..WalkOptions::default()
        };
        let output = walk(&hierarchy, 0.5, options);
        assert_eq!(output.stats.cells_contoured, 0);
        assert_eq!(output.builder.polygon_count(), 0);
    }

    #[test]
    fn test_integer_voxels() {
        let mut values = vec![0u8; 27];
        values[13] = 200;
        let hierarchy = single_block(3, values);
        let output = walk(&hierarchy, 100.0, WalkOptions::default());
        let mesh = output.builder.finish(100.0, &[]);
        assert!(!mesh.is_empty());
        assert!(mesh.is_watertight());
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_unsupported_type_warns() {
        let hierarchy = single_block(
            2,
            VoxelArray::Unsupported {
                type_name: "string".to_string(),
                len: 8,
            },
        );
        let output = walk(&hierarchy, 0.5, WalkOptions::default());
        assert_eq!(output.builder.polygon_count(), 0);
        match output.warning {
            Some(ContourWarning::UnsupportedScalarType {
                block_id,
                ref type_name,
                ..
            }) => {
                assert_eq!(block_id, 0);
                assert_eq!(type_name, "string");
            }
            None => panic!("expected a warning"),
        }
    }
}
