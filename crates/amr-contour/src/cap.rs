//! Boundary capping: closes the cut cross-section on dual-cell faces that lie
//! on the domain boundary.
//!
//! Each flagged face is handled on its own. The cube case is projected onto
//! the face, the 16-entry [`CAP_TABLE`] gives up to two polygons in face-local
//! indices, and those map back to cube corners and edges. Edge points come
//! from the same locator as the surface triangles, so neighboring cells and
//! the surface all meet in shared points.

use crate::tables::{face_case, CAP_TABLE, FACE_CORNERS, FACE_COUNT, FACE_EDGES};
use crate::triangulate::{CellEmitter, DualCell};

/// Polygons emitted by the capper for one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CapCount {
    pub polygons: usize,
    pub triangles: usize,
}

impl CellEmitter<'_> {
    /// Cap every face of `cell` whose bit is set in `faces`.
    ///
    /// With `triangulate` set, cap polygons with more than three points are
    /// split into a fan of triangles.
    pub(crate) fn cap(&mut self, cell: &mut DualCell, faces: u8, triangulate: bool) -> CapCount {
        let mut count = CapCount::default();
        let block_id = self.block_id();
        let mut ids: Vec<u32> = Vec::with_capacity(5);

        for face in 0..FACE_COUNT {
            if faces & (1 << face) == 0 {
                continue;
            }

            for polygon in CAP_TABLE[face_case(cell.case_index, face)] {
                ids.clear();
                for &local in polygon.iter() {
                    let local = local as usize;
                    let id = if local < 4 {
                        self.corner_point(cell, FACE_CORNERS[face][local])
                    } else {
                        self.edge_point(cell, FACE_EDGES[face][local - 4])
                    };
                    ids.push(id);
                }

                if triangulate && ids.len() > 3 {
                    for i in 1..ids.len() - 1 {
                        self.builder
                            .add_triangle([ids[0], ids[i], ids[i + 1]], block_id);
                        count.triangles += 1;
                    }
                } else {
                    self.builder.add_polygon(&ids, block_id);
                    if ids.len() == 3 {
                        count.triangles += 1;
                    }
                }
                count.polygons += 1;
            }
        }
        count
    }
}
