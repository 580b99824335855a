//! Corner geometry, edge interpolation and triangle emission for dual cells.
//!
//! Points are created once per block: edge points are keyed by the padded
//! index of the edge's lower corner and the edge axis, corner points (used by
//! caps) by the padded index of the corner. The boundary capper reuses the
//! same locator, so caps and surface share their edge points exactly.

use hashbrown::HashMap;
use nalgebra::Point3;

use crate::helper::{direction_index, BlockMeta, LevelGeometry, PaddedBlock};
use crate::helper::ghost::global_cell;
use crate::mesh::MeshBuilder;
use crate::tables::{edge_axis, triangle_table, CORNER_OFFSETS, EDGE_CORNERS};

/// Values and cached points of the dual cell being processed.
#[derive(Debug, Clone)]
pub(crate) struct DualCell {
    /// Padded point of corner 0.
    pub origin: [usize; 3],
    pub case_index: u8,
    pub values: [f64; 8],
    /// Points already created for the cell's edges.
    pub edge_ids: [Option<u32>; 12],
}

impl DualCell {
    pub fn new(origin: [usize; 3], case_index: u8, values: [f64; 8]) -> Self {
        Self {
            origin,
            case_index,
            values,
            edge_ids: [None; 12],
        }
    }

    #[inline]
    pub fn corner(&self, corner: usize) -> [usize; 3] {
        let o = CORNER_OFFSETS[corner];
        [
            self.origin[0] + o[0],
            self.origin[1] + o[1],
            self.origin[2] + o[2],
        ]
    }
}

/// Builds geometry for the dual cells of one padded block.
pub(crate) struct CellEmitter<'a> {
    block: &'a PaddedBlock,
    meta: &'a BlockMeta,
    geometry: &'a LevelGeometry,
    iso_value: f64,
    degenerate_cells: bool,
    pub builder: MeshBuilder,
    edge_points: HashMap<(usize, u8), u32>,
    corner_points: HashMap<usize, u32>,
    attributes: Vec<f64>,
    pub triangles: usize,
}

impl<'a> CellEmitter<'a> {
    pub fn new(
        block: &'a PaddedBlock,
        meta: &'a BlockMeta,
        geometry: &'a LevelGeometry,
        iso_value: f64,
        degenerate_cells: bool,
    ) -> Self {
        let attribute_count = block.attributes().len();
        Self {
            block,
            meta,
            geometry,
            iso_value,
            degenerate_cells,
            builder: MeshBuilder::new(attribute_count),
            edge_points: HashMap::new(),
            corner_points: HashMap::new(),
            attributes: Vec::with_capacity(attribute_count),
            triangles: 0,
        }
    }

    #[inline]
    pub fn block_id(&self) -> usize {
        self.block.id
    }

    /// Padded point counts of the block.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.block.dims
    }

    /// Position of padded point `p`.
    ///
    /// Ghost points facing a coarser neighbor are snapped onto that
    /// neighbor's cell centers.
    pub fn corner_position(&self, p: [usize; 3]) -> Point3<f64> {
        let cell = global_cell(self.meta.origin_index, p);
        let diff = if self.degenerate_cells {
            let dims = self.block.dims;
            let mut d = [0i64; 3];
            for axis in 0..3 {
                d[axis] = if p[axis] == 0 {
                    -1
                } else if p[axis] == dims[axis] - 1 {
                    1
                } else {
                    0
                };
            }
            self.meta.region_bits.level_diff(direction_index(d))
        } else {
            0
        };
        self.geometry.snapped_center(self.meta.level, cell, diff)
    }

    /// Point on cube edge `edge` of `cell`, created on first use.
    pub fn edge_point(&mut self, cell: &mut DualCell, edge: usize) -> u32 {
        if let Some(id) = cell.edge_ids[edge] {
            return id;
        }

        let [c0, c1] = EDGE_CORNERS[edge];
        let p0 = cell.corner(c0);
        let p1 = cell.corner(c1);
        let i0 = self.block.linear_index(p0);
        let key = (i0, edge_axis(edge) as u8);

        let id = match self.edge_points.get(&key) {
            Some(&id) => id,
            None => {
                let i1 = self.block.linear_index(p1);
                let (v0, v1) = (cell.values[c0], cell.values[c1]);
                let k = interpolation_factor(self.iso_value, v0, v1);
                let x0 = self.corner_position(p0);
                let x1 = self.corner_position(p1);
                let position = x0 + (x1 - x0) * k;

                self.attributes.clear();
                for array in self.block.attributes() {
                    let a0 = array.get(i0).unwrap_or(f64::NAN);
                    let a1 = array.get(i1).unwrap_or(f64::NAN);
                    self.attributes.push(a0 + k * (a1 - a0));
                }
                let id = self.builder.add_point(position, &self.attributes);
                self.edge_points.insert(key, id);
                id
            }
        };
        cell.edge_ids[edge] = Some(id);
        id
    }

    /// Point at cube corner `corner` of `cell`, created on first use.
    pub fn corner_point(&mut self, cell: &DualCell, corner: usize) -> u32 {
        let p = cell.corner(corner);
        let index = self.block.linear_index(p);
        if let Some(&id) = self.corner_points.get(&index) {
            return id;
        }

        let position = self.corner_position(p);
        self.attributes.clear();
        for array in self.block.attributes() {
            self.attributes.push(array.get(index).unwrap_or(f64::NAN));
        }
        let id = self.builder.add_point(position, &self.attributes);
        self.corner_points.insert(index, id);
        id
    }

    /// Emit the isosurface triangles of `cell`.
    ///
    /// Degenerate triangles produced by snapped corners are kept.
    pub fn triangulate(&mut self, cell: &mut DualCell) {
        let block_id = self.block.id;
        for tri in &triangle_table()[cell.case_index as usize] {
            let ids = [
                self.edge_point(cell, tri[0] as usize),
                self.edge_point(cell, tri[1] as usize),
                self.edge_point(cell, tri[2] as usize),
            ];
            self.builder.add_triangle(ids, block_id);
            self.triangles += 1;
        }
    }
}

/// Fraction along an edge from its lower corner value `v0` to its upper
/// corner value `v1` where the iso-value is crossed.
#[inline]
pub fn interpolation_factor(iso_value: f64, v0: f64, v1: f64) -> f64 {
    let delta = v1 - v0;
    if delta == 0.0 {
        0.5
    } else {
        (iso_value - v0) / delta
    }
}

/// Marching-cubes case of 8 corner values: bit `c` set iff corner `c` is
/// strictly above the iso-value.
#[inline]
pub fn case_index(values: &[f64; 8], iso_value: f64) -> u8 {
    values
        .iter()
        .enumerate()
        .fold(0u8, |acc, (c, &v)| if v > iso_value { acc | (1 << c) } else { acc })
}
