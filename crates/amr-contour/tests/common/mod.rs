//! Shared hierarchy fixtures for the integration tests.

#![allow(dead_code)]

use amr_contour::{AmrBlock, AmrHierarchy, ContourMesh};
use nalgebra::{Point3, Vector3};

/// Cells per block along each axis.
pub const BLOCK_CELLS: usize = 4;

/// A sphere sampled as a signed distance: positive inside.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: [f64; 3], radius: f64) -> Self {
        Self {
            center: Point3::from(center),
            radius,
        }
    }

    pub fn value(&self, p: &Point3<f64>) -> f64 {
        self.radius - (p - self.center).norm()
    }
}

/// Largest value of several spheres, so that disjoint spheres stay apart.
pub fn union_value(spheres: &[Sphere], p: &Point3<f64>) -> f64 {
    spheres
        .iter()
        .map(|s| s.value(p))
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Cell-centered samples of `f` over a cubic block without ghost layers.
pub fn sample_block(
    origin: Point3<f64>,
    spacing: f64,
    n: usize,
    f: impl Fn(&Point3<f64>) -> f64,
) -> Vec<f64> {
    sample_cells(origin, spacing, [n, n, n], f)
}

/// Cell-centered samples of `f` over a block of `dims` cells, x fastest.
pub fn sample_cells(
    origin: Point3<f64>,
    spacing: f64,
    dims: [usize; 3],
    f: impl Fn(&Point3<f64>) -> f64,
) -> Vec<f64> {
    let mut values = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                let p = origin
                    + Vector3::new(x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5) * spacing;
                values.push(f(&p));
            }
        }
    }
    values
}

/// Unit-spacing level-0 blocks of `dims` cells at the given block lattice
/// positions, ids in order.
pub fn lattice_hierarchy(
    positions: &[[usize; 3]],
    dims: [usize; 3],
    f: impl Fn(&Point3<f64>) -> f64,
) -> AmrHierarchy {
    positions
        .iter()
        .enumerate()
        .map(|(id, g)| {
            let origin = Point3::new(
                (g[0] * dims[0]) as f64,
                (g[1] * dims[1]) as f64,
                (g[2] * dims[2]) as f64,
            );
            AmrBlock::new(id, 0, origin, Vector3::repeat(1.0), dims)
                .with_array("vf", sample_cells(origin, 1.0, dims, &f))
        })
        .collect()
}

/// `blocks^3` level-0 blocks of unit spacing, owned round-robin by x slab
/// across `ranks`.
pub fn uniform_hierarchy(
    blocks: usize,
    ranks: usize,
    f: impl Fn(&Point3<f64>) -> f64,
) -> AmrHierarchy {
    let n = BLOCK_CELLS;
    let mut hierarchy = AmrHierarchy::new();
    let mut id = 0;
    for k in 0..blocks {
        for j in 0..blocks {
            for i in 0..blocks {
                let origin = Point3::new((i * n) as f64, (j * n) as f64, (k * n) as f64);
                let block = AmrBlock::new(id, 0, origin, Vector3::repeat(1.0), [n, n, n])
                    .with_owner(i * ranks / blocks)
                    .with_array("vf", sample_block(origin, 1.0, n, &f));
                hierarchy.push(block);
                id += 1;
            }
        }
    }
    hierarchy
}

/// A 2x2x2 level-0 domain of side 8 whose high octant is refined into eight
/// level-1 blocks. Ids 0..7 are coarse, 7..15 fine.
pub fn two_level_hierarchy(f: impl Fn(&Point3<f64>) -> f64) -> AmrHierarchy {
    nested_hierarchy(2, f)
}

/// A domain of side 8 refined `levels - 1` times. Level 0 refines its high
/// octant; every later level refines its lowest block again, so the finest
/// blocks touch level-0 blocks across a jump of several levels.
pub fn nested_hierarchy(levels: u32, f: impl Fn(&Point3<f64>) -> f64) -> AmrHierarchy {
    let n = BLOCK_CELLS;
    let mut hierarchy = AmrHierarchy::new();
    let mut id = 0;
    let mut base = [0usize; 3];
    for level in 0..levels {
        let spacing = 1.0 / (1u64 << level) as f64;
        let refined = if level + 1 == levels {
            None
        } else if level == 0 {
            Some([1, 1, 1])
        } else {
            Some(base)
        };
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    let g = [base[0] + i, base[1] + j, base[2] + k];
                    if Some(g) == refined {
                        continue;
                    }
                    let origin = Point3::new(
                        (g[0] * n) as f64 * spacing,
                        (g[1] * n) as f64 * spacing,
                        (g[2] * n) as f64 * spacing,
                    );
                    hierarchy.push(
                        AmrBlock::new(id, level, origin, Vector3::repeat(spacing), [n, n, n])
                            .with_array("vf", sample_block(origin, spacing, n, &f)),
                    );
                    id += 1;
                }
            }
        }
        if let Some(r) = refined {
            base = [r[0] * 2, r[1] * 2, r[2] * 2];
        }
    }
    hierarchy
}

/// The same blocks with owners dealt round-robin over `ranks`.
pub fn deal_to_ranks(hierarchy: &AmrHierarchy, ranks: usize) -> AmrHierarchy {
    hierarchy
        .blocks()
        .iter()
        .enumerate()
        .map(|(i, b)| b.clone().with_owner(i % ranks))
        .collect()
}

/// Polygons as lists of exact point coordinates, sorted, for comparing
/// meshes independently of point numbering.
pub fn canonical_polygons(mesh: &ContourMesh) -> Vec<Vec<[u64; 3]>> {
    let mut polygons: Vec<Vec<[u64; 3]>> = mesh
        .polygons()
        .map(|polygon| {
            polygon
                .iter()
                .map(|&i| {
                    let p = mesh.points[i as usize];
                    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
                })
                .collect()
        })
        .collect();
    polygons.sort();
    polygons
}
