//! Point merging for assembled contour meshes.
//!
//! Blocks never share point ids, so points on block seams and points collapsed
//! by degenerate snapping exist several times. [`merge_points`] welds them with
//! a spatial hash, drops polygons that collapse below three distinct points and
//! compacts the point arrays.

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::info;

use crate::mesh::ContourMesh;

/// What [`merge_points`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Points folded into another point.
    pub merged_points: usize,
    /// Points no longer referenced after welding and dropped.
    pub removed_points: usize,
    /// Polygons left with fewer than three distinct points.
    pub removed_polygons: usize,
}

fn pos_to_cell(p: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (p.x / cell_size).floor() as i64,
        (p.y / cell_size).floor() as i64,
        (p.z / cell_size).floor() as i64,
    )
}

/// Weld points closer than `epsilon` and clean up what collapses.
///
/// Each point is folded into the smallest-index point of its cluster, so the
/// result does not depend on hash order. Block and fragment ids stay aligned
/// with the surviving polygons.
pub fn merge_points(mesh: &mut ContourMesh, epsilon: f64) -> MergeStats {
    let original_points = mesh.points.len();
    let original_polygons = mesh.polygon_count();
    if original_points == 0 || epsilon.is_nan() || epsilon <= 0.0 {
        return MergeStats::default();
    }

    let cell_size = epsilon * 2.0;
    let mut spatial_hash: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, p) in mesh.points.iter().enumerate() {
        spatial_hash
            .entry(pos_to_cell(p, cell_size))
            .or_default()
            .push(idx as u32);
    }

    let mut remap: Vec<u32> = (0..original_points as u32).collect();
    let mut merged_points = 0;

    for (idx, p) in mesh.points.iter().enumerate() {
        let idx = idx as u32;
        if remap[idx as usize] != idx {
            continue;
        }
        let cell = pos_to_cell(p, cell_size);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) = spatial_hash.get(&(cell.0 + dx, cell.1 + dy, cell.2 + dz))
                    else {
                        continue;
                    };
                    for &other in candidates {
                        if other <= idx || remap[other as usize] != other {
                            continue;
                        }
                        if (p - mesh.points[other as usize]).norm() < epsilon {
                            remap[other as usize] = idx;
                            merged_points += 1;
                        }
                    }
                }
            }
        }
    }

    for i in 0..remap.len() {
        let mut target = remap[i];
        while remap[target as usize] != target {
            target = remap[target as usize];
        }
        remap[i] = target;
    }

    // rebuild polygons without repeated points
    let mut offsets = Vec::with_capacity(mesh.offsets.len());
    let mut connectivity = Vec::with_capacity(mesh.connectivity.len());
    let mut block_ids = Vec::with_capacity(original_polygons);
    let mut fragment_ids = mesh
        .fragment_ids
        .as_ref()
        .map(|ids| Vec::with_capacity(ids.len()));
    let mut ring: Vec<u32> = Vec::with_capacity(8);
    offsets.push(0u32);

    for i in 0..original_polygons {
        ring.clear();
        for &p in mesh.polygon(i) {
            let p = remap[p as usize];
            if ring.last() != Some(&p) {
                ring.push(p);
            }
        }
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            continue;
        }
        connectivity.extend_from_slice(&ring);
        offsets.push(connectivity.len() as u32);
        block_ids.push(mesh.block_ids[i]);
        if let (Some(out), Some(ids)) = (fragment_ids.as_mut(), mesh.fragment_ids.as_ref()) {
            out.push(ids[i]);
        }
    }

    // compact referenced points, keeping their original order
    let mut compact = vec![u32::MAX; original_points];
    for &p in &connectivity {
        compact[p as usize] = 0;
    }
    let mut kept = 0u32;
    for slot in compact.iter_mut() {
        if *slot == 0 {
            *slot = kept;
            kept += 1;
        }
    }
    for p in connectivity.iter_mut() {
        *p = compact[*p as usize];
    }

    let keep = |i: usize| compact[i] != u32::MAX;
    mesh.points = mesh
        .points
        .iter()
        .enumerate()
        .filter(|&(i, _)| keep(i))
        .map(|(_, p)| *p)
        .collect();
    for array in &mut mesh.point_data {
        array.values = array
            .values
            .iter()
            .enumerate()
            .filter(|&(i, _)| keep(i))
            .map(|(_, v)| *v)
            .collect();
    }

    mesh.offsets = offsets;
    mesh.connectivity = connectivity;
    mesh.block_ids = block_ids;
    mesh.fragment_ids = fragment_ids;

    let stats = MergeStats {
        merged_points,
        removed_points: original_points - mesh.points.len() - merged_points,
        removed_polygons: original_polygons - mesh.polygon_count(),
    };

    info!(
        merged = stats.merged_points,
        removed_polygons = stats.removed_polygons,
        "Merged points (epsilon = {:.3e}): {} → {}",
        epsilon,
        original_points,
        mesh.points.len()
    );

    stats
}
