//! Fragment labeling: connected components of the contour across ranks.
//!
//! Locally, polygons that share a point (or a point position, up to the
//! quantum) belong to one fragment. Fragments that continue on another rank
//! meet there along open edges; the points of those edges are all-gathered as
//! quantized position keys and fragments with a common key are joined. Every
//! rank derives the same global numbering from the gathered data.

use bytemuck::{Pod, Zeroable};
use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::debug;

use crate::comm::Communicator;
use crate::error::{ContourError, ContourResult};
use crate::mesh::ContourMesh;

/// Open-edge point of a local fragment, as sent to every rank.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentRecord {
    /// Quantized position.
    pub key: [i64; 3],
    /// Local fragment id on the sending rank.
    pub fragment: u32,
    pub _pad: u32,
}

impl FragmentRecord {
    pub const SIZE: usize = std::mem::size_of::<FragmentRecord>();
}

/// Union-find with the smaller index as root.
#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<u32>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi as usize] = lo;
        }
    }
}

fn quantize(p: &Point3<f64>, origin: &Point3<f64>, quantum: f64) -> [i64; 3] {
    let rel = p - origin;
    [
        (rel.x / quantum).round() as i64,
        (rel.y / quantum).round() as i64,
        (rel.z / quantum).round() as i64,
    ]
}

/// Label every polygon of `mesh` with a fragment id and return the number of
/// fragments.
///
/// Collective: every rank of `comm` must call it for the same iso-value.
/// Positions are compared after rounding to multiples of `quantum` relative
/// to `origin`.
///
/// # Errors
/// [`ContourError::Communication`] when the gather fails or a payload is
/// malformed.
pub fn label_fragments(
    mesh: &mut ContourMesh,
    comm: &mut dyn Communicator,
    origin: Point3<f64>,
    quantum: f64,
) -> ContourResult<usize> {
    let keys: Vec<[i64; 3]> = mesh
        .points
        .iter()
        .map(|p| quantize(p, &origin, quantum))
        .collect();

    let mut points = DisjointSet::new(mesh.point_count());
    let mut first_at: HashMap<[i64; 3], u32> = HashMap::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let first = *first_at.entry(*key).or_insert(i as u32);
        points.union(first, i as u32);
    }
    for polygon in mesh.polygons() {
        for pair in polygon.windows(2) {
            points.union(pair[0], pair[1]);
        }
    }

    // local ids in polygon order
    let mut local_of_root: HashMap<u32, u32> = HashMap::new();
    let mut local_ids = Vec::with_capacity(mesh.polygon_count());
    for polygon in mesh.polygons() {
        let Some(&first) = polygon.first() else {
            local_ids.push(0);
            continue;
        };
        let root = points.find(first);
        let next = local_of_root.len() as u32;
        local_ids.push(*local_of_root.entry(root).or_insert(next));
    }
    let local_count = local_of_root.len();

    if comm.size() <= 1 {
        mesh.fragment_ids = Some(local_ids);
        return Ok(local_count);
    }

    // open-edge points of every local fragment
    let mut records: Vec<FragmentRecord> = Vec::new();
    let mut seen: HashSet<([i64; 3], u32)> = HashSet::new();
    let counts = mesh.edge_use_counts();
    let mut open_points: Vec<u32> = counts
        .iter()
        .filter(|&(_, &c)| c == 1)
        .flat_map(|(&(a, b), _)| [a, b])
        .collect();
    open_points.sort_unstable();
    open_points.dedup();
    for p in open_points {
        let fragment = local_of_root
            .get(&points.find(p))
            .copied()
            .unwrap_or_default();
        let key = keys[p as usize];
        if seen.insert((key, fragment)) {
            records.push(FragmentRecord {
                key,
                fragment,
                _pad: 0,
            });
        }
    }
    records.sort_unstable_by_key(|r| (r.key, r.fragment));

    let mut payload = Vec::with_capacity(8 + records.len() * FragmentRecord::SIZE);
    payload.extend_from_slice(&(local_count as u64).to_le_bytes());
    payload.extend_from_slice(bytemuck::cast_slice(&records));

    let rank = comm.rank();
    let gathered = comm.all_gather(&payload)?;

    let mut offsets = Vec::with_capacity(gathered.len() + 1);
    let mut parsed = Vec::with_capacity(gathered.len());
    offsets.push(0usize);
    for (source, bytes) in gathered.iter().enumerate() {
        let malformed = || {
            ContourError::communication(
                rank,
                format!("malformed fragment payload from rank {}", source),
            )
        };
        if bytes.len() < 8 || (bytes.len() - 8) % FragmentRecord::SIZE != 0 {
            return Err(malformed());
        }
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[..8]);
        let count = u64::from_le_bytes(count_bytes) as usize;
        let remote: Vec<FragmentRecord> = bytes[8..]
            .chunks_exact(FragmentRecord::SIZE)
            .map(bytemuck::pod_read_unaligned::<FragmentRecord>)
            .collect();
        if remote.iter().any(|r| r.fragment as usize >= count) {
            return Err(malformed());
        }
        let base = offsets[source];
        offsets.push(base + count);
        parsed.push(remote);
    }

    let total = offsets[gathered.len()];
    let mut global = DisjointSet::new(total);
    let mut owner_of_key: HashMap<[i64; 3], u32> = HashMap::new();
    for (source, remote) in parsed.iter().enumerate() {
        for record in remote {
            let node = (offsets[source] + record.fragment as usize) as u32;
            let first = *owner_of_key.entry(record.key).or_insert(node);
            global.union(first, node);
        }
    }

    let mut global_of_root: HashMap<u32, u32> = HashMap::new();
    let mut global_ids = Vec::with_capacity(total);
    for node in 0..total as u32 {
        let root = global.find(node);
        let next = global_of_root.len() as u32;
        global_ids.push(*global_of_root.entry(root).or_insert(next));
    }
    let global_count = global_of_root.len();

    let base = offsets[rank];
    mesh.fragment_ids = Some(
        local_ids
            .iter()
            .map(|&local| global_ids[base + local as usize])
            .collect(),
    );

    debug!(
        rank = rank,
        local_fragments = local_count,
        global_fragments = global_count,
        open_points = records.len(),
        "Labeled fragments"
    );
    Ok(global_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{local_group, SingleProcess};
    use crate::mesh::MeshBuilder;

    fn square(builder: &mut MeshBuilder, x0: f64, y0: f64) {
        let ids: Vec<u32> = [
            Point3::new(x0, y0, 0.0),
            Point3::new(x0 + 1.0, y0, 0.0),
            Point3::new(x0 + 1.0, y0 + 1.0, 0.0),
            Point3::new(x0, y0 + 1.0, 0.0),
        ]
        .iter()
        .map(|p| builder.add_point(*p, &[]))
        .collect();
        builder.add_polygon(&ids, 0);
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(FragmentRecord::SIZE, 32);
    }

    #[test]
    fn test_local_labels() {
        let mut builder = MeshBuilder::new(0);
        square(&mut builder, 0.0, 0.0);
        square(&mut builder, 5.0, 0.0);
        // touches the first square along x = 1 without sharing point ids
        square(&mut builder, 1.0, 0.0);
        let mut mesh = builder.finish(0.0, &[]);

        let count =
            label_fragments(&mut mesh, &mut SingleProcess, Point3::origin(), 1e-6).unwrap();
        assert_eq!(count, 2);
        assert_eq!(mesh.fragment_ids, Some(vec![0, 1, 0]));
        assert_eq!(mesh.fragment_count(), Some(2));
    }

    #[test]
    fn test_fragments_joined_across_ranks() {
        // rank 0 holds x in [0, 1], rank 1 holds x in [1, 2] and a far square
        let group = local_group(2);
        let results: Vec<(usize, Vec<u32>)> = std::thread::scope(|s| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|mut comm| {
                    s.spawn(move || {
                        let mut builder = MeshBuilder::new(0);
                        if comm.rank() == 0 {
                            square(&mut builder, 0.0, 0.0);
                        } else {
                            square(&mut builder, 9.0, 9.0);
                            square(&mut builder, 1.0, 0.0);
                        }
                        let mut mesh = builder.finish(0.0, &[]);
                        let count =
                            label_fragments(&mut mesh, &mut comm, Point3::origin(), 1e-6)
                                .unwrap();
                        (count, mesh.fragment_ids.unwrap())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results[0].0, 2);
        assert_eq!(results[1].0, 2);
        assert_eq!(results[0].1, vec![0]);
        assert_eq!(results[1].1, vec![1, 0]);
    }
}
