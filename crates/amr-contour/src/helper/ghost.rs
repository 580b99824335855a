//! Ghost padding and the cross-rank ghost exchange.
//!
//! Every local block is rebuilt with exactly one ghost layer on each side
//! ("padded"). Surplus input ghost layers are dropped, missing ones are
//! synthesized by clamping to the nearest non-ghost cell and then overwritten
//! from whichever block covers the ghost cell:
//!
//! - same level: the matching cell
//! - coarser: the coarse cell containing the ghost cell
//! - finer: the first fine sub-cell
//!
//! Ghost cells covered by a block of another rank are filled through
//! [`BlockAdjacencyHelper::share_ghost_data`].

use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;
use tracing::debug;

use super::{BlockAdjacencyHelper, Neighbor};
use crate::comm::Communicator;
use crate::error::{ContourError, ContourResult};
use crate::voxel::VoxelArray;

/// A local block with exactly one ghost layer, ready to be walked.
#[derive(Debug, Clone)]
pub struct PaddedBlock {
    /// Index of the block in the hierarchy.
    pub index: usize,
    /// Block id, used as polygon provenance.
    pub id: usize,
    /// Padded point counts (non-ghost dims + 2).
    pub dims: [usize; 3],
    /// Padded fields; entry 0 is the contoured scalar.
    pub fields: Vec<VoxelArray>,
}

impl PaddedBlock {
    /// Linear index of padded point `p`.
    #[inline]
    pub fn linear_index(&self, p: [usize; 3]) -> usize {
        p[0] + self.dims[0] * (p[1] + self.dims[1] * p[2])
    }

    /// Total number of padded points.
    #[inline]
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// True for a block without points (never produced by padding).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The contoured scalar.
    #[inline]
    pub fn scalar(&self) -> &VoxelArray {
        &self.fields[0]
    }

    /// Arrays interpolated onto output points.
    #[inline]
    pub fn attributes(&self) -> &[VoxelArray] {
        &self.fields[1..]
    }

    #[inline]
    fn is_ghost(&self, p: [usize; 3]) -> bool {
        (0..3).any(|a| p[a] == 0 || p[a] == self.dims[a] - 1)
    }

    /// Padded coordinates of every ghost point.
    fn ghost_points(dims: [usize; 3]) -> impl Iterator<Item = [usize; 3]> {
        let [nx, ny, nz] = dims;
        (0..nz).flat_map(move |z| {
            (0..ny).flat_map(move |y| {
                (0..nx).filter_map(move |x| {
                    let ghost = x == 0
                        || y == 0
                        || z == 0
                        || x == nx - 1
                        || y == ny - 1
                        || z == nz - 1;
                    ghost.then_some([x, y, z])
                })
            })
        })
    }
}

/// One ghost value sent to the owner of a padded block.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GhostRecord {
    /// Hierarchy index of the receiving block.
    pub block: u32,
    /// Field position (0 = contoured scalar).
    pub field: u32,
    /// Padded linear index within the receiving block.
    pub index: u32,
    pub _pad: u32,
    pub value: f64,
}

impl GhostRecord {
    pub const SIZE: usize = std::mem::size_of::<GhostRecord>();

    /// Decode a payload of packed records.
    pub fn parse(payload: &[u8]) -> Option<Vec<GhostRecord>> {
        if payload.len() % Self::SIZE != 0 {
            return None;
        }
        Some(
            payload
                .chunks_exact(Self::SIZE)
                .map(bytemuck::pod_read_unaligned::<GhostRecord>)
                .collect(),
        )
    }
}

/// Message buffers reused across ghost exchanges.
#[derive(Debug, Default)]
pub struct ExchangeBuffer {
    outgoing: Vec<Vec<u8>>,
    /// Records sent in the last exchange.
    pub records_sent: usize,
    /// Records received in the last exchange.
    pub records_received: usize,
}

impl ExchangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(&mut self, ranks: usize) {
        self.outgoing.resize_with(ranks, Vec::new);
        self.outgoing.truncate(ranks);
        for payload in &mut self.outgoing {
            payload.clear();
        }
        self.records_sent = 0;
        self.records_received = 0;
    }

    fn push(&mut self, rank: usize, record: GhostRecord) {
        self.outgoing[rank].extend_from_slice(bytemuck::bytes_of(&record));
        self.records_sent += 1;
    }

    /// Bytes currently reserved for outgoing payloads.
    pub fn capacity(&self) -> usize {
        self.outgoing.iter().map(Vec::capacity).sum()
    }
}

impl BlockAdjacencyHelper<'_> {
    /// Pad every local block to one ghost layer.
    ///
    /// `fields[0]` is the contoured scalar; the rest are arrays interpolated
    /// onto output points. Unless `skip_ghost_copy` is set, ghost cells are
    /// filled from local blocks covering them; ghost cells covered by remote
    /// blocks keep their clamped value until
    /// [`share_ghost_data`](Self::share_ghost_data) runs.
    ///
    /// # Errors
    /// [`ContourError::MissingArray`] when a local block lacks a field and
    /// [`ContourError::InvalidInput`] when a field has the wrong length.
    pub fn pad_local_blocks(
        &self,
        fields: &[&str],
        skip_ghost_copy: bool,
    ) -> ContourResult<Vec<PaddedBlock>> {
        let blocks = self.hierarchy.blocks();
        let n = self.geometry.block_dims;
        let dims = [n[0] + 2, n[1] + 2, n[2] + 2];
        let mut padded_blocks = Vec::new();
        let mut ghost_copies = 0usize;

        for index in self.local_blocks() {
            let block = &blocks[index];
            let mut padded = PaddedBlock {
                index,
                id: block.id,
                dims,
                fields: Vec::with_capacity(fields.len()),
            };

            for &name in fields {
                let source = block
                    .array(name)
                    .ok_or_else(|| ContourError::missing_array(name, block.id))?;
                if source.len() != block.array_len() {
                    return Err(ContourError::invalid_input(format!(
                        "array '{}' on block {} has {} values, expected {}",
                        name,
                        block.id,
                        source.len(),
                        block.array_len()
                    )));
                }

                let mut field = source.zeroed_like(padded.len());
                for z in 0..dims[2] {
                    for y in 0..dims[1] {
                        for x in 0..dims[0] {
                            let p = [x, y, z];
                            let mut cell = [0i64; 3];
                            for axis in 0..3 {
                                let c = p[axis] as i64 - 1;
                                // keep input ghosts, clamp where the input has none
                                let lo = -(block.ghost[axis][0] as i64);
                                let hi = n[axis] as i64 + block.ghost[axis][1] as i64 - 1;
                                cell[axis] = c.clamp(lo.max(-1), hi);
                            }
                            if let Some(value) = block.array_index(cell).and_then(|i| source.get(i)) {
                                field.set(padded.linear_index(p), value);
                            }
                        }
                    }
                }
                padded.fields.push(field);
            }

            if !skip_ghost_copy {
                ghost_copies += self.copy_local_ghosts(&mut padded, fields);
            }
            padded_blocks.push(padded);
        }

        debug!(
            blocks = padded_blocks.len(),
            ghost_copies = ghost_copies,
            skip_ghost_copy = skip_ghost_copy,
            "Padded local blocks"
        );
        Ok(padded_blocks)
    }

    /// Overwrite ghost points with values from local blocks covering them.
    fn copy_local_ghosts(&self, padded: &mut PaddedBlock, fields: &[&str]) -> usize {
        let blocks = self.hierarchy.blocks();
        let meta = &self.metas[padded.index];
        let mut copies = 0;

        for p in PaddedBlock::ghost_points(padded.dims) {
            let Some(found) = self.locate(meta.level, global_cell(meta.origin_index, p)) else {
                continue;
            };
            let source = &blocks[found.block];
            if !source.is_local(self.rank) || found.block == padded.index {
                continue;
            }
            let Some(source_index) = source.array_index(found.cell) else {
                continue;
            };
            let target = padded.linear_index(p);
            for (slot, &name) in fields.iter().enumerate() {
                if let Some(value) = source.array(name).and_then(|a| a.get(source_index)) {
                    padded.fields[slot].set(target, value);
                }
            }
            copies += 1;
        }
        copies
    }

    /// Narrow a record field to the 32 bits of the wire format.
    fn record_field(&self, value: usize, what: &str) -> ContourResult<u32> {
        u32::try_from(value).map_err(|_| {
            ContourError::communication(
                self.rank,
                format!("{} {} does not fit a ghost record", what, value),
            )
        })
    }

    /// Collective exchange of ghost values with the other ranks.
    ///
    /// Every rank sends, for each remote block touching one of its local
    /// blocks, the values of that block's ghost points it covers; it then
    /// writes what it receives into its own padded blocks. Must be called by
    /// every rank of `comm`, the same number of times.
    ///
    /// # Errors
    /// [`ContourError::Communication`] when the exchange fails or a received
    /// record does not address a local padded block, or when a block or
    /// point index does not fit the 32-bit record fields.
    pub fn share_ghost_data(
        &self,
        padded_blocks: &mut [PaddedBlock],
        fields: &[&str],
        comm: &mut dyn Communicator,
        buffer: &mut ExchangeBuffer,
    ) -> ContourResult<usize> {
        let blocks = self.hierarchy.blocks();
        buffer.prepare(comm.size());

        for (remote, meta) in self.metas.iter().enumerate() {
            if meta.owner == self.rank || meta.owner >= comm.size() {
                continue;
            }
            let touches_local = meta.neighbors.iter().any(|n| match *n {
                Neighbor::Same(b) | Neighbor::Coarser { block: b, .. } => {
                    blocks[b].is_local(self.rank)
                }
                _ => false,
            }) || self.touches_local_finer(remote);
            if !touches_local {
                continue;
            }

            let block = self.record_field(remote, "block index")?;
            let n = self.geometry.block_dims;
            let dims = [n[0] + 2, n[1] + 2, n[2] + 2];
            for p in PaddedBlock::ghost_points(dims) {
                let Some(found) = self.locate(meta.level, global_cell(meta.origin_index, p)) else {
                    continue;
                };
                let source = &blocks[found.block];
                if !source.is_local(self.rank) {
                    continue;
                }
                let Some(source_index) = source.array_index(found.cell) else {
                    continue;
                };
                let index =
                    self.record_field(p[0] + dims[0] * (p[1] + dims[1] * p[2]), "ghost index")?;
                for (field, &name) in fields.iter().enumerate() {
                    let Some(value) = source.array(name).and_then(|a| a.get(source_index)) else {
                        continue;
                    };
                    buffer.push(
                        meta.owner,
                        GhostRecord {
                            block,
                            field: self.record_field(field, "field index")?,
                            index,
                            _pad: 0,
                            value,
                        },
                    );
                }
            }
        }

        let incoming = comm.exchange(&buffer.outgoing)?;

        let slots: HashMap<usize, usize> = padded_blocks
            .iter()
            .enumerate()
            .map(|(slot, b)| (b.index, slot))
            .collect();

        for (source_rank, payload) in incoming.iter().enumerate() {
            if source_rank == self.rank {
                continue;
            }
            let records = GhostRecord::parse(payload).ok_or_else(|| {
                ContourError::communication(
                    self.rank,
                    format!(
                        "payload of {} bytes from rank {} is not a whole number of ghost records",
                        payload.len(),
                        source_rank
                    ),
                )
            })?;
            for record in records {
                let target = slots
                    .get(&(record.block as usize))
                    .and_then(|&slot| padded_blocks.get_mut(slot))
                    .filter(|b| {
                        (record.field as usize) < b.fields.len()
                            && (record.index as usize) < b.len()
                            && b.is_ghost(b.unlinear(record.index as usize))
                    })
                    .ok_or_else(|| {
                        ContourError::communication(
                            self.rank,
                            format!(
                                "rank {} sent a ghost record for block {} field {} index {} not held here",
                                source_rank, record.block, record.field, record.index
                            ),
                        )
                    })?;
                target.fields[record.field as usize].set(record.index as usize, record.value);
                buffer.records_received += 1;
            }
        }

        debug!(
            rank = self.rank,
            sent = buffer.records_sent,
            received = buffer.records_received,
            "Shared ghost data"
        );
        Ok(buffer.records_received)
    }

    /// True if a remote block touches a local block that is finer than it.
    fn touches_local_finer(&self, remote: usize) -> bool {
        let meta = &self.metas[remote];
        if !meta.neighbors.contains(&Neighbor::Finer) {
            return false;
        }
        let blocks = self.hierarchy.blocks();
        self.metas.iter().enumerate().any(|(i, other)| {
            blocks[i].is_local(self.rank)
                && other.neighbors.iter().any(
                    |n| matches!(*n, Neighbor::Coarser { block, .. } if block == remote),
                )
        })
    }
}

impl PaddedBlock {
    #[inline]
    fn unlinear(&self, index: usize) -> [usize; 3] {
        let x = index % self.dims[0];
        let y = (index / self.dims[0]) % self.dims[1];
        let z = index / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }
}

/// Global cell of padded point `p` for a block starting at `origin_index`.
#[inline]
pub(crate) fn global_cell(origin_index: [i64; 3], p: [usize; 3]) -> [i64; 3] {
    [
        origin_index[0] + p[0] as i64 - 1,
        origin_index[1] + p[1] as i64 - 1,
        origin_index[2] + p[2] as i64 - 1,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcess;
    use crate::hierarchy::{AmrBlock, AmrHierarchy};
    use nalgebra::{Point3, Vector3};

    /// Two blocks side by side along x; cell value = global x index.
    fn pair(owner_b: usize) -> AmrHierarchy {
        let make = |id: usize, gx: i64, owner: usize| {
            let mut values = Vec::new();
            for _z in 0..2 {
                for _y in 0..2 {
                    for x in 0..2 {
                        values.push((gx * 2 + x) as f64);
                    }
                }
            }
            AmrBlock::new(
                id,
                0,
                Point3::new(gx as f64 * 2.0, 0.0, 0.0),
                Vector3::repeat(1.0),
                [2, 2, 2],
            )
            .with_owner(owner)
            .with_array("f", values)
        };
        AmrHierarchy::from_blocks(vec![make(0, 0, 0), make(1, 1, owner_b)])
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(GhostRecord::SIZE, 24);
        let record = GhostRecord {
            block: 3,
            field: 1,
            index: 42,
            _pad: 0,
            value: -2.5,
        };
        let bytes = bytemuck::bytes_of(&record).to_vec();
        assert_eq!(GhostRecord::parse(&bytes), Some(vec![record]));
        assert_eq!(GhostRecord::parse(&bytes[..23]), None);
    }

    #[test]
    fn test_padding_clamps_without_neighbors() {
        let hierarchy = pair(0);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let padded = helper.pad_local_blocks(&["f"], true).unwrap();
        assert_eq!(padded.len(), 2);
        let b = &padded[0];
        assert_eq!(b.dims, [4, 4, 4]);
        // clamped low ghost repeats the first cell, high ghost the last
        assert_eq!(b.scalar().get(b.linear_index([0, 1, 1])), Some(0.0));
        assert_eq!(b.scalar().get(b.linear_index([3, 1, 1])), Some(1.0));
    }

    #[test]
    fn test_local_ghost_copy() {
        let hierarchy = pair(0);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let padded = helper.pad_local_blocks(&["f"], false).unwrap();
        let a = &padded[0];
        let b = &padded[1];
        // block 0's high ghost is block 1's first cell, and vice versa
        assert_eq!(a.scalar().get(a.linear_index([3, 1, 1])), Some(2.0));
        assert_eq!(b.scalar().get(b.linear_index([0, 1, 1])), Some(1.0));
    }

    #[test]
    fn test_exchange_with_single_process_is_noop() {
        let hierarchy = pair(0);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let mut padded = helper.pad_local_blocks(&["f"], false).unwrap();
        let mut buffer = ExchangeBuffer::new();
        let received = helper
            .share_ghost_data(&mut padded, &["f"], &mut SingleProcess, &mut buffer)
            .unwrap();
        assert_eq!(received, 0);
        assert_eq!(buffer.records_sent, 0);
    }

    #[test]
    fn test_exchange_between_two_ranks() {
        let hierarchy = pair(1);
        let views = [hierarchy.view_for_rank(0), hierarchy.view_for_rank(1)];
        let group = crate::comm::local_group(2);

        let results: Vec<Vec<PaddedBlock>> = std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .into_iter()
                .zip(views.iter())
                .map(|(mut comm, view)| {
                    scope.spawn(move || {
                        let mut helper =
                            BlockAdjacencyHelper::initialize(view, "f", comm.rank()).unwrap();
                        helper.compute_adjacency();
                        let mut padded = helper.pad_local_blocks(&["f"], false).unwrap();
                        let mut buffer = ExchangeBuffer::new();
                        helper
                            .share_ghost_data(&mut padded, &["f"], &mut comm, &mut buffer)
                            .unwrap();
                        padded
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let a = &results[0][0];
        let b = &results[1][0];
        assert_eq!(a.scalar().get(a.linear_index([3, 1, 1])), Some(2.0));
        assert_eq!(b.scalar().get(b.linear_index([0, 1, 1])), Some(1.0));
    }

    #[test]
    fn test_malformed_record_is_communication_error() {
        struct Garbage;
        impl Communicator for Garbage {
            fn rank(&self) -> usize {
                0
            }
            fn size(&self) -> usize {
                2
            }
            fn exchange(&mut self, _outgoing: &[Vec<u8>]) -> ContourResult<Vec<Vec<u8>>> {
                Ok(vec![Vec::new(), vec![1, 2, 3]])
            }
        }

        let hierarchy = pair(1).view_for_rank(0);
        let mut helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        helper.compute_adjacency();
        let mut padded = helper.pad_local_blocks(&["f"], false).unwrap();
        let err = helper
            .share_ghost_data(&mut padded, &["f"], &mut Garbage, &mut ExchangeBuffer::new())
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Communication);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_record_field_is_communication_error() {
        let hierarchy = pair(0);
        let helper = BlockAdjacencyHelper::initialize(&hierarchy, "f", 0).unwrap();
        assert_eq!(helper.record_field(7, "block index").unwrap(), 7);
        assert_eq!(
            helper.record_field(u32::MAX as usize, "ghost index").unwrap(),
            u32::MAX
        );
        let err = helper
            .record_field(u32::MAX as usize + 1, "ghost index")
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Communication);
    }
}
