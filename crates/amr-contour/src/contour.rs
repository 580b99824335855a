//! The AMR dual contour driver.
//!
//! One pass per iso-value:
//!
//! 1. build a [`BlockAdjacencyHelper`] and compute adjacency,
//! 2. pad the local blocks and fill their ghosts (locally, then across ranks),
//! 3. walk every local block, sequentially or with rayon,
//! 4. concatenate the per-block geometry in block order,
//! 5. optionally merge points and label fragments.
//!
//! Any error aborts the run; no partial mesh is returned.

use hashbrown::HashSet;
use rayon::prelude::*;
use tracing::info;

use crate::comm::{Communicator, SingleProcess};
use crate::error::{ContourError, ContourResult, ContourWarning};
use crate::fragments::label_fragments;
use crate::helper::{BlockAdjacencyHelper, ExchangeBuffer, PaddedBlock};
use crate::hierarchy::AmrHierarchy;
use crate::mesh::{ContourMesh, MeshBuilder};
use crate::params::ContourParams;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::tracing_ext::{log_pass, OperationTimer};
use crate::walker::{walk_block, BlockOutput, BlockStats};
use crate::weld::{merge_points, MergeStats};

/// Smallest fragment quantum, relative to the finest spacing.
const MIN_FRAGMENT_QUANTUM: f64 = 1e-9;

/// Statistics of one iso-value pass on this rank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassStats {
    pub iso_value: f64,
    /// Local blocks walked.
    pub blocks: usize,
    /// Walk counters summed over the local blocks.
    pub walk: BlockStats,
    /// Ghost records sent and received in the exchange.
    pub ghost_records_sent: usize,
    pub ghost_records_received: usize,
    /// Point merging, when enabled.
    pub merge: Option<MergeStats>,
    /// Global fragment count, when labeling ran.
    pub fragments: Option<usize>,
    pub elapsed_ms: f64,
}

/// Everything a run produces on this rank.
#[derive(Debug, Clone, Default)]
pub struct ContourOutput {
    /// One mesh per iso-value, in parameter order.
    pub meshes: Vec<ContourMesh>,
    /// One entry per iso-value.
    pub stats: Vec<PassStats>,
    /// Non-fatal issues, at most one per block.
    pub warnings: Vec<ContourWarning>,
}

impl ContourOutput {
    /// Total polygon count over all meshes.
    pub fn total_polygons(&self) -> usize {
        self.meshes.iter().map(|m| m.polygon_count()).sum()
    }

    /// Mesh extracted at `iso_value`, if that value was requested.
    pub fn mesh_for(&self, iso_value: f64) -> Option<&ContourMesh> {
        self.meshes.iter().find(|m| m.iso_value == iso_value)
    }
}

/// Crack-free isosurface extraction over an AMR hierarchy.
///
/// # Example
///
/// ```
/// use amr_contour::{AmrBlock, AmrDualContour, AmrHierarchy, ContourParams, SingleProcess};
/// use nalgebra::{Point3, Vector3};
///
/// let n = 4;
/// let values: Vec<f64> = (0..n * n * n).map(|i| if i == 21 { 1.0 } else { 0.0 }).collect();
/// let block = AmrBlock::new(0, 0, Point3::origin(), Vector3::repeat(1.0), [n, n, n])
///     .with_array("vf", values);
/// let hierarchy = AmrHierarchy::from_blocks(vec![block]);
///
/// let contour = AmrDualContour::new(ContourParams::new("vf", vec![0.5])).unwrap();
/// let output = contour.execute(&hierarchy, &mut SingleProcess).unwrap();
/// assert!(output.meshes[0].is_watertight());
/// ```
#[derive(Debug, Clone)]
pub struct AmrDualContour {
    params: ContourParams,
}

impl AmrDualContour {
    /// Create a contour filter after validating `params`.
    ///
    /// # Errors
    /// [`ContourError::InvalidParams`] when the parameters are rejected.
    pub fn new(params: ContourParams) -> ContourResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The parameters of this filter.
    pub fn params(&self) -> &ContourParams {
        &self.params
    }

    /// Contour `hierarchy` at every iso-value.
    ///
    /// Collective over `comm`: every rank must call it with the same
    /// parameters and the same hierarchy metadata.
    pub fn execute(
        &self,
        hierarchy: &AmrHierarchy,
        comm: &mut dyn Communicator,
    ) -> ContourResult<ContourOutput> {
        self.execute_with_progress(hierarchy, comm, None)
    }

    /// Like [`execute`](Self::execute), reporting progress between blocks.
    ///
    /// # Errors
    /// [`ContourError::Cancelled`] when the callback returns `false`. Other
    /// ranks of a multi-rank run then fail their next exchange.
    pub fn execute_with_progress(
        &self,
        hierarchy: &AmrHierarchy,
        comm: &mut dyn Communicator,
        callback: Option<&ProgressCallback>,
    ) -> ContourResult<ContourOutput> {
        let _timer = OperationTimer::new("amr_dual_contour");
        let rank = comm.rank();
        let local_blocks = hierarchy
            .blocks()
            .iter()
            .filter(|b| b.is_local(rank))
            .count();
        let tracker =
            ProgressTracker::new((local_blocks * self.params.iso_values.len()) as u64);

        let mut output = ContourOutput::default();
        let mut warned: HashSet<usize> = HashSet::new();
        let mut buffer = ExchangeBuffer::new();

        for &iso_value in &self.params.iso_values {
            let (mesh, stats, warnings) =
                self.run_pass(hierarchy, comm, iso_value, &tracker, callback, &mut buffer)?;
            for warning in warnings {
                let ContourWarning::UnsupportedScalarType { block_id, .. } = &warning;
                if warned.insert(*block_id) {
                    output.warnings.push(warning);
                }
            }
            output.meshes.push(mesh);
            output.stats.push(stats);
        }

        info!(
            rank = rank,
            iso_values = self.params.iso_values.len(),
            local_blocks = local_blocks,
            polygons = output.total_polygons(),
            warnings = output.warnings.len(),
            "AMR dual contour finished"
        );
        Ok(output)
    }

    fn run_pass(
        &self,
        hierarchy: &AmrHierarchy,
        comm: &mut dyn Communicator,
        iso_value: f64,
        tracker: &ProgressTracker,
        callback: Option<&ProgressCallback>,
        buffer: &mut ExchangeBuffer,
    ) -> ContourResult<(ContourMesh, PassStats, Vec<ContourWarning>)> {
        let params = &self.params;
        let rank = comm.rank();

        let mut helper = BlockAdjacencyHelper::initialize(hierarchy, &params.array_name, rank)?;
        helper.compute_adjacency();

        let fields = params.field_names();
        let mut padded = helper.pad_local_blocks(&fields, params.skip_ghost_copy)?;
        let timer = OperationTimer::for_pass("contour_pass", iso_value, padded.len());

        let mut stats = PassStats {
            iso_value,
            blocks: padded.len(),
            ..PassStats::default()
        };

        if params.enable_multiprocess_communication && comm.size() > 1 && !params.skip_ghost_copy
        {
            helper.share_ghost_data(&mut padded, &fields, comm, buffer)?;
            stats.ghost_records_sent = buffer.records_sent;
            stats.ghost_records_received = buffer.records_received;
        }

        let outputs = self.walk_blocks(&helper, &padded, iso_value, tracker, callback)?;

        let mut builder = MeshBuilder::new(params.interpolate_arrays.len());
        let mut warnings = Vec::new();
        for block_output in outputs {
            stats.walk.accumulate(&block_output.stats);
            if let Some(warning) = block_output.warning {
                warnings.push(warning);
            }
            builder.append(block_output.builder);
        }
        let mut mesh = builder.finish(iso_value, &params.interpolate_arrays);

        let finest = helper.finest_spacing().min();
        if params.enable_merge_points {
            let epsilon = params.merge_tolerance * finest;
            stats.merge = Some(merge_points(&mut mesh, epsilon));
        }

        if params.label_fragments {
            let quantum = finest * params.merge_tolerance.max(MIN_FRAGMENT_QUANTUM);
            let origin = helper.global_origin();
            let count = if params.enable_multiprocess_communication {
                label_fragments(&mut mesh, comm, origin, quantum)?
            } else {
                label_fragments(&mut mesh, &mut SingleProcess, origin, quantum)?
            };
            stats.fragments = Some(count);
        }

        stats.elapsed_ms = timer.elapsed_ms();
        log_pass(&stats, &mesh);
        Ok((mesh, stats, warnings))
    }

    /// Walk the padded blocks, returning their outputs in block order.
    fn walk_blocks(
        &self,
        helper: &BlockAdjacencyHelper<'_>,
        padded: &[PaddedBlock],
        iso_value: f64,
        tracker: &ProgressTracker,
        callback: Option<&ProgressCallback>,
    ) -> ContourResult<Vec<BlockOutput>> {
        let params = &self.params;
        let options = params.walk_options();
        let geometry = helper.geometry();

        let walk = |block: &PaddedBlock| -> Option<BlockOutput> {
            if !tracker.before_block(callback, iso_value) {
                return None;
            }
            let output = walk_block(
                block,
                helper.meta(block.index),
                geometry,
                &params.array_name,
                iso_value,
                options,
            );
            tracker.block_done();
            Some(output)
        };

        let outputs: Vec<Option<BlockOutput>> = if params.parallel {
            padded.par_iter().map(walk).collect()
        } else {
            let mut outputs = Vec::with_capacity(padded.len());
            for block in padded {
                let output = walk(block);
                let stop = output.is_none();
                outputs.push(output);
                if stop {
                    break;
                }
            }
            outputs
        };

        if tracker.is_cancelled() || outputs.iter().any(Option::is_none) {
            return Err(ContourError::Cancelled {
                completed_blocks: tracker.completed() as usize,
                total_blocks: tracker.total() as usize,
            });
        }
        Ok(outputs.into_iter().flatten().collect())
    }
}
