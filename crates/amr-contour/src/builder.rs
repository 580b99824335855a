//! Fluent builder API for contour runs.
//!
//! # Example
//!
//! ```
//! use amr_contour::{AmrBlock, AmrHierarchy, ContourBuilder};
//! use nalgebra::{Point3, Vector3};
//!
//! let n = 4;
//! let values: Vec<f64> = (0..n * n * n).map(|i| (i % 7) as f64 / 7.0).collect();
//! let hierarchy = AmrHierarchy::from_blocks(vec![
//!     AmrBlock::new(0, 0, Point3::origin(), Vector3::repeat(0.5), [n, n, n])
//!         .with_array("vf", values),
//! ]);
//!
//! let output = ContourBuilder::new(&hierarchy, "vf")
//!     .iso_value(0.5)
//!     .watertight()
//!     .label_fragments(true)
//!     .build()
//!     .unwrap();
//! assert_eq!(output.meshes.len(), 1);
//! ```

use crate::comm::{Communicator, SingleProcess};
use crate::contour::{AmrDualContour, ContourOutput};
use crate::error::ContourResult;
use crate::hierarchy::AmrHierarchy;
use crate::params::ContourParams;
use crate::progress::ProgressCallback;

/// Fluent builder for [`AmrDualContour`] runs.
pub struct ContourBuilder<'a> {
    hierarchy: &'a AmrHierarchy,
    params: ContourParams,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> ContourBuilder<'a> {
    /// Start a run contouring `array_name` over `hierarchy`.
    pub fn new(hierarchy: &'a AmrHierarchy, array_name: impl Into<String>) -> Self {
        Self {
            hierarchy,
            params: ContourParams::new(array_name, Vec::new()),
            progress_callback: None,
        }
    }

    /// Replace all parameters except the array name and iso-values.
    pub fn params(mut self, params: ContourParams) -> Self {
        let array_name = std::mem::take(&mut self.params.array_name);
        let iso_values = std::mem::take(&mut self.params.iso_values);
        self.params = ContourParams {
            array_name,
            iso_values,
            ..params
        };
        self
    }

    // =========================================================================
    // Iso-values
    // =========================================================================

    /// Add one iso-value.
    pub fn iso_value(mut self, value: f64) -> Self {
        self.params.iso_values.push(value);
        self
    }

    /// Add several iso-values.
    pub fn iso_values(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.params.iso_values.extend(values);
        self
    }

    // =========================================================================
    // Surface Options
    // =========================================================================

    /// Close the surface at the domain boundary.
    pub fn capping(mut self, enable: bool) -> Self {
        self.params.enable_capping = enable;
        self
    }

    /// Split cap polygons into triangles.
    pub fn triangulate_cap(mut self, enable: bool) -> Self {
        self.params.triangulate_cap = enable;
        self
    }

    /// Snap ghost corners onto coarser neighbors' cell centers.
    pub fn degenerate_cells(mut self, enable: bool) -> Self {
        self.params.enable_degenerate_cells = enable;
        self
    }

    /// Weld coincident points after assembly.
    pub fn merge_points(mut self, enable: bool) -> Self {
        self.params.enable_merge_points = enable;
        self
    }

    /// Merge distance relative to the finest spacing.
    pub fn merge_tolerance(mut self, tolerance: f64) -> Self {
        self.params.merge_tolerance = tolerance;
        self
    }

    /// Label connected components.
    pub fn label_fragments(mut self, enable: bool) -> Self {
        self.params.label_fragments = enable;
        self
    }

    /// Interpolate another cell array onto the output points.
    pub fn interpolate(mut self, array_name: impl Into<String>) -> Self {
        self.params.interpolate_arrays.push(array_name.into());
        self
    }

    // =========================================================================
    // Ghosts and Execution
    // =========================================================================

    /// Exchange ghost values with other ranks.
    pub fn multiprocess_communication(mut self, enable: bool) -> Self {
        self.params.enable_multiprocess_communication = enable;
        self
    }

    /// Trust the ghost layers present in the input.
    pub fn skip_ghost_copy(mut self, enable: bool) -> Self {
        self.params.skip_ghost_copy = enable;
        self
    }

    /// Walk blocks in parallel.
    pub fn parallel(mut self, enable: bool) -> Self {
        self.params.parallel = enable;
        self
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Fast preset: no welding, polygonal caps, parallel walks.
    pub fn fast(mut self) -> Self {
        self.params.enable_merge_points = false;
        self.params.triangulate_cap = false;
        self.params.parallel = true;
        self
    }

    /// Closed, welded triangle mesh.
    pub fn watertight(mut self) -> Self {
        self.params.enable_capping = true;
        self.params.enable_degenerate_cells = true;
        self.params.enable_merge_points = true;
        self.params.triangulate_cap = true;
        self
    }

    // =========================================================================
    // Progress Reporting
    // =========================================================================

    /// Set a progress callback, consulted between blocks.
    ///
    /// Return `false` from the callback to cancel the run.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// The parameters configured so far.
    pub fn current_params(&self) -> &ContourParams {
        &self.params
    }

    /// Run in a single process.
    pub fn build(self) -> ContourResult<ContourOutput> {
        self.build_with(&mut SingleProcess)
    }

    /// Run as one rank of `comm`.
    ///
    /// # Errors
    /// Any [`ContourError`](crate::ContourError) of the run, including
    /// `InvalidParams` for a configuration without iso-values.
    pub fn build_with(self, comm: &mut dyn Communicator) -> ContourResult<ContourOutput> {
        let contour = AmrDualContour::new(self.params)?;
        contour.execute_with_progress(self.hierarchy, comm, self.progress_callback.as_ref())
    }
}
