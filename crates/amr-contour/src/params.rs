//! Contour parameters and presets.

use serde::{Deserialize, Serialize};

use crate::error::{ContourError, ContourResult};
use crate::walker::WalkOptions;

/// Parameters of an AMR contour run.
///
/// # Example
///
/// ```
/// use amr_contour::ContourParams;
///
/// let params = ContourParams {
///     enable_merge_points: false,
///     ..ContourParams::new("volume_fraction", vec![0.5])
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    /// Name of the cell array to contour.
    pub array_name: String,

    /// Iso-values; each produces its own mesh.
    pub iso_values: Vec<f64>,

    /// Close the surface where it leaves the domain.
    ///
    /// Default: `true`
    pub enable_capping: bool,

    /// Snap ghost corners facing a coarser neighbor onto the coarse cell
    /// centers, so that surfaces meet without cracks at level transitions.
    ///
    /// Default: `true`
    pub enable_degenerate_cells: bool,

    /// Exchange ghost values with blocks owned by other ranks.
    ///
    /// Must be set identically on every rank.
    ///
    /// Default: `true`
    pub enable_multiprocess_communication: bool,

    /// Weld coincident points after assembly.
    ///
    /// Default: `true`
    pub enable_merge_points: bool,

    /// Split cap polygons into triangles.
    ///
    /// Default: `true`
    pub triangulate_cap: bool,

    /// Use the ghost values present in the input instead of copying them
    /// from neighbor blocks. Also skips the cross-rank ghost exchange.
    ///
    /// Default: `false`
    pub skip_ghost_copy: bool,

    /// Label connected components of every mesh.
    ///
    /// Default: `false`
    pub label_fragments: bool,

    /// Cell arrays interpolated onto the output points.
    ///
    /// Default: empty
    pub interpolate_arrays: Vec<String>,

    /// Point merge distance, relative to the smallest finest-level spacing.
    ///
    /// Default: `1e-6`
    pub merge_tolerance: f64,

    /// Walk the local blocks of a pass in parallel.
    ///
    /// Default: `false`
    pub parallel: bool,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            array_name: String::new(),
            iso_values: Vec::new(),
            enable_capping: true,
            enable_degenerate_cells: true,
            enable_multiprocess_communication: true,
            enable_merge_points: true,
            triangulate_cap: true,
            skip_ghost_copy: false,
            label_fragments: false,
            interpolate_arrays: Vec::new(),
            merge_tolerance: 1e-6,
            parallel: false,
        }
    }
}

impl ContourParams {
    /// Default parameters for `array_name` at `iso_values`.
    pub fn new(array_name: impl Into<String>, iso_values: Vec<f64>) -> Self {
        Self {
            array_name: array_name.into(),
            iso_values,
            ..Default::default()
        }
    }

    /// Raw surface geometry as fast as possible: no welding, polygonal caps,
    /// blocks walked in parallel.
    pub fn fast(array_name: impl Into<String>, iso_values: Vec<f64>) -> Self {
        Self {
            enable_merge_points: false,
            triangulate_cap: false,
            parallel: true,
            ..Self::new(array_name, iso_values)
        }
    }

    /// A closed, welded triangle mesh.
    pub fn watertight(array_name: impl Into<String>, iso_values: Vec<f64>) -> Self {
        Self {
            enable_capping: true,
            enable_degenerate_cells: true,
            enable_merge_points: true,
            triangulate_cap: true,
            ..Self::new(array_name, iso_values)
        }
    }

    /// Watertight output with fragment labels and parallel block walks.
    pub fn extended(array_name: impl Into<String>, iso_values: Vec<f64>) -> Self {
        Self {
            label_fragments: true,
            parallel: true,
            ..Self::watertight(array_name, iso_values)
        }
    }

    /// Check the parameters before a run.
    ///
    /// # Errors
    /// [`ContourError::InvalidParams`] naming the first offending field.
    pub fn validate(&self) -> ContourResult<()> {
        if self.array_name.is_empty() {
            return Err(ContourError::invalid_params("array_name is empty"));
        }
        if self.iso_values.is_empty() {
            return Err(ContourError::invalid_params("no iso_values given"));
        }
        if let Some(v) = self.iso_values.iter().find(|v| !v.is_finite()) {
            return Err(ContourError::invalid_params(format!(
                "iso value {} is not finite",
                v
            )));
        }
        if !self.merge_tolerance.is_finite() || self.merge_tolerance < 0.0 {
            return Err(ContourError::invalid_params(format!(
                "merge_tolerance must be a finite non-negative number, got {}",
                self.merge_tolerance
            )));
        }
        for (i, name) in self.interpolate_arrays.iter().enumerate() {
            if name.is_empty() {
                return Err(ContourError::invalid_params(
                    "interpolate_arrays contains an empty name",
                ));
            }
            if self.interpolate_arrays[..i].contains(name) {
                return Err(ContourError::invalid_params(format!(
                    "array '{}' is listed twice in interpolate_arrays",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Walker switches derived from these parameters.
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            enable_capping: self.enable_capping,
            enable_degenerate_cells: self.enable_degenerate_cells,
            triangulate_cap: self.triangulate_cap,
        }
    }

    /// Arrays padded per block: the contoured scalar first, then the
    /// interpolated arrays.
    pub fn field_names(&self) -> Vec<&str> {
        std::iter::once(self.array_name.as_str())
            .chain(self.interpolate_arrays.iter().map(String::as_str))
            .collect()
    }

    /// Load parameters from a JSON string. Missing fields take their defaults.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
