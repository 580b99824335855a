//! Logging helpers for contour runs.
//!
//! The crate logs through `tracing` and never installs a subscriber. Enable
//! output in an application with, for example:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=amr_contour=debug for adjacency and exchange summaries
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: Blocks skipped because of an unsupported voxel type
//! - **INFO**: Pass summaries, point merging, timing
//! - **DEBUG**: Adjacency, padding, exchange, fragment and mesh extent summaries
//! - **TRACE**: Per-block walk statistics

use std::time::Instant;

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::contour::PassStats;
use crate::mesh::ContourMesh;

/// Logs the elapsed time of an operation under `amr_contour::timing` when
/// dropped.
///
/// ```rust,ignore
/// let _timer = OperationTimer::new("amr_dual_contour");
/// // ... run every pass ...
/// // elapsed time is logged here
/// ```
pub struct OperationTimer {
    name: &'static str,
    iso_value: Option<f64>,
    start: Instant,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        debug!(target: "amr_contour::timing", operation = name, "Starting operation");
        Self {
            name,
            iso_value: None,
            start: Instant::now(),
        }
    }

    /// Timer for the pass at `iso_value` over `blocks` local blocks.
    pub fn for_pass(name: &'static str, iso_value: f64, blocks: usize) -> Self {
        debug!(
            target: "amr_contour::timing",
            operation = name,
            iso_value = iso_value,
            blocks = blocks,
            "Starting operation"
        );
        Self {
            name,
            iso_value: Some(iso_value),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "amr_contour::timing",
            operation = self.name,
            iso_value = ?self.iso_value,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log the outcome of one iso-value pass: a summary at INFO and the mesh
/// extent at DEBUG.
pub fn log_pass(stats: &PassStats, mesh: &ContourMesh) {
    info!(
        target: "amr_contour::pass",
        iso_value = stats.iso_value,
        blocks = stats.blocks,
        cells = stats.walk.cells_contoured,
        cap_polygons = stats.walk.cap_polygons,
        polygons = mesh.polygon_count(),
        points = mesh.point_count(),
        fragments = ?stats.fragments,
        elapsed_ms = format!("{:.2}", stats.elapsed_ms),
        "Contour pass completed"
    );

    let extent = mesh
        .bounds()
        .map(|(min, max)| max - min)
        .unwrap_or_else(Vector3::zeros);
    debug!(
        target: "amr_contour::mesh_state",
        iso_value = mesh.iso_value,
        extent = format!("{:.3} x {:.3} x {:.3}", extent.x, extent.y, extent.z),
        "Mesh extent"
    );
}
