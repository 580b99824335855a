//! Crack-free isosurface extraction over block-structured AMR data.
//!
//! This crate contours a cell-centered scalar field (typically a volume
//! fraction) stored on the blocks of an adaptive mesh refinement hierarchy.
//! Every block is padded with one ghost layer and contoured on its dual grid,
//! so surfaces stay continuous across block faces, across refinement levels
//! and across processes.
//!
//! # Features
//!
//! - **Dual-grid marching cubes**: one surface per iso-value over all blocks
//! - **Level transitions**: ghost corners facing a coarser block snap onto the
//!   coarse cell centers, closing the cracks between levels
//! - **Ownership**: cells shared by several blocks are emitted exactly once
//! - **Capping**: the surface is closed where it leaves the domain
//! - **Distributed runs**: ghost values and fragment labels are exchanged
//!   through a [`Communicator`]
//! - **Post-processing**: point merging, fragment labeling and interpolation
//!   of additional cell arrays onto the output points
//!
//! # Coordinate System
//!
//! Blocks share one physical frame. A block covers `dims` cells from its
//! `origin`, the low corner of its first non-ghost cell. Level `l + 1` halves
//! the spacing of level `l`. Polygons wind counter-clockwise when viewed from
//! the side where the scalar is below the iso-value.
//!
//! # Quick Start
//!
//! ```
//! use amr_contour::{AmrBlock, AmrDualContour, AmrHierarchy, ContourParams, SingleProcess};
//! use nalgebra::{Point3, Vector3};
//!
//! // 4^3 cells with a single full cell in the middle
//! let n = 4;
//! let mut values = vec![0.0f64; n * n * n];
//! values[1 + n * (1 + n)] = 1.0;
//!
//! let hierarchy = AmrHierarchy::from_blocks(vec![
//!     AmrBlock::new(0, 0, Point3::origin(), Vector3::repeat(1.0), [n, n, n])
//!         .with_array("volume_fraction", values),
//! ]);
//!
//! let contour = AmrDualContour::new(ContourParams::new("volume_fraction", vec![0.5])).unwrap();
//! let output = contour.execute(&hierarchy, &mut SingleProcess).unwrap();
//!
//! let mesh = &output.meshes[0];
//! assert!(mesh.is_watertight());
//! println!("{}", mesh.report());
//! ```
//!
//! # Builder API
//!
//! ```
//! use amr_contour::{AmrBlock, AmrHierarchy, ContourBuilder};
//! use nalgebra::{Point3, Vector3};
//!
//! let n = 4;
//! let hierarchy = AmrHierarchy::from_blocks(vec![
//!     AmrBlock::new(0, 0, Point3::origin(), Vector3::repeat(1.0), [n, n, n])
//!         .with_array("vf", vec![1.0f32; n * n * n]),
//! ]);
//!
//! let output = ContourBuilder::new(&hierarchy, "vf")
//!     .iso_value(0.5)
//!     .watertight()
//!     .label_fragments(true)
//!     .build()
//!     .unwrap();
//!
//! // a full domain produces a closed box made of caps only
//! assert_eq!(output.meshes[0].fragment_count(), Some(1));
//! ```
//!
//! # Error Handling
//!
//! Runs return `ContourResult<T>`, which is `Result<T, ContourError>`. Blocks
//! whose scalar type cannot be contoured are skipped and reported as
//! [`ContourWarning`]s instead.
//!
//! ```
//! use amr_contour::{AmrDualContour, AmrHierarchy, ContourError, ContourParams, SingleProcess};
//!
//! let contour = AmrDualContour::new(ContourParams::new("vf", vec![0.5])).unwrap();
//! match contour.execute(&AmrHierarchy::new(), &mut SingleProcess) {
//!     Err(ContourError::InvalidInput { details }) => println!("bad input: {}", details),
//!     Err(e) => println!("{} ({})", e, e.recovery_suggestion()),
//!     Ok(_) => unreachable!(),
//! }
//! ```
//!
//! # Distributed Runs
//!
//! Every rank lists every block but only holds the arrays of the blocks it
//! owns. [`AmrDualContour::execute`] is collective: all ranks call it with the
//! same parameters. [`local_group`] provides an in-process communicator for
//! running several ranks on threads.

mod builder;
mod cap;
mod contour;
mod error;
mod triangulate;
mod voxel;

pub mod comm;
pub mod fragments;
pub mod helper;
pub mod hierarchy;
pub mod mesh;
pub mod params;
pub mod progress;
pub mod tables;
pub mod tracing_ext;
pub mod walker;
pub mod weld;

// Re-export core types at crate root
pub use error::{ContourError, ContourResult, ContourWarning, ErrorCode, RecoverySuggestion};
pub use hierarchy::{AmrBlock, AmrHierarchy, CellData};
pub use mesh::{ContourMesh, MeshBuilder, MeshReport, PointArray};
pub use voxel::{Voxel, VoxelArray};

pub use comm::{local_group, Communicator, LocalCommunicator, SingleProcess};
pub use helper::BlockAdjacencyHelper;

// Contouring
pub use contour::{AmrDualContour, ContourOutput, PassStats};
pub use params::ContourParams;
pub use triangulate::{case_index, interpolation_factor};
pub use walker::{walk_block, BlockOutput, BlockStats, WalkOptions};

// Post-processing
pub use fragments::label_fragments;
pub use weld::{merge_points, MergeStats};

// Builder API
pub use builder::ContourBuilder;
