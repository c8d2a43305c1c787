//! # cortex-morph
//!
//! Morph source-space data from one subject's cortical surface onto another's.
//!
//! Data known on a sparse set of vertices of a subject's registered sphere is
//! spread over the mesh by diffusion smoothing, then resampled through a
//! precomputed morph map onto the destination subject's vertices. The whole
//! pipeline is folded into one sparse operator that is computed once and
//! applied to any number of estimates.
//!
//! ## Features
//!
//! - **Diffusion smoothing**: degree-normalized spreading over the mesh edge graph
//! - **Destination grades**: icosahedral, explicit or full-resolution vertex sets
//! - **Cross-hemisphere morphs** on left-right symmetric subjects
//! - **Nearest-vertex morphs** for exact, unsmoothed correspondence
//! - **Volume morphs** through a pluggable registration backend
//! - **Persistence**: lossless JSON records of precomputed morphs
//!
//! ## Quick Start
//!
//! ```
//! use cortex_morph::prelude::*;
//! use nalgebra::DMatrix;
//!
//! // Spheres and morph maps come from a SubjectStore
//! let sphere = ico_surface(2).unwrap();
//! let store = InMemoryStore::new()
//!     .with_sphere("sample", Hemisphere::Left, sphere.clone())
//!     .with_sphere("sample", Hemisphere::Right, sphere);
//!
//! let vertices = [vec![0, 12, 40], vec![3, 7]];
//! let source = SourceSpace::surface(Some("sample"), vertices.clone());
//! let options = MorphOptions::default()
//!     .with_subject_to("sample")
//!     .with_grade(Grade::Full)
//!     .with_smooth(5)
//!     .with_warn(false);
//! let morph = compute_source_morph(&source, &options, &store, None).unwrap();
//!
//! let stc = SurfaceEstimate::scalar(vertices, DMatrix::from_element(5, 10, 1.0), 0.0, 0.001).unwrap();
//! let Estimate::Surface(morphed) = morph.apply(stc.into()).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(morphed.n_vertices(), 2 * 162);
//! assert_eq!(morphed.n_times(), 10);
//! ```
//!
//! ## Building Blocks
//!
//! The stages are available on their own:
//!
//! ```
//! use cortex_morph::algo::smooth::{smooth_buffer, SmoothOptions};
//! use cortex_morph::prelude::*;
//!
//! let sphere = ico_surface(1).unwrap();
//! let kernel = diffusion_kernel(&sphere);
//!
//! // Spread a unit impulse from vertex 0 over the whole sphere
//! let smoothed = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &SmoothOptions::default()).unwrap();
//! assert_eq!(smoothed.n_uncovered, 0);
//! assert_eq!(smoothed.data.nrows(), 42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;
pub mod morph;
pub mod sparse;
pub mod store;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use cortex_morph::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::{compute_morph_matrix, compute_sparse_morph, grade_to_vertices, Grade};
    pub use crate::error::{MorphError, Result};
    pub use crate::mesh::{diffusion_kernel, ico_surface, mesh_edges, Hemisphere, Surface};
    pub use crate::morph::{
        compute_source_morph, read_source_morph, Estimate, MorphOptions, SourceMorph, SourceSpace,
        SurfaceEstimate, SurfaceMorph, Volume, VolumeEstimate, VolumeMorph, VolumeRegistration,
        VolumeTransform,
    };
    pub use crate::sparse::CsrMatrix;
    pub use crate::store::{InMemoryStore, SubjectStore};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
