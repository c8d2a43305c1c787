//! Surface morph algorithms.
//!
//! - **Smoothing**: diffusion of sparse vertex data over the sphere mesh
//! - **Resolution**: icosahedral, explicit or full destination vertex sets
//! - **Assembly**: per-hemisphere smoothing composed into one sparse operator
//! - **Nearest**: exact one-to-one correspondence without smoothing

pub mod assemble;
pub mod nearest;
pub mod resolve;
pub mod smooth;

pub use assemble::compute_morph_matrix;
pub use nearest::compute_sparse_morph;
pub use resolve::{grade_to_vertices, Grade};
pub use smooth::{morph_buffer, morph_vector_buffer, smooth_buffer, SmoothOptions, Smoothed};
