//! Mesh edge graph used as the diffusion operator.

use crate::error::{MorphError, Result};
use crate::sparse::CsrMatrix;

use super::Surface;

/// Build the symmetric edge-count matrix of a triangle list.
///
/// Entry `(i, j)` counts how many triangles contain the edge `i-j`, so interior
/// edges of a closed manifold carry 2 and boundary edges carry 1. Repeated
/// vertices inside a triangle do not produce self-loops.
///
/// # Errors
///
/// Returns [`MorphError::InvalidVertexIndex`] if a triangle references a vertex
/// `>= n_vertices`.
pub fn mesh_edges(n_vertices: usize, triangles: &[[usize; 3]]) -> Result<CsrMatrix> {
    for (fi, tri) in triangles.iter().enumerate() {
        if let Some(&bad) = tri.iter().find(|&&v| v >= n_vertices) {
            return Err(MorphError::InvalidVertexIndex { face: fi, vertex: bad });
        }
    }
    Ok(edge_counts(n_vertices, triangles))
}

/// Edge counts of triangles whose indices are all below `n_vertices`.
fn edge_counts(n_vertices: usize, triangles: &[[usize; 3]]) -> CsrMatrix {
    let mut triplets = Vec::with_capacity(triangles.len() * 6);
    for tri in triangles {
        for k in 0..3 {
            let (a, b) = (tri[k], tri[(k + 1) % 3]);
            if a != b {
                triplets.push((a, b, 1.0));
                triplets.push((b, a, 1.0));
            }
        }
    }
    CsrMatrix::from_triplets(n_vertices, n_vertices, triplets)
}

/// Build the one-step diffusion kernel of a surface.
///
/// The edge graph is collapsed to binary weights and every vertex is connected
/// to itself, so row `i` of `kernel * x` sums `x` over vertex `i` and its
/// neighbors.
pub fn diffusion_kernel(surface: &Surface) -> CsrMatrix {
    let n = surface.num_vertices();
    // Surface::new rejects out-of-range triangle indices
    let mut edges = edge_counts(n, surface.triangles());
    edges.binarize();
    edges.add(&CsrMatrix::identity(n))
}
