//! Exact nearest-vertex correspondence without smoothing.
//!
//! Every source vertex is sent to the destination vertex carrying the largest
//! weight in its row of the reverse-direction morph map. The resulting operator
//! is a permutation: each source value lands on exactly one destination vertex.

use tracing::info;

use crate::error::{MorphError, Result};
use crate::mesh::Hemisphere;
use crate::sparse::CsrMatrix;
use crate::store::{read_morph_maps, SubjectStore};

/// Build the nearest-correspondence operator for `vertices_from`.
///
/// Returns the destination vertices per hemisphere, sorted, and a square
/// operator whose row `i` picks the source value mapped onto the `i`-th
/// concatenated destination vertex.
///
/// # Errors
///
/// - [`MorphError::MissingResource`] if the `subject_to -> subject_from` morph
///   maps are unavailable.
/// - [`MorphError::DataShape`] if a source vertex is outside the morph map or
///   has no correspondent at all.
pub fn compute_sparse_morph(
    subject_from: &str,
    subject_to: &str,
    vertices_from: &[Vec<usize>; 2],
    store: &dyn SubjectStore,
) -> Result<([Vec<usize>; 2], CsrMatrix)> {
    info!(subject_from, subject_to, "computing sparse morph");
    let maps = read_morph_maps(store, subject_to, subject_from, false)?;

    let mut vertices: [Vec<usize>; 2] = Default::default();
    let mut cols = Vec::new();
    for hemi in Hemisphere::BOTH {
        let h = hemi.index();
        let map = &maps[h];
        if let Some(&bad) = vertices_from[h].iter().find(|&&v| v >= map.nrows()) {
            return Err(MorphError::shape(format!(
                "{hemi} source vertex {bad} is out of range for a morph map with {} rows",
                map.nrows()
            )));
        }

        let correspondents = map
            .select_rows(&vertices_from[h])
            .row_argmax()
            .into_iter()
            .zip(&vertices_from[h])
            .map(|(best, &v)| {
                best.ok_or_else(|| {
                    MorphError::shape(format!("{hemi} source vertex {v} has no correspondent"))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut order: Vec<usize> = (0..correspondents.len()).collect();
        order.sort_by_key(|&i| correspondents[i]);

        let offset = cols.len();
        cols.extend(order.iter().map(|&i| offset + i));
        vertices[h] = order.iter().map(|&i| correspondents[i]).collect();
    }

    let n = cols.len();
    let triplets = cols.into_iter().enumerate().map(|(row, col)| (row, col, 1.0)).collect();
    Ok((vertices, CsrMatrix::from_triplets(n, n, triplets)))
}
