//! Morph matrix assembly.
//!
//! Each hemisphere carrying source vertices is smoothed over its sphere and
//! resampled through the morph map onto its destination vertices. The
//! per-hemisphere operators are laid out block-diagonally: rows follow the
//! concatenated destination vertices, columns the concatenated source vertices.

use tracing::info;

use crate::error::{MorphError, Result};
use crate::mesh::{diffusion_kernel, Hemisphere};
use crate::sparse::CsrMatrix;
use crate::store::{read_morph_maps, read_spheres, SubjectStore};

use super::smooth::{morph_buffer, SmoothOptions};

/// Build the sparse operator morphing `vertices_from` of `subject_from` onto
/// `vertices_to` of `subject_to`.
///
/// With `xhemi` set, source hemisphere `h` is morphed onto destination
/// hemisphere `1 - h` through the cross-hemisphere morph maps; its block lands
/// in the rows of that opposite hemisphere. Destination rows of a hemisphere
/// that receives no source data stay zero.
///
/// # Errors
///
/// - [`MorphError::Configuration`] if `xhemi` is set for two different subjects,
///   or the smoothing options are invalid.
/// - [`MorphError::EmptyMorph`] if neither hemisphere has source vertices.
/// - [`MorphError::DataShape`] if source or destination vertices are out of
///   range of the spheres and morph maps.
/// - [`MorphError::MissingResource`] if a sphere or morph map is unavailable.
pub fn compute_morph_matrix(
    subject_from: &str,
    subject_to: &str,
    vertices_from: &[Vec<usize>; 2],
    vertices_to: &[Vec<usize>; 2],
    store: &dyn SubjectStore,
    options: &SmoothOptions,
    xhemi: bool,
) -> Result<CsrMatrix> {
    if xhemi && subject_from != subject_to {
        return Err(MorphError::config(format!(
            "cross-hemisphere morphing needs a symmetric subject, got {subject_from} -> {subject_to}"
        )));
    }
    if vertices_from.iter().all(|v| v.is_empty()) {
        return Err(MorphError::EmptyMorph);
    }
    info!(subject_from, subject_to, xhemi, "computing morph matrix");

    let spheres = read_spheres(store, subject_from)?;
    let maps = read_morph_maps(store, subject_from, subject_to, xhemi)?;

    // Every destination hemisphere is checked, including one no source reaches
    for hemi_to in Hemisphere::BOTH {
        let hemi_from = if xhemi { hemi_to.opposite() } else { hemi_to };
        let map = &maps[hemi_from.index()];
        if let Some(&bad) = vertices_to[hemi_to.index()].iter().find(|&&v| v >= map.nrows()) {
            return Err(MorphError::shape(format!(
                "{hemi_to} destination vertex {bad} is out of range for a morph map with {} rows",
                map.nrows()
            )));
        }
    }

    let row_offsets = [0, vertices_to[0].len()];
    let col_offsets = [0, vertices_from[0].len()];
    let n_rows = vertices_to[0].len() + vertices_to[1].len();
    let n_cols = vertices_from[0].len() + vertices_from[1].len();

    let mut blocks = Vec::with_capacity(2);
    for hemi in Hemisphere::BOTH {
        let h = hemi.index();
        let idx_use = &vertices_from[h];
        if idx_use.is_empty() {
            continue;
        }
        let h_to = if xhemi { hemi.opposite().index() } else { h };

        let kernel = diffusion_kernel(&spheres[h]);
        let block = morph_buffer(
            CsrMatrix::identity(idx_use.len()),
            idx_use,
            &kernel,
            &vertices_to[h_to],
            &maps[h],
            options,
        )?
        .data;
        blocks.push((row_offsets[h_to], col_offsets[h], block));
    }

    let placed: Vec<_> = blocks.iter().map(|(r, c, b)| (*r, *c, b)).collect();
    let morph_mat = CsrMatrix::from_blocks(n_rows, n_cols, &placed);
    info!(rows = n_rows, cols = n_cols, nnz = morph_mat.nnz(), "morph matrix done");
    Ok(morph_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ico_surface, Surface};
    use crate::store::InMemoryStore;

    fn store(subject: &str) -> InMemoryStore {
        let ico = ico_surface(1).unwrap();
        InMemoryStore::new()
            .with_sphere(subject, Hemisphere::Left, ico.clone())
            .with_sphere(subject, Hemisphere::Right, ico)
    }

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_single_pass_over_full_sources_averages_neighbors() {
        let store = store("sample");
        let verts = [all(42), all(42)];
        let opts = SmoothOptions::default().with_smooth(1);
        let m = compute_morph_matrix("sample", "sample", &verts, &verts, &store, &opts, false)
            .unwrap();
        assert_eq!(m.shape(), (84, 84));

        let kernel = diffusion_kernel(&ico_surface(1).unwrap());
        for i in 0..42 {
            let (cols, vals) = m.row(i);
            assert_eq!(cols, kernel.row(i).0);
            let expected = 1.0 / cols.len() as f64;
            assert!(vals.iter().all(|&v| (v - expected).abs() < 1e-12));
            // Right hemisphere block is the same operator shifted
            let shifted: Vec<usize> = m.row(42 + i).0.iter().map(|c| c - 42).collect();
            assert_eq!(shifted, cols);
        }
    }

    #[test]
    fn test_rows_follow_destination_vertices() {
        let store = store("sample");
        let from = [vec![0, 5, 9], vec![1, 2]];
        let to = [all(42), vec![3, 7, 11, 20]];
        let opts = SmoothOptions::default();
        let m = compute_morph_matrix("sample", "sample", &from, &to, &store, &opts, false).unwrap();
        assert_eq!(m.shape(), (46, 5));
        // Hemispheres never share structure
        assert_eq!(m.block_nnz(0..42, 3..5), 0);
        assert_eq!(m.block_nnz(42..46, 0..3), 0);
    }

    #[test]
    fn test_hemisphere_without_sources_gives_zero_rows() {
        let store = store("sample");
        let from = [vec![0, 1, 2], vec![]];
        let to = [all(42), all(42)];
        let opts = SmoothOptions::default().with_warn(false);
        let m = compute_morph_matrix("sample", "sample", &from, &to, &store, &opts, false).unwrap();
        assert_eq!(m.shape(), (84, 3));
        assert_eq!(m.block_nnz(42..84, 0..3), 0);
        assert!(m.block_nnz(0..42, 0..3) > 0);
    }

    #[test]
    fn test_empty_sources() {
        let store = store("sample");
        let verts = [vec![], vec![]];
        let err = compute_morph_matrix(
            "sample",
            "sample",
            &verts,
            &[all(42), all(42)],
            &store,
            &SmoothOptions::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, MorphError::EmptyMorph));
    }

    #[test]
    fn test_xhemi_places_blocks_in_opposite_rows() {
        let ico = ico_surface(1).unwrap();
        let store = store("sym")
            .with_morph_map("sym", "sym", Hemisphere::Left, true, CsrMatrix::identity(42))
            .with_morph_map("sym", "sym", Hemisphere::Right, true, CsrMatrix::identity(42));
        let from = [vec![0, 1, 2], vec![]];
        let to = [vec![4, 5], all(ico.num_vertices())];
        let opts = SmoothOptions::default().with_smooth(2).with_warn(false);
        let m = compute_morph_matrix("sym", "sym", &from, &to, &store, &opts, true).unwrap();
        assert_eq!(m.shape(), (44, 3));
        assert_eq!(m.block_nnz(0..2, 0..3), 0);
        assert!(m.block_nnz(2..44, 0..3) > 0);
    }

    #[test]
    fn test_xhemi_needs_same_subject() {
        let store = store("a");
        let verts = [vec![0], vec![0]];
        let err = compute_morph_matrix("a", "b", &verts, &verts, &store, &SmoothOptions::default(), true)
            .unwrap_err();
        assert!(matches!(err, MorphError::Configuration { .. }));
    }

    #[test]
    fn test_destination_out_of_range() {
        let store = store("sample");
        let from = [vec![0], vec![0]];
        let to = [vec![0, 42], vec![0]];
        let err = compute_morph_matrix(
            "sample",
            "sample",
            &from,
            &to,
            &store,
            &SmoothOptions::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
    }

    #[test]
    fn test_destination_out_of_range_without_sources() {
        let store = store("sample");
        let from = [vec![0, 1], vec![]];
        let to = [vec![0, 1], vec![99_999]];
        let err = compute_morph_matrix(
            "sample",
            "sample",
            &from,
            &to,
            &store,
            &SmoothOptions::default().with_warn(false),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
        assert!(err.to_string().contains("right destination vertex 99999"));
    }

    #[test]
    fn test_xhemi_blocks_use_their_own_maps() {
        // Distinct non-square xhemi maps: left -> right has 3 rows picking
        // vertices 0, 1, 2; right -> left has 2 rows picking vertices 40, 41
        let lh_to_rh = CsrMatrix::from_triplets(3, 42, vec![(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]);
        let rh_to_lh = CsrMatrix::from_triplets(2, 42, vec![(0, 40, 1.0), (1, 41, 1.0)]);
        let store = store("sym")
            .with_morph_map("sym", "sym", Hemisphere::Left, true, lh_to_rh)
            .with_morph_map("sym", "sym", Hemisphere::Right, true, rh_to_lh);
        let from = [vec![0, 1, 2], vec![40, 41]];
        let to = [vec![0, 1], vec![0, 1, 2]];
        let opts = SmoothOptions::default().with_smooth(1).with_warn(false);
        let m = compute_morph_matrix("sym", "sym", &from, &to, &store, &opts, true).unwrap();
        assert_eq!(m.shape(), (5, 5));

        // Left destination rows are fed only by right sources through rh_to_lh
        assert_eq!(m.block_nnz(0..2, 0..3), 0);
        assert!(m.block_nnz(0..2, 3..5) > 0);
        // Right destination rows are fed only by left sources through lh_to_rh
        assert_eq!(m.block_nnz(2..5, 3..5), 0);
        assert!(m.block_nnz(2..5, 0..3) > 0);

        // Each block equals its hemisphere smoothed and resampled on its own
        let kernel = diffusion_kernel(&ico_surface(1).unwrap());
        let rh_block = morph_buffer(
            CsrMatrix::identity(2),
            &[40, 41],
            &kernel,
            &[0, 1],
            &CsrMatrix::from_triplets(2, 42, vec![(0, 40, 1.0), (1, 41, 1.0)]),
            &opts,
        )
        .unwrap()
        .data;
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(m.get(i, 3 + j), rh_block.get(i, j));
            }
        }
        let lh_block = morph_buffer(
            CsrMatrix::identity(3),
            &[0, 1, 2],
            &kernel,
            &[0, 1, 2],
            &CsrMatrix::from_triplets(3, 42, vec![(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]),
            &opts,
        )
        .unwrap()
        .data;
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.get(2 + i, j), lh_block.get(i, j));
            }
        }
    }

    #[test]
    fn test_rows_of_smoothed_operator_sum_to_one() {
        // Barycentric morph maps and degree normalization keep rows stochastic
        let points = ico_surface(2).unwrap();
        let surface = Surface::new(points.points().to_vec(), points.triangles().to_vec()).unwrap();
        let store = InMemoryStore::new()
            .with_sphere("s", Hemisphere::Left, surface.clone())
            .with_sphere("s", Hemisphere::Right, surface);
        let from = [vec![0, 10, 50, 100], vec![3, 90]];
        let to = [all(162), all(162)];
        let m = compute_morph_matrix("s", "s", &from, &to, &store, &SmoothOptions::default(), false)
            .unwrap();
        for i in 0..m.nrows() {
            let s: f64 = m.row(i).1.iter().sum();
            assert!((s - 1.0).abs() < 1e-10, "row {i} sums to {s}");
        }
    }
}
