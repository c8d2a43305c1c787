//! Diffusion smoothing of sparse vertex data over a mesh.
//!
//! Data known on a subset of vertices is spread across mesh edges, one ring of
//! neighbors per iteration. After each pass every vertex holds the average of
//! the values on itself and its active neighbors (the row is divided by the
//! number of active vertices it touched), and the set of active vertices grows
//! to everything reached so far.
//!
//! # Termination
//!
//! - With `smooth = Some(n)` exactly `n` passes are performed.
//! - With `smooth = None` passes continue until every vertex is active.
//!
//! Either way no more than [`MAX_SMOOTH_ITERATIONS`] passes are ever run.
//!
//! # Example
//!
//! ```
//! use cortex_morph::algo::smooth::{smooth_buffer, SmoothOptions};
//! use cortex_morph::mesh::{diffusion_kernel, Surface};
//! use cortex_morph::sparse::CsrMatrix;
//! use nalgebra::Point3;
//!
//! let points = vec![Point3::origin(); 3];
//! let surface = Surface::new(points, vec![[0, 1, 2]]).unwrap();
//! let kernel = diffusion_kernel(&surface);
//!
//! // Unit impulse on vertex 0 spreads to the whole triangle in one pass
//! let smoothed = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &SmoothOptions::default()).unwrap();
//! assert_eq!(smoothed.iterations, 1);
//! assert_eq!(smoothed.n_uncovered, 0);
//! ```

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::{MorphError, Result};
use crate::sparse::CsrMatrix;

/// Hard ceiling on the number of smoothing passes.
pub const MAX_SMOOTH_ITERATIONS: usize = 100;

/// Options for diffusion smoothing.
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Number of smoothing passes. `None` fills the surface.
    pub smooth: Option<usize>,

    /// Whether to log a warning when some vertices stay unreached.
    pub warn: bool,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            smooth: None,
            warn: true,
        }
    }
}

impl SmoothOptions {
    /// Create options with a fixed number of passes.
    pub fn with_smooth(mut self, smooth: usize) -> Self {
        self.smooth = Some(smooth);
        self
    }

    /// Set whether partial coverage is reported.
    pub fn with_warn(mut self, warn: bool) -> Self {
        self.warn = warn;
        self
    }
}

/// Data that can be diffused: rows are vertices, columns are independent signals.
pub trait DiffusionBuffer: Sized {
    /// Number of rows (vertices) held.
    fn nrows(&self) -> usize;

    /// Compute `kernel[:, active] * self`, producing one row per kernel row.
    fn diffuse(&self, kernel: &CsrMatrix, active: &[usize]) -> Self;

    /// Keep only the given rows, in order.
    fn take_rows(&self, rows: &[usize]) -> Self;

    /// Divide row `i` by `divisors[i]`.
    fn scale_rows_inv(&mut self, divisors: &[f64]);

    /// Compute `map * self`.
    fn project(&self, map: &CsrMatrix) -> Self;
}

impl DiffusionBuffer for CsrMatrix {
    fn nrows(&self) -> usize {
        CsrMatrix::nrows(self)
    }

    fn diffuse(&self, kernel: &CsrMatrix, active: &[usize]) -> Self {
        if active.len() < kernel.ncols() {
            kernel.select_columns(active).mul(self)
        } else {
            kernel.mul(self)
        }
    }

    fn take_rows(&self, rows: &[usize]) -> Self {
        self.select_rows(rows)
    }

    fn scale_rows_inv(&mut self, divisors: &[f64]) {
        CsrMatrix::scale_rows_inv(self, divisors);
    }

    fn project(&self, map: &CsrMatrix) -> Self {
        map.mul(self)
    }
}

impl DiffusionBuffer for DMatrix<f64> {
    fn nrows(&self) -> usize {
        self.shape().0
    }

    fn diffuse(&self, kernel: &CsrMatrix, active: &[usize]) -> Self {
        if active.len() < kernel.ncols() {
            kernel.select_columns(active).mul_dense(self)
        } else {
            kernel.mul_dense(self)
        }
    }

    fn take_rows(&self, rows: &[usize]) -> Self {
        self.select_rows(rows)
    }

    fn scale_rows_inv(&mut self, divisors: &[f64]) {
        assert_eq!(divisors.len(), self.shape().0, "Divisor length mismatch");
        for (i, &d) in divisors.iter().enumerate() {
            for v in self.row_mut(i).iter_mut() {
                *v /= d;
            }
        }
    }

    fn project(&self, map: &CsrMatrix) -> Self {
        map.mul_dense(self)
    }
}

/// Result of a smoothing run.
#[derive(Debug, Clone)]
pub struct Smoothed<D> {
    /// Smoothed data, one row per mesh vertex (or per target after projection).
    pub data: D,
    /// Number of passes performed.
    pub iterations: usize,
    /// Number of mesh vertices never reached by the diffusion.
    pub n_uncovered: usize,
}

/// Diffuse `data`, whose rows live on the vertices `idx_use`, over the whole mesh.
///
/// `kernel` is the `N x N` diffusion kernel (binary edge graph plus self-loops,
/// see [`crate::mesh::diffusion_kernel`]). The result has `N` rows; vertices
/// the diffusion never reached are zero.
///
/// # Errors
///
/// - [`MorphError::Configuration`] if `smooth` is `Some(0)`.
/// - [`MorphError::DataShape`] if `idx_use` is not strictly increasing, lies
///   outside the mesh, or does not match the number of data rows.
pub fn smooth_buffer<D: DiffusionBuffer>(
    data: D,
    idx_use: &[usize],
    kernel: &CsrMatrix,
    options: &SmoothOptions,
) -> Result<Smoothed<D>> {
    let n_vertices = kernel.nrows();
    validate_inputs(data.nrows(), idx_use, kernel)?;

    let last = match options.smooth {
        Some(0) => {
            return Err(MorphError::config(
                "the number of smoothing operations (\"smooth\") has to be at least 1",
            ))
        }
        Some(s) => (s - 1).min(MAX_SMOOTH_ITERATIONS - 1),
        None => MAX_SMOOTH_ITERATIONS - 1,
    };

    let mut data = data;
    let mut active = idx_use.to_vec();
    let mut mult = DVector::zeros(n_vertices);
    let mut k = 0;
    let degree = loop {
        mult.fill(0.0);
        for &i in &active {
            mult[i] = 1.0;
        }
        // Number of active vertices in each closed neighborhood
        let data_sum = kernel.mul_vec(&mult);
        let reached: Vec<usize> = (0..n_vertices).filter(|&i| data_sum[i] != 0.0).collect();

        let done = k == last || (options.smooth.is_none() && reached.len() >= n_vertices);

        data = data.diffuse(kernel, &active);
        active = reached;
        if done {
            break data_sum;
        }

        data = data.take_rows(&active);
        let divisors: Vec<f64> = active.iter().map(|&i| data_sum[i]).collect();
        data.scale_rows_inv(&divisors);
        k += 1;
    };

    // Unreached rows are zero; dividing them by one keeps them that way
    let divisors: Vec<f64> = degree
        .iter()
        .map(|&d| if d == 0.0 { 1.0 } else { d })
        .collect();
    data.scale_rows_inv(&divisors);

    let n_uncovered = n_vertices - active.len();
    if n_uncovered > 0 && options.warn {
        warn!(
            "{}/{} vertices not included in smoothing, consider increasing the number of steps",
            n_uncovered, n_vertices
        );
    }
    debug!(iterations = k + 1, "smooth iterations done");

    Ok(Smoothed {
        data,
        iterations: k + 1,
        n_uncovered,
    })
}

/// Smooth `data` over the mesh, then resample it onto the rows `nearest` of `map`.
///
/// `map` is a morph map whose columns are the mesh vertices. The returned data
/// has one row per entry of `nearest`.
///
/// # Errors
///
/// Everything [`smooth_buffer`] reports, plus [`MorphError::DataShape`] when
/// `map` does not have one column per mesh vertex or `nearest` indexes past its
/// rows.
pub fn morph_buffer<D: DiffusionBuffer>(
    data: D,
    idx_use: &[usize],
    kernel: &CsrMatrix,
    nearest: &[usize],
    map: &CsrMatrix,
    options: &SmoothOptions,
) -> Result<Smoothed<D>> {
    if map.ncols() != kernel.nrows() {
        return Err(MorphError::shape(format!(
            "morph map has {} columns but the mesh has {} vertices",
            map.ncols(),
            kernel.nrows()
        )));
    }
    if let Some(&bad) = nearest.iter().find(|&&v| v >= map.nrows()) {
        return Err(MorphError::shape(format!(
            "destination vertex {bad} is out of range for a morph map with {} rows",
            map.nrows()
        )));
    }

    let smoothed = smooth_buffer(data, idx_use, kernel, options)?;
    Ok(Smoothed {
        data: smoothed.data.project(&map.select_rows(nearest)),
        iterations: smoothed.iterations,
        n_uncovered: smoothed.n_uncovered,
    })
}

/// Morph vector-valued data one component at a time.
///
/// `data` has one row per source vertex and `3 * n_times` columns, component
/// `c` occupying columns `c * n_times .. (c + 1) * n_times`. The output keeps
/// that layout with one row per entry of `nearest`.
pub fn morph_vector_buffer(
    data: &DMatrix<f64>,
    n_times: usize,
    idx_use: &[usize],
    kernel: &CsrMatrix,
    nearest: &[usize],
    map: &CsrMatrix,
    options: &SmoothOptions,
) -> Result<Smoothed<DMatrix<f64>>> {
    if data.ncols() != 3 * n_times {
        return Err(MorphError::shape(format!(
            "vector data has {} columns, expected 3 x {} timepoints",
            data.ncols(),
            n_times
        )));
    }

    let mut out = DMatrix::zeros(nearest.len(), 3 * n_times);
    let mut iterations = 0;
    let mut n_uncovered = 0;
    for dim in 0..3 {
        let component = data.columns(dim * n_times, n_times).into_owned();
        let morphed = morph_buffer(component, idx_use, kernel, nearest, map, options)?;
        out.columns_mut(dim * n_times, n_times).copy_from(&morphed.data);
        iterations = morphed.iterations;
        n_uncovered = morphed.n_uncovered;
    }
    Ok(Smoothed {
        data: out,
        iterations,
        n_uncovered,
    })
}

fn validate_inputs(n_rows: usize, idx_use: &[usize], kernel: &CsrMatrix) -> Result<()> {
    if kernel.nrows() != kernel.ncols() {
        return Err(MorphError::shape("diffusion kernel must be square"));
    }
    if n_rows != idx_use.len() {
        return Err(MorphError::shape(format!(
            "data has {} rows but {} source vertices were given",
            n_rows,
            idx_use.len()
        )));
    }
    if idx_use.windows(2).any(|w| w[0] >= w[1]) {
        return Err(MorphError::shape("source vertices must be strictly increasing"));
    }
    if let Some(&last) = idx_use.last() {
        if last >= kernel.nrows() {
            return Err(MorphError::shape(format!(
                "source vertex {last} is out of range for a mesh with {} vertices",
                kernel.nrows()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{diffusion_kernel, Surface};
    use nalgebra::Point3;

    /// A strip of triangles 0-1-2, 1-2-3, ... : a path-like mesh.
    fn strip(n: usize) -> CsrMatrix {
        let points = vec![Point3::origin(); n];
        let tris = (0..n - 2).map(|i| [i, i + 1, i + 2]).collect();
        diffusion_kernel(&Surface::new(points, tris).unwrap())
    }

    fn single_triangle_plus_isolated() -> CsrMatrix {
        let points = vec![Point3::origin(); 4];
        diffusion_kernel(&Surface::new(points, vec![[0, 1, 2]]).unwrap())
    }

    #[test]
    fn test_single_pass_averages_closed_neighborhood() {
        let kernel = single_triangle_plus_isolated();
        let data = DMatrix::from_column_slice(4, 1, &[3.0, 6.0, 9.0, 5.0]);
        let opts = SmoothOptions::default().with_smooth(1);
        let out = smooth_buffer(data, &[0, 1, 2, 3], &kernel, &opts).unwrap();

        assert_eq!(out.iterations, 1);
        // Triangle vertices have degree 3, the isolated vertex only itself
        assert!((out.data[(0, 0)] - 6.0).abs() < 1e-12);
        assert!((out.data[(1, 0)] - 6.0).abs() < 1e-12);
        assert!((out.data[(2, 0)] - 6.0).abs() < 1e-12);
        assert!((out.data[(3, 0)] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_fill_reaches_every_vertex() {
        let kernel = strip(10);
        let out = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &SmoothOptions::default())
            .unwrap();
        assert_eq!(out.n_uncovered, 0);
        assert_eq!(out.data.nrows(), 10);
        // Vertex 0 reaches 9 along the strip: two hops per pass
        assert_eq!(out.iterations, 5);
        for i in 0..10 {
            assert!(out.data.get(i, 0) > 0.0, "vertex {i} not reached");
        }
    }

    #[test]
    fn test_fixed_passes_leave_far_vertices_uncovered() {
        let kernel = strip(10);
        let opts = SmoothOptions::default().with_smooth(1).with_warn(false);
        let out = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &opts).unwrap();
        assert_eq!(out.iterations, 1);
        assert_eq!(out.n_uncovered, 7);
        assert_eq!(out.data.nrows(), 10);
        assert_eq!(out.data.get(5, 0), 0.0);
    }

    /// Log sink shared between a test and its subscriber.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_while(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_partial_coverage_warning_follows_flag() {
        let kernel = strip(10);
        let loud = logged_while(|| {
            let opts = SmoothOptions::default().with_smooth(1);
            smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &opts).unwrap();
        });
        assert!(loud.contains("7/10 vertices not included in smoothing"), "got: {loud}");

        let quiet = logged_while(|| {
            let opts = SmoothOptions::default().with_smooth(1).with_warn(false);
            smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &opts).unwrap();
        });
        assert!(quiet.is_empty(), "got: {quiet}");

        let covered = logged_while(|| {
            smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &SmoothOptions::default()).unwrap();
        });
        assert!(covered.is_empty(), "got: {covered}");
    }

    #[test]
    fn test_disconnected_mesh_stops_at_ceiling() {
        let kernel = single_triangle_plus_isolated();
        let opts = SmoothOptions::default().with_warn(false);
        let out = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &opts).unwrap();
        assert_eq!(out.iterations, MAX_SMOOTH_ITERATIONS);
        assert_eq!(out.n_uncovered, 1);
    }

    #[test]
    fn test_requested_passes_are_capped() {
        let kernel = single_triangle_plus_isolated();
        let opts = SmoothOptions::default().with_smooth(1000).with_warn(false);
        let out = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &opts).unwrap();
        assert_eq!(out.iterations, MAX_SMOOTH_ITERATIONS);
    }

    #[test]
    fn test_zero_smooth_is_rejected() {
        let kernel = strip(4);
        let opts = SmoothOptions::default().with_smooth(0);
        let err = smooth_buffer(CsrMatrix::identity(1), &[0], &kernel, &opts).unwrap_err();
        assert!(matches!(err, MorphError::Configuration { .. }));
    }

    #[test]
    fn test_unsorted_vertices_are_rejected() {
        let kernel = strip(4);
        let err = smooth_buffer(CsrMatrix::identity(2), &[2, 1], &kernel, &SmoothOptions::default())
            .unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
    }

    #[test]
    fn test_sparse_and_dense_paths_agree() {
        let kernel = strip(8);
        let idx = [1, 4, 6];
        let opts = SmoothOptions::default().with_smooth(2).with_warn(false);
        let sparse = smooth_buffer(CsrMatrix::identity(3), &idx, &kernel, &opts).unwrap();
        let dense = smooth_buffer(DMatrix::identity(3, 3), &idx, &kernel, &opts).unwrap();
        let diff = sparse.data.to_dense() - dense.data;
        assert!(diff.abs().max() < 1e-12);
    }

    #[test]
    fn test_smoothing_preserves_constants() {
        let kernel = strip(12);
        let idx = [0, 3, 7, 11];
        let data = DMatrix::from_element(4, 2, 2.5);
        let out = smooth_buffer(data, &idx, &kernel, &SmoothOptions::default()).unwrap();
        for v in out.data.iter() {
            assert!((v - 2.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_morph_buffer_selects_map_rows() {
        let kernel = strip(5);
        let map = CsrMatrix::identity(5);
        let opts = SmoothOptions::default();
        let out = morph_buffer(CsrMatrix::identity(5), &[0, 1, 2, 3, 4], &kernel, &[4, 0], &map, &opts)
            .unwrap();
        assert_eq!(out.data.shape(), (2, 5));

        let err = morph_buffer(CsrMatrix::identity(5), &[0, 1, 2, 3, 4], &kernel, &[5], &map, &opts)
            .unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
    }

    #[test]
    fn test_vector_components_are_morphed_independently() {
        let kernel = strip(6);
        let map = CsrMatrix::identity(6);
        let idx = [0, 2, 5];
        let n_times = 2;
        let data = DMatrix::from_fn(3, 3 * n_times, |i, j| (i * 10 + j) as f64);
        let opts = SmoothOptions::default().with_smooth(2).with_warn(false);
        let nearest = [0, 1, 2, 3, 4, 5];

        let out = morph_vector_buffer(&data, n_times, &idx, &kernel, &nearest, &map, &opts).unwrap();
        assert_eq!(out.data.shape(), (6, 3 * n_times));

        // Smoothing is linear, so morphing all columns at once gives the same answer
        let joint = morph_buffer(data.clone(), &idx, &kernel, &nearest, &map, &opts).unwrap();
        assert!((out.data - joint.data).abs().max() < 1e-12);
    }
}
