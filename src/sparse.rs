//! Compressed sparse row matrices.
//!
//! This module provides the small set of sparse operations the morph pipeline
//! needs: construction from triplets, products against dense and sparse
//! operands, row/column selection, row scaling and block placement.
//!
//! Dimension mismatches between operands are programming errors and panic;
//! inputs coming from callers are validated before they reach this module.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{MorphError, Result};

/// Compressed Sparse Row (CSR) matrix.
///
/// Column indices within a row are kept strictly increasing, which makes the
/// layout canonical: two matrices with the same entries compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CsrRecord", into = "CsrRecord")]
pub struct CsrMatrix {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// Row pointers: row_ptr[i] is the index in col_idx/values where row i starts.
    /// Length is rows + 1, with row_ptr[rows] = nnz.
    row_ptr: Vec<usize>,
    /// Column indices for each non-zero value.
    col_idx: Vec<usize>,
    /// Non-zero values.
    values: Vec<f64>,
}

/// Persisted form of a [`CsrMatrix`]: shape plus the raw index and value arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsrRecord {
    shape: [usize; 2],
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl From<CsrMatrix> for CsrRecord {
    fn from(m: CsrMatrix) -> Self {
        CsrRecord {
            shape: [m.rows, m.cols],
            indptr: m.row_ptr,
            indices: m.col_idx,
            data: m.values,
        }
    }
}

impl TryFrom<CsrRecord> for CsrMatrix {
    type Error = MorphError;

    fn try_from(r: CsrRecord) -> Result<Self> {
        let [rows, cols] = r.shape;
        if r.indptr.len() != rows + 1 {
            return Err(MorphError::shape(format!(
                "indptr has {} entries for {} rows",
                r.indptr.len(),
                rows
            )));
        }
        if r.indices.len() != r.data.len() || r.indptr[rows] != r.data.len() {
            return Err(MorphError::shape("indices, data and indptr disagree on nnz"));
        }
        for i in 0..rows {
            let (start, end) = (r.indptr[i], r.indptr[i + 1]);
            if start > end {
                return Err(MorphError::shape(format!("indptr decreases at row {i}")));
            }
            let row = &r.indices[start..end];
            if row.iter().any(|&c| c >= cols) || row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(MorphError::shape(format!(
                    "row {i} has unsorted or out-of-range column indices"
                )));
            }
        }
        Ok(CsrMatrix {
            rows,
            cols,
            row_ptr: r.indptr,
            col_idx: r.indices,
            values: r.data,
        })
    }
}

impl CsrMatrix {
    /// Create a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        if triplets.is_empty() {
            return Self::zeros(rows, cols);
        }

        // Sort by (row, col) for CSR construction
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());

        let mut prev = None;
        for (row, col, val) in triplets {
            assert!(row < rows && col < cols, "triplet ({row}, {col}) out of bounds");
            if prev == Some((row, col)) {
                // Same position: accumulate value
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
            } else {
                col_idx.push(col);
                values.push(val);
                row_ptr[row + 1] += 1;
                prev = Some((row, col));
            }
        }

        // Counts to offsets
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Create an all-zero matrix with no stored entries.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create an `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the shape as `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values stored in row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Value at `(i, j)`, zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (cols, vals) = self.row(i);
        cols.binary_search(&j).map(|k| vals[k]).unwrap_or(0.0)
    }

    /// Iterate over stored entries as `(row, col, value)`.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |i| {
            let (cols, vals) = self.row(i);
            cols.iter().zip(vals).map(move |(&j, &v)| (i, j, v))
        })
    }

    /// Number of stored entries inside the block `rows x cols`.
    pub fn block_nnz(&self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> usize {
        rows.map(|i| self.row(i).0.iter().filter(|&&j| cols.contains(&j)).count())
            .sum()
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        let mut y = DVector::zeros(self.rows);
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            y[i] = cols.iter().zip(vals).map(|(&j, &v)| v * x[j]).sum();
        }
        y
    }

    /// Multiply by a dense matrix: Y = A * X.
    pub fn mul_dense(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        assert_eq!(x.nrows(), self.cols, "Dense operand dimension mismatch");

        let mut y = DMatrix::zeros(self.rows, x.ncols());
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                for t in 0..x.ncols() {
                    y[(i, t)] += v * x[(j, t)];
                }
            }
        }
        y
    }

    /// Multiply by another sparse matrix: C = A * B.
    pub fn mul(&self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(self.cols, other.rows, "Sparse operand dimension mismatch");

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            for (&k, &a) in cols.iter().zip(vals) {
                let (bcols, bvals) = other.row(k);
                for (&j, &b) in bcols.iter().zip(bvals) {
                    *acc.entry(j).or_insert(0.0) += a * b;
                }
            }
            for (j, v) in std::mem::take(&mut acc) {
                col_idx.push(j);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }

        CsrMatrix {
            rows: self.rows,
            cols: other.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Element-wise sum of two matrices with the same shape.
    pub fn add(&self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(self.shape(), other.shape(), "Sparse shape mismatch");
        let triplets = self.triplets().chain(other.triplets()).collect();
        CsrMatrix::from_triplets(self.rows, self.cols, triplets)
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> CsrMatrix {
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for &r in rows {
            let (cols, vals) = self.row(r);
            col_idx.extend_from_slice(cols);
            values.extend_from_slice(vals);
            row_ptr.push(col_idx.len());
        }
        CsrMatrix {
            rows: rows.len(),
            cols: self.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Keep only the given columns; the result has `cols.len()` columns.
    ///
    /// `cols` must be strictly increasing so that column order stays sorted.
    pub fn select_columns(&self, cols: &[usize]) -> CsrMatrix {
        let mut remap = vec![usize::MAX; self.cols];
        for (new, &old) in cols.iter().enumerate() {
            remap[old] = new;
        }

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for i in 0..self.rows {
            let (rcols, rvals) = self.row(i);
            for (&j, &v) in rcols.iter().zip(rvals) {
                if remap[j] != usize::MAX {
                    col_idx.push(remap[j]);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        CsrMatrix {
            rows: self.rows,
            cols: cols.len(),
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Divide every row `i` by `divisors[i]`.
    pub fn scale_rows_inv(&mut self, divisors: &[f64]) {
        assert_eq!(divisors.len(), self.rows, "Divisor length mismatch");
        for (i, &d) in divisors.iter().enumerate() {
            for v in &mut self.values[self.row_ptr[i]..self.row_ptr[i + 1]] {
                *v /= d;
            }
        }
    }

    /// Replace every stored value by one, collapsing multiplicities.
    pub fn binarize(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 1.0);
    }

    /// Index of the largest stored value in each row.
    ///
    /// Ties resolve to the lowest column. Rows without stored entries yield `None`.
    pub fn row_argmax(&self) -> Vec<Option<usize>> {
        (0..self.rows)
            .map(|i| {
                let (cols, vals) = self.row(i);
                let mut best: Option<(usize, f64)> = None;
                for (&j, &v) in cols.iter().zip(vals) {
                    if best.map_or(true, |(_, bv)| v > bv) {
                        best = Some((j, v));
                    }
                }
                best.map(|(j, _)| j)
            })
            .collect()
    }

    /// Place sub-matrices into a zero `rows x cols` matrix at the given offsets.
    ///
    /// Blocks must not overlap; overlapping entries would be summed.
    pub fn from_blocks(rows: usize, cols: usize, blocks: &[(usize, usize, &CsrMatrix)]) -> Self {
        let triplets = blocks
            .iter()
            .flat_map(|&(r0, c0, block)| block.triplets().map(move |(i, j, v)| (r0 + i, c0 + j, v)))
            .collect();
        CsrMatrix::from_triplets(rows, cols, triplets)
    }

    /// Convert to a dense matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.rows, self.cols);
        for (i, j, v) in self.triplets() {
            m[(i, j)] = v;
        }
        m
    }
}
