//! Source estimates: per-vertex time series with their vertex layout.

use nalgebra::DMatrix;

use crate::error::{MorphError, Result};
use crate::mesh::Hemisphere;

/// How the columns of a surface estimate are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One value per vertex and timepoint; columns are timepoints.
    Scalar,
    /// A 3-vector per vertex and timepoint. Component `c` at time `t` is
    /// column `c * n_times + t`.
    Vector {
        /// Number of timepoints.
        n_times: usize,
    },
}

/// Time series on the vertices of both cortical hemispheres.
///
/// Rows follow the left hemisphere vertices, then the right hemisphere vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceEstimate {
    vertices: [Vec<usize>; 2],
    data: DMatrix<f64>,
    layout: Layout,
    tmin: f64,
    tstep: f64,
    subject: Option<String>,
}

impl SurfaceEstimate {
    /// Create a scalar estimate, one column per timepoint.
    ///
    /// # Errors
    ///
    /// Returns [`MorphError::DataShape`] if the row count differs from the
    /// number of vertices.
    pub fn scalar(vertices: [Vec<usize>; 2], data: DMatrix<f64>, tmin: f64, tstep: f64) -> Result<Self> {
        Self::new(vertices, data, Layout::Scalar, tmin, tstep)
    }

    /// Create a vector estimate from data with `3 * n_times` columns.
    ///
    /// # Errors
    ///
    /// Returns [`MorphError::DataShape`] if the row count differs from the
    /// number of vertices or the column count is not a multiple of three.
    pub fn vector(vertices: [Vec<usize>; 2], data: DMatrix<f64>, tmin: f64, tstep: f64) -> Result<Self> {
        if data.ncols() % 3 != 0 {
            return Err(MorphError::shape(format!(
                "vector data needs 3 components per timepoint, got {} columns",
                data.ncols()
            )));
        }
        let n_times = data.ncols() / 3;
        Self::new(vertices, data, Layout::Vector { n_times }, tmin, tstep)
    }

    fn new(
        vertices: [Vec<usize>; 2],
        data: DMatrix<f64>,
        layout: Layout,
        tmin: f64,
        tstep: f64,
    ) -> Result<Self> {
        let n = vertices[0].len() + vertices[1].len();
        if data.nrows() != n {
            return Err(MorphError::shape(format!(
                "data has {} rows for {} vertices",
                data.nrows(),
                n
            )));
        }
        Ok(Self {
            vertices,
            data,
            layout,
            tmin,
            tstep,
            subject: None,
        })
    }

    /// Attach the subject the data lives on.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Vertex indices, `[left, right]`.
    pub fn vertices(&self) -> &[Vec<usize>; 2] {
        &self.vertices
    }

    /// Number of vertices over both hemispheres.
    pub fn n_vertices(&self) -> usize {
        self.data.nrows()
    }

    /// Raw data, one row per vertex.
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Column layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Whether each vertex carries a 3-vector.
    pub fn is_vector(&self) -> bool {
        matches!(self.layout, Layout::Vector { .. })
    }

    /// Number of timepoints.
    pub fn n_times(&self) -> usize {
        match self.layout {
            Layout::Scalar => self.data.ncols(),
            Layout::Vector { n_times } => n_times,
        }
    }

    /// Time of the first sample.
    pub fn tmin(&self) -> f64 {
        self.tmin
    }

    /// Sampling step.
    pub fn tstep(&self) -> f64 {
        self.tstep
    }

    /// Subject name, if known.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Rows belonging to one hemisphere.
    pub fn hemi_data(&self, hemi: Hemisphere) -> DMatrix<f64> {
        let n_lh = self.vertices[0].len();
        match hemi {
            Hemisphere::Left => self.data.rows(0, n_lh).into_owned(),
            Hemisphere::Right => self.data.rows(n_lh, self.vertices[1].len()).into_owned(),
        }
    }

    /// One component (0, 1 or 2) of a vector estimate, `n_vertices x n_times`.
    ///
    /// Returns `None` for scalar estimates or a component past 2.
    pub fn component(&self, dim: usize) -> Option<DMatrix<f64>> {
        match self.layout {
            Layout::Vector { n_times } if dim < 3 => {
                Some(self.data.columns(dim * n_times, n_times).into_owned())
            }
            _ => None,
        }
    }

    /// Replace vertices, data and subject while keeping layout and timing.
    pub(crate) fn morphed(&self, vertices: [Vec<usize>; 2], data: DMatrix<f64>, subject: &str) -> Self {
        Self {
            vertices,
            data,
            layout: self.layout,
            tmin: self.tmin,
            tstep: self.tstep,
            subject: Some(subject.to_string()),
        }
    }
}

/// Time series on voxels of a volume source space.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEstimate {
    vertices: Vec<usize>,
    shape: [usize; 3],
    data: DMatrix<f64>,
    tmin: f64,
    tstep: f64,
    subject: Option<String>,
}

impl VolumeEstimate {
    /// Create a volume estimate on flat voxel indices of a grid of `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`MorphError::DataShape`] if the row count differs from the
    /// number of voxels or a voxel lies outside the grid.
    pub fn new(
        vertices: Vec<usize>,
        shape: [usize; 3],
        data: DMatrix<f64>,
        tmin: f64,
        tstep: f64,
    ) -> Result<Self> {
        if data.nrows() != vertices.len() {
            return Err(MorphError::shape(format!(
                "data has {} rows for {} voxels",
                data.nrows(),
                vertices.len()
            )));
        }
        let n_voxels: usize = shape.iter().product();
        if let Some(&bad) = vertices.iter().find(|&&v| v >= n_voxels) {
            return Err(MorphError::shape(format!(
                "voxel {bad} is outside a grid of shape {shape:?}"
            )));
        }
        Ok(Self {
            vertices,
            shape,
            data,
            tmin,
            tstep,
            subject: None,
        })
    }

    /// Attach the subject the data lives on.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Flat voxel indices carrying data.
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    /// Grid shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Raw data, one row per voxel.
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Time of the first sample.
    pub fn tmin(&self) -> f64 {
        self.tmin
    }

    /// Sampling step.
    pub fn tstep(&self) -> f64 {
        self.tstep
    }

    /// Subject name, if known.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

/// Either kind of source estimate.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate {
    /// Data on cortical surface vertices.
    Surface(SurfaceEstimate),
    /// Data on volume voxels.
    Volume(VolumeEstimate),
}

impl Estimate {
    /// Subject name, if known.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Estimate::Surface(e) => e.subject(),
            Estimate::Volume(e) => e.subject(),
        }
    }
}

impl From<SurfaceEstimate> for Estimate {
    fn from(e: SurfaceEstimate) -> Self {
        Estimate::Surface(e)
    }
}

impl From<VolumeEstimate> for Estimate {
    fn from(e: VolumeEstimate) -> Self {
        Estimate::Volume(e)
    }
}
