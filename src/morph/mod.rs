//! Source morphs between subjects.
//!
//! [`compute_source_morph`] precomputes a [`SourceMorph`] once for a source
//! space and a set of [`MorphOptions`]; the morph can then be applied to any
//! number of estimates living on that source space, saved and read back.
//!
//! # Example
//!
//! ```
//! use cortex_morph::mesh::{ico_surface, Hemisphere};
//! use cortex_morph::morph::{compute_source_morph, Grade, MorphOptions, SourceSpace, SurfaceEstimate};
//! use cortex_morph::store::InMemoryStore;
//! use nalgebra::DMatrix;
//!
//! let sphere = ico_surface(2).unwrap();
//! let store = InMemoryStore::new()
//!     .with_sphere("sample", Hemisphere::Left, sphere.clone())
//!     .with_sphere("sample", Hemisphere::Right, sphere);
//!
//! let source = SourceSpace::surface(Some("sample"), [vec![0, 5, 20], vec![1, 2]]);
//! let options = MorphOptions::default()
//!     .with_subject_to("sample")
//!     .with_grade(Grade::Ico(1));
//! let morph = compute_source_morph(&source, &options, &store, None).unwrap();
//!
//! let stc = SurfaceEstimate::scalar([vec![0, 5, 20], vec![1, 2]], DMatrix::from_element(5, 4, 1.0), 0.0, 0.001)
//!     .unwrap();
//! let morphed = morph.apply(stc.into()).unwrap();
//! assert_eq!(morphed.subject(), Some("sample"));
//! ```

mod apply;
pub mod estimate;
mod persist;
pub mod volume;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::algo::{compute_morph_matrix, compute_sparse_morph, grade_to_vertices, SmoothOptions};
use crate::error::{MorphError, Result};
use crate::sparse::CsrMatrix;
use crate::store::SubjectStore;

pub use crate::algo::Grade;
pub use estimate::{Estimate, Layout, SurfaceEstimate, VolumeEstimate};
pub use persist::{read_source_morph, MORPH_SUFFIX};
pub use volume::{Registration, Volume, VolumeMorph, VolumeRegistration, VolumeTransform};

/// Options controlling how a morph is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphOptions {
    /// Source subject; inferred from the source space when unset.
    pub subject_from: Option<String>,
    /// Destination subject.
    pub subject_to: String,
    /// Destination resolution of surface morphs.
    pub grade: Grade,
    /// Number of smoothing passes; `None` fills the surface.
    pub smooth: Option<usize>,
    /// Report vertices left out of smoothing.
    pub warn: bool,
    /// Morph each hemisphere onto the opposite one of a symmetric subject.
    pub xhemi: bool,
    /// Use exact nearest-vertex correspondence instead of smoothing.
    pub sparse: bool,
    /// Iterations per level of the affine volume registration.
    pub niter_affine: Vec<usize>,
    /// Iterations per level of the nonlinear volume registration.
    pub niter_sdr: Vec<usize>,
    /// Search both hemispheres concurrently when resolving vertices.
    pub parallel: bool,
}

impl Default for MorphOptions {
    fn default() -> Self {
        Self {
            subject_from: None,
            subject_to: "fsaverage".to_string(),
            grade: Grade::default(),
            smooth: None,
            warn: true,
            xhemi: false,
            sparse: false,
            niter_affine: vec![100, 100, 10],
            niter_sdr: vec![5, 5, 3],
            parallel: true,
        }
    }
}

impl MorphOptions {
    /// Set the source subject explicitly.
    pub fn with_subject_from(mut self, subject: impl Into<String>) -> Self {
        self.subject_from = Some(subject.into());
        self
    }

    /// Set the destination subject.
    pub fn with_subject_to(mut self, subject: impl Into<String>) -> Self {
        self.subject_to = subject.into();
        self
    }

    /// Set the destination resolution.
    pub fn with_grade(mut self, grade: Grade) -> Self {
        self.grade = grade;
        self
    }

    /// Set a fixed number of smoothing passes.
    pub fn with_smooth(mut self, smooth: usize) -> Self {
        self.smooth = Some(smooth);
        self
    }

    /// Set whether partial smoothing coverage is reported.
    pub fn with_warn(mut self, warn: bool) -> Self {
        self.warn = warn;
        self
    }

    /// Enable or disable cross-hemisphere morphing.
    pub fn with_xhemi(mut self, xhemi: bool) -> Self {
        self.xhemi = xhemi;
        self
    }

    /// Enable or disable nearest-vertex (unsmoothed) morphing.
    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Set the volume registration iteration schedules.
    pub fn with_niter(mut self, niter_affine: Vec<usize>, niter_sdr: Vec<usize>) -> Self {
        self.niter_affine = niter_affine;
        self.niter_sdr = niter_sdr;
        self
    }

    /// Enable or disable concurrent vertex resolution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Load options from a JSON string. Missing fields take their defaults.
    pub fn from_json(json_str: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The vertices that carry source data.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpace {
    /// Cortical surface vertices, `[left, right]`.
    Surface {
        /// Subject the source space was built on.
        subject: Option<String>,
        /// Vertex indices per hemisphere.
        vertices: [Vec<usize>; 2],
    },
    /// Voxels of a volume grid.
    Volume {
        /// Subject the source space was built on.
        subject: Option<String>,
        /// Flat voxel indices.
        vertices: Vec<usize>,
        /// Grid shape.
        shape: [usize; 3],
    },
}

impl SourceSpace {
    /// A surface source space.
    pub fn surface(subject: Option<&str>, vertices: [Vec<usize>; 2]) -> Self {
        SourceSpace::Surface {
            subject: subject.map(str::to_string),
            vertices,
        }
    }

    /// A volume source space.
    pub fn volume(subject: Option<&str>, vertices: Vec<usize>, shape: [usize; 3]) -> Self {
        SourceSpace::Volume {
            subject: subject.map(str::to_string),
            vertices,
            shape,
        }
    }

    /// Subject the source space was built on, if known.
    pub fn subject(&self) -> Option<&str> {
        match self {
            SourceSpace::Surface { subject, .. } | SourceSpace::Volume { subject, .. } => {
                subject.as_deref()
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SourceSpace::Surface { .. } => "surface",
            SourceSpace::Volume { .. } => "volume",
        }
    }
}

impl From<&SurfaceEstimate> for SourceSpace {
    fn from(e: &SurfaceEstimate) -> Self {
        SourceSpace::surface(e.subject(), e.vertices().clone())
    }
}

impl From<&VolumeEstimate> for SourceSpace {
    fn from(e: &VolumeEstimate) -> Self {
        SourceSpace::volume(e.subject(), e.vertices().to_vec(), e.shape())
    }
}

/// A precomputed morph between two subjects' cortical surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMorph {
    pub(crate) subject_from: String,
    pub(crate) subject_to: String,
    pub(crate) grade: Grade,
    pub(crate) smooth: Option<usize>,
    pub(crate) xhemi: bool,
    pub(crate) sparse: bool,
    pub(crate) vertices_from: [Vec<usize>; 2],
    pub(crate) vertices_to: [Vec<usize>; 2],
    pub(crate) morph_mat: CsrMatrix,
}

impl SurfaceMorph {
    /// Source subject.
    pub fn subject_from(&self) -> &str {
        &self.subject_from
    }

    /// Destination subject.
    pub fn subject_to(&self) -> &str {
        &self.subject_to
    }

    /// Source vertices the morph expects, `[left, right]`.
    pub fn vertices_from(&self) -> &[Vec<usize>; 2] {
        &self.vertices_from
    }

    /// Destination vertices, `[left, right]`.
    pub fn vertices_to(&self) -> &[Vec<usize>; 2] {
        &self.vertices_to
    }

    /// The sparse operator, destination vertices by source vertices.
    pub fn morph_mat(&self) -> &CsrMatrix {
        &self.morph_mat
    }

    /// Number of smoothing passes requested, `None` when filling the surface.
    pub fn smooth(&self) -> Option<usize> {
        self.smooth
    }

    /// Whether hemispheres were swapped.
    pub fn xhemi(&self) -> bool {
        self.xhemi
    }

    /// Whether this is a nearest-vertex morph.
    pub fn sparse(&self) -> bool {
        self.sparse
    }
}

/// A precomputed morph, surface or volume.
#[derive(Debug, Clone)]
pub enum SourceMorph {
    /// Morph between cortical surfaces.
    Surface(SurfaceMorph),
    /// Morph between volume source spaces.
    Volume(VolumeMorph),
}

impl SourceMorph {
    /// Source subject.
    pub fn subject_from(&self) -> &str {
        match self {
            SourceMorph::Surface(m) => m.subject_from(),
            SourceMorph::Volume(m) => m.subject_from(),
        }
    }

    /// Destination subject.
    pub fn subject_to(&self) -> &str {
        match self {
            SourceMorph::Surface(m) => m.subject_to(),
            SourceMorph::Volume(m) => m.subject_to(),
        }
    }

    /// `"surface"` or `"volume"`.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceMorph::Surface(_) => "surface",
            SourceMorph::Volume(_) => "volume",
        }
    }
}

impl fmt::Display for SourceMorph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SourceMorph | {}, subject_from : {}, subject_to : {}",
            self.kind(),
            self.subject_from(),
            self.subject_to()
        )?;
        match self {
            SourceMorph::Surface(m) => {
                write!(f, ", grade : {}", m.grade)?;
                match m.smooth {
                    Some(n) => write!(f, ", smooth : {n}")?,
                    None => write!(f, ", smooth : fill")?,
                }
                write!(f, ", xhemi : {}", m.xhemi)?;
            }
            SourceMorph::Volume(m) => {
                write!(f, ", niter_affine : {:?}, niter_sdr : {:?}", m.niter_affine, m.niter_sdr)?;
            }
        }
        f.write_str(">")
    }
}

/// Resolve the source subject from the requested name and the source space.
///
/// # Errors
///
/// Returns [`MorphError::Configuration`] if the two disagree or neither is set.
pub fn check_subject_from(subject_from: Option<&str>, source_subject: Option<&str>) -> Result<String> {
    match (subject_from, source_subject) {
        (Some(requested), Some(actual)) if requested != actual => Err(MorphError::config(format!(
            "subject_from does not match source space subject ({requested} != {actual})"
        ))),
        (Some(subject), _) | (None, Some(subject)) => Ok(subject.to_string()),
        (None, None) => Err(MorphError::config(
            "subject_from could not be inferred, it must be specified",
        )),
    }
}

/// Precompute the morph of `source` onto `options.subject_to`.
///
/// Surface sources are smoothed over the source sphere and resampled onto the
/// destination vertices chosen by `options.grade`, or sent to their nearest
/// destination vertex when `options.sparse` is set. Volume sources are
/// registered through `registration`.
///
/// # Errors
///
/// - [`MorphError::Configuration`] for invalid option combinations: `xhemi` or
///   `sparse` with a volume source, `sparse` with a grade other than
///   [`Grade::Full`] or together with `xhemi`, `smooth = Some(0)`, a volume
///   source without a registration backend, or unresolvable subjects.
/// - Any error from vertex resolution, morph matrix assembly or registration.
pub fn compute_source_morph(
    source: &SourceSpace,
    options: &MorphOptions,
    store: &dyn SubjectStore,
    registration: Option<&dyn VolumeRegistration>,
) -> Result<SourceMorph> {
    let subject_from = check_subject_from(options.subject_from.as_deref(), source.subject())?;
    let subject_to = options.subject_to.as_str();
    let warn = options.warn && !options.sparse;

    if !matches!(source, SourceSpace::Surface { .. }) && options.xhemi {
        return Err(MorphError::config(
            "inter-hemispheric morphing can only be used with surface source estimates",
        ));
    }
    if options.sparse && !matches!(source, SourceSpace::Surface { .. }) {
        return Err(MorphError::config(
            "only surface source estimates can compute a sparse morph",
        ));
    }
    info!(kind = source.kind(), "source space inferred");

    match source {
        SourceSpace::Volume {
            vertices, shape, ..
        } => {
            let registration = registration.ok_or_else(|| {
                MorphError::config("volume morphs need a registration backend")
            })?;
            let morph = VolumeMorph::compute(
                &subject_from,
                subject_to,
                vertices,
                *shape,
                &options.niter_affine,
                &options.niter_sdr,
                store,
                registration,
            )?;
            Ok(SourceMorph::Volume(morph))
        }
        SourceSpace::Surface { vertices, .. } => {
            let (vertices_to, morph_mat) = if options.sparse {
                if options.grade != Grade::Full {
                    return Err(MorphError::config(
                        "grade must be full (every vertex) for a sparse morph",
                    ));
                }
                if options.xhemi {
                    return Err(MorphError::config(
                        "sparse morphs do not support cross-hemisphere mapping",
                    ));
                }
                compute_sparse_morph(&subject_from, subject_to, vertices, store)?
            } else {
                let vertices_to =
                    grade_to_vertices(subject_to, &options.grade, store, options.parallel)?;
                let smooth = SmoothOptions {
                    smooth: options.smooth,
                    warn,
                };
                let morph_mat = compute_morph_matrix(
                    &subject_from,
                    subject_to,
                    vertices,
                    &vertices_to,
                    store,
                    &smooth,
                    options.xhemi,
                )?;
                (vertices_to, morph_mat)
            };

            let n_verts = vertices_to[0].len() + vertices_to[1].len();
            if morph_mat.nrows() != n_verts {
                return Err(MorphError::shape(format!(
                    "morph matrix has {} rows for {} destination vertices",
                    morph_mat.nrows(),
                    n_verts
                )));
            }

            Ok(SourceMorph::Surface(SurfaceMorph {
                subject_from,
                subject_to: subject_to.to_string(),
                grade: options.grade.clone(),
                smooth: options.smooth,
                xhemi: options.xhemi,
                sparse: options.sparse,
                vertices_from: vertices.clone(),
                vertices_to,
                morph_mat,
            }))
        }
    }
}
