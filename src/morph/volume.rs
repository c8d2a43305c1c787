//! Volume morphs.
//!
//! Volumetric registration is not performed here. A [`VolumeRegistration`]
//! backend aligns the two subjects' anatomical volumes and hands back opaque
//! [`VolumeTransform`] handles (an affine pre-alignment and a nonlinear
//! mapping); this module only orchestrates their use on source estimates.

use std::fmt;
use std::sync::Arc;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MorphError, Result};
use crate::store::SubjectStore;

use super::estimate::VolumeEstimate;

/// A dense scalar 3D grid, stored flat with the last axis varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl Volume {
    /// Create a volume from its shape and flat data.
    ///
    /// # Errors
    ///
    /// Returns [`MorphError::DataShape`] if `data` does not hold exactly
    /// `shape[0] * shape[1] * shape[2]` values.
    pub fn new(shape: [usize; 3], data: Vec<f64>) -> Result<Self> {
        let n: usize = shape.iter().product();
        if data.len() != n {
            return Err(MorphError::shape(format!(
                "volume of shape {shape:?} needs {n} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// An all-zero volume.
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Grid dimensions.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of voxels.
    #[inline]
    pub fn n_voxels(&self) -> usize {
        self.data.len()
    }

    /// Voxel values in flat order.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable voxel values in flat order.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// An opaque spatial transform produced by a registration backend.
pub trait VolumeTransform: Send + Sync + fmt::Debug {
    /// Resample `volume` through this transform.
    fn transform(&self, volume: &Volume) -> Result<Volume>;

    /// Identifier the backend uses to restore this transform.
    fn kind(&self) -> &str;

    /// Parameters needed to rebuild this transform, see [`VolumeRegistration::restore`].
    fn to_record(&self) -> serde_json::Value;
}

/// Output of a registration: affine pre-alignment followed by a nonlinear mapping.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Affine transform applied first.
    pub pre_affine: Arc<dyn VolumeTransform>,
    /// Nonlinear (diffeomorphic) mapping applied to the pre-aligned volume.
    pub mapping: Arc<dyn VolumeTransform>,
}

/// A volumetric registration backend.
pub trait VolumeRegistration: Send + Sync {
    /// Register `moving` onto `fixed`.
    ///
    /// `niter_affine` and `niter_sdr` hold the number of iterations per
    /// resolution level of the affine and nonlinear stages.
    fn register(
        &self,
        moving: &Volume,
        fixed: &Volume,
        niter_affine: &[usize],
        niter_sdr: &[usize],
    ) -> Result<Registration>;

    /// Rebuild a transform from the output of [`VolumeTransform::to_record`].
    fn restore(&self, kind: &str, record: &serde_json::Value) -> Result<Arc<dyn VolumeTransform>>;
}

/// A precomputed morph between two subjects' volume source spaces.
#[derive(Debug, Clone)]
pub struct VolumeMorph {
    pub(crate) subject_from: String,
    pub(crate) subject_to: String,
    pub(crate) niter_affine: Vec<usize>,
    pub(crate) niter_sdr: Vec<usize>,
    pub(crate) vertices_from: Vec<usize>,
    pub(crate) shape_from: [usize; 3],
    pub(crate) pre_affine: Arc<dyn VolumeTransform>,
    pub(crate) mapping: Arc<dyn VolumeTransform>,
}

impl VolumeMorph {
    /// Register the anatomical volume of `subject_from` onto `subject_to`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compute(
        subject_from: &str,
        subject_to: &str,
        vertices_from: &[usize],
        shape_from: [usize; 3],
        niter_affine: &[usize],
        niter_sdr: &[usize],
        store: &dyn SubjectStore,
        registration: &dyn VolumeRegistration,
    ) -> Result<Self> {
        let n_voxels: usize = shape_from.iter().product();
        if let Some(&bad) = vertices_from.iter().find(|&&v| v >= n_voxels) {
            return Err(MorphError::shape(format!(
                "voxel {bad} is outside a source grid of shape {shape_from:?}"
            )));
        }

        info!(subject_from, "loading moving volume");
        let moving = store.mri(subject_from)?;
        info!(subject_to, "loading static volume");
        let fixed = store.mri(subject_to)?;

        let Registration {
            pre_affine,
            mapping,
        } = registration.register(&moving, &fixed, niter_affine, niter_sdr)?;

        Ok(Self {
            subject_from: subject_from.to_string(),
            subject_to: subject_to.to_string(),
            niter_affine: niter_affine.to_vec(),
            niter_sdr: niter_sdr.to_vec(),
            vertices_from: vertices_from.to_vec(),
            shape_from,
            pre_affine,
            mapping,
        })
    }

    /// Source subject.
    pub fn subject_from(&self) -> &str {
        &self.subject_from
    }

    /// Destination subject.
    pub fn subject_to(&self) -> &str {
        &self.subject_to
    }

    /// Affine iteration schedule used for the registration.
    pub fn niter_affine(&self) -> &[usize] {
        &self.niter_affine
    }

    /// Nonlinear iteration schedule used for the registration.
    pub fn niter_sdr(&self) -> &[usize] {
        &self.niter_sdr
    }

    /// Morph a volume estimate.
    ///
    /// Each timepoint is scattered into the source grid, pushed through the
    /// affine and then the nonlinear transform, and flattened. Destination
    /// voxels are the ones whose values are not all zero over time.
    ///
    /// # Errors
    ///
    /// - [`MorphError::Configuration`] if the estimate belongs to another subject.
    /// - [`MorphError::DataShape`] if its voxels differ from the morph's source voxels.
    /// - Whatever the transforms report, typically [`MorphError::Transform`].
    pub fn apply(&self, estimate: &VolumeEstimate) -> Result<VolumeEstimate> {
        if let Some(subject) = estimate.subject() {
            if subject != self.subject_from {
                return Err(MorphError::config(format!(
                    "estimate subject ({subject}) != morph subject_from ({})",
                    self.subject_from
                )));
            }
        }
        if estimate.vertices() != self.vertices_from.as_slice() || estimate.shape() != self.shape_from {
            return Err(MorphError::shape(format!(
                "voxels do not match between morph ({} in {:?}) and estimate ({} in {:?})",
                self.vertices_from.len(),
                self.shape_from,
                estimate.vertices().len(),
                estimate.shape()
            )));
        }

        let data = estimate.data();
        let n_times = data.ncols();
        let mut frames = Vec::with_capacity(n_times);
        for t in 0..n_times {
            let mut vol = Volume::zeros(self.shape_from);
            for (row, &voxel) in self.vertices_from.iter().enumerate() {
                vol.data_mut()[voxel] = data[(row, t)];
            }
            let warped = self.mapping.transform(&self.pre_affine.transform(&vol)?)?;
            frames.push(warped);
        }

        let shape_to = frames.first().map_or(self.shape_from, Volume::shape);
        if frames.iter().any(|f| f.shape() != shape_to) {
            return Err(MorphError::Transform {
                message: "transformed timepoints have different shapes".to_string(),
            });
        }

        let n_voxels: usize = shape_to.iter().product();
        let vertices_to: Vec<usize> = (0..n_voxels)
            .filter(|&v| frames.iter().map(|f| f.data()[v]).sum::<f64>() != 0.0)
            .collect();
        let morphed = DMatrix::from_fn(vertices_to.len(), n_times, |i, t| {
            frames[t].data()[vertices_to[i]]
        });

        VolumeEstimate::new(vertices_to, shape_to, morphed, estimate.tmin(), estimate.tstep())
            .map(|e| e.with_subject(&self.subject_to))
    }
}
