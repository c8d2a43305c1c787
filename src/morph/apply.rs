//! Applying precomputed morphs to estimates.

use tracing::debug;

use crate::error::{MorphError, Result};
use crate::mesh::Hemisphere;

use super::estimate::{Estimate, SurfaceEstimate};
use super::{SourceMorph, SurfaceMorph};

impl SurfaceMorph {
    /// Morph a surface estimate onto the destination vertices.
    ///
    /// Vector estimates are morphed by position only: each component is
    /// resampled with the same operator, orientations are never rotated.
    /// Timing is kept and the subject becomes the destination subject.
    ///
    /// # Errors
    ///
    /// - [`MorphError::Configuration`] if the estimate names a subject other
    ///   than the morph's source subject.
    /// - [`MorphError::DataShape`] if the estimate's vertices differ from the
    ///   morph's source vertices in either hemisphere.
    pub fn apply(&self, estimate: &SurfaceEstimate) -> Result<SurfaceEstimate> {
        if let Some(subject) = estimate.subject() {
            if subject != self.subject_from {
                return Err(MorphError::config(format!(
                    "estimate subject ({subject}) != morph subject_from ({})",
                    self.subject_from
                )));
            }
        }
        for hemi in Hemisphere::BOTH {
            let (expected, actual) = (&self.vertices_from[hemi.index()], &estimate.vertices()[hemi.index()]);
            if expected != actual {
                return Err(MorphError::shape(format!(
                    "vertices do not match between morph ({}) and estimate ({}) for the {hemi} hemisphere",
                    expected.len(),
                    actual.len()
                )));
            }
        }

        // Vector components sit side by side in the columns, so one product
        // morphs all of them
        let data = self.morph_mat.mul_dense(estimate.data());
        debug!(
            rows = data.nrows(),
            cols = data.ncols(),
            "applied morph matrix"
        );
        Ok(estimate.morphed(self.vertices_to.clone(), data, &self.subject_to))
    }
}

impl SourceMorph {
    /// Morph an estimate of the matching kind.
    ///
    /// # Errors
    ///
    /// [`MorphError::Configuration`] if a surface estimate is given to a volume
    /// morph or the reverse, plus everything [`SurfaceMorph::apply`] and
    /// [`super::VolumeMorph::apply`] report.
    pub fn apply(&self, estimate: Estimate) -> Result<Estimate> {
        match (self, &estimate) {
            (SourceMorph::Surface(m), Estimate::Surface(e)) => m.apply(e).map(Estimate::Surface),
            (SourceMorph::Volume(m), Estimate::Volume(e)) => m.apply(e).map(Estimate::Volume),
            _ => Err(MorphError::config(format!(
                "cannot apply a {} morph to a {} estimate",
                self.kind(),
                match estimate {
                    Estimate::Surface(_) => "surface",
                    Estimate::Volume(_) => "volume",
                }
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ico_surface, Hemisphere};
    use crate::morph::estimate::VolumeEstimate;
    use crate::morph::{compute_source_morph, Grade, MorphOptions, SourceSpace};
    use crate::store::InMemoryStore;
    use nalgebra::DMatrix;

    fn morph(vertices: [Vec<usize>; 2]) -> SourceMorph {
        let ico = ico_surface(1).unwrap();
        let store = InMemoryStore::new()
            .with_sphere("sample", Hemisphere::Left, ico.clone())
            .with_sphere("sample", Hemisphere::Right, ico);
        let source = SourceSpace::surface(Some("sample"), vertices);
        let opts = MorphOptions::default()
            .with_subject_to("sample")
            .with_grade(Grade::Vertices([vec![0, 1, 2, 3], vec![10, 11]]))
            .with_smooth(2)
            .with_warn(false);
        compute_source_morph(&source, &opts, &store, None).unwrap()
    }

    #[test]
    fn test_scalar_apply_keeps_timing() {
        let verts = [vec![0, 6], vec![11]];
        let m = morph(verts.clone());
        let stc = SurfaceEstimate::scalar(verts, DMatrix::from_element(3, 5, 2.0), -0.1, 0.01)
            .unwrap()
            .with_subject("sample");
        let Estimate::Surface(out) = m.apply(stc.into()).unwrap() else {
            panic!("expected a surface estimate");
        };
        assert_eq!(out.vertices(), &[vec![0, 1, 2, 3], vec![10, 11]]);
        assert_eq!(out.data().shape(), (6, 5));
        assert_eq!(out.tmin(), -0.1);
        assert_eq!(out.tstep(), 0.01);
        assert_eq!(out.subject(), Some("sample"));
    }

    #[test]
    fn test_vector_apply_keeps_components() {
        let verts = [vec![0, 6], vec![11]];
        let m = morph(verts.clone());
        let data = DMatrix::from_fn(3, 3 * 4, |i, j| (i + j) as f64);
        let stc = SurfaceEstimate::vector(verts, data, 0.0, 0.01).unwrap();
        let Estimate::Surface(out) = m.apply(stc.clone().into()).unwrap() else {
            panic!("expected a surface estimate");
        };
        assert!(out.is_vector());
        assert_eq!(out.n_times(), 4);
        assert_eq!(out.data().shape(), (6, 12));

        // Each component matches morphing it on its own
        let SourceMorph::Surface(sm) = &m else { unreachable!() };
        for dim in 0..3 {
            let expected = sm.morph_mat().mul_dense(&stc.component(dim).unwrap());
            assert_eq!(out.component(dim).unwrap(), expected);
        }
    }

    #[test]
    fn test_mismatched_layout() {
        let m = morph([vec![0, 6], vec![11]]);
        let stc = SurfaceEstimate::scalar([vec![0, 7], vec![11]], DMatrix::zeros(3, 1), 0.0, 1.0)
            .unwrap();
        let err = m.apply(stc.into()).unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
        assert!(err.to_string().contains("left hemisphere"));
    }

    #[test]
    fn test_mismatched_subject() {
        let m = morph([vec![0, 6], vec![11]]);
        let stc = SurfaceEstimate::scalar([vec![0, 6], vec![11]], DMatrix::zeros(3, 1), 0.0, 1.0)
            .unwrap()
            .with_subject("other");
        assert!(matches!(m.apply(stc.into()), Err(MorphError::Configuration { .. })));
    }

    #[test]
    fn test_kind_mismatch() {
        let m = morph([vec![0], vec![1]]);
        let est = VolumeEstimate::new(vec![0], [1, 1, 1], DMatrix::zeros(1, 1), 0.0, 1.0).unwrap();
        let err = m.apply(est.into()).unwrap_err();
        assert!(err.to_string().contains("surface morph to a volume estimate"));
    }
}
