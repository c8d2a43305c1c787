//! Access to per-subject resources.
//!
//! Surfaces, morph maps and MRI volumes live outside this crate. The morph
//! pipeline reads them through the [`SubjectStore`] capability, which callers
//! implement over whatever storage they use. [`InMemoryStore`] is a ready-made
//! implementation for data that is already loaded.
//!
//! # Morph map contract
//!
//! `morph_map(from, to, hemi, xhemi)` returns a sparse matrix whose columns are
//! the vertices of `from`'s `hemi` sphere and whose rows are the vertices of
//! `to`'s destination hemisphere (`hemi`, or the opposite one when `xhemi` is
//! set). Each row holds barycentric weights summing to one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MorphError, Result};
use crate::mesh::{Hemisphere, Surface};
use crate::morph::Volume;
use crate::sparse::CsrMatrix;

/// Provider of subject surfaces, morph maps and volumes.
pub trait SubjectStore: Send + Sync {
    /// The registered sphere surface of one hemisphere of `subject`.
    fn sphere(&self, subject: &str, hemi: Hemisphere) -> Result<Arc<Surface>>;

    /// The precomputed morph map for source hemisphere `hemi` of `from` onto `to`.
    fn morph_map(
        &self,
        from: &str,
        to: &str,
        hemi: Hemisphere,
        xhemi: bool,
    ) -> Result<Arc<CsrMatrix>>;

    /// The anatomical volume of `subject`, used by volume morphs.
    fn mri(&self, subject: &str) -> Result<Volume> {
        Err(MorphError::missing("MRI volume", subject))
    }
}

/// Both hemisphere spheres of a subject, `[left, right]`.
pub fn read_spheres(store: &dyn SubjectStore, subject: &str) -> Result<[Arc<Surface>; 2]> {
    Ok([
        store.sphere(subject, Hemisphere::Left)?,
        store.sphere(subject, Hemisphere::Right)?,
    ])
}

/// Morph maps for both source hemispheres, `[left, right]`.
///
/// Morphing a subject onto itself within each hemisphere needs no stored map:
/// the map is the identity on that hemisphere's sphere.
pub fn read_morph_maps(
    store: &dyn SubjectStore,
    from: &str,
    to: &str,
    xhemi: bool,
) -> Result<[Arc<CsrMatrix>; 2]> {
    let read = |hemi: Hemisphere| -> Result<Arc<CsrMatrix>> {
        if from == to && !xhemi {
            let n = store.sphere(from, hemi)?.num_vertices();
            debug!(subject = from, hemi = hemi.as_str(), n, "using identity morph map");
            return Ok(Arc::new(CsrMatrix::identity(n)));
        }
        store.morph_map(from, to, hemi, xhemi)
    };
    Ok([read(Hemisphere::Left)?, read(Hemisphere::Right)?])
}

/// A [`SubjectStore`] backed by in-memory maps.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    spheres: HashMap<(String, Hemisphere), Arc<Surface>>,
    morph_maps: HashMap<(String, String, Hemisphere, bool), Arc<CsrMatrix>>,
    mris: HashMap<String, Volume>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sphere surface of one hemisphere.
    pub fn with_sphere(mut self, subject: &str, hemi: Hemisphere, surface: Surface) -> Self {
        self.spheres
            .insert((subject.to_string(), hemi), Arc::new(surface));
        self
    }

    /// Register a morph map for source hemisphere `hemi`.
    pub fn with_morph_map(
        mut self,
        from: &str,
        to: &str,
        hemi: Hemisphere,
        xhemi: bool,
        map: CsrMatrix,
    ) -> Self {
        self.morph_maps
            .insert((from.to_string(), to.to_string(), hemi, xhemi), Arc::new(map));
        self
    }

    /// Register the anatomical volume of a subject.
    pub fn with_mri(mut self, subject: &str, volume: Volume) -> Self {
        self.mris.insert(subject.to_string(), volume);
        self
    }
}

impl SubjectStore for InMemoryStore {
    fn sphere(&self, subject: &str, hemi: Hemisphere) -> Result<Arc<Surface>> {
        self.spheres
            .get(&(subject.to_string(), hemi))
            .cloned()
            .ok_or_else(|| {
                MorphError::missing("sphere surface", format!("{subject}/{}.sphere.reg", hemi.as_str()))
            })
    }

    fn morph_map(
        &self,
        from: &str,
        to: &str,
        hemi: Hemisphere,
        xhemi: bool,
    ) -> Result<Arc<CsrMatrix>> {
        self.morph_maps
            .get(&(from.to_string(), to.to_string(), hemi, xhemi))
            .cloned()
            .ok_or_else(|| {
                let reg = if xhemi { "left_right" } else { "reg" };
                MorphError::missing(
                    "morph map",
                    format!("{from} -> {to} ({}.sphere.{reg})", hemi.as_str()),
                )
            })
    }

    fn mri(&self, subject: &str) -> Result<Volume> {
        self.mris
            .get(subject)
            .cloned()
            .ok_or_else(|| MorphError::missing("MRI volume", subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn triangle() -> Surface {
        let points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        Surface::new(points, vec![[0, 1, 2]]).unwrap()
    }

    #[test]
    fn test_missing_sphere_is_reported() {
        let store = InMemoryStore::new();
        let err = store.sphere("sample", Hemisphere::Left).unwrap_err();
        assert!(matches!(err, MorphError::MissingResource { kind: "sphere surface", .. }));
        assert!(err.to_string().contains("sample/lh.sphere.reg"));
    }

    #[test]
    fn test_same_subject_maps_are_identity() {
        let store = InMemoryStore::new()
            .with_sphere("sym", Hemisphere::Left, triangle())
            .with_sphere("sym", Hemisphere::Right, triangle());
        let maps = read_morph_maps(&store, "sym", "sym", false).unwrap();
        assert_eq!(*maps[0], CsrMatrix::identity(3));
        assert_eq!(*maps[1], CsrMatrix::identity(3));
    }

    #[test]
    fn test_cross_hemisphere_maps_come_from_store() {
        let store = InMemoryStore::new()
            .with_sphere("sym", Hemisphere::Left, triangle())
            .with_sphere("sym", Hemisphere::Right, triangle());
        let err = read_morph_maps(&store, "sym", "sym", true).unwrap_err();
        assert!(err.to_string().contains("left_right"));

        let store = store
            .with_morph_map("sym", "sym", Hemisphere::Left, true, CsrMatrix::identity(3))
            .with_morph_map("sym", "sym", Hemisphere::Right, true, CsrMatrix::identity(3));
        assert!(read_morph_maps(&store, "sym", "sym", true).is_ok());
    }
}
