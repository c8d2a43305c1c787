//! Saving and loading precomputed morphs.
//!
//! A morph is stored as a JSON record tagged with its kind. Surface morphs
//! carry their configuration, vertex lists and the sparse operator as
//! `shape`/`indptr`/`indices`/`data`; floats round-trip exactly. Volume
//! morphs carry the registration transforms as `(kind, params)` pairs that the
//! registration backend rebuilds on load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MorphError, Result};

use super::volume::{VolumeMorph, VolumeRegistration, VolumeTransform};
use super::{SourceMorph, SurfaceMorph};

/// Suffix appended to morph file names that do not already end in `.json`.
pub const MORPH_SUFFIX: &str = "-morph.json";

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MorphRecord {
    Surface(SurfaceMorph),
    Volume(VolumeRecord),
}

#[derive(Serialize, Deserialize)]
struct VolumeRecord {
    subject_from: String,
    subject_to: String,
    niter_affine: Vec<usize>,
    niter_sdr: Vec<usize>,
    vertices_from: Vec<usize>,
    shape_from: [usize; 3],
    pre_affine: TransformRecord,
    mapping: TransformRecord,
}

#[derive(Serialize, Deserialize)]
struct TransformRecord {
    kind: String,
    params: serde_json::Value,
}

impl TransformRecord {
    fn of(transform: &dyn VolumeTransform) -> Self {
        Self {
            kind: transform.kind().to_string(),
            params: transform.to_record(),
        }
    }

    fn restore(&self, registration: &dyn VolumeRegistration) -> Result<Arc<dyn VolumeTransform>> {
        registration.restore(&self.kind, &self.params)
    }
}

impl SourceMorph {
    /// Encode this morph as a JSON record.
    pub fn to_record(&self) -> Result<serde_json::Value> {
        let record = match self {
            SourceMorph::Surface(m) => MorphRecord::Surface(m.clone()),
            SourceMorph::Volume(m) => MorphRecord::Volume(VolumeRecord {
                subject_from: m.subject_from.clone(),
                subject_to: m.subject_to.clone(),
                niter_affine: m.niter_affine.clone(),
                niter_sdr: m.niter_sdr.clone(),
                vertices_from: m.vertices_from.clone(),
                shape_from: m.shape_from,
                pre_affine: TransformRecord::of(m.pre_affine.as_ref()),
                mapping: TransformRecord::of(m.mapping.as_ref()),
            }),
        };
        Ok(serde_json::to_value(record)?)
    }

    /// Rebuild a morph from [`SourceMorph::to_record`] output.
    ///
    /// Volume morphs need the registration backend that produced them to
    /// restore their transforms.
    ///
    /// # Errors
    ///
    /// - [`MorphError::Serialization`] if the record is malformed.
    /// - [`MorphError::DataShape`] if the stored operator does not match the
    ///   stored vertex lists, or a source voxel lies outside the source grid.
    /// - [`MorphError::Configuration`] if a volume record is read without a
    ///   registration backend.
    pub fn from_record(
        record: serde_json::Value,
        registration: Option<&dyn VolumeRegistration>,
    ) -> Result<Self> {
        match serde_json::from_value::<MorphRecord>(record)? {
            MorphRecord::Surface(m) => {
                let n_to: usize = m.vertices_to.iter().map(Vec::len).sum();
                let n_from: usize = m.vertices_from.iter().map(Vec::len).sum();
                if m.morph_mat.shape() != (n_to, n_from) {
                    return Err(MorphError::shape(format!(
                        "morph matrix is {:?} but the record lists {n_to} destination and {n_from} source vertices",
                        m.morph_mat.shape()
                    )));
                }
                Ok(SourceMorph::Surface(m))
            }
            MorphRecord::Volume(r) => {
                let n_voxels: usize = r.shape_from.iter().product();
                if let Some(&bad) = r.vertices_from.iter().find(|&&v| v >= n_voxels) {
                    return Err(MorphError::shape(format!(
                        "voxel {bad} is outside a source grid of shape {:?}",
                        r.shape_from
                    )));
                }
                let registration = registration.ok_or_else(|| {
                    MorphError::config("reading a volume morph needs a registration backend")
                })?;
                Ok(SourceMorph::Volume(VolumeMorph {
                    pre_affine: r.pre_affine.restore(registration)?,
                    mapping: r.mapping.restore(registration)?,
                    subject_from: r.subject_from,
                    subject_to: r.subject_to,
                    niter_affine: r.niter_affine,
                    niter_sdr: r.niter_sdr,
                    vertices_from: r.vertices_from,
                    shape_from: r.shape_from,
                }))
            }
        }
    }

    /// Save this morph to `path`, appending [`MORPH_SUFFIX`] unless the name
    /// already ends in `.json`. Returns the path written.
    ///
    /// # Errors
    ///
    /// - [`MorphError::Configuration`] if the file exists and `overwrite` is false.
    /// - [`MorphError::Io`] if writing fails.
    pub fn save(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<PathBuf> {
        let path = morph_file_name(path.as_ref());
        if path.exists() && !overwrite {
            return Err(MorphError::config(format!(
                "destination file {} exists, use overwrite to replace it",
                path.display()
            )));
        }

        let json = serde_json::to_string(&self.to_record()?)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), kind = self.kind(), "saved source morph");
        Ok(path)
    }
}

/// Read a morph written by [`SourceMorph::save`].
///
/// # Errors
///
/// - [`MorphError::MissingResource`] if the file does not exist.
/// - Everything [`SourceMorph::from_record`] reports.
pub fn read_source_morph(
    path: impl AsRef<Path>,
    registration: Option<&dyn VolumeRegistration>,
) -> Result<SourceMorph> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MorphError::missing("morph file", path.display().to_string()));
    }
    let contents = std::fs::read_to_string(path)?;
    let record: serde_json::Value = serde_json::from_str(&contents)?;
    SourceMorph::from_record(record, registration)
}

fn morph_file_name(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "json") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(MORPH_SUFFIX);
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ico_surface, Hemisphere};
    use crate::morph::volume::tests::{mri_store, ShiftRegistration};
    use crate::morph::{compute_source_morph, Grade, MorphOptions, SourceSpace};
    use crate::store::InMemoryStore;

    fn surface_morph() -> SourceMorph {
        let ico = ico_surface(1).unwrap();
        let store = InMemoryStore::new()
            .with_sphere("sample", Hemisphere::Left, ico.clone())
            .with_sphere("sample", Hemisphere::Right, ico);
        let source = SourceSpace::surface(Some("sample"), [vec![0, 9, 30], vec![4]]);
        let opts = MorphOptions::default()
            .with_subject_to("sample")
            .with_grade(Grade::Full)
            .with_smooth(4)
            .with_warn(false);
        compute_source_morph(&source, &opts, &store, None).unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(morph_file_name(Path::new("out/sample")), PathBuf::from("out/sample-morph.json"));
        assert_eq!(morph_file_name(Path::new("out/x.json")), PathBuf::from("out/x.json"));
        assert_eq!(morph_file_name(Path::new("out/x.h5")), PathBuf::from("out/x.h5-morph.json"));
    }

    #[test]
    fn test_surface_record_round_trip() {
        let morph = surface_morph();
        let record = morph.to_record().unwrap();
        assert_eq!(record["kind"], "surface");
        assert!(record["morph_mat"]["indptr"].is_array());

        let SourceMorph::Surface(back) = SourceMorph::from_record(record, None).unwrap() else {
            panic!("expected a surface morph");
        };
        let SourceMorph::Surface(orig) = &morph else { unreachable!() };
        assert_eq!(&back, orig);
    }

    #[test]
    fn test_surface_record_with_wrong_vertex_count() {
        let mut record = surface_morph().to_record().unwrap();
        record["vertices_from"] = serde_json::json!([[0, 1], [2]]);
        let err = SourceMorph::from_record(record, None).unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
    }

    #[test]
    fn test_volume_record_with_voxel_outside_grid() {
        let source = SourceSpace::volume(Some("a"), vec![0, 5], [2, 2, 4]);
        let opts = MorphOptions::default().with_subject_to("b").with_niter(vec![1], vec![1]);
        let morph = compute_source_morph(&source, &opts, &mri_store(), Some(&ShiftRegistration)).unwrap();
        let mut record = morph.to_record().unwrap();
        record["vertices_from"] = serde_json::json!([0, 16]);
        let err = SourceMorph::from_record(record, Some(&ShiftRegistration)).unwrap_err();
        assert!(matches!(err, MorphError::DataShape { .. }));
    }

    #[test]
    fn test_save_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let morph = surface_morph();
        let written = morph.save(dir.path().join("sample"), false).unwrap();
        assert!(written.ends_with("sample-morph.json"));

        let err = morph.save(dir.path().join("sample"), false).unwrap_err();
        assert!(matches!(err, MorphError::Configuration { .. }));
        assert!(morph.save(dir.path().join("sample"), true).is_ok());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_source_morph(dir.path().join("nothing-morph.json"), None).unwrap_err();
        assert!(matches!(err, MorphError::MissingResource { kind: "morph file", .. }));
    }

    #[test]
    fn test_volume_round_trip_restores_transforms() {
        let source = SourceSpace::volume(Some("a"), vec![0, 5], [2, 2, 4]);
        let opts = MorphOptions::default().with_subject_to("b").with_niter(vec![1, 1], vec![1]);
        let morph = compute_source_morph(&source, &opts, &mri_store(), Some(&ShiftRegistration)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = morph.save(dir.path().join("vol.json"), false).unwrap();

        let err = read_source_morph(&path, None).unwrap_err();
        assert!(matches!(err, MorphError::Configuration { .. }));

        let back = read_source_morph(&path, Some(&ShiftRegistration)).unwrap();
        let SourceMorph::Volume(v) = back else {
            panic!("expected a volume morph");
        };
        assert_eq!(v.mapping.kind(), "shift");
        assert_eq!(v.mapping.to_record()["offset"], 2);
        assert_eq!(v.niter_affine(), &[1, 1]);
    }
}
