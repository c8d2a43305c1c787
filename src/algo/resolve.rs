//! Destination vertex resolution.
//!
//! A [`Grade`] names the destination vertex set of a surface morph. It is
//! turned into a concrete `[left, right]` pair of sorted vertex indices by
//! [`grade_to_vertices`].

use std::fmt;

use kiddo::KdTree;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MorphError, Result};
use crate::mesh::{ico_surface, Hemisphere, Surface};
use crate::store::SubjectStore;

/// Number of vertices per hemisphere of the grade-5 icosahedral source space.
pub const FSAVERAGE_ICO5_VERTICES: usize = 10_242;

/// Destination resolution of a surface morph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    /// Vertices nearest to an icosahedron subdivided this many times.
    Ico(u32),
    /// Explicit `[left, right]` vertex lists, used as given.
    Vertices([Vec<usize>; 2]),
    /// Every vertex of both hemispheres.
    Full,
}

impl Default for Grade {
    fn default() -> Self {
        Grade::Ico(5)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Ico(g) => write!(f, "ico{g}"),
            Grade::Vertices([lh, rh]) => write!(f, "vertices ({}, {})", lh.len(), rh.len()),
            Grade::Full => f.write_str("full"),
        }
    }
}

/// Resolve `grade` into sorted destination vertices of `subject`, `[left, right]`.
///
/// Icosahedral grades map every reference vertex onto its nearest neighbor on
/// the subject's registered sphere (both normalized to unit radius). With
/// `parallel` set the two hemispheres are searched concurrently.
///
/// # Errors
///
/// - [`MorphError::MissingResource`] if a sphere is not available.
/// - [`MorphError::DegenerateMapping`] if two reference vertices land on the
///   same subject vertex.
/// - [`MorphError::InvalidParameter`] for an unsupported subdivision level.
pub fn grade_to_vertices(
    subject: &str,
    grade: &Grade,
    store: &dyn SubjectStore,
    parallel: bool,
) -> Result<[Vec<usize>; 2]> {
    match grade {
        Grade::Ico(5) if subject == "fsaverage" => {
            debug!("using the precomputed fsaverage grade 5 vertices");
            let all: Vec<usize> = (0..FSAVERAGE_ICO5_VERTICES).collect();
            Ok([all.clone(), all])
        }
        Grade::Ico(level) => {
            info!(subject, grade = level, "resolving icosahedral destination vertices");
            let ico = ico_surface(*level)?;
            let spheres = [
                store.sphere(subject, Hemisphere::Left)?,
                store.sphere(subject, Hemisphere::Right)?,
            ];

            let search = |sphere: &Surface| nearest_vertices(sphere, ico.points());
            let [lh, rh] = &spheres;
            let (lh, rh) = if parallel {
                rayon::join(|| search(lh.as_ref()), || search(rh.as_ref()))
            } else {
                (search(lh.as_ref()), search(rh.as_ref()))
            };

            let vertices = [lh, rh];
            for verts in &vertices {
                if verts.windows(2).any(|w| w[0] == w[1]) {
                    return Err(MorphError::DegenerateMapping {
                        grade: *level,
                        subject: subject.to_string(),
                        n_vertices: verts.len(),
                    });
                }
            }
            Ok(vertices)
        }
        Grade::Vertices(pair) => Ok(pair.clone()),
        Grade::Full => Ok([
            (0..store.sphere(subject, Hemisphere::Left)?.num_vertices()).collect(),
            (0..store.sphere(subject, Hemisphere::Right)?.num_vertices()).collect(),
        ]),
    }
}

/// For every query point, the index of the nearest vertex of `sphere` after
/// projecting both onto the unit sphere. The result is sorted.
fn nearest_vertices(sphere: &Surface, queries: &[Point3<f64>]) -> Vec<usize> {
    let mut kdtree: KdTree<f64, 3> = KdTree::new();
    for (i, p) in sphere.unit_sphere_points().iter().enumerate() {
        kdtree.add(&[p.x, p.y, p.z], i as u64);
    }

    let mut nearest: Vec<usize> = queries
        .iter()
        .map(|q| {
            let q = q.coords.normalize();
            kdtree.nearest_one::<kiddo::SquaredEuclidean>(&[q.x, q.y, q.z]).item as usize
        })
        .collect();
    nearest.sort_unstable();
    nearest
}
