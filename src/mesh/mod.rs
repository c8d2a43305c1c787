//! Core mesh data structures.
//!
//! This module provides the triangulated [`Surface`] used for one hemisphere's
//! spherical registration, the [`Hemisphere`] tag, the mesh edge graph that
//! drives diffusion smoothing, and the canonical icosahedral reference mesh.
//!
//! # Construction
//!
//! ```
//! use cortex_morph::mesh::Surface;
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let surface = Surface::new(points, vec![[0, 1, 2]]).unwrap();
//! assert_eq!(surface.num_vertices(), 3);
//! ```

mod graph;
mod ico;

use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{MorphError, Result};

pub use graph::{diffusion_kernel, mesh_edges};
pub use ico::{ico_surface, MAX_ICO_GRADE};

/// One cortical hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hemisphere {
    /// Left hemisphere (index 0).
    Left,
    /// Right hemisphere (index 1).
    Right,
}

impl Hemisphere {
    /// Both hemispheres in storage order.
    pub const BOTH: [Hemisphere; 2] = [Hemisphere::Left, Hemisphere::Right];

    /// Position of this hemisphere in `[left, right]` pairs.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Hemisphere::Left => 0,
            Hemisphere::Right => 1,
        }
    }

    /// The other hemisphere.
    #[inline]
    pub fn opposite(self) -> Hemisphere {
        match self {
            Hemisphere::Left => Hemisphere::Right,
            Hemisphere::Right => Hemisphere::Left,
        }
    }

    /// Short FreeSurfer-style name.
    pub fn as_str(self) -> &'static str {
        match self {
            Hemisphere::Left => "lh",
            Hemisphere::Right => "rh",
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Hemisphere::Left => "left",
            Hemisphere::Right => "right",
        })
    }
}

/// A triangulated surface: ordered points plus triangles indexing them.
///
/// Surfaces are immutable once built; every triangle index is guaranteed to be
/// valid for the point set.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    points: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
}

impl Surface {
    /// Build a surface from points and triangles.
    ///
    /// # Errors
    ///
    /// Returns [`MorphError::InvalidVertexIndex`] if a triangle references a
    /// point that does not exist.
    pub fn new(points: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        for (fi, tri) in triangles.iter().enumerate() {
            for &vi in tri {
                if vi >= points.len() {
                    return Err(MorphError::InvalidVertexIndex { face: fi, vertex: vi });
                }
            }
        }
        Ok(Self { points, triangles })
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.points.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Vertex positions.
    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Triangles as vertex index triples.
    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Vertex positions projected onto the unit sphere.
    ///
    /// Points at the origin are left in place.
    pub fn unit_sphere_points(&self) -> Vec<Point3<f64>> {
        self.points
            .iter()
            .map(|p| {
                let norm = p.coords.norm();
                if norm > 0.0 {
                    Point3::from(p.coords / norm)
                } else {
                    *p
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_rejects_out_of_range_index() {
        let points = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let err = Surface::new(points, vec![[0, 1, 2]]).unwrap_err();
        assert!(matches!(err, MorphError::InvalidVertexIndex { face: 0, vertex: 2 }));
    }

    #[test]
    fn test_unit_sphere_points() {
        let points = vec![Point3::new(0.0, 3.0, 4.0), Point3::origin()];
        let surface = Surface::new(points, Vec::new()).unwrap();
        let unit = surface.unit_sphere_points();
        assert!((unit[0].coords.norm() - 1.0).abs() < 1e-12);
        assert!((unit[0].z - 0.8).abs() < 1e-12);
        assert_eq!(unit[1], Point3::origin());
    }

    #[test]
    fn test_hemisphere_helpers() {
        assert_eq!(Hemisphere::Left.opposite(), Hemisphere::Right);
        assert_eq!(Hemisphere::Right.index(), 1);
        assert_eq!(Hemisphere::Left.as_str(), "lh");
        assert_eq!(Hemisphere::Right.to_string(), "right");
    }
}
