//! Canonical icosahedral reference meshes.
//!
//! Grade `g` is the regular icosahedron subdivided `g` times, each pass
//! splitting every triangle into four and pushing the new edge midpoints onto
//! the unit sphere. Grade `g` has `10 * 4^g + 2` vertices.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::{MorphError, Result};

use super::Surface;

/// Highest subdivision level accepted by [`ico_surface`].
pub const MAX_ICO_GRADE: u32 = 7;

/// Build the icosahedral reference surface at subdivision level `grade`.
///
/// # Errors
///
/// Returns [`MorphError::InvalidParameter`] if `grade` exceeds [`MAX_ICO_GRADE`].
pub fn ico_surface(grade: u32) -> Result<Surface> {
    if grade > MAX_ICO_GRADE {
        return Err(MorphError::invalid_param(
            "grade",
            grade,
            "icosahedral subdivision is limited to 7 levels",
        ));
    }

    let (mut points, mut triangles) = icosahedron();
    for _ in 0..grade {
        (points, triangles) = subdivide_once(&points, &triangles);
    }
    Surface::new(points, triangles)
}

/// The regular icosahedron with vertices on the unit sphere.
fn icosahedron() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let raw = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ];
    let points = raw
        .iter()
        .map(|&[x, y, z]| Point3::from(Point3::new(x, y, z).coords.normalize()))
        .collect();

    let triangles = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    (points, triangles)
}

/// Split every triangle into four, projecting new vertices onto the unit sphere.
fn subdivide_once(
    points: &[Point3<f64>],
    triangles: &[[usize; 3]],
) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut new_points = points.to_vec();
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
    let mut new_triangles = Vec::with_capacity(triangles.len() * 4);

    let mut midpoint = |a: usize, b: usize, pts: &mut Vec<Point3<f64>>| -> usize {
        // Canonical edge key (smaller index first)
        let key = if a < b { (a, b) } else { (b, a) };
        *midpoints.entry(key).or_insert_with(|| {
            let mid = (pts[a].coords + pts[b].coords).normalize();
            pts.push(Point3::from(mid));
            pts.len() - 1
        })
    };

    for &[v0, v1, v2] in triangles {
        let m01 = midpoint(v0, v1, &mut new_points);
        let m12 = midpoint(v1, v2, &mut new_points);
        let m20 = midpoint(v2, v0, &mut new_points);

        new_triangles.push([v0, m01, m20]);
        new_triangles.push([v1, m12, m01]);
        new_triangles.push([v2, m20, m12]);
        new_triangles.push([m01, m12, m20]);
    }

    (new_points, new_triangles)
}
