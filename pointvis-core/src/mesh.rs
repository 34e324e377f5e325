//! Triangle mesh that texture samples are placed on

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::point::*;

/// A triangle mesh with one texture face per triangle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Corner positions of a face
    pub fn triangle(&self, face: usize) -> Option<[Point3f; 3]> {
        let [a, b, c] = *self.faces.get(face)?;
        Some([
            *self.vertices.get(a)?,
            *self.vertices.get(b)?,
            *self.vertices.get(c)?,
        ])
    }

    /// Fail if any face references a vertex that does not exist
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        match self.faces.iter().position(|f| f.iter().any(|&i| i >= n)) {
            Some(face) => Err(Error::UnsupportedMeshTopology(format!(
                "face {face} references a vertex outside 0..{n}"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_lookup_and_validation() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.triangle(0).unwrap()[1], Point3f::new(1.0, 0.0, 0.0));
        assert!(mesh.triangle(1).is_none());

        mesh.faces.push([0, 1, 5]);
        assert!(matches!(mesh.validate(), Err(Error::UnsupportedMeshTopology(_))));
    }
}
