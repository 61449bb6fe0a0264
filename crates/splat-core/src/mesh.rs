use std::ops::{Deref, DerefMut};

use crate::geometry_indices::{FaceIndex, PointIndex};
use crate::point_cloud::PointCloud;

pub type Face = [PointIndex; 3];

/// Placeholder for face slots reserved before they are written.
const DEGENERATE_FACE: Face = [PointIndex(0), PointIndex(0), PointIndex(0)];

/// A point cloud with triangle connectivity.
///
/// Faces hold point indices in fixed corner order. Connectivity is stored
/// apart from the attribute columns, so face slots may be reserved before
/// the vertex data (and with it the point count) exists; once both sides
/// are in place, [`Mesh::is_face_valid`] ties a face back to the stored
/// points.
#[derive(Debug, Default, Clone)]
pub struct Mesh {
    point_cloud: PointCloud,
    faces: Vec<Face>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_face(&mut self, face: Face) {
        self.faces.push(face);
    }

    /// Writes the face at `face_id`, reserving degenerate slots up to it
    /// when the connectivity has not been sized that far yet.
    pub fn set_face(&mut self, face_id: FaceIndex, face: Face) {
        let slot = face_id.0 as usize;
        if slot >= self.faces.len() {
            self.faces.resize(slot + 1, DEGENERATE_FACE);
        }
        self.faces[slot] = face;
    }

    /// Reserves degenerate faces or truncates down to `num_faces`.
    pub fn set_num_faces(&mut self, num_faces: usize) {
        self.faces.resize(num_faces, DEGENERATE_FACE);
    }

    pub fn face(&self, face_id: FaceIndex) -> Face {
        self.faces[face_id.0 as usize]
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// True when every corner addresses a stored point.
    pub fn is_face_valid(&self, face: &Face) -> bool {
        let num_points = self.point_cloud.num_points();
        face.iter().all(|corner| (corner.0 as usize) < num_points)
    }

    /// Point-id deduplication that also remaps face corners.
    pub fn deduplicate_point_ids(&mut self) -> Option<Vec<PointIndex>> {
        let id_map = self.point_cloud.deduplicate_point_ids()?;
        for face in self.faces.iter_mut() {
            for corner in face.iter_mut() {
                *corner = id_map[corner.0 as usize];
            }
        }
        Some(id_map)
    }
}

impl Deref for Mesh {
    type Target = PointCloud;

    fn deref(&self) -> &Self::Target {
        &self.point_cloud
    }
}

impl DerefMut for Mesh {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.point_cloud
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_num_faces_truncates() {
        let mut mesh = Mesh::new();
        mesh.set_num_faces(3);
        mesh.set_face(FaceIndex(2), [PointIndex(1), PointIndex(2), PointIndex(3)]);
        assert_eq!(mesh.num_faces(), 3);
        mesh.set_num_faces(1);
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(mesh.face(FaceIndex(0)), DEGENERATE_FACE);
    }

    #[test]
    fn test_set_face_reserves_missing_slots() {
        let mut mesh = Mesh::new();
        mesh.set_face(FaceIndex(2), [PointIndex(4), PointIndex(5), PointIndex(6)]);
        assert_eq!(mesh.num_faces(), 3);
        assert_eq!(mesh.face(FaceIndex(0)), DEGENERATE_FACE);
        assert_eq!(mesh.face(FaceIndex(1)), DEGENERATE_FACE);
        assert_eq!(
            mesh.face(FaceIndex(2)),
            [PointIndex(4), PointIndex(5), PointIndex(6)]
        );
    }

    #[test]
    fn test_add_face() {
        let mut mesh = Mesh::new();
        mesh.add_face([PointIndex(0), PointIndex(1), PointIndex(2)]);
        assert_eq!(mesh.num_faces(), 1);
        assert_eq!(
            mesh.face(FaceIndex(0)),
            [PointIndex(0), PointIndex(1), PointIndex(2)]
        );
    }

    #[test]
    fn test_face_validity_tracks_point_count() {
        let mut mesh = Mesh::new();
        mesh.set_num_points(3);
        assert!(mesh.is_face_valid(&[PointIndex(0), PointIndex(1), PointIndex(2)]));
        assert!(!mesh.is_face_valid(&[PointIndex(0), PointIndex(1), PointIndex(3)]));
        // An empty cloud has no valid faces at all.
        let empty = Mesh::new();
        assert!(!empty.is_face_valid(&[PointIndex(0), PointIndex(0), PointIndex(0)]));
    }
}
