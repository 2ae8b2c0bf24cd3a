//! Shared triangle mesh storage.
//!
//! Triangles do not copy their vertices; each `Triangle` primitive holds an
//! `Arc<Mesh>` back-reference plus three vertex indices.

use std::sync::Arc;

use lumen_math::{BBox, Vec3};

use crate::bsdf::BsdfId;
use crate::scene::{SceneError, SceneResult};
use crate::triangle::Triangle;
use crate::Primitive;

/// Vertex positions, per-vertex shading normals and triangle indices.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Unit shading normals, same length as `positions`
    pub normals: Vec<Vec3>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: BBox,
}

impl Mesh {
    /// Create a mesh, validating indices against the vertex count.
    ///
    /// When `normals` is `None`, smooth vertex normals are computed from the
    /// counter-clockwise face winding.
    pub fn new(
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        normals: Option<Vec<Vec3>>,
    ) -> SceneResult<Self> {
        if indices.len() % 3 != 0 {
            return Err(SceneError::IncompleteTriangle { len: indices.len() });
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(SceneError::MeshIndexOutOfRange {
                index: index as usize,
                len: positions.len(),
            });
        }

        let bounds = positions.iter().fold(BBox::EMPTY, |mut acc, p| {
            acc.expand_point(*p);
            acc
        });

        let normals = match normals {
            Some(normals) if normals.len() != positions.len() => {
                return Err(SceneError::NormalCountMismatch {
                    normals: normals.len(),
                    positions: positions.len(),
                });
            }
            Some(normals) => normals.into_iter().map(|n| n.normalize_or_zero()).collect(),
            None => Self::smooth_normals(&positions, &indices),
        };

        Ok(Self {
            positions,
            normals,
            indices,
            bounds,
        })
    }

    /// Average area-weighted face normals at each vertex.
    fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
        let mut normals = vec![Vec3::ZERO; positions.len()];

        for face in indices.chunks_exact(3) {
            let [i0, i1, i2] = [face[0] as usize, face[1] as usize, face[2] as usize];
            let face_normal = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            // Unreferenced or fully degenerate vertices fall back to +Y.
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }
        normals
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// One triangle primitive per face, all bound to `bsdf`.
    pub fn triangles(mesh: &Arc<Mesh>, bsdf: BsdfId) -> Vec<Primitive> {
        mesh.indices
            .chunks_exact(3)
            .map(|face| {
                let face = [face[0] as usize, face[1] as usize, face[2] as usize];
                Primitive::Triangle(Triangle::new(Arc::clone(mesh), face, bsdf))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_positions() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = Mesh::new(quad_positions(), vec![0, 1, 2, 1, 3, 2], None).unwrap();

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.bounds.min, Vec3::ZERO);
        assert_eq!(mesh.bounds.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_smooth_normals_follow_ccw_winding() {
        let mesh = Mesh::new(quad_positions(), vec![0, 1, 2, 1, 3, 2], None).unwrap();
        for normal in &mesh.normals {
            assert!((*normal - Vec3::Z).length() < 1e-12, "normal {normal:?}");
        }
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let err = Mesh::new(quad_positions(), vec![0, 1, 7], None).unwrap_err();
        assert!(matches!(err, SceneError::MeshIndexOutOfRange { index: 7, len: 4 }));
    }

    #[test]
    fn test_normal_count_must_match() {
        let err = Mesh::new(quad_positions(), vec![0, 1, 2], Some(vec![Vec3::Z])).unwrap_err();
        assert!(matches!(err, SceneError::NormalCountMismatch { normals: 1, positions: 4 }));
    }

    #[test]
    fn test_triangles_share_the_mesh() {
        let mesh = Arc::new(Mesh::new(quad_positions(), vec![0, 1, 2, 1, 3, 2], None).unwrap());
        let prims = Mesh::triangles(&mesh, BsdfId(3));
        assert_eq!(prims.len(), 2);
        assert_eq!(Arc::strong_count(&mesh), 3);
        assert!(prims.iter().all(|p| p.bsdf() == BsdfId(3)));
    }
}
