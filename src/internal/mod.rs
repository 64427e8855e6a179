//! Engine-facing mesh and skeleton representation.
//!
//! Nothing here refers back to the source document, so the optimizer, the
//! tangent synthesizer and the exporter work on this data alone.

mod aabb;
mod bounds;
mod optimize;
mod tangent;

use nalgebra::{Matrix4, UnitQuaternion, Vector2, Vector3};

use crate::error::{ConversionError, ConversionResult};

pub use aabb::Aabb;
pub use bounds::{blend_position, compute_frame_bounds, compute_static_bounds};
pub use optimize::{
    CACHE_SIZE, average_transform_to_vertex_ratio, optimize_index_order, remove_degenerate_triangles,
};
pub use tangent::{calculate_normals, calculate_tangent_space, complete_vertex_data};

/// Joint influence on a vertex. `joint` is the 1-based joint index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight {
    pub joint: usize,
    pub weight: f32,
}

/// One material group of a mesh instance, with welded vertices.
///
/// Optional attributes are empty when absent; populated ones have exactly
/// one entry per vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub name: String,
    pub material: String,
    pub positions: Vec<Vector3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub tangents: Vec<Vector3<f32>>,
    pub bitangents: Vec<Vector3<f32>>,
    pub colors: Vec<Vector3<f32>>,
    /// `tex_coords[channel][vertex]`.
    pub tex_coords: Vec<Vec<Vector2<f32>>>,
    /// Per-vertex influences; empty for static meshes.
    pub weights: Vec<Vec<Weight>>,
    /// Triangle list.
    pub indices: Vec<u32>,
    pub bbox: Aabb,
}

impl SubMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_skinned(&self) -> bool {
        !self.weights.is_empty()
    }

    pub fn triangle(&self, t: usize) -> [usize; 3] {
        [
            self.indices[t * 3] as usize,
            self.indices[t * 3 + 1] as usize,
            self.indices[t * 3 + 2] as usize,
        ]
    }

    /// Check attribute lengths and index bounds.
    pub fn validate(&self) -> ConversionResult<()> {
        let n = self.vertex_count();
        let check = |name: &str, len: usize| {
            if len != 0 && len != n {
                Err(ConversionError::Integrity(format!(
                    "submesh '{}': {name} has {len} entries for {n} vertices",
                    self.name
                )))
            } else {
                Ok(())
            }
        };
        check("normals", self.normals.len())?;
        check("tangents", self.tangents.len())?;
        check("bitangents", self.bitangents.len())?;
        check("colors", self.colors.len())?;
        check("weights", self.weights.len())?;
        for channel in &self.tex_coords {
            check("tex coords", channel.len())?;
        }
        if self.indices.len() % 3 != 0 {
            return Err(ConversionError::Integrity(format!(
                "submesh '{}': index count {} is not a multiple of 3",
                self.name,
                self.indices.len()
            )));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(ConversionError::Integrity(format!(
                "submesh '{}': index {bad} out of range for {n} vertices",
                self.name
            )));
        }
        Ok(())
    }
}

/// Rotation and translation of a joint at one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub rotation: UnitQuaternion<f32>,
    pub translation: Vector3<f32>,
}

impl JointPose {
    pub fn to_matrix(&self) -> Matrix4<f32> {
        crate::math::compose(&self.rotation, &self.translation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointRecord {
    /// 1-based, in scene traversal order.
    pub index: usize,
    /// Parent joint index; 0 for the skeleton root.
    pub parent: usize,
    pub name: String,
    pub inverse_bind: Matrix4<f32>,
    /// Local pose per frame.
    pub relative_poses: Vec<JointPose>,
    /// Skinning pose per frame: absolute transform times inverse bind.
    pub absolute_poses: Vec<JointPose>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub name: String,
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
    /// Diffuse texture file name.
    pub texture: Option<String>,
}

/// Result of converting one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InternalData {
    pub meshes: Vec<SubMesh>,
    pub joints: Vec<JointRecord>,
    pub materials: Vec<MaterialRecord>,
    pub frame_count: usize,
    pub frame_rate: f32,
    /// One box per frame, enclosing all skinned submeshes.
    pub frame_bboxes: Vec<Aabb>,
}

impl InternalData {
    pub fn joint(&self, index: usize) -> Option<&JointRecord> {
        self.joints.iter().find(|j| j.index == index)
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(SubMesh::vertex_count).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(SubMesh::triangle_count).sum()
    }

    /// Drop degenerate triangles from every submesh. Returns the number removed.
    pub fn remove_degenerate_triangles(&mut self) -> usize {
        self.meshes.iter_mut().map(remove_degenerate_triangles).sum()
    }

    /// Reorder every submesh for vertex cache reuse.
    pub fn optimize_index_order(&mut self) {
        for mesh in &mut self.meshes {
            optimize_index_order(mesh);
        }
    }

    pub fn atvr(&self) -> f32 {
        average_transform_to_vertex_ratio(&self.meshes)
    }
}

#[cfg(test)]
pub(crate) mod test_meshes {
    use super::*;

    pub fn mesh(positions: &[[f32; 3]], indices: &[u32]) -> SubMesh {
        let positions: Vec<Vector3<f32>> =
            positions.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect();
        SubMesh {
            name: "test".to_string(),
            material: "default".to_string(),
            bbox: Aabb::from_points(&positions),
            positions,
            indices: indices.to_vec(),
            ..SubMesh::default()
        }
    }

    /// A `n` by `n` grid of quads in the XY plane, rows emitted in order.
    pub fn grid(n: usize) -> SubMesh {
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push([x as f32, y as f32, 0.0]);
            }
        }
        let stride = (n + 1) as u32;
        let mut indices = Vec::new();
        for y in 0..n as u32 {
            for x in 0..n as u32 {
                let a = y * stride + x;
                let b = a + 1;
                let c = a + stride;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, d, a, d, c]);
            }
        }
        mesh(&positions, &indices)
    }
}

#[cfg(test)]
mod tests {
    use super::test_meshes::*;
    use super::*;

    #[test]
    fn given_index_out_of_range_when_validating_then_integrity_error() {
        let mesh = mesh(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 3]);
        assert!(matches!(mesh.validate(), Err(ConversionError::Integrity(_))));
    }

    #[test]
    fn given_mismatched_normals_when_validating_then_integrity_error() {
        let mut mesh = mesh(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2]);
        mesh.normals = vec![Vector3::z()];
        assert!(mesh.validate().is_err());
        mesh.normals = vec![Vector3::z(); 3];
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn given_grid_when_counting_then_two_triangles_per_quad() {
        let data = InternalData {
            meshes: vec![grid(3)],
            ..InternalData::default()
        };
        assert_eq!(data.triangle_count(), 18);
        assert_eq!(data.vertex_count(), 16);
    }
}
