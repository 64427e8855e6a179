use std::collections::HashMap;

use nalgebra::{Matrix4, Vector3, Vector4};

use super::{Aabb, InternalData, SubMesh, Weight};

/// Set each submesh's static box from its raw positions.
pub fn compute_static_bounds(meshes: &mut [SubMesh]) {
    for mesh in meshes {
        mesh.bbox = Aabb::from_points(&mesh.positions);
    }
}

/// Linear blend skinning of one position.
///
/// Weights are used as given, without normalization. Influences whose joint
/// has no matrix are skipped; a vertex with no usable influence keeps its
/// position.
pub fn blend_position(
    position: &Vector3<f32>,
    weights: &[Weight],
    joint_matrix: impl Fn(usize) -> Option<Matrix4<f32>>,
) -> Vector3<f32> {
    let mut blended = Matrix4::zeros();
    let mut used = false;
    for w in weights {
        if let Some(m) = joint_matrix(w.joint) {
            blended += m * w.weight;
            used = true;
        }
    }
    if !used {
        return *position;
    }
    let p = blended * Vector4::new(position.x, position.y, position.z, 1.0);
    Vector3::new(p.x, p.y, p.z)
}

/// One box per frame enclosing every submesh's blended positions.
pub fn compute_frame_bounds(data: &InternalData) -> Vec<Aabb> {
    (0..data.frame_count)
        .map(|frame| {
            let matrices: HashMap<usize, Matrix4<f32>> = data
                .joints
                .iter()
                .filter_map(|j| j.absolute_poses.get(frame).map(|p| (j.index, p.to_matrix())))
                .collect();
            let mut aabb = Aabb::empty();
            for mesh in &data.meshes {
                aabb.merge(&skinned_bounds(mesh, &matrices));
            }
            aabb
        })
        .collect()
}

/// Box of one submesh's positions blended with `matrices`.
fn skinned_bounds(mesh: &SubMesh, matrices: &HashMap<usize, Matrix4<f32>>) -> Aabb {
    let blended: Vec<Vector3<f32>> = mesh
        .positions
        .iter()
        .enumerate()
        .map(|(v, position)| {
            let weights = mesh.weights.get(v).map(Vec::as_slice).unwrap_or(&[]);
            blend_position(position, weights, |joint| matrices.get(&joint).copied())
        })
        .collect();
    Aabb::from_points(&blended)
}
