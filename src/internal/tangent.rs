use nalgebra::Vector3;

use super::SubMesh;
use crate::error::{ConversionError, ConversionResult};

/// Smooth per-vertex normals from counter-clockwise faces.
///
/// Each vertex receives the sum of the unit normals of its faces, normalized.
/// Vertices only touched by degenerate faces keep a zero normal.
pub fn calculate_normals(mesh: &mut SubMesh) {
    let mut normals = vec![Vector3::zeros(); mesh.vertex_count()];
    for t in 0..mesh.triangle_count() {
        let [a, b, c] = mesh.triangle(t);
        let (pa, pb, pc) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
        let Some(face) = (pb - pa).cross(&(pc - pa)).try_normalize(0.0) else {
            continue;
        };
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    for n in &mut normals {
        *n = n.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
    }
    mesh.normals = normals;
}

/// Per-vertex tangent and bitangent from positions and texture channel
/// `channel`, orthogonalized against the normals.
///
/// Normals are computed first when missing. Returns the number of vertices
/// whose basis has a zero-length vector.
pub fn calculate_tangent_space(mesh: &mut SubMesh, channel: usize) -> ConversionResult<usize> {
    if channel >= mesh.tex_coords.len() {
        return Err(ConversionError::MissingData(format!(
            "submesh '{}' has {} texture channels, channel {channel} requested",
            mesh.name,
            mesh.tex_coords.len()
        )));
    }
    if mesh.normals.len() != mesh.vertex_count() {
        calculate_normals(mesh);
    }

    let n = mesh.vertex_count();
    let mut s_dirs = vec![Vector3::zeros(); n];
    let mut t_dirs = vec![Vector3::zeros(); n];
    let uv = &mesh.tex_coords[channel];

    for t in 0..mesh.triangle_count() {
        let [a, b, c] = mesh.triangle(t);
        let e1 = mesh.positions[b] - mesh.positions[a];
        let e2 = mesh.positions[c] - mesh.positions[a];
        let d1 = uv[b] - uv[a];
        let d2 = uv[c] - uv[a];

        let det = d1.x * d2.y - d2.x * d1.y;
        if det == 0.0 {
            continue;
        }
        let r = 1.0 / det;
        let s_dir = (e1 * d2.y - e2 * d1.y) * r;
        let t_dir = (e2 * d1.x - e1 * d2.x) * r;
        for v in [a, b, c] {
            s_dirs[v] += s_dir;
            t_dirs[v] += t_dir;
        }
    }

    let mut invalid = 0;
    let mut tangents = Vec::with_capacity(n);
    let mut bitangents = Vec::with_capacity(n);
    for v in 0..n {
        let normal = mesh.normals[v];
        let tangent = (s_dirs[v] - normal * normal.dot(&s_dirs[v]))
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros);
        let cross = normal.cross(&tangent);
        let handedness = if cross.dot(&t_dirs[v]) < 0.0 { -1.0 } else { 1.0 };
        let bitangent = cross * handedness;

        if normal.norm() == 0.0 || tangent.norm() == 0.0 || bitangent.norm() == 0.0 {
            invalid += 1;
        }
        tangents.push(tangent);
        bitangents.push(bitangent);
    }
    mesh.tangents = tangents;
    mesh.bitangents = bitangents;
    Ok(invalid)
}

/// Fill in normals, then tangents and bitangents, where they are missing.
///
/// Returns the number of vertices with a zero-length basis vector.
pub fn complete_vertex_data(mesh: &mut SubMesh, channel: usize) -> ConversionResult<usize> {
    if mesh.positions.is_empty() {
        return Err(ConversionError::MissingData(format!(
            "submesh '{}' has no positions",
            mesh.name
        )));
    }
    if mesh.normals.is_empty() {
        calculate_normals(mesh);
    }
    if mesh.tangents.is_empty() || mesh.bitangents.is_empty() {
        return calculate_tangent_space(mesh, channel);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::test_meshes::mesh;
    use nalgebra::Vector2;

    fn uv_triangle() -> SubMesh {
        let mut m = mesh(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2]);
        m.tex_coords = vec![vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
        ]];
        m
    }

    #[test]
    fn given_ccw_triangle_in_xy_plane_when_calculating_normals_then_normal_is_positive_z() {
        let mut m = uv_triangle();
        calculate_normals(&mut m);
        for n in &m.normals {
            assert!((n - Vector3::z()).norm() < 1e-6);
        }
    }

    #[test]
    fn given_aligned_uvs_when_calculating_tangent_space_then_basis_follows_axes() {
        let mut m = uv_triangle();
        let invalid = calculate_tangent_space(&mut m, 0).expect("tangent space");
        assert_eq!(invalid, 0);
        for v in 0..3 {
            assert!((m.tangents[v] - Vector3::x()).norm() < 1e-5);
            assert!((m.bitangents[v] - Vector3::y()).norm() < 1e-5);
            assert!(m.tangents[v].dot(&m.normals[v]).abs() < 1e-5);
        }
    }

    #[test]
    fn given_mirrored_uvs_when_calculating_tangent_space_then_bitangent_flips() {
        let mut m = uv_triangle();
        for uv in &mut m.tex_coords[0] {
            uv.y = -uv.y;
        }
        calculate_tangent_space(&mut m, 0).expect("tangent space");
        assert!((m.bitangents[0] + Vector3::y()).norm() < 1e-5);
    }

    #[test]
    fn given_missing_channel_when_calculating_tangent_space_then_missing_data_error() {
        let mut m = uv_triangle();
        let result = calculate_tangent_space(&mut m, 1);
        assert!(matches!(result, Err(ConversionError::MissingData(_))));
    }

    #[test]
    fn given_back_to_back_faces_when_completing_then_zero_basis_is_counted() {
        let mut m = uv_triangle();
        m.indices.extend_from_slice(&[0, 2, 1]);
        let invalid = complete_vertex_data(&mut m, 0).expect("complete");
        assert_eq!(invalid, 3);
        assert_eq!(m.normals.len(), 3);
    }

    #[test]
    fn given_existing_basis_when_completing_then_data_is_kept() {
        let mut m = uv_triangle();
        m.normals = vec![Vector3::y(); 3];
        m.tangents = vec![Vector3::x(); 3];
        m.bitangents = vec![Vector3::z(); 3];
        assert_eq!(complete_vertex_data(&mut m, 0).expect("complete"), 0);
        assert_eq!(m.normals[0], Vector3::y());
    }
}
