use nalgebra::{Matrix3, Matrix4, Point3, Unit, UnitQuaternion, Vector3, Vector4};

/// Tolerance used for vertex welding, degenerate detection and source snapping.
pub const EPSILON: f32 = 1e-4;

/// Snap a value onto the `EPSILON` grid.
pub fn round_eps(value: f32) -> f32 {
    let scale = 1.0e4_f64;
    ((f64::from(value) * scale + 0.5).floor() / scale) as f32
}

pub fn is_near(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// Component-wise comparison; slices of different length never match.
pub fn slice_near(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| is_near(*x, *y))
}

// ─── Coordinate system ────────────────────────────────────────────────────────

/// Authoring tool vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
    Unknown,
}

/// Basis change applied at the scene root so output is Y-up.
pub fn up_axis_matrix(axis: UpAxis) -> Matrix4<f32> {
    match axis {
        UpAxis::Z => Matrix4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ),
        UpAxis::X => Matrix4::new(
            0.0, -1.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ),
        UpAxis::Y | UpAxis::Unknown => Matrix4::identity(),
    }
}

// ─── Matrix construction ──────────────────────────────────────────────────────

/// Build a matrix from 16 floats stored row by row. Returns `None` for short input.
pub fn matrix_from_row_major(values: &[f32]) -> Option<Matrix4<f32>> {
    (values.len() >= 16).then(|| Matrix4::from_row_slice(&values[..16]))
}

pub fn translation_matrix(values: &[f32]) -> Matrix4<f32> {
    let v = vec3_or(values, 0.0);
    Matrix4::new_translation(&v)
}

/// `values` is `axis.x axis.y axis.z angle_degrees`.
pub fn rotation_matrix(values: &[f32]) -> Matrix4<f32> {
    if values.len() < 4 {
        return Matrix4::identity();
    }
    let axis = Vector3::new(values[0], values[1], values[2]);
    match Unit::try_new(axis, f32::EPSILON) {
        Some(axis) => {
            UnitQuaternion::from_axis_angle(&axis, values[3].to_radians()).to_homogeneous()
        }
        None => Matrix4::identity(),
    }
}

pub fn scale_matrix(values: &[f32]) -> Matrix4<f32> {
    let v = vec3_or(values, 1.0);
    Matrix4::new_nonuniform_scaling(&v)
}

fn vec3_or(values: &[f32], fallback: f32) -> Vector3<f32> {
    let at = |i: usize| values.get(i).copied().unwrap_or(fallback);
    Vector3::new(at(0), at(1), at(2))
}

// ─── Transform helpers ────────────────────────────────────────────────────────

/// Transform a point and return the result together with its homogeneous w.
pub fn transform_point_w(m: &Matrix4<f32>, p: &Vector3<f32>) -> (Vector3<f32>, f32) {
    let h = m * Vector4::new(p.x, p.y, p.z, 1.0);
    (Vector3::new(h.x, h.y, h.z), h.w)
}

pub fn transform_direction(m: &Matrix4<f32>, d: &Vector3<f32>) -> Vector3<f32> {
    m.transform_vector(d)
}

pub fn transform_point(m: &Matrix4<f32>, p: &Vector3<f32>) -> Vector3<f32> {
    m.transform_point(&Point3::from(*p)).coords
}

/// Split an affine matrix into a normalized rotation and a translation.
pub fn decompose(m: &Matrix4<f32>) -> (UnitQuaternion<f32>, Vector3<f32>) {
    let basis: Matrix3<f32> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = UnitQuaternion::from_matrix(&basis);
    let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    (rotation, translation)
}

/// Rebuild the rigid matrix described by a decomposed pose.
pub fn compose(rotation: &UnitQuaternion<f32>, translation: &Vector3<f32>) -> Matrix4<f32> {
    let mut m = rotation.to_homogeneous();
    m[(0, 3)] = translation.x;
    m[(1, 3)] = translation.y;
    m[(2, 3)] = translation.z;
    m
}
