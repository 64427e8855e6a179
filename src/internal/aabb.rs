use nalgebra::Vector3;

/// Axis-aligned bounding box.
///
/// An empty box has `mins = +inf` and `maxs = -inf` so that the first
/// [`Aabb::grow`] sets both corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub mins: Vector3<f32>,
    pub maxs: Vector3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    #[inline]
    pub fn new(mins: Vector3<f32>, maxs: Vector3<f32>) -> Self {
        Self { mins, maxs }
    }

    pub fn empty() -> Self {
        Self {
            mins: Vector3::repeat(f32::INFINITY),
            maxs: Vector3::repeat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f32>>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.grow(p);
        }
        aabb
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mins.x > self.maxs.x || self.mins.y > self.maxs.y || self.mins.z > self.maxs.z
    }

    #[inline]
    pub fn grow(&mut self, p: &Vector3<f32>) {
        self.mins = self.mins.inf(p);
        self.maxs = self.maxs.sup(p);
    }

    pub fn merge(&mut self, other: &Aabb) {
        if !other.is_empty() {
            self.grow(&other.mins);
            self.grow(&other.maxs);
        }
    }

    #[inline]
    pub fn contains(&self, p: &Vector3<f32>) -> bool {
        let Self { mins: i, maxs: a } = self;
        (p.x >= i.x && p.y >= i.y && p.z >= i.z) && (p.x <= a.x && p.y <= a.y && p.z <= a.z)
    }
}
