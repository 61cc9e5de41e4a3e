// Minimal vector math for placement and connection decisions.
//
// Layouts live in the z = 0 plane, but positions stay 3D so presentation layers can
// use them directly.

use core::ops::{Add, AddAssign, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A point in the z = 0 plane.
    #[inline]
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Point at `radius` and `angle` (radians) around `origin`, in the z = 0 plane.
    #[inline]
    pub fn on_circle(origin: Vec3, radius: f64, angle: f64) -> Self {
        origin + Vec3::xy(angle.cos() * radius, angle.sin() * radius)
    }

    #[inline]
    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn distance_to(self, other: Vec3) -> f64 {
        (other - self).length()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    #[inline]
    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        if len > 0.0 {
            self * (1.0 / len)
        } else {
            Vec3::ZERO
        }
    }

    /// Unit vector pointing from `self` towards `to`.
    #[inline]
    pub fn direction_to(self, to: Vec3) -> Vec3 {
        (to - self).normalize()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Index of the point in `points` closest to `target` (linear scan).
pub fn nearest<I>(target: Vec3, points: I) -> Option<usize>
where
    I: IntoIterator<Item = Vec3>,
{
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.into_iter().enumerate() {
        let d = target.distance_to(p);
        if best.map(|(_, bd)| d < bd).unwrap_or(true) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_and_direction() {
        let a = Vec3::xy(1.0, 1.0);
        let b = Vec3::xy(4.0, 5.0);
        assert_eq!(a.distance_to(b), 5.0);
        let d = a.direction_to(b);
        assert!((d.length() - 1.0).abs() < 1e-12);
        assert!((d.x - 0.6).abs() < 1e-12);
        assert!((d.y - 0.8).abs() < 1e-12);
    }

    #[test]
    fn zero_vector_normalizes_to_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
        assert_eq!(Vec3::xy(2.0, 2.0).direction_to(Vec3::xy(2.0, 2.0)), Vec3::ZERO);
    }

    #[test]
    fn dot_of_opposite_directions_is_negative() {
        let inward = Vec3::xy(3.0, 0.0).direction_to(Vec3::ZERO);
        let outward = Vec3::xy(1.0, 0.0);
        assert!((inward.dot(outward) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn circle_points_sit_on_radius() {
        let origin = Vec3::xy(10.0, -2.0);
        let p = Vec3::on_circle(origin, 3.0, 1.234);
        assert!((origin.distance_to(p) - 3.0).abs() < 1e-12);
        assert_eq!(p.z, 0.0);
    }

    #[test]
    fn nearest_picks_first_of_equal_distances() {
        let pts = [Vec3::xy(5.0, 0.0), Vec3::xy(1.0, 0.0), Vec3::xy(-1.0, 0.0)];
        assert_eq!(nearest(Vec3::ZERO, pts), Some(1));
        assert_eq!(nearest(Vec3::ZERO, core::iter::empty()), None);
    }
}
