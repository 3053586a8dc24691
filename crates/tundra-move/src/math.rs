//! Minimal vector/quaternion math for the XZ navigation plane.

use core::ops::{Add, Div, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Vector-magnitude zero test threshold.
pub const EPSILON: f32 = 1.0 / 1024.0;

/// A 2D vector on the navigation plane. `x` and `z` match the world-space
/// axes the plane is embedded in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, z: 0.0 };

    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero when the length is
    /// degenerate.
    pub fn normalized_or_zero(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            self / len
        }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.z)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.z / rhs)
    }
}

/// Truncate `v` to at most `max_len`, preserving direction.
pub fn truncate(v: Vec2, max_len: f32) -> Vec2 {
    let len = v.length();
    if len <= max_len || len <= f32::EPSILON {
        v
    } else {
        v * (max_len / len)
    }
}

/// A world-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn xz(self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }
}

/// A rotation quaternion. Movement only ever produces yaw rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `angle_rad` about the world Y axis.
    pub fn from_y_angle(angle_rad: f32) -> Self {
        Self {
            x: 0.0,
            y: (angle_rad / 2.0).sin(),
            z: 0.0,
            w: (angle_rad / 2.0).cos(),
        }
    }
}

/// Facing rotation for a velocity: `atan2(v.z, v.x) - pi/2` about Y.
///
/// Callers must not pass a degenerate velocity; the direction would be
/// meaningless.
pub fn facing_from_velocity(velocity: Vec2) -> Quat {
    debug_assert!(velocity.length() > EPSILON);
    let angle_rad = velocity.z.atan2(velocity.x) - core::f32::consts::FRAC_PI_2;
    Quat::from_y_angle(angle_rad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_preserves_short_vectors() {
        let v = Vec2::new(0.3, 0.4);
        assert_eq!(truncate(v, 1.0), v);
    }

    #[test]
    fn truncate_clamps_long_vectors() {
        let v = truncate(Vec2::new(3.0, 4.0), 1.0);
        assert!((v.length() - 1.0).abs() < 1e-5);
        assert!((v.x / v.z - 3.0 / 4.0).abs() < 1e-5);
    }

    #[test]
    fn facing_is_pure_yaw() {
        let q = facing_from_velocity(Vec2::new(0.0, 1.0));
        assert_eq!(q.x, 0.0);
        assert_eq!(q.z, 0.0);
        assert!((q.y * q.y + q.w * q.w - 1.0).abs() < 1e-5);
    }
}
