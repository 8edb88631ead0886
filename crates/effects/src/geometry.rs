//! Minimal collision shapes. The runtime only ever calls [`Collider::intersects`].

use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const ONE: Vec3 = Vec3::new(1.0, 1.0, 1.0);
    pub const HALF: Vec3 = Vec3::new(0.5, 0.5, 0.5);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn distance_sq(self, other: Vec3) -> f32 {
        (self - other).length_sq()
    }

    pub fn normalized(self) -> Vec3 {
        let length = self.length_sq().sqrt();
        if length <= f32::EPSILON || !length.is_finite() {
            return Vec3::ZERO;
        }
        self * (1.0 / length)
    }

    pub fn floor(self) -> Vec3 {
        Vec3::new(self.x.floor(), self.y.floor(), self.z.floor())
    }

    fn clamp(self, min: Vec3, max: Vec3) -> Vec3 {
        Vec3::new(
            self.x.clamp(min.x, max.x),
            self.y.clamp(min.y, max.y),
            self.z.clamp(min.z, max.z),
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned box. Touching faces count as overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// One cell sized box with its minimum corner at `origin`.
    pub fn unit_at(origin: Vec3) -> Self {
        Self::new(origin, origin + Vec3::ONE)
    }

    pub fn grow(self, amount: Vec3) -> Self {
        Self::new(self.min - amount, self.max + amount)
    }

    fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collider {
    Box(Aabb),
    Sphere(Sphere),
}

impl Collider {
    pub fn intersects(&self, other: &Collider) -> bool {
        match (self, other) {
            (Collider::Box(a), Collider::Box(b)) => a.overlaps(b),
            (Collider::Sphere(a), Collider::Sphere(b)) => {
                let reach = a.radius + b.radius;
                a.center.distance_sq(b.center) <= reach * reach
            }
            (Collider::Box(aabb), Collider::Sphere(sphere))
            | (Collider::Sphere(sphere), Collider::Box(aabb)) => {
                let closest = sphere.center.clamp(aabb.min, aabb.max);
                closest.distance_sq(sphere.center) <= sphere.radius * sphere.radius
            }
        }
    }
}

impl From<Aabb> for Collider {
    fn from(value: Aabb) -> Self {
        Collider::Box(value)
    }
}

impl From<Sphere> for Collider {
    fn from(value: Sphere) -> Self {
        Collider::Sphere(value)
    }
}
