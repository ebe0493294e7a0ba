//! Common types and traits for 3D geometry.
//!
//! Coordinates follow the container frame used throughout the engine:
//! `x` is width, `y` is height (floor at `y = 0`, pointing up) and `z` is depth.
//! Positions are box centers.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Numerical tolerance for face comparisons.
///
/// Faces computed as "adjacent" through floating-point arithmetic can end up a
/// few ULPs apart; anything below this threshold counts as touching.
pub const EPSILON_GENERAL: f64 = 1e-9;

/// Resolution used when ordering candidate positions.
pub const EPSILON_ORDER: f64 = 1e-3;

/// Represents a 3D vector or point in container space.
///
/// # Examples
/// ```ignore
/// let center = Vec3::new(0.0, 0.5, 0.0);
/// let dims = Vec3::new(1.0, 1.0, 1.0);
/// let top = center.y + dims.y / 2.0;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new 3D vector.
    ///
    /// # Parameters
    /// * `x` - X component (width)
    /// * `y` - Y component (height)
    /// * `z` - Z component (depth)
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Calculates the volume (product of all components).
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Calculates the footprint area (X × Z product).
    #[inline]
    pub fn footprint_area(&self) -> f64 {
        self.x * self.z
    }

    /// Component along the given axis.
    #[inline]
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Width => self.x,
            Axis::Height => self.y,
            Axis::Depth => self.z,
        }
    }

    /// Overwrites the component along the given axis.
    #[inline]
    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Width => self.x = value,
            Axis::Height => self.y = value,
            Axis::Depth => self.z = value,
        }
    }

    /// Component-wise maximum.
    #[inline]
    pub fn max(&self, other: &Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

/// One of the three container axes, in search order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
    Depth,
}

impl Axis {
    /// Fixed order in which the size search visits the axes.
    pub const ALL: [Axis; 3] = [Axis::Width, Axis::Height, Axis::Depth];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Width => "width",
            Axis::Height => "height",
            Axis::Depth => "depth",
        }
    }
}

/// Trait for objects with 3D dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Calculates the footprint area on the floor plane.
    fn footprint_area(&self) -> f64 {
        self.dimensions().footprint_area()
    }
}

/// Trait for objects with a center position in container space.
pub trait Positioned {
    /// Returns the center position.
    fn center(&self) -> Vec3;
}

/// Axis-aligned bounding box built from a center and full extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a bounding box around `center` with the given full extents.
    #[inline]
    pub fn from_center_and_dims(center: Vec3, dims: Vec3) -> Self {
        let half = dims * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Creates a bounding box from anything positioned and dimensional.
    #[inline]
    pub fn of<T: Positioned + Dimensional>(item: &T) -> Self {
        Self::from_center_and_dims(item.center(), item.dimensions())
    }

    /// Strict interior overlap on all three axes. Touching faces do not count.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.max.x > other.min.x + EPSILON_GENERAL
            && self.min.x < other.max.x - EPSILON_GENERAL
            && self.max.y > other.min.y + EPSILON_GENERAL
            && self.min.y < other.max.y - EPSILON_GENERAL
            && self.max.z > other.min.z + EPSILON_GENERAL
            && self.min.z < other.max.z - EPSILON_GENERAL
    }

    /// Calculates the overlap length in one dimension.
    #[inline]
    pub fn overlap_1d(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
        (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
    }

    /// Calculates the overlap area of both footprints (XZ plane).
    #[inline]
    pub fn overlap_area_xz(&self, other: &Self) -> f64 {
        let overlap_x = Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x);
        let overlap_z = Self::overlap_1d(self.min.z, self.max.z, other.min.z, other.max.z);
        overlap_x * overlap_z
    }

    /// Bottom face height.
    #[inline]
    pub fn bottom(&self) -> f64 {
        self.min.y
    }

    /// Top face height.
    #[inline]
    pub fn top(&self) -> f64 {
        self.max.y
    }
}

/// Validation functions shared by the model and the request layer.
pub mod validation {
    /// Validates a single strictly positive, finite value.
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_positive(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates all three dimensions of a box.
    pub fn validate_dimensions_3d(dims: (f64, f64, f64)) -> Result<(), String> {
        validate_positive(dims.0, "Width")?;
        validate_positive(dims.1, "Height")?;
        validate_positive(dims.2, "Depth")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(a.max(&Vec3::new(0.0, 9.0, 3.0)), Vec3::new(1.0, 9.0, 3.0));
    }

    #[test]
    fn test_vec3_axis_access() {
        let mut v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.get(Axis::Height), 2.0);
        v.set(Axis::Depth, 7.5);
        assert_eq!(v, Vec3::new(1.0, 2.0, 7.5));
    }

    #[test]
    fn test_vec3_volume_and_footprint() {
        let dims = Vec3::new(10.0, 20.0, 30.0);
        assert!((dims.volume() - 6000.0).abs() < 1e-6);
        assert!((dims.footprint_area() - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounding_box_touching_faces_do_not_intersect() {
        let a = BoundingBox::from_center_and_dims(Vec3::zero(), Vec3::new(1.0, 1.0, 1.0));
        let touching =
            BoundingBox::from_center_and_dims(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let overlapping =
            BoundingBox::from_center_and_dims(Vec3::new(0.9, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));

        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
    }

    #[test]
    fn test_bounding_box_overlap_area() {
        let a = BoundingBox::from_center_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
        let b = BoundingBox::from_center_and_dims(
            Vec3::new(5.0, 20.0, 5.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        // Height is ignored; the footprints share a 5x5 square.
        assert!((a.overlap_area_xz(&b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_validation_positive() {
        assert!(validation::validate_positive(10.0, "Width").is_ok());
        assert!(validation::validate_positive(0.0, "Width").is_err());
        assert!(validation::validate_positive(-1.0, "Width").is_err());
        assert!(validation::validate_positive(f64::NAN, "Width").is_err());
        assert!(validation::validate_positive(f64::INFINITY, "Width").is_err());
        assert!(validation::validate_dimensions_3d((1.0, 0.0, 1.0)).is_err());
    }
}
