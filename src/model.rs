//! Data models for the container sizing engine.
//!
//! This module defines the fundamental data structures:
//! - `BoxSpec`: A user-authored box definition with a quantity
//! - `BoxInstance`: One physical unit expanded from a `BoxSpec`
//! - `PlacedBox`: An oriented box with its center position in the container
//! - `Container`: The container dimensions
//! - `Constraints`: Per-axis fixed sizes (`None` = free, to be minimized)

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{Axis, Dimensional, Positioned, Vec3, validation};

/// Validation error for box definitions, constraints and run settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No boxes to pack")]
    EmptyInput,
}

/// User-authored box definition.
///
/// # Fields
/// * `id` - Identifier of the definition, referenced by every expanded instance
/// * `width`, `height`, `depth` - Canonical (unrotated) dimensions
/// * `quantity` - Number of physical units, at least 1
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "id": 1, "width": 30.0, "height": 20.0, "depth": 40.0, "quantity": 2 }))]
pub struct BoxSpec {
    pub id: usize,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl BoxSpec {
    /// Creates a new definition with validation.
    ///
    /// # Examples
    /// ```ignore
    /// assert!(BoxSpec::new(1, 10.0, 20.0, 30.0, 2).is_ok());
    /// assert!(BoxSpec::new(1, -10.0, 20.0, 30.0, 2).is_err());
    /// ```
    #[allow(dead_code)]
    pub fn new(
        id: usize,
        width: f64,
        height: f64,
        depth: f64,
        quantity: u32,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            id,
            width,
            height,
            depth,
            quantity,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks dimensions and quantity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_dimensions_3d((self.width, self.height, self.depth)).map_err(
            |msg| ValidationError::InvalidDimension(format!("box definition {}: {}", self.id, msg)),
        )?;
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "box definition {}: quantity must be at least 1",
                self.id
            )));
        }
        Ok(())
    }
}

impl Dimensional for BoxSpec {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }
}

/// Expands every definition `quantity` times into dense, 0-based instances.
///
/// Instance ids follow the definition order.
pub fn expand_box_specs(specs: &[BoxSpec]) -> Vec<BoxInstance> {
    let total: usize = specs.iter().map(|s| s.quantity as usize).sum();
    let mut instances = Vec::with_capacity(total);
    for spec in specs {
        for _ in 0..spec.quantity {
            instances.push(BoxInstance {
                instance_id: instances.len(),
                definition_id: spec.id,
                width: spec.width,
                height: spec.height,
                depth: spec.depth,
            });
        }
    }
    instances
}

/// One physical box. Dimensions are the canonical, unrotated ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxInstance {
    pub instance_id: usize,
    pub definition_id: usize,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl BoxInstance {
    /// Distinct axis permutations of the dimensions.
    ///
    /// With rotation disabled only the canonical orientation is returned.
    /// Cubes and square prisms yield fewer than six entries.
    pub fn orientations(&self, allow_rotation: bool) -> Vec<Vec3> {
        let (w, h, d) = (self.width, self.height, self.depth);
        if !allow_rotation {
            return vec![Vec3::new(w, h, d)];
        }

        let permutations = [
            Vec3::new(w, h, d),
            Vec3::new(w, d, h),
            Vec3::new(h, w, d),
            Vec3::new(h, d, w),
            Vec3::new(d, w, h),
            Vec3::new(d, h, w),
        ];

        let mut unique: Vec<Vec3> = Vec::with_capacity(permutations.len());
        for dims in permutations {
            if !unique.contains(&dims) {
                unique.push(dims);
            }
        }
        unique
    }
}

impl Dimensional for BoxInstance {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }
}

/// A box bound to an orientation and a final center position.
///
/// # Fields
/// * `position` - Center; x/z relative to the container center, y from the floor
/// * `dims` - Oriented dimensions (width, height, depth)
/// * `rotated` - Whether `dims` differs from the canonical orientation
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PlacedBox {
    pub instance_id: usize,
    pub definition_id: usize,
    pub position: Vec3,
    pub dims: Vec3,
    pub rotated: bool,
}

impl PlacedBox {
    /// Binds `instance` to the oriented `dims` at `position`.
    pub fn new(instance: &BoxInstance, dims: Vec3, position: Vec3) -> Self {
        Self {
            instance_id: instance.instance_id,
            definition_id: instance.definition_id,
            position,
            dims,
            rotated: dims != instance.dimensions(),
        }
    }

    /// Height of the bottom face above the floor.
    #[inline]
    #[allow(dead_code)]
    pub fn bottom_y(&self) -> f64 {
        self.position.y - self.dims.y / 2.0
    }

    /// Height of the top face.
    #[inline]
    pub fn top_y(&self) -> f64 {
        self.position.y + self.dims.y / 2.0
    }
}

impl Positioned for PlacedBox {
    fn center(&self) -> Vec3 {
        self.position
    }
}

impl Dimensional for PlacedBox {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

/// Axis-aligned container, centered in x/z, floor at y = 0, open top.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Container {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl Container {
    pub fn new(width: f64, height: f64, depth: f64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn from_dims(dims: Vec3) -> Self {
        Self::new(dims.x, dims.y, dims.z)
    }
}

impl Dimensional for Container {
    fn dimensions(&self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }
}

/// Per-axis container constraints. `None` leaves the axis free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Constraints {
    #[serde(default)]
    #[schema(nullable = true)]
    pub width: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub height: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub depth: Option<f64>,
}

impl Constraints {
    /// No axis fixed.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::Width => self.width,
            Axis::Height => self.height,
            Axis::Depth => self.depth,
        }
    }

    /// Axes left free, in search order.
    pub fn unconstrained_axes(&self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|axis| self.get(*axis).is_none())
            .collect()
    }

    /// Rejects non-positive or non-finite fixed sizes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for axis in Axis::ALL {
            if let Some(value) = self.get(axis) {
                validation::validate_positive(value, axis.name())
                    .map_err(ValidationError::InvalidConstraint)?;
            }
        }
        Ok(())
    }

    /// Fixed axes that some box cannot fit in any permitted orientation.
    ///
    /// These are not rejected; the run proceeds and reports the affected boxes
    /// as unplaceable.
    pub fn warnings_for(&self, specs: &[BoxSpec], allow_rotation: bool) -> Vec<String> {
        let mut warnings = Vec::new();
        for axis in Axis::ALL {
            let Some(limit) = self.get(axis) else {
                continue;
            };
            for spec in specs {
                let dims = spec.dimensions();
                let needed = if allow_rotation {
                    dims.x.min(dims.y).min(dims.z)
                } else {
                    dims.get(axis)
                };
                if needed > limit {
                    warnings.push(format!(
                        "Box definition {} needs at least {} on the {} axis, but it is fixed to {}",
                        spec.id,
                        needed,
                        axis.name(),
                        limit
                    ));
                }
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: usize, dims: (f64, f64, f64), quantity: u32) -> BoxSpec {
        BoxSpec {
            id,
            width: dims.0,
            height: dims.1,
            depth: dims.2,
            quantity,
        }
    }

    #[test]
    fn expansion_yields_dense_instance_ids() {
        let specs = vec![spec(7, (1.0, 2.0, 3.0), 2), spec(9, (4.0, 5.0, 6.0), 3)];
        let instances = expand_box_specs(&specs);

        assert_eq!(instances.len(), 5);
        for (idx, instance) in instances.iter().enumerate() {
            assert_eq!(instance.instance_id, idx);
        }
        assert_eq!(instances[1].definition_id, 7);
        assert_eq!(instances[2].definition_id, 9);
        assert_eq!(instances[4].depth, 6.0);
    }

    #[test]
    fn box_spec_validation_rejects_bad_input() {
        assert!(BoxSpec::new(1, 1.0, 1.0, 1.0, 1).is_ok());
        assert!(matches!(
            BoxSpec::new(1, 0.0, 1.0, 1.0, 1),
            Err(ValidationError::InvalidDimension(_))
        ));
        assert!(matches!(
            BoxSpec::new(1, 1.0, 1.0, 1.0, 0),
            Err(ValidationError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn orientations_are_deduplicated() {
        let instances = expand_box_specs(&[
            spec(1, (1.0, 2.0, 3.0), 1),
            spec(2, (2.0, 2.0, 3.0), 1),
            spec(3, (2.0, 2.0, 2.0), 1),
        ]);

        assert_eq!(instances[0].orientations(true).len(), 6);
        assert_eq!(instances[1].orientations(true).len(), 3);
        assert_eq!(instances[2].orientations(true).len(), 1);
        assert_eq!(
            instances[0].orientations(false),
            vec![Vec3::new(1.0, 2.0, 3.0)]
        );
    }

    #[test]
    fn placed_box_reports_rotation() {
        let instance = &expand_box_specs(&[spec(1, (1.0, 2.0, 3.0), 1)])[0];
        let upright = PlacedBox::new(instance, Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.0, 0.0));
        let lying = PlacedBox::new(instance, Vec3::new(2.0, 1.0, 3.0), Vec3::new(0.0, 0.5, 0.0));

        assert!(!upright.rotated);
        assert!(lying.rotated);
        assert_eq!(lying.bottom_y(), 0.0);
        assert_eq!(lying.top_y(), 1.0);
    }

    #[test]
    fn constraints_parse_nulls_and_list_free_axes() {
        let constraints: Constraints =
            serde_json::from_str(r#"{"width": null, "height": 2.5}"#).expect("valid JSON");
        assert_eq!(constraints.height, Some(2.5));
        assert_eq!(
            constraints.unconstrained_axes(),
            vec![Axis::Width, Axis::Depth]
        );
    }

    #[test]
    fn constraints_reject_non_positive_values() {
        let constraints = Constraints {
            width: Some(0.0),
            ..Constraints::default()
        };
        assert!(matches!(
            constraints.validate(),
            Err(ValidationError::InvalidConstraint(_))
        ));
    }

    #[test]
    fn constraint_warnings_respect_rotation() {
        let specs = vec![spec(1, (1.0, 3.0, 1.0), 1)];
        let constraints = Constraints {
            height: Some(1.5),
            ..Constraints::default()
        };

        assert_eq!(constraints.warnings_for(&specs, false).len(), 1);
        assert!(constraints.warnings_for(&specs, true).is_empty());
    }
}
