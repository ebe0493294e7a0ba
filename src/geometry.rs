//! Geometric and physical validity checks for candidate placements.
//!
//! Everything here is a pure function of its arguments: AABB collision,
//! container bounds, the discrete gravity drop and the support-based
//! stability score. The placement heuristic calls these for every candidate,
//! so they avoid allocation.

use crate::model::{Container, PlacedBox};
use crate::types::{BoundingBox, Dimensional, EPSILON_GENERAL, Positioned, Vec3};

/// Decrement used by the gravity simulation.
pub const DROP_STEP: f64 = 0.5;
/// Clearance left above the first obstruction met while dropping.
pub const REST_CLEARANCE: f64 = 0.1;
/// Offset above the floor for boxes that fall all the way down.
pub const FLOOR_EPSILON: f64 = 0.001;
/// A bottom face this close to the floor counts as standing on it.
pub const FLOOR_TOLERANCE: f64 = 0.1;
/// Maximum vertical gap between a supporting top face and the bottom face it carries.
pub const SUPPORT_GAP: f64 = 0.5;
/// Support ratios below this value count as cantilevered.
pub const CANTILEVER_THRESHOLD: f64 = 0.5;
/// Minimum stability the engine requires for boxes above the floor.
pub const MIN_STABILITY: f64 = 0.2;

/// Checks whether two boxes overlap in their interiors.
///
/// Touching faces do not count as overlap.
#[allow(dead_code)]
pub fn overlaps<A, B>(a: &A, b: &B) -> bool
where
    A: Positioned + Dimensional,
    B: Positioned + Dimensional,
{
    BoundingBox::of(a).intersects(&BoundingBox::of(b))
}

/// Checks `item` against every already placed box.
pub fn collides_with_any<T: Positioned + Dimensional>(item: &T, placed: &[PlacedBox]) -> bool {
    let bbox = BoundingBox::of(item);
    placed
        .iter()
        .any(|p| bbox.intersects(&BoundingBox::of(p)))
}

/// Checks that all six faces lie inside `[-W/2, W/2] × [0, H] × [-D/2, D/2]`.
pub fn within_container<T: Positioned + Dimensional>(item: &T, container: &Container) -> bool {
    let bbox = BoundingBox::of(item);
    let half_w = container.width / 2.0;
    let half_d = container.depth / 2.0;

    bbox.min.x >= -half_w - EPSILON_GENERAL
        && bbox.max.x <= half_w + EPSILON_GENERAL
        && bbox.min.y >= -EPSILON_GENERAL
        && bbox.max.y <= container.height + EPSILON_GENERAL
        && bbox.min.z >= -half_d - EPSILON_GENERAL
        && bbox.max.z <= half_d + EPSILON_GENERAL
}

/// Simulates gravity and returns the resting center height of `item`.
///
/// Starting at the current height, the box is moved down in steps of
/// [`DROP_STEP`] until it hits a placed box. It then rests on the highest box
/// it hit, [`REST_CLEARANCE`] above it. Without an obstruction it lands on the
/// floor. Obstructions thinner than one step can be skipped.
pub fn drop_to_rest<T: Positioned + Dimensional>(item: &T, placed: &[PlacedBox]) -> f64 {
    let center = item.center();
    let dims = item.dimensions();
    let floor_rest = dims.y / 2.0;

    let mut test_y = center.y;
    while test_y > floor_rest {
        let probe = BoundingBox::from_center_and_dims(Vec3::new(center.x, test_y, center.z), dims);
        let obstruction_top = placed
            .iter()
            .map(BoundingBox::of)
            .filter(|other| probe.intersects(other))
            .map(|other| other.top())
            .fold(None, |acc: Option<f64>, top| {
                Some(acc.map_or(top, |current| current.max(top)))
            });

        if let Some(top) = obstruction_top {
            return top + floor_rest + REST_CLEARANCE;
        }
        test_y -= DROP_STEP;
    }

    floor_rest + FLOOR_EPSILON
}

/// Fraction of the footprint carried by boxes directly below, in `[0, 1]`.
///
/// Boxes on the floor score 1.0. Ratios below [`CANTILEVER_THRESHOLD`] are
/// halved.
pub fn support_ratio<T: Positioned + Dimensional>(item: &T, placed: &[PlacedBox]) -> f64 {
    let bbox = BoundingBox::of(item);
    if bbox.bottom().abs() <= FLOOR_TOLERANCE {
        return 1.0;
    }

    let footprint = item.footprint_area();
    if footprint <= 0.0 {
        return 0.0;
    }

    let supported: f64 = placed
        .iter()
        .map(BoundingBox::of)
        .filter(|below| (below.top() - bbox.bottom()).abs() <= SUPPORT_GAP)
        .map(|below| bbox.overlap_area_xz(&below))
        .sum();

    let ratio = (supported / footprint).min(1.0);
    if ratio < CANTILEVER_THRESHOLD {
        ratio * 0.5
    } else {
        ratio
    }
}

/// Full validity check: bounds, collisions, then stability above the floor.
pub fn is_valid<T: Positioned + Dimensional>(
    item: &T,
    placed: &[PlacedBox],
    container: &Container,
    min_stability: f64,
) -> bool {
    if !within_container(item, container) {
        return false;
    }
    if collides_with_any(item, placed) {
        return false;
    }

    let bottom = item.center().y - item.dimensions().y / 2.0;
    if bottom > FLOOR_TOLERANCE {
        return support_ratio(item, placed) >= min_stability;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoxInstance;
    use approx::assert_abs_diff_eq;

    fn placed(id: usize, center: (f64, f64, f64), dims: (f64, f64, f64)) -> PlacedBox {
        let instance = BoxInstance {
            instance_id: id,
            definition_id: id,
            width: dims.0,
            height: dims.1,
            depth: dims.2,
        };
        PlacedBox::new(
            &instance,
            Vec3::new(dims.0, dims.1, dims.2),
            Vec3::new(center.0, center.1, center.2),
        )
    }

    #[test]
    fn touching_faces_are_not_overlaps() {
        let a = placed(0, (0.0, 0.5, 0.0), (1.0, 1.0, 1.0));
        let beside = placed(1, (1.0, 0.5, 0.0), (1.0, 1.0, 1.0));
        let above = placed(2, (0.0, 1.5, 0.0), (1.0, 1.0, 1.0));
        let inside = placed(3, (0.25, 0.5, 0.25), (1.0, 1.0, 1.0));

        assert!(!overlaps(&a, &beside));
        assert!(!overlaps(&a, &above));
        assert!(overlaps(&a, &inside));
        assert!(collides_with_any(&inside, &[beside.clone(), a.clone()]));
        assert!(!collides_with_any(&above, &[a, beside]));
    }

    #[test]
    fn container_bounds_are_inclusive() {
        let container = Container::new(2.0, 1.0, 2.0);
        let corner = placed(0, (-0.5, 0.5, -0.5), (1.0, 1.0, 1.0));
        let too_high = placed(1, (-0.5, 0.6, -0.5), (1.0, 1.0, 1.0));
        let outside = placed(2, (0.6, 0.5, 0.0), (1.0, 1.0, 1.0));
        let below_floor = placed(3, (0.0, 0.4, 0.0), (1.0, 1.0, 1.0));

        assert!(within_container(&corner, &container));
        assert!(!within_container(&too_high, &container));
        assert!(!within_container(&outside, &container));
        assert!(!within_container(&below_floor, &container));
    }

    #[test]
    fn drop_lands_on_floor_without_obstruction() {
        let falling = placed(0, (0.0, 5.0, 0.0), (1.0, 1.0, 1.0));
        let y = drop_to_rest(&falling, &[]);
        assert_abs_diff_eq!(y, 0.5 + FLOOR_EPSILON, epsilon = 1e-12);
    }

    #[test]
    fn drop_rests_above_first_obstruction() {
        let base = placed(0, (0.0, 1.0, 0.0), (2.0, 2.0, 2.0));
        let falling = placed(1, (0.0, 6.0, 0.0), (1.0, 1.0, 1.0));

        let y = drop_to_rest(&falling, &[base]);
        assert_abs_diff_eq!(y, 2.0 + 0.5 + REST_CLEARANCE, epsilon = 1e-9);
    }

    #[test]
    fn drop_ignores_boxes_outside_the_footprint() {
        let aside = placed(0, (5.0, 1.0, 0.0), (2.0, 2.0, 2.0));
        let falling = placed(1, (0.0, 6.0, 0.0), (1.0, 1.0, 1.0));

        let y = drop_to_rest(&falling, &[aside]);
        assert_abs_diff_eq!(y, 0.5 + FLOOR_EPSILON, epsilon = 1e-12);
    }

    #[test]
    fn drop_skips_obstacles_thinner_than_a_step() {
        // Probe heights 2.0, 1.5, 1.0, 0.5 all miss the plate at 1.2..1.3.
        let plate = placed(0, (0.0, 1.25, 0.0), (2.0, 0.1, 2.0));
        let falling = placed(1, (0.0, 2.0, 0.0), (1.0, 0.2, 1.0));

        let y = drop_to_rest(&falling, &[plate]);
        assert_abs_diff_eq!(y, 0.1 + FLOOR_EPSILON, epsilon = 1e-12);
    }

    #[test]
    fn drop_lifts_a_box_that_starts_inside_an_obstacle() {
        let base = placed(0, (0.0, 1.0, 0.0), (2.0, 2.0, 2.0));
        let falling = placed(1, (0.0, 1.5, 0.0), (1.0, 1.0, 1.0));

        let y = drop_to_rest(&falling, &[base]);
        assert_abs_diff_eq!(y, 2.0 + 0.5 + REST_CLEARANCE, epsilon = 1e-9);
        assert!(y > falling.position.y);
    }

    #[test]
    fn floor_boxes_are_fully_supported() {
        let on_floor = placed(0, (0.0, 0.55, 0.0), (1.0, 1.0, 1.0));
        assert_eq!(support_ratio(&on_floor, &[]), 1.0);
    }

    #[test]
    fn support_ratio_sums_supporting_faces() {
        let left = placed(0, (-0.5, 0.5, 0.0), (1.0, 1.0, 2.0));
        let right = placed(1, (0.5, 0.5, 0.0), (1.0, 1.0, 2.0));
        let top = placed(2, (0.0, 1.5, 0.0), (2.0, 1.0, 2.0));

        assert_abs_diff_eq!(support_ratio(&top, &[left.clone(), right]), 1.0, epsilon = 1e-9);
        // Half the footprint is not below the cantilever threshold.
        assert_abs_diff_eq!(support_ratio(&top, &[left]), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn cantilevered_support_is_halved() {
        let base = placed(0, (0.0, 0.5, 0.0), (1.0, 1.0, 1.0));
        // 0.25 of the footprint rests on the base.
        let top = placed(1, (1.0, 1.5, 0.0), (2.0, 1.0, 1.0));

        assert_abs_diff_eq!(support_ratio(&top, &[base]), 0.125, epsilon = 1e-9);
    }

    #[test]
    fn validity_requires_bounds_collision_and_support() {
        let container = Container::new(4.0, 4.0, 4.0);
        let base = placed(0, (0.0, 0.5, 0.0), (1.0, 1.0, 1.0));
        let stacked = placed(1, (0.0, 1.5, 0.0), (1.0, 1.0, 1.0));
        let floating = placed(2, (1.5, 1.5, 0.0), (1.0, 1.0, 1.0));
        let cantilever = placed(3, (0.75, 1.5, 0.0), (2.0, 1.0, 1.0));
        let colliding = placed(4, (0.2, 0.5, 0.0), (1.0, 1.0, 1.0));

        let existing = vec![base];
        assert!(is_valid(&stacked, &existing, &container, MIN_STABILITY));
        assert!(!is_valid(&floating, &existing, &container, MIN_STABILITY));
        assert!(!is_valid(&cantilever, &existing, &container, MIN_STABILITY));
        assert!(!is_valid(&colliding, &existing, &container, MIN_STABILITY));
    }
}
