//! Greedy placement heuristic for a fixed container.
//!
//! One call to [`place_boxes`] is an *attempt*: boxes are ordered by a
//! (possibly noisy) volume score, then placed one after another at the first
//! valid candidate position in bottom-back-left order. There is no
//! backtracking; boxes without a valid candidate are left out.

use crate::geometry::{MIN_STABILITY, drop_to_rest, is_valid};
use crate::model::{BoxInstance, Container, PlacedBox};
use crate::random::SeededRandom;
use crate::types::{Dimensional, EPSILON_GENERAL, EPSILON_ORDER, Positioned, Vec3};

/// Maximum relative deviation of the ordering score.
pub const NOISE_AMPLITUDE: f64 = 0.2;

/// Number of floor grid positions per axis.
const GRID_DIVISIONS: usize = 5;

/// Switches that shape a single attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementOptions {
    /// Try every distinct axis permutation of each box.
    pub allow_rotation: bool,
    /// Perturb the volume ordering for seeds other than 0.
    pub use_noise: bool,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            allow_rotation: true,
            use_noise: true,
        }
    }
}

/// Prospective center position for one orientation of a box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub position: Vec3,
    pub dims: Vec3,
    /// Position was derived from a supporting top face; do not drop it.
    pub skip_gravity: bool,
}

impl Candidate {
    fn resting(position: Vec3, dims: Vec3) -> Self {
        Self {
            position,
            dims,
            skip_gravity: true,
        }
    }

    fn falling(position: Vec3, dims: Vec3) -> Self {
        Self {
            position,
            dims,
            skip_gravity: false,
        }
    }

    /// Quantized ordering key: lowest, then furthest back, then leftmost.
    fn order_key(&self) -> (i64, i64, i64) {
        let quantize = |value: f64| (value / EPSILON_ORDER).round() as i64;
        (
            quantize(self.position.y),
            quantize(self.position.z),
            quantize(self.position.x),
        )
    }
}

impl Positioned for Candidate {
    fn center(&self) -> Vec3 {
        self.position
    }
}

impl Dimensional for Candidate {
    fn dimensions(&self) -> Vec3 {
        self.dims
    }
}

/// Orders boxes by descending score `volume × (1 + noise)`.
///
/// Noise is drawn in input order and only when `use_noise` is set and
/// `seed > 0`, so seed 0 always yields plain descending volume. Equal scores
/// keep their input order.
pub fn order_boxes(boxes: &[BoxInstance], seed: u64, use_noise: bool) -> Vec<&BoxInstance> {
    let mut rng = SeededRandom::new(seed);
    let noisy = use_noise && seed > 0;

    let mut scored: Vec<(f64, &BoxInstance)> = boxes
        .iter()
        .map(|instance| {
            let noise = if noisy {
                rng.next_symmetric(NOISE_AMPLITUDE)
            } else {
                0.0
            };
            (instance.volume() * (1.0 + noise), instance)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, instance)| instance).collect()
}

/// Candidate positions for one orientation against the current placement.
///
/// Yields `1 + 11 · placed.len() + 25` candidates: the floor corner, eleven
/// positions around every placed box and a 5×5 floor grid.
pub fn generate_candidates(dims: Vec3, placed: &[PlacedBox], container: &Container) -> Vec<Candidate> {
    let (w, h, d) = (dims.x, dims.y, dims.z);
    let half_w = container.width / 2.0;
    let half_d = container.depth / 2.0;

    let mut candidates =
        Vec::with_capacity(1 + 11 * placed.len() + GRID_DIVISIONS * GRID_DIVISIONS);

    candidates.push(Candidate::falling(
        Vec3::new(-half_w + w / 2.0, h / 2.0, -half_d + d / 2.0),
        dims,
    ));

    for p in placed {
        let Vec3 { x: px, y: py, z: pz } = p.position;
        let on_top = p.top_y() + h / 2.0;
        let shift_x = (p.dims.x - w) / 4.0;
        let shift_z = (p.dims.z - d) / 4.0;

        candidates.push(Candidate::resting(Vec3::new(px, on_top, pz), dims));
        candidates.push(Candidate::resting(Vec3::new(px + shift_x, on_top, pz), dims));
        candidates.push(Candidate::resting(Vec3::new(px - shift_x, on_top, pz), dims));
        candidates.push(Candidate::resting(Vec3::new(px, on_top, pz + shift_z), dims));
        candidates.push(Candidate::resting(Vec3::new(px, on_top, pz - shift_z), dims));

        let reach_x = p.dims.x / 2.0 + w / 2.0;
        let reach_z = p.dims.z / 2.0 + d / 2.0;

        // right, behind
        candidates.push(Candidate::falling(Vec3::new(px + reach_x, py, pz), dims));
        candidates.push(Candidate::falling(Vec3::new(px, py, pz + reach_z), dims));

        for (sign_x, sign_z) in [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)] {
            candidates.push(Candidate::falling(
                Vec3::new(px + sign_x * reach_x, py, pz + sign_z * reach_z),
                dims,
            ));
        }
    }

    let span_x = container.width - w;
    let span_z = container.depth - d;
    let divisions = (GRID_DIVISIONS - 1) as f64;
    for i in 0..GRID_DIVISIONS {
        for j in 0..GRID_DIVISIONS {
            let x = -half_w + w / 2.0 + span_x * i as f64 / divisions;
            let z = -half_d + d / 2.0 + span_z * j as f64 / divisions;
            candidates.push(Candidate::falling(Vec3::new(x, h / 2.0, z), dims));
        }
    }

    candidates
}

/// Sorts candidates bottom-back-left. Stable for equal keys.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by_key(Candidate::order_key);
}

/// Runs one attempt and returns the placed boxes in placement order.
pub fn place_boxes(
    boxes: &[BoxInstance],
    container: &Container,
    seed: u64,
    options: PlacementOptions,
) -> Vec<PlacedBox> {
    let mut placed: Vec<PlacedBox> = Vec::with_capacity(boxes.len());

    for instance in order_boxes(boxes, seed, options.use_noise) {
        if let Some(placement) = place_single(instance, &placed, container, options.allow_rotation)
        {
            placed.push(placement);
        }
    }

    placed
}

/// First valid candidate for `instance`, if any.
fn place_single(
    instance: &BoxInstance,
    placed: &[PlacedBox],
    container: &Container,
    allow_rotation: bool,
) -> Option<PlacedBox> {
    let mut candidates: Vec<Candidate> = instance
        .orientations(allow_rotation)
        .into_iter()
        .flat_map(|dims| generate_candidates(dims, placed, container))
        .collect();
    sort_candidates(&mut candidates);

    for mut candidate in candidates {
        // Gravity only moves along y, so a candidate outside the x/z bounds stays invalid.
        if !within_footprint_bounds(&candidate, container) {
            continue;
        }
        if candidate.position.y > candidate.dims.y / 2.0 && !candidate.skip_gravity {
            candidate.position.y = drop_to_rest(&candidate, placed);
        }
        if is_valid(&candidate, placed, container, MIN_STABILITY) {
            return Some(PlacedBox::new(instance, candidate.dims, candidate.position));
        }
    }

    None
}

fn within_footprint_bounds(candidate: &Candidate, container: &Container) -> bool {
    let half_w = container.width / 2.0;
    let half_d = container.depth / 2.0;
    let Vec3 { x, z, .. } = candidate.position;
    let Vec3 { x: w, z: d, .. } = candidate.dims;

    x - w / 2.0 >= -half_w - EPSILON_GENERAL
        && x + w / 2.0 <= half_w + EPSILON_GENERAL
        && z - d / 2.0 >= -half_d - EPSILON_GENERAL
        && z + d / 2.0 <= half_d + EPSILON_GENERAL
}
