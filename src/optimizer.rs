//! Container size search and run driver.
//!
//! The search works as a single linear pipeline:
//! 1. initial estimate from the total box volume
//! 2. per-axis binary search over the free axes (width, height, depth)
//! 3. a final Monte-Carlo pass keeping the attempt with most boxes placed
//! 4. an expansion fallback when boxes are still missing
//! 5. rounding of the container to multiples of [`ROUNDING_STEP`]
//!
//! [`optimize_with_progress`] wraps the search with timing, progress events
//! and cooperative cancellation and always finishes with exactly one
//! terminal event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::model::{BoxInstance, Constraints, Container, PlacedBox, ValidationError};
use crate::placement::{PlacementOptions, place_boxes};
use crate::types::{Axis, Dimensional, Vec3, validation};

/// Safety margin applied to the total box volume for the initial estimate.
pub const VOLUME_SLACK: f64 = 1.1;
/// Convergence tolerance of the per-axis binary search.
pub const SEARCH_TOLERANCE: f64 = 0.05;
/// Growth factor of the expansion fallback.
pub const EXPANSION_FACTOR: f64 = 1.1;
/// Maximum number of expansion steps.
pub const MAX_EXPANSION_STEPS: usize = 20;
/// Granularity of the reported container dimensions.
pub const ROUNDING_STEP: f64 = 0.125;

/// Attempt budget of the Monte-Carlo search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonteCarloConfig {
    /// Attempts per binary-search probe.
    #[serde(default = "MonteCarloConfig::default_search_attempts")]
    pub search_attempts: usize,
    /// Attempts of the final placement pass.
    #[serde(default = "MonteCarloConfig::default_final_attempts")]
    pub final_attempts: usize,
    /// Perturb the box ordering for seeds other than 0.
    #[serde(default = "MonteCarloConfig::default_use_noise")]
    pub use_noise: bool,
}

impl MonteCarloConfig {
    pub const DEFAULT_SEARCH_ATTEMPTS: usize = 15;
    pub const DEFAULT_FINAL_ATTEMPTS: usize = 10;
    pub const DEFAULT_USE_NOISE: bool = true;
    const LEGACY_ATTEMPTS: usize = 3;

    fn default_search_attempts() -> usize {
        Self::DEFAULT_SEARCH_ATTEMPTS
    }

    fn default_final_attempts() -> usize {
        Self::DEFAULT_FINAL_ATTEMPTS
    }

    fn default_use_noise() -> bool {
        Self::DEFAULT_USE_NOISE
    }

    /// Budget of the plain heuristic: few attempts, no ordering noise.
    #[allow(dead_code)]
    pub fn legacy() -> Self {
        Self::uniform(Self::LEGACY_ATTEMPTS)
    }

    /// Same number of attempts for probes and the final pass, no noise.
    pub fn uniform(attempts: usize) -> Self {
        Self {
            search_attempts: attempts,
            final_attempts: attempts,
            use_noise: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.search_attempts == 0 || self.final_attempts == 0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "attempt budgets must be at least 1 (search: {}, final: {})",
                self.search_attempts, self.final_attempts
            )));
        }
        Ok(())
    }
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            search_attempts: Self::DEFAULT_SEARCH_ATTEMPTS,
            final_attempts: Self::DEFAULT_FINAL_ATTEMPTS,
            use_noise: Self::DEFAULT_USE_NOISE,
        }
    }
}

/// Everything one optimization run needs.
#[derive(Clone, Debug)]
pub struct OptimizeRequest {
    pub boxes: Vec<BoxInstance>,
    pub constraints: Constraints,
    pub allow_rotation: bool,
    pub monte_carlo: MonteCarloConfig,
}

impl OptimizeRequest {
    /// Pre-condition checks. Infeasible but well-formed input passes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.boxes.is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        for instance in &self.boxes {
            validation::validate_dimensions_3d((instance.width, instance.height, instance.depth))
                .map_err(|msg| {
                    ValidationError::InvalidDimension(format!(
                        "box {}: {}",
                        instance.instance_id, msg
                    ))
                })?;
        }
        self.constraints.validate()?;
        self.monte_carlo.validate()
    }

    fn placement_options(&self) -> PlacementOptions {
        PlacementOptions {
            allow_rotation: self.allow_rotation,
            use_noise: self.monte_carlo.use_noise,
        }
    }
}

/// Container and placement found by the size search.
#[derive(Clone, Debug, PartialEq)]
pub struct SizingOutcome {
    pub container: Container,
    pub placed_boxes: Vec<PlacedBox>,
}

/// Result of one run. Infeasible packings are reported with `success = false`.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct OptimizationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(nullable = true)]
    pub container: Option<Container>,
    pub placed_boxes: Vec<PlacedBox>,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(nullable = true)]
    pub reason: Option<String>,
}

impl OptimizationResult {
    const INFEASIBLE_REASON: &'static str = "No valid packing found for the given constraints";

    fn from_outcome(outcome: Option<SizingOutcome>, execution_time_ms: f64) -> Self {
        match outcome {
            Some(SizingOutcome {
                container,
                placed_boxes,
            }) => Self {
                success: true,
                container: Some(container),
                placed_boxes,
                execution_time_ms,
                reason: None,
            },
            None => Self {
                success: false,
                container: None,
                placed_boxes: Vec::new(),
                execution_time_ms,
                reason: Some(Self::INFEASIBLE_REASON.to_string()),
            },
        }
    }

    /// Number of placed boxes.
    pub fn placed_count(&self) -> usize {
        self.placed_boxes.len()
    }
}

/// Errors that end a run without a result.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    InvalidConfiguration(#[from] ValidationError),
    #[error("Optimization cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Events emitted during a run, suitable for SSE.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizeEvent {
    /// Intermediate step. `progress` never decreases within a run.
    Progress { message: String, progress: u8 },
    /// Terminal: the run produced a result.
    Complete { result: OptimizationResult },
    /// Terminal: the run failed.
    Error { error: String },
}

impl OptimizeEvent {
    #[allow(dead_code)]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OptimizeEvent::Progress { .. })
    }
}

/// Shared flag for cooperative cancellation, polled before every attempt.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs a complete optimization without progress reporting.
pub fn optimize(request: OptimizeRequest) -> Result<OptimizationResult, OptimizeError> {
    optimize_with_progress(request, &CancellationFlag::new(), |_| {})
}

/// Runs a complete optimization and reports every step through `on_event`.
///
/// Emits zero or more `Progress` events followed by exactly one `Complete`
/// or `Error` event.
pub fn optimize_with_progress(
    request: OptimizeRequest,
    cancel: &CancellationFlag,
    mut on_event: impl FnMut(&OptimizeEvent),
) -> Result<OptimizationResult, OptimizeError> {
    let outcome = run(request, cancel, &mut on_event);
    match &outcome {
        Ok(result) => on_event(&OptimizeEvent::Complete {
            result: result.clone(),
        }),
        Err(err) => on_event(&OptimizeEvent::Error {
            error: err.to_string(),
        }),
    }
    outcome
}

fn run<F: FnMut(&OptimizeEvent)>(
    request: OptimizeRequest,
    cancel: &CancellationFlag,
    on_event: &mut F,
) -> Result<OptimizationResult, OptimizeError> {
    let started = Instant::now();
    request.validate()?;

    let mut search = SizeSearch::new(&request, cancel, on_event);
    search.report(0, "Starting optimization");
    let outcome = search.find_minimum_container()?;
    search.report(100, "Optimization finished");

    let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    Ok(OptimizationResult::from_outcome(
        outcome,
        execution_time_ms,
    ))
}

/// Searches the smallest container for `boxes` without progress reporting.
///
/// Returns `None` when not a single box can be placed.
#[allow(dead_code)]
pub fn find_minimum_container(
    boxes: &[BoxInstance],
    constraints: &Constraints,
    allow_rotation: bool,
    monte_carlo: MonteCarloConfig,
) -> Option<SizingOutcome> {
    let request = OptimizeRequest {
        boxes: boxes.to_vec(),
        constraints: *constraints,
        allow_rotation,
        monte_carlo,
    };
    let cancel = CancellationFlag::new();
    let mut ignore = |_: &OptimizeEvent| {};
    // Without a raised flag the search cannot fail.
    SizeSearch::new(&request, &cancel, &mut ignore)
        .find_minimum_container()
        .ok()
        .flatten()
}

/// Rounds up to the next multiple of [`ROUNDING_STEP`], then to 4 decimals.
pub fn round_up_dimension(value: f64) -> f64 {
    let stepped = (value / ROUNDING_STEP).ceil() * ROUNDING_STEP;
    (stepped * 10_000.0).round() / 10_000.0
}

/// Largest canonical extent per axis.
pub fn max_extents(boxes: &[BoxInstance]) -> Vec3 {
    boxes
        .iter()
        .map(Dimensional::dimensions)
        .fold(Vec3::zero(), |acc, dims| acc.max(&dims))
}

/// Starting dimensions: constrained axes fixed, free axes from total volume.
pub fn initial_dimensions(boxes: &[BoxInstance], constraints: &Constraints) -> Vec3 {
    let extents = max_extents(boxes);
    let mut dims = extents;
    for axis in Axis::ALL {
        if let Some(fixed) = constraints.get(axis) {
            dims.set(axis, fixed);
        }
    }

    let free = constraints.unconstrained_axes();
    if free.is_empty() {
        return dims;
    }

    let target_volume: f64 = boxes.iter().map(|b| b.volume()).sum::<f64>() * VOLUME_SLACK;
    let fixed_product: f64 = Axis::ALL
        .iter()
        .filter_map(|axis| constraints.get(*axis))
        .product();
    let per_axis = (target_volume / fixed_product).powf(1.0 / free.len() as f64);

    for axis in free {
        dims.set(axis, extents.get(axis).max(per_axis.ceil()));
    }
    dims
}

struct SizeSearch<'a, F: FnMut(&OptimizeEvent)> {
    boxes: &'a [BoxInstance],
    constraints: Constraints,
    options: PlacementOptions,
    monte_carlo: MonteCarloConfig,
    cancel: &'a CancellationFlag,
    on_event: &'a mut F,
    last_progress: u8,
}

impl<'a, F: FnMut(&OptimizeEvent)> SizeSearch<'a, F> {
    fn new(request: &'a OptimizeRequest, cancel: &'a CancellationFlag, on_event: &'a mut F) -> Self {
        Self {
            boxes: &request.boxes,
            constraints: request.constraints,
            options: request.placement_options(),
            monte_carlo: request.monte_carlo,
            cancel,
            on_event,
            last_progress: 0,
        }
    }

    fn report(&mut self, progress: u8, message: impl Into<String>) {
        let progress = progress.clamp(self.last_progress, 100);
        self.last_progress = progress;
        (self.on_event)(&OptimizeEvent::Progress {
            message: message.into(),
            progress,
        });
    }

    /// One placement attempt, unless the run was cancelled.
    fn attempt(&self, dims: Vec3, seed: u64) -> Result<Vec<PlacedBox>, OptimizeError> {
        if self.cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }
        Ok(place_boxes(
            self.boxes,
            &Container::from_dims(dims),
            seed,
            self.options,
        ))
    }

    fn find_minimum_container(&mut self) -> Result<Option<SizingOutcome>, OptimizeError> {
        if self.boxes.is_empty() {
            return Ok(None);
        }

        self.report(5, "Estimating initial container size");
        let free = self.constraints.unconstrained_axes();
        let extents = max_extents(self.boxes);
        let mut dims = initial_dimensions(self.boxes, &self.constraints);
        log::debug!(
            "Initial estimate {:.3} x {:.3} x {:.3} ({} free axes)",
            dims.x,
            dims.y,
            dims.z,
            free.len()
        );

        for (idx, axis) in free.iter().enumerate() {
            let progress = 10 + (60 * idx / free.len()) as u8;
            self.report(progress, format!("Searching minimum {}", axis.name()));
            self.search_axis(&mut dims, *axis, extents.get(*axis))?;
        }

        self.report(70, "Running final placement attempts");
        let mut best = self.final_pass(dims)?;
        let mut best_dims = dims;

        if best.len() < self.boxes.len() && !free.is_empty() {
            self.report(90, "Expanding container");
            (best_dims, best) = self.expand(dims, &free, best_dims, best)?;
        }

        if best.is_empty() {
            log::debug!("No box could be placed");
            return Ok(None);
        }

        self.report(95, "Rounding container dimensions");
        let container = Container::new(
            round_up_dimension(best_dims.x),
            round_up_dimension(best_dims.y),
            round_up_dimension(best_dims.z),
        );

        Ok(Some(SizingOutcome {
            container,
            placed_boxes: best,
        }))
    }

    /// Binary search on one axis while the others stay fixed.
    fn search_axis(&mut self, dims: &mut Vec3, axis: Axis, max_extent: f64) -> Result<(), OptimizeError> {
        let mut low = max_extent;
        let mut high = (dims.get(axis) * 3.0).max(max_extent * 5.0);
        let mut best_fit = high;

        while high - low > SEARCH_TOLERANCE {
            let mid = (low + high) / 2.0;
            dims.set(axis, mid);
            if self.fits_all(*dims)? {
                best_fit = mid;
                high = mid;
            } else {
                low = mid + SEARCH_TOLERANCE;
            }
        }

        dims.set(axis, best_fit);
        log::debug!("Minimum {} settled at {:.4}", axis.name(), best_fit);
        Ok(())
    }

    /// Probe: does any of the search attempts place every box?
    fn fits_all(&self, dims: Vec3) -> Result<bool, OptimizeError> {
        for seed in 0..self.monte_carlo.search_attempts as u64 {
            if self.attempt(dims, seed)?.len() == self.boxes.len() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Best of the final attempts; stops at the first complete placement.
    fn final_pass(&mut self, dims: Vec3) -> Result<Vec<PlacedBox>, OptimizeError> {
        let attempts = self.monte_carlo.final_attempts;
        let mut best: Vec<PlacedBox> = Vec::new();

        for seed in 0..attempts {
            let placed = self.attempt(dims, seed as u64)?;
            if placed.len() > best.len() {
                best = placed;
            }
            if best.len() == self.boxes.len() {
                break;
            }
            let progress = 70 + (20 * (seed + 1) / attempts) as u8;
            self.report(
                progress,
                format!("Final attempt {}/{}: {} boxes placed", seed + 1, attempts, best.len()),
            );
        }

        Ok(best)
    }

    /// Grows every free axis until all boxes fit, keeping the best placement seen.
    fn expand(
        &mut self,
        start: Vec3,
        free: &[Axis],
        mut best_dims: Vec3,
        mut best: Vec<PlacedBox>,
    ) -> Result<(Vec3, Vec<PlacedBox>), OptimizeError> {
        let mut dims = start;

        for step in 0..MAX_EXPANSION_STEPS {
            for axis in free {
                let current = dims.get(*axis);
                let mut grown = current * EXPANSION_FACTOR;
                if grown == current {
                    grown = current + 1.0;
                }
                dims.set(*axis, grown);
            }

            let placed = self.attempt(dims, 0)?;
            log::debug!(
                "Expansion step {}: {} of {} boxes placed",
                step + 1,
                placed.len(),
                self.boxes.len()
            );
            if placed.len() > best.len() {
                best = placed;
                best_dims = dims;
            }
            if best.len() == self.boxes.len() {
                break;
            }
            let progress = 90 + (5 * (step + 1) / MAX_EXPANSION_STEPS) as u8;
            self.report(progress, format!("Expansion step {}", step + 1));
        }

        Ok((best_dims, best))
    }
}
