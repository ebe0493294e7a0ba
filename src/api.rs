//! REST API for the container sizing service.
//!
//! Provides the optimization endpoints, a progress stream and the OpenAPI
//! documentation. Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::model::{BoxSpec, Constraints, Container, PlacedBox, ValidationError, expand_box_specs};
use crate::optimizer::{
    CancellationFlag, MonteCarloConfig, OptimizationResult, OptimizeError, OptimizeEvent,
    OptimizeRequest, optimize, optimize_with_progress,
};
use crate::types::{Dimensional, Vec3};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>container_sizer API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the optimization endpoints.
///
/// Axes left out of `constraints` are minimized. `monte_carlo` takes
/// precedence over `max_attempts`; without either the configured budget
/// applies.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "boxes": [
            { "id": 1, "width": 1.0, "height": 2.0, "depth": 1.0, "quantity": 2 },
            { "id": 2, "width": 1.0, "height": 1.0, "depth": 1.0, "quantity": 4 }
        ],
        "constraints": { "height": 2.0 },
        "allow_rotation": true
    })
)]
pub struct OptimizeRequestBody {
    pub boxes: Vec<BoxSpec>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    #[schema(nullable = true)]
    pub allow_rotation: Option<bool>,
    /// Attempt budget of the plain heuristic: same count for probes and the
    /// final pass, no ordering noise.
    #[serde(default)]
    #[schema(nullable = true)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub monte_carlo: Option<MonteCarloConfig>,
}

#[derive(Debug)]
struct ValidatedOptimizeRequest {
    request: OptimizeRequest,
    warnings: Vec<String>,
}

impl ValidatedOptimizeRequest {
    fn box_count(&self) -> usize {
        self.request.boxes.len()
    }
}

impl OptimizeRequestBody {
    fn into_validated(
        self,
        defaults: &OptimizerConfig,
    ) -> Result<ValidatedOptimizeRequest, ValidationError> {
        if self.boxes.is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        for spec in &self.boxes {
            spec.validate()?;
        }
        self.constraints.validate()?;

        let monte_carlo = match (self.monte_carlo, self.max_attempts) {
            (Some(config), _) => config,
            (None, Some(attempts)) => MonteCarloConfig::uniform(attempts),
            (None, None) => defaults.monte_carlo(),
        };
        monte_carlo.validate()?;

        let allow_rotation = self.allow_rotation.unwrap_or(defaults.allow_rotation());
        let warnings = self.constraints.warnings_for(&self.boxes, allow_rotation);

        Ok(ValidatedOptimizeRequest {
            request: OptimizeRequest {
                boxes: expand_box_specs(&self.boxes),
                constraints: self.constraints,
                allow_rotation,
                monte_carlo,
            },
            warnings,
        })
    }
}

/// Response structure of `POST /optimize`.
///
/// # Fields
/// * `result` - Engine result with container and placements
/// * `total_boxes` - Number of expanded box instances
/// * `placed_count` - Number of boxes placed
/// * `utilization_percent` - Placed box volume relative to the container volume
/// * `warnings` - Constraints that some box cannot satisfy
#[derive(Serialize, ToSchema)]
pub struct OptimizeResponse {
    pub result: OptimizationResult,
    pub total_boxes: usize,
    pub placed_count: usize,
    pub utilization_percent: f64,
    pub warnings: Vec<String>,
}

impl OptimizeResponse {
    fn from_result(result: OptimizationResult, total_boxes: usize, warnings: Vec<String>) -> Self {
        let utilization_percent = utilization_percent(result.container.as_ref(), &result.placed_boxes);
        Self {
            placed_count: result.placed_count(),
            result,
            total_boxes,
            utilization_percent,
            warnings,
        }
    }
}

/// Placed box volume as a percentage of the container volume, 0 without a container.
fn utilization_percent(container: Option<&Container>, placed: &[PlacedBox]) -> f64 {
    let Some(container) = container else {
        return 0.0;
    };
    let capacity = container.volume();
    if capacity <= 0.0 {
        return 0.0;
    }
    let used: f64 = placed.iter().map(|p| p.volume()).sum();
    used / capacity * 100.0
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn internal_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Optimization failed",
        details,
    )
}

fn parse_optimize_request(
    payload: Result<Json<OptimizeRequestBody>, JsonRejection>,
    defaults: &OptimizerConfig,
) -> Result<ValidatedOptimizeRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    payload
        .into_validated(defaults)
        .map_err(|err| validation_error(err.to_string()))
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_optimize, handle_optimize_stream),
    components(
        schemas(
            OptimizeRequestBody,
            BoxSpec,
            Constraints,
            MonteCarloConfig,
            OptimizeResponse,
            OptimizationResult,
            PlacedBox,
            Container,
            Vec3,
            ErrorResponse
        )
    ),
    tags((name = "sizing", description = "Endpoints for container size optimization"))
)]
struct ApiDoc;

/// Starts the API server on the configured address.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { optimizer_config };

    let app = Router::new()
        // API endpoints
        .route("/optimize", post(handle_optimize))
        .route("/optimize_stream", post(handle_optimize_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        log::error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    log::info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        log::info!("💡 Local access: http://localhost:{}", config.port());
    }
    log::info!("📦 API Endpoints: POST /optimize, POST /optimize_stream");
    log::info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /optimize endpoint.
///
/// Searches the smallest container for the given boxes and returns the
/// placement together with derived statistics.
#[utoipa::path(
    post,
    path = "/optimize",
    request_body = OptimizeRequestBody,
    responses(
        (status = 200, description = "Optimization finished", body = OptimizeResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request data",
            body = ErrorResponse
        ),
        (
            status = INTERNAL_SERVER_ERROR,
            description = "The optimization worker failed",
            body = ErrorResponse
        )
    ),
    tag = "sizing"
)]
async fn handle_optimize(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequestBody>, JsonRejection>,
) -> impl IntoResponse {
    let validated = match parse_optimize_request(payload, &state.optimizer_config) {
        Ok(validated) => validated,
        Err(response) => return response,
    };

    let total_boxes = validated.box_count();
    let ValidatedOptimizeRequest { request, warnings } = validated;
    log::info!(
        "📥 New optimize request: {} boxes, rotation {}",
        total_boxes,
        if request.allow_rotation { "on" } else { "off" }
    );
    for warning in &warnings {
        log::warn!("⚠️ {}", warning);
    }

    let result = match tokio::task::spawn_blocking(move || optimize(request)).await {
        Ok(Ok(result)) => result,
        Ok(Err(OptimizeError::InvalidConfiguration(err))) => {
            return validation_error(err.to_string());
        }
        Ok(Err(err)) => {
            log::error!("❌ Optimization failed: {}", err);
            return internal_error(err.to_string());
        }
        Err(err) => {
            log::error!("❌ Optimization worker panicked: {}", err);
            return internal_error(err.to_string());
        }
    };

    log::info!(
        "📦 Result: {}/{} boxes placed in {:.1} ms",
        result.placed_count(),
        total_boxes,
        result.execution_time_ms
    );

    let response = OptimizeResponse::from_result(result, total_boxes, warnings);
    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for POST /optimize_stream endpoint (SSE).
///
/// Streams progress events in real-time as Server-Sent Events
/// (text/event-stream). The stream ends with one `complete` or `error` event.
/// Closing the connection cancels the run.
#[utoipa::path(
    post,
    path = "/optimize_stream",
    request_body = OptimizeRequestBody,
    responses(
        (
            status = 200,
            description = "Streams optimization events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request data",
            body = ErrorResponse
        )
    ),
    tag = "sizing"
)]
async fn handle_optimize_stream(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequestBody>, JsonRejection>,
) -> impl IntoResponse {
    let ValidatedOptimizeRequest { request, warnings } =
        match parse_optimize_request(payload, &state.optimizer_config) {
            Ok(validated) => validated,
            Err(response) => return response,
        };
    for warning in &warnings {
        log::warn!("⚠️ {}", warning);
    }
    log::info!("📡 New optimize stream: {} boxes", request.boxes.len());

    let (tx, rx) = mpsc::channel::<String>(32);
    let panic_tx = tx.clone();
    let cancel = CancellationFlag::new();

    let worker = tokio::task::spawn_blocking(move || {
        let _ = optimize_with_progress(request, &cancel, |evt| {
            let Ok(json) = serde_json::to_string(evt) else {
                return;
            };
            if tx.blocking_send(json).is_err() && !cancel.is_cancelled() {
                log::info!("🔌 Stream closed by client, cancelling optimization");
                cancel.cancel();
            }
        });
    });

    tokio::spawn(async move {
        if let Err(err) = worker.await {
            log::error!("❌ Optimization worker panicked: {}", err);
            let event = OptimizeEvent::Error {
                error: OptimizeError::Internal(err.to_string()).to_string(),
            };
            if let Ok(json) = serde_json::to_string(&event) {
                let _ = panic_tx.send(json).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn body(json: &str) -> OptimizeRequestBody {
        serde_json::from_str(json).expect("Should parse valid JSON")
    }

    fn placed(dims: (f64, f64, f64)) -> PlacedBox {
        let instance = &expand_box_specs(&[BoxSpec {
            id: 1,
            width: dims.0,
            height: dims.1,
            depth: dims.2,
            quantity: 1,
        }])[0];
        PlacedBox::new(
            instance,
            Vec3::new(dims.0, dims.1, dims.2),
            Vec3::new(0.0, dims.1 / 2.0, 0.0),
        )
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/optimize"),
            "OpenAPI documentation is missing the /optimize path"
        );
        assert!(
            paths.contains_key("/optimize_stream"),
            "OpenAPI documentation is missing the /optimize_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in [
            "OptimizeRequestBody",
            "OptimizeResponse",
            "OptimizationResult",
            "ErrorResponse",
        ] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn request_parses_optional_fields() {
        let request = body(
            r#"{
                "boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0}],
                "allow_rotation": null
            }"#,
        );
        assert_eq!(request.boxes[0].quantity, 1);
        assert_eq!(request.constraints, Constraints::unconstrained());
        assert_eq!(request.allow_rotation, None);
        assert_eq!(request.max_attempts, None);
        assert!(request.monte_carlo.is_none());
    }

    #[test]
    fn request_level_allow_rotation_overrides_config() {
        let defaults = OptimizerConfig::default();
        assert!(defaults.allow_rotation());

        let validated = body(
            r#"{
                "boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0}],
                "allow_rotation": false
            }"#,
        )
        .into_validated(&defaults)
        .expect("Should validate successfully");
        assert!(!validated.request.allow_rotation);

        let validated = body(r#"{"boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0}]}"#)
            .into_validated(&defaults)
            .expect("Should validate successfully");
        assert!(
            validated.request.allow_rotation,
            "When allow_rotation is omitted, the config setting should be used"
        );
    }

    #[test]
    fn attempt_budget_precedence() {
        let defaults = OptimizerConfig::default();
        let boxes = r#""boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0, "quantity": 3}]"#;

        let configured = body(&format!("{{{boxes}}}"))
            .into_validated(&defaults)
            .expect("valid");
        assert_eq!(configured.request.monte_carlo, defaults.monte_carlo());
        assert_eq!(configured.box_count(), 3);

        let legacy = body(&format!(r#"{{{boxes}, "max_attempts": 5}}"#))
            .into_validated(&defaults)
            .expect("valid");
        assert_eq!(legacy.request.monte_carlo, MonteCarloConfig::uniform(5));
        assert!(!legacy.request.monte_carlo.use_noise);

        let explicit = body(&format!(
            r#"{{{boxes}, "max_attempts": 5, "monte_carlo": {{"search_attempts": 2, "final_attempts": 4}}}}"#
        ))
        .into_validated(&defaults)
        .expect("valid");
        assert_eq!(explicit.request.monte_carlo.search_attempts, 2);
        assert_eq!(explicit.request.monte_carlo.final_attempts, 4);
        assert!(explicit.request.monte_carlo.use_noise);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let defaults = OptimizerConfig::default();

        let empty = body(r#"{"boxes": []}"#).into_validated(&defaults);
        assert!(matches!(empty, Err(ValidationError::EmptyInput)));

        let zero_quantity =
            body(r#"{"boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0, "quantity": 0}]}"#)
                .into_validated(&defaults);
        assert!(matches!(zero_quantity, Err(ValidationError::InvalidQuantity(_))));

        let bad_constraint = body(
            r#"{"boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0}], "constraints": {"depth": -2.0}}"#,
        )
        .into_validated(&defaults);
        assert!(matches!(bad_constraint, Err(ValidationError::InvalidConstraint(_))));

        let zero_attempts = body(
            r#"{"boxes": [{"id": 1, "width": 1.0, "height": 1.0, "depth": 1.0}], "max_attempts": 0}"#,
        )
        .into_validated(&defaults);
        assert!(matches!(
            zero_attempts,
            Err(ValidationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn unsatisfiable_constraints_produce_warnings() {
        let validated = body(
            r#"{
                "boxes": [{"id": 4, "width": 5.0, "height": 5.0, "depth": 5.0}],
                "constraints": {"width": 2.0, "height": 2.0, "depth": 2.0}
            }"#,
        )
        .into_validated(&OptimizerConfig::default())
        .expect("infeasible input is still valid");
        assert_eq!(validated.warnings.len(), 3);
        assert!(validated.warnings[0].contains("Box definition 4"));
    }

    #[test]
    fn utilization_relates_box_volume_to_container() {
        let container = Container::new(2.0, 1.0, 1.0);
        let boxes = vec![placed((1.0, 1.0, 1.0))];
        let percent = utilization_percent(Some(&container), &boxes);
        assert_abs_diff_eq!(percent, 50.0, epsilon = 1e-9);
        assert_eq!(utilization_percent(None, &boxes), 0.0);
    }

    #[test]
    fn response_reports_counts() {
        let result = OptimizationResult {
            success: true,
            container: Some(Container::new(1.0, 1.0, 1.0)),
            placed_boxes: vec![placed((1.0, 1.0, 1.0))],
            execution_time_ms: 1.0,
            reason: None,
        };
        let response = OptimizeResponse::from_result(result, 2, Vec::new());
        assert_eq!(response.placed_count, 1);
        assert_eq!(response.total_boxes, 2);
        assert_abs_diff_eq!(response.utilization_percent, 100.0, epsilon = 1e-9);

        let json = serde_json::to_value(&response).expect("serializes");
        assert_eq!(json["result"]["success"], true);
        assert_eq!(json["result"]["container"]["width"], 1.0);
    }
}
