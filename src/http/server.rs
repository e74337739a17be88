//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with all simulated endpoints
//! - Wire up middleware (request ID, tracing, timeout, body limits)
//! - Map each route to its transaction flow
//! - Turn flow outcomes into HTTP responses
//!
//! # Design Decisions
//! - The handler layer owns no simulation logic; it parses parameters,
//!   calls the engine, and maps outcomes to status codes
//! - Every response carries the invocation's trace id in `x-trace-id` so
//!   callers can find their telemetry

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::SimConfig;
use crate::sim::{FlowKind, FlowOutcome, RequestParams, TransactionEngine};

static X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransactionEngine>,
}

/// HTTP server for the transaction simulator.
pub struct HttpServer {
    router: Router,
    config: SimConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and engine.
    pub fn new(config: SimConfig, engine: Arc<TransactionEngine>) -> Self {
        let state = AppState { engine };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &SimConfig, state: AppState) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/api/products", get(list_products))
            .route("/api/users", get(list_users))
            .route("/api/orders", post(create_order))
            .route("/api/checkout", post(checkout))
            .route("/api/error", get(simulate_error))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

/// Optional body for the order-creating endpoints.
#[derive(Debug, Default, Deserialize)]
struct OrderRequest {
    user_id: Option<u64>,
}

/// The body is optional; an empty or unparsable one means default params.
fn parse_params(body: &[u8]) -> RequestParams {
    let request: OrderRequest = serde_json::from_slice(body).unwrap_or_default();
    RequestParams {
        user_id: request.user_id,
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn list_products(State(state): State<AppState>) -> Response {
    run_flow(state, FlowKind::ListProducts, RequestParams::default()).await
}

async fn list_users(State(state): State<AppState>) -> Response {
    run_flow(state, FlowKind::ListUsers, RequestParams::default()).await
}

async fn create_order(State(state): State<AppState>, body: Bytes) -> Response {
    run_flow(state, FlowKind::CreateOrder, parse_params(&body)).await
}

async fn checkout(State(state): State<AppState>, body: Bytes) -> Response {
    run_flow(state, FlowKind::Checkout, parse_params(&body)).await
}

async fn simulate_error(State(state): State<AppState>) -> Response {
    run_flow(state, FlowKind::SimulateError, RequestParams::default()).await
}

/// Dispatch one flow and map its outcome to an HTTP response.
async fn run_flow(state: AppState, kind: FlowKind, params: RequestParams) -> Response {
    match state.engine.run(kind, params).await {
        Ok(result) => {
            let (status, body) = match result.outcome {
                FlowOutcome::Products(products) => (StatusCode::OK, json!(products)),
                FlowOutcome::Users(users) => (StatusCode::OK, json!(users)),
                FlowOutcome::OrderCompleted(receipt) => (StatusCode::CREATED, json!(receipt)),
                FlowOutcome::CheckoutCompleted(receipt) => (StatusCode::CREATED, json!(receipt)),
                FlowOutcome::PaymentDeclined { .. } => (
                    StatusCode::PAYMENT_REQUIRED,
                    json!({"error": "Payment declined"}),
                ),
                FlowOutcome::Fault { message, .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": message}),
                ),
            };

            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&result.trace_id.to_string()) {
                response.headers_mut().insert(X_TRACE_ID.clone(), value);
            }
            response
        }
        Err(e) => {
            tracing::error!(flow = ?kind, error = %e, "Flow invocation aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
                .into_response()
        }
    }
}
