//! The instrumented transaction simulation engine.
//!
//! # Responsibilities
//! - Execute the named multi-step flows as strictly sequential step chains
//! - Build one well-formed span tree per invocation
//! - Synthesize bounded random latency and failure outcomes per step
//! - Emit metrics and logs consistent with the span tree
//!
//! # Data Flow
//! ```text
//! Invoker (HTTP handler)
//!     → TransactionEngine::run(kind, params)
//!         → open root span, request counter
//!         → step spans: delay → attributes → log → close
//!         → on failure: mark span, close all ancestors, stop
//!         → close root, duration histogram
//!     → TransactionResult { trace_id, outcome }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::catalog::{Catalog, User};
use crate::config::SimulationConfig;
use crate::sim::rng::{self, RandomnessSource};
use crate::telemetry::metrics::LabelSet;
use crate::telemetry::span::{SpanId, TraceContext, TraceError, TraceId};
use crate::telemetry::TelemetryContext;

/// Total requests, labeled `{endpoint, method}`.
pub const REQUEST_COUNT: &str = "app.request.count";
/// Request duration in milliseconds, labeled `{endpoint}`.
pub const REQUEST_DURATION: &str = "app.request.duration";
/// Completed orders, labeled `{status}`.
pub const ORDERS_TOTAL: &str = "app.orders.total";
/// Currently active users (signed adjustments).
pub const ACTIVE_USERS: &str = "app.users.active";

/// The simulated flows the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    ListProducts,
    ListUsers,
    CreateOrder,
    Checkout,
    SimulateError,
}

impl FlowKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::ListProducts => "/api/products",
            Self::ListUsers => "/api/users",
            Self::CreateOrder => "/api/orders",
            Self::Checkout => "/api/checkout",
            Self::SimulateError => "/api/error",
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::ListProducts | Self::ListUsers | Self::SimulateError => "GET",
            Self::CreateOrder | Self::Checkout => "POST",
        }
    }

    fn root_span_name(&self) -> String {
        format!("{} {}", self.method(), self.endpoint())
    }
}

/// Caller-supplied parameters for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// Pin the acting user instead of picking one at random.
    pub user_id: Option<u64>,
}

/// Successful order creation payload.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub order_id: u64,
    pub user: String,
    pub items: Vec<String>,
    pub total: f64,
    pub status: String,
}

/// Successful checkout payload.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub user: String,
    pub items: Vec<String>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub status: String,
}

/// What one invocation produced.
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Products(Vec<crate::catalog::Product>),
    Users(Vec<User>),
    OrderCompleted(OrderReceipt),
    CheckoutCompleted(CheckoutReceipt),
    /// Simulated domain failure: the charge was rejected.
    PaymentDeclined { user: String, amount: f64 },
    /// Deliberately injected fault, surfaced as an unhandled error.
    Fault { kind: String, message: String },
}

/// Outcome of one engine invocation, correlated with its emitted telemetry.
#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub trace_id: TraceId,
    pub outcome: FlowOutcome,
}

/// Faults that abort an invocation. These never represent simulated domain
/// outcomes; they indicate engine bugs.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Orchestrator for the simulated flows.
///
/// One engine serves many concurrent invocations; each `run` call owns its
/// own trace context, so invocations never share span state.
pub struct TransactionEngine {
    telemetry: Arc<TelemetryContext>,
    catalog: Arc<Catalog>,
    rng: Arc<dyn RandomnessSource>,
    settings: SimulationConfig,
}

impl TransactionEngine {
    pub fn new(
        telemetry: Arc<TelemetryContext>,
        catalog: Arc<Catalog>,
        rng: Arc<dyn RandomnessSource>,
        settings: SimulationConfig,
    ) -> Self {
        describe_metrics();
        Self {
            telemetry,
            catalog,
            rng,
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run one flow to completion and return its outcome together with the
    /// trace id of the telemetry it emitted.
    pub async fn run(
        &self,
        kind: FlowKind,
        params: RequestParams,
    ) -> Result<TransactionResult, EngineError> {
        let started = Instant::now();
        self.telemetry.metrics.counter(REQUEST_COUNT).add(
            1,
            &LabelSet::empty()
                .with("endpoint", kind.endpoint())
                .with("method", kind.method()),
        );

        let mut trace = self.telemetry.start_trace();
        let root = trace.start_span(&kind.root_span_name());
        self.stamp_root(&mut trace, root, kind)?;

        let flow = match kind {
            FlowKind::ListProducts => self.list_products(&mut trace).await,
            FlowKind::ListUsers => self.list_users(&mut trace).await,
            FlowKind::CreateOrder => self.create_order(&mut trace, root, &params).await,
            FlowKind::Checkout => self.checkout(&mut trace, &params).await,
            FlowKind::SimulateError => self.simulate_error(&mut trace, root).await,
        };

        let outcome = match flow {
            Ok(outcome) => outcome,
            Err(e) => {
                // Nesting faults abort the invocation, but its spans still
                // close so other traces stay unaffected.
                trace.end_all();
                return Err(e);
            }
        };

        // Failure paths close the whole stack themselves; the success path
        // still holds the root.
        if trace.depth() > 0 {
            trace.end_span(root)?;
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.telemetry.metrics.histogram(REQUEST_DURATION).record(
            elapsed_ms,
            &LabelSet::empty().with("endpoint", kind.endpoint()),
        );

        Ok(TransactionResult {
            trace_id: trace.trace_id(),
            outcome,
        })
    }

    fn stamp_root(
        &self,
        trace: &mut TraceContext,
        root: SpanId,
        kind: FlowKind,
    ) -> Result<(), TraceError> {
        let service = &self.telemetry.service;
        trace.set_attribute(root, "service.name", service.service_name.as_str())?;
        trace.set_attribute(root, "service.version", service.service_version.as_str())?;
        trace.set_attribute(root, "deployment.environment", service.environment.as_str())?;
        trace.set_attribute(root, "http.method", kind.method())?;
        trace.set_attribute(root, "http.route", kind.endpoint())?;
        Ok(())
    }

    async fn list_products(&self, trace: &mut TraceContext) -> Result<FlowOutcome, EngineError> {
        self.telemetry
            .logger
            .info(Some(trace), "Listing all products", &[]);

        let span = trace.start_span("fetch-products-from-db");
        self.pause(10, 50).await;
        trace.set_attribute(span, "db.system", "postgresql")?;
        trace.set_attribute(span, "db.statement", "SELECT * FROM products")?;
        trace.set_attribute(span, "db.rows_returned", self.catalog.products().len())?;
        trace.end_span(span)?;

        Ok(FlowOutcome::Products(self.catalog.products().to_vec()))
    }

    async fn list_users(&self, trace: &mut TraceContext) -> Result<FlowOutcome, EngineError> {
        let users = self.catalog.users();
        self.telemetry
            .metrics
            .up_down_counter(ACTIVE_USERS)
            .add(self.rng.int_in(-1, 2), &LabelSet::empty());
        self.telemetry.logger.info(
            Some(trace),
            "Listing users",
            &[("user_count", json!(users.len()))],
        );

        let span = trace.start_span("fetch-users-from-db");
        self.pause(10, 80).await;
        trace.set_attribute(span, "db.system", "postgresql")?;
        trace.set_attribute(span, "db.statement", "SELECT * FROM users")?;
        trace.end_span(span)?;

        Ok(FlowOutcome::Users(users.to_vec()))
    }

    async fn create_order(
        &self,
        trace: &mut TraceContext,
        root: SpanId,
        params: &RequestParams,
    ) -> Result<FlowOutcome, EngineError> {
        let log = &self.telemetry.logger;
        let user = self.pick_user(params);
        let count = self.rng.int_in(1, 3) as usize;
        let items = rng::sample(self.rng.as_ref(), self.catalog.products(), count);
        let total: f64 = items.iter().map(|p| p.price).sum();
        let order_id = self.rng.int_in(10_000, 99_999) as u64;

        trace.set_attribute(root, "order.id", order_id)?;
        trace.set_attribute(root, "order.user_id", user.id)?;
        trace.set_attribute(root, "order.total", total)?;
        trace.set_attribute(root, "order.items_count", items.len())?;
        log.info(
            Some(trace),
            "Creating order",
            &[
                ("order_id", json!(order_id)),
                ("user", json!(user.name)),
                ("total", json!(total)),
            ],
        );

        let span = trace.start_span("validate-inventory");
        self.pause(10, 30).await;
        trace.set_attribute(span, "inventory.items_checked", items.len())?;
        log.info(
            Some(trace),
            "Inventory validated",
            &[("order_id", json!(order_id))],
        );
        trace.end_span(span)?;

        let span = trace.start_span("process-payment");
        let delay = self.pause(50, 200).await;
        let delay_ms = delay.as_secs_f64() * 1000.0;
        trace.set_attribute(span, "payment.amount", total)?;
        trace.set_attribute(span, "payment.method", "credit_card")?;
        trace.set_attribute(span, "payment.duration_ms", delay_ms)?;
        if delay_ms > self.settings.slow_payment_threshold_ms {
            log.warn(
                Some(trace),
                "Slow payment processing detected",
                &[
                    ("order_id", json!(order_id)),
                    ("duration_ms", json!(delay_ms)),
                ],
            );
        }
        log.info(
            Some(trace),
            "Payment processed",
            &[("order_id", json!(order_id)), ("amount", json!(total))],
        );
        trace.end_span(span)?;

        let span = trace.start_span("send-confirmation");
        self.pause(10, 40).await;
        trace.set_attribute(span, "notification.type", "email")?;
        trace.set_attribute(span, "notification.recipient", user.email.as_str())?;
        log.info(
            Some(trace),
            "Order confirmation sent",
            &[("order_id", json!(order_id)), ("email", json!(user.email))],
        );
        trace.end_span(span)?;

        self.telemetry
            .metrics
            .counter(ORDERS_TOTAL)
            .add(1, &LabelSet::empty().with("status", "completed"));

        Ok(FlowOutcome::OrderCompleted(OrderReceipt {
            order_id,
            user: user.name.clone(),
            items: items.iter().map(|p| p.name.clone()).collect(),
            total: round2(total),
            status: "completed".to_string(),
        }))
    }

    async fn checkout(
        &self,
        trace: &mut TraceContext,
        params: &RequestParams,
    ) -> Result<FlowOutcome, EngineError> {
        let log = &self.telemetry.logger;
        let user = self.pick_user(params);
        let count = self.rng.int_in(1, 4) as usize;
        let cart = rng::sample(self.rng.as_ref(), self.catalog.products(), count);
        let subtotal: f64 = cart.iter().map(|p| p.price).sum();

        log.info(
            Some(trace),
            "Checkout started",
            &[("user", json!(user.name)), ("cart_size", json!(cart.len()))],
        );

        let flow = trace.start_span("checkout-flow");
        trace.set_attribute(flow, "checkout.user_id", user.id)?;
        trace.set_attribute(flow, "checkout.total", subtotal)?;

        let span = trace.start_span("validate-cart");
        self.pause(5, 20).await;
        trace.end_span(span)?;

        // Discount applies to the raw subtotal; tax is computed on the
        // discounted amount. Intermediate values stay unrounded.
        let span = trace.start_span("apply-discounts");
        let discount = *rng::choose(self.rng.as_ref(), &self.settings.discount_percents);
        let mut total = subtotal;
        if discount > 0 {
            total *= 1.0 - f64::from(discount) / 100.0;
            trace.set_attribute(span, "discount.percent", i64::from(discount))?;
            log.info(Some(trace), "Discount applied", &[("discount", json!(discount))]);
        }
        self.pause(5, 10).await;
        trace.end_span(span)?;

        let span = trace.start_span("calculate-tax");
        let tax = total * self.settings.tax_rate;
        trace.set_attribute(span, "tax.rate", self.settings.tax_rate)?;
        trace.set_attribute(span, "tax.amount", tax)?;
        self.pause(5, 10).await;
        trace.end_span(span)?;

        let span = trace.start_span("charge-payment");
        self.pause(50, 300).await;
        trace.set_attribute(span, "payment.total", total + tax)?;
        if self.rng.fails(self.settings.payment_failure_probability) {
            trace.set_attribute(span, "error", true)?;
            trace.set_error(span)?;
            log.error(
                Some(trace),
                "Payment failed",
                &[("user", json!(user.name)), ("amount", json!(total + tax))],
            );
            // Remaining steps are skipped; the step span, checkout-flow, and
            // the root all close before returning.
            trace.end_all();
            return Ok(FlowOutcome::PaymentDeclined {
                user: user.name.clone(),
                amount: round2(total + tax),
            });
        }
        trace.end_span(span)?;

        let span = trace.start_span("create-shipment");
        let tracking = format!("TRK-{}", self.rng.int_in(100_000, 999_999));
        trace.set_attribute(span, "shipment.tracking", tracking.as_str())?;
        self.pause(10, 50).await;
        log.info(Some(trace), "Shipment created", &[("tracking", json!(tracking))]);
        trace.end_span(span)?;

        trace.end_span(flow)?;

        self.telemetry
            .metrics
            .counter(ORDERS_TOTAL)
            .add(1, &LabelSet::empty().with("status", "completed"));
        log.info(
            Some(trace),
            "Checkout completed",
            &[("user", json!(user.name)), ("total", json!(total + tax))],
        );

        Ok(FlowOutcome::CheckoutCompleted(CheckoutReceipt {
            user: user.name.clone(),
            items: cart.iter().map(|p| p.name.clone()).collect(),
            subtotal: round2(total),
            tax: round2(tax),
            total: round2(total + tax),
            status: "completed".to_string(),
        }))
    }

    async fn simulate_error(
        &self,
        trace: &mut TraceContext,
        root: SpanId,
    ) -> Result<FlowOutcome, EngineError> {
        self.telemetry.logger.error(
            Some(trace),
            "Simulated application error",
            &[("error_type", json!("test"))],
        );

        let span = trace.start_span("failing-operation");
        trace.set_attribute(span, "error", true)?;
        trace.record_exception(span, "ValueError", "Something went wrong")?;
        trace.end_span(span)?;

        let message = "Simulated error for observability testing";
        trace.record_exception(root, "ValueError", message)?;
        trace.end_all();

        Ok(FlowOutcome::Fault {
            kind: "ValueError".to_string(),
            message: message.to_string(),
        })
    }

    fn pick_user(&self, params: &RequestParams) -> &User {
        params
            .user_id
            .and_then(|id| self.catalog.user_by_id(id))
            .unwrap_or_else(|| rng::choose(self.rng.as_ref(), self.catalog.users()))
    }

    async fn pause(&self, min_ms: u64, max_ms: u64) -> Duration {
        let delay = self.rng.delay(
            Duration::from_millis(min_ms),
            Duration::from_millis(max_ms),
        );
        tokio::time::sleep(delay).await;
        delay
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn describe_metrics() {
    metrics::describe_counter!(REQUEST_COUNT, metrics::Unit::Count, "Total number of requests");
    metrics::describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Milliseconds,
        "Request duration in milliseconds"
    );
    metrics::describe_counter!(ORDERS_TOTAL, metrics::Unit::Count, "Total orders created");
    metrics::describe_gauge!(ACTIVE_USERS, metrics::Unit::Count, "Currently active users");
}
