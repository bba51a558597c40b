//! HTTP surface for conversational invoicing and payment settlement.
//!
//! Exposes the messaging webhook that drives invoice drafting, the
//! payment initiation and provider callback endpoints, and invoice
//! lookup, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use conversation::{ConversationMachine, InMemoryTransport};
use domain::{InvoiceService, PaymentMethodService};
use entity_store::EntityStore;
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::{
    InMemoryDispatcher, InMemoryPushProvider, RetryPolicy, SettlementOrchestrator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EntityStore> {
    pub store: Arc<S>,
    pub machine: ConversationMachine<S>,
    pub invoices: InvoiceService<S>,
    pub methods: PaymentMethodService<S>,
    pub orchestrator: SettlementOrchestrator<S, InMemoryPushProvider, InMemoryDispatcher>,
    pub transport: InMemoryTransport,
    pub provider: InMemoryPushProvider,
    pub dispatcher: InMemoryDispatcher,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EntityStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhook", post(routes::webhook::receive::<S>))
        .route("/payments/initiate", post(routes::payments::initiate::<S>))
        .route("/payments/callback", post(routes::payments::callback::<S>))
        .route("/payments/passive", post(routes::payments::passive::<S>))
        .route("/invoices/{id}", get(routes::invoices::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with in-memory provider, dispatcher
/// and transport doubles.
pub fn create_default_state<S: EntityStore + 'static>(
    store: Arc<S>,
    policy: RetryPolicy,
    push_timeout: std::time::Duration,
) -> Arc<AppState<S>> {
    let provider = InMemoryPushProvider::new();
    let dispatcher = InMemoryDispatcher::new();
    let transport = InMemoryTransport::new();

    let orchestrator = SettlementOrchestrator::new(
        store.clone(),
        Arc::new(provider.clone()),
        Arc::new(dispatcher.clone()),
    )
    .with_policy(policy)
    .with_push_timeout(push_timeout);

    Arc::new(AppState {
        machine: ConversationMachine::new(store.clone()),
        invoices: InvoiceService::new(store.clone()),
        methods: PaymentMethodService::new(store.clone()),
        orchestrator,
        transport,
        provider,
        dispatcher,
        store,
    })
}
