pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod schemas;
pub mod services;
pub mod validation;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ports::LedgerStore;
use crate::services::{ProductDirectory, ReportingService, StockMutationEngine};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub engine: StockMutationEngine,
    pub products: ProductDirectory,
    pub reports: ReportingService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            engine: StockMutationEngine::new(store.clone()),
            products: ProductDirectory::new(store.clone()),
            reports: ReportingService::new(store.clone()),
            store,
            start_time: Instant::now(),
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.engine = self.engine.with_retry_policy(max_attempts, backoff);
        self
    }
}

/// Allows any origin when `allowed_origins` is empty.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::auth::ACTOR_HEADER),
            HeaderName::from_static(middleware::request_logger::REQUEST_ID_HEADER),
        ]);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_app(state: AppState) -> Router {
    use handlers::{inventory, products, reports};

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/inventory/stock-in", post(inventory::stock_in))
        .route("/api/inventory/stock-out", post(inventory::stock_out))
        .route("/api/inventory/adjustment", post(inventory::adjust))
        .route("/api/inventory/return", post(inventory::record_return))
        .route("/api/inventory/damage", post(inventory::record_damage))
        .route("/api/inventory/expiry", post(inventory::record_expiry))
        .route("/api/inventory/transfer", post(inventory::transfer))
        .route("/api/inventory/transactions", get(inventory::list_transactions))
        .route("/api/inventory/transactions/:id", get(inventory::get_transaction))
        .route("/api/inventory/stock-alerts", get(inventory::stock_alerts))
        .route("/api/inventory/dashboard", get(inventory::dashboard))
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/api/products/:id",
            get(products::get_product).delete(products::deactivate_product),
        )
        .route("/api/products/sku/:sku", get(products::get_product_by_sku))
        .route("/api/products/barcode/:barcode", get(products::get_product_by_barcode))
        .route("/api/products/:id/ledger", get(products::product_ledger))
        .route("/api/reports/inventory-summary", get(reports::inventory_summary))
        .route("/api/reports/transaction-summary", get(reports::transaction_summary))
        .route("/api/reports/low-stock-report", get(reports::low_stock_report))
        .route("/api/reports/overstock-report", get(reports::overstock_report))
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
