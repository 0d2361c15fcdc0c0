pub mod inventory;
pub mod products;
pub mod reports;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::health::{check_health, StoreChecker};
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = StoreChecker::new(state.store.clone());
    let response = check_health(&[&store], state.start_time).await;

    // 503 when the ledger store is unreachable
    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
