use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Actor;
use crate::schemas::{TransactionPage, TransactionView};
use crate::services::reporting::{Dashboard, TransactionQuery};
use crate::services::stock_engine::{AdjustmentRequest, MovementRequest, TransferRequest};
use crate::services::StockAlerts;
use crate::AppState;

type Created = (StatusCode, Json<TransactionView>);

fn created(entry: crate::domain::InventoryTransaction) -> Created {
    (StatusCode::CREATED, Json(TransactionView::from(entry)))
}

pub async fn stock_in(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<MovementRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.stock_in(actor, req).await?))
}

pub async fn stock_out(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<MovementRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.stock_out(actor, req).await?))
}

pub async fn adjust(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<AdjustmentRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.adjust(actor, req).await?))
}

pub async fn record_return(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<MovementRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.record_return(actor, req).await?))
}

pub async fn record_damage(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<MovementRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.record_damage(actor, req).await?))
}

pub async fn record_expiry(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<MovementRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.record_expiry(actor, req).await?))
}

pub async fn transfer(
    State(state): State<AppState>,
    Actor(actor): Actor,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Created, AppError> {
    let Json(req) = payload?;
    Ok(created(state.engine.transfer(actor, req).await?))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Json<TransactionPage>, AppError> {
    let Query(query) = query?;
    let (filter, paging) = query.into_filter()?;
    let page = state.reports.transactions(&filter).await?;
    Ok(Json(TransactionPage::new(page, paging.page, paging.limit)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    let entry = state.reports.transaction(id).await?;
    Ok(Json(entry.into()))
}

pub async fn stock_alerts(State(state): State<AppState>) -> Result<Json<StockAlerts>, AppError> {
    Ok(Json(state.reports.stock_alerts().await?))
}

pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.reports.dashboard().await?))
}
