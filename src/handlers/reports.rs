use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::error::AppError;
use crate::services::reporting::{
    DateRangeQuery, InventorySummary, StockReportRow, TransactionSummary,
};
use crate::AppState;

pub async fn inventory_summary(
    State(state): State<AppState>,
) -> Result<Json<InventorySummary>, AppError> {
    Ok(Json(state.reports.inventory_summary().await?))
}

pub async fn transaction_summary(
    State(state): State<AppState>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<Json<TransactionSummary>, AppError> {
    let Query(range) = query?;
    let (start, end) = range.bounds()?;
    Ok(Json(state.reports.transaction_summary(start, end).await?))
}

pub async fn low_stock_report(
    State(state): State<AppState>,
) -> Result<Json<Vec<StockReportRow>>, AppError> {
    Ok(Json(state.reports.low_stock_report().await?))
}

pub async fn overstock_report(
    State(state): State<AppState>,
) -> Result<Json<Vec<StockReportRow>>, AppError> {
    Ok(Json(state.reports.overstock_report().await?))
}
