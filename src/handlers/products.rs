use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::NewProduct;
use crate::error::AppError;
use crate::ports::{PageRequest, ProductFilter, ProductSortField, SortOrder, StockLevel};
use crate::schemas::{ProductPage, ProductView};
use crate::services::reporting::LedgerAudit;
use crate::validation::{sanitize_optional, ValidationError};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub category: Option<Uuid>,
    pub supplier: Option<Uuid>,
    pub stock_status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductQuery {
    pub fn into_filter(self) -> Result<(ProductFilter, PageRequest), ValidationError> {
        let paging = PageRequest::new(self.page, self.limit);
        let stock_level = match self.stock_status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                raw.parse::<StockLevel>()
                    .map_err(|e| ValidationError::new("stockStatus", e))?,
            ),
            None => None,
        };
        let sort_by = match self.sort_by.as_deref() {
            Some(raw) => raw
                .parse::<ProductSortField>()
                .map_err(|e| ValidationError::new("sortBy", e))?,
            None => ProductSortField::Name,
        };
        let order = match self.sort_order.as_deref() {
            Some(raw) => raw
                .parse::<SortOrder>()
                .map_err(|e| ValidationError::new("sortOrder", e))?,
            None => SortOrder::Asc,
        };

        let filter = ProductFilter {
            search: sanitize_optional(self.search),
            category_id: self.category,
            supplier_id: self.supplier,
            stock_level,
            include_inactive: self.include_inactive,
            sort_by,
            order,
            limit: paging.limit,
            offset: paging.offset(),
        };
        Ok((filter, paging))
    }
}

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductView>), AppError> {
    let Json(request) = payload?;
    let product = state.products.create(request).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Json<ProductPage>, AppError> {
    let Query(query) = query?;
    let (filter, paging) = query.into_filter()?;
    let page = state.products.list(&filter).await?;
    Ok(Json(ProductPage::new(page, paging.page, paging.limit)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductView>, AppError> {
    Ok(Json(state.products.get(id).await?.into()))
}

pub async fn get_product_by_sku(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> Result<Json<ProductView>, AppError> {
    Ok(Json(state.products.by_sku(&sku).await?.into()))
}

pub async fn get_product_by_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> Result<Json<ProductView>, AppError> {
    Ok(Json(state.products.by_barcode(&barcode).await?.into()))
}

pub async fn deactivate_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductView>, AppError> {
    Ok(Json(state.products.deactivate(id).await?.into()))
}

pub async fn product_ledger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerAudit>, AppError> {
    Ok(Json(state.reports.audit_product(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_query_builds_filter() {
        let category = Uuid::new_v4();
        let query = ProductQuery {
            page: Some(2),
            limit: Some(5),
            category: Some(category),
            stock_status: Some("high".to_string()),
            sort_by: Some("currentStock".to_string()),
            sort_order: Some("desc".to_string()),
            ..Default::default()
        };
        let (filter, paging) = query.into_filter().unwrap();
        assert_eq!(filter.category_id, Some(category));
        assert_eq!(filter.stock_level, Some(StockLevel::High));
        assert_eq!(filter.sort_by, ProductSortField::CurrentStock);
        assert_eq!(filter.order, SortOrder::Desc);
        assert_eq!(filter.offset, 5);
        assert_eq!(paging.page, 2);
    }

    #[test]
    fn product_query_rejects_unknown_values() {
        let query = ProductQuery {
            stock_status: Some("normal".to_string()),
            ..Default::default()
        };
        assert_eq!(query.into_filter().unwrap_err().field, "stockStatus");

        let query = ProductQuery {
            sort_by: Some("password".to_string()),
            ..Default::default()
        };
        assert_eq!(query.into_filter().unwrap_err().field, "sortBy");
    }
}
