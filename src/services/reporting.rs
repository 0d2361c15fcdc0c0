//! Read-side aggregation over products and the transaction log.
//!
//! Nothing here takes a mutation scope, so results may trail in-flight writes.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{money, InventoryTransaction, Product, TransactionType};
use crate::ports::{LedgerStore, Page, PageRequest, SortField, SortOrder, TransactionFilter};
use crate::schemas::TransactionView;
use crate::services::alerts::{self, StockAlerts};
use crate::services::stock_engine::LedgerError;
use crate::validation::ValidationError;

pub const RECENT_TRANSACTIONS: i64 = 10;

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain end date covers
/// the whole day, up to 23:59:59.999.
pub fn parse_date_bound(
    field: &'static str,
    raw: &str,
    end_of_day: bool,
) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::new(field, format!("'{}' is not a valid date", raw)))?;
    let naive = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| ValidationError::new(field, "date out of range"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Query string of the transaction listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(alias = "product")]
    pub product_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl TransactionQuery {
    pub fn into_filter(self) -> Result<(TransactionFilter, PageRequest), ValidationError> {
        let paging = PageRequest::new(self.page, self.limit);

        let kind = match self.kind.as_deref().filter(|k| !k.is_empty()) {
            Some(raw) => Some(
                raw.parse::<TransactionType>()
                    .map_err(|e| ValidationError::new("type", e))?,
            ),
            None => None,
        };
        let start = self
            .start_date
            .as_deref()
            .map(|raw| parse_date_bound("startDate", raw, false))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|raw| parse_date_bound("endDate", raw, true))
            .transpose()?;
        let sort_by = match self.sort_by.as_deref() {
            Some(raw) => raw
                .parse::<SortField>()
                .map_err(|e| ValidationError::new("sortBy", e))?,
            None => SortField::TransactionDate,
        };
        let order = match self.sort_order.as_deref() {
            Some(raw) => raw
                .parse::<SortOrder>()
                .map_err(|e| ValidationError::new("sortOrder", e))?,
            None => SortOrder::Desc,
        };

        let filter = TransactionFilter {
            product_id: self.product_id,
            kind,
            start,
            end,
            sort_by,
            order,
            limit: paging.limit,
            offset: paging.offset(),
        };
        Ok((filter, paging))
    }
}

/// Query string of the transaction summary; both bounds are mandatory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
        let (Some(start), Some(end)) = (self.start_date.as_deref(), self.end_date.as_deref())
        else {
            return Err(ValidationError::new(
                "startDate",
                "startDate and endDate are required",
            ));
        };
        let start = parse_date_bound("startDate", start, false)?;
        let end = parse_date_bound("endDate", end, true)?;
        if end < start {
            return Err(ValidationError::new("endDate", "endDate is before startDate"));
        }
        Ok((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueBreakdown {
    pub count: i64,
    pub value: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementBreakdown {
    pub count: i64,
    pub quantity: BigDecimal,
    pub value: BigDecimal,
}

impl Default for MovementBreakdown {
    fn default() -> Self {
        Self {
            count: 0,
            quantity: BigDecimal::from(0),
            value: BigDecimal::from(0),
        }
    }
}

impl MovementBreakdown {
    fn add(&mut self, entry: &InventoryTransaction) {
        self.count += 1;
        self.quantity += &entry.quantity;
        if let Some(value) = &entry.total_value {
            self.value += value;
        }
    }

    fn rounded(mut self) -> Self {
        self.value = money(&self.value);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_products: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub total_value: BigDecimal,
    pub recent_transactions: Vec<TransactionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_products: i64,
    pub total_value: BigDecimal,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub category_breakdown: BTreeMap<String, ValueBreakdown>,
    pub supplier_breakdown: BTreeMap<String, ValueBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub total_transactions: i64,
    pub total_in: BigDecimal,
    pub total_out: BigDecimal,
    pub total_value: BigDecimal,
    pub type_breakdown: BTreeMap<String, MovementBreakdown>,
    /// Keyed by UTC calendar day, `YYYY-MM-DD`.
    pub daily_breakdown: BTreeMap<String, MovementBreakdown>,
}

/// One line of the low-stock and over-stock reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReportRow {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub current_stock: BigDecimal,
    pub min_stock_level: BigDecimal,
    pub max_stock_level: Option<BigDecimal>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub cost_price: BigDecimal,
    pub selling_price: BigDecimal,
    pub stock_value: BigDecimal,
}

impl From<&Product> for StockReportRow {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            barcode: product.barcode.clone(),
            current_stock: product.current_stock.clone(),
            min_stock_level: product.min_stock_level.clone(),
            max_stock_level: product.max_stock_level.clone(),
            category_id: product.category_id,
            supplier_id: product.supplier_id,
            cost_price: product.cost_price.clone(),
            selling_price: product.selling_price.clone(),
            stock_value: money(&product.stock_value()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerViolation {
    pub transaction_id: Uuid,
    pub message: String,
}

/// Result of replaying one product's ledger from a zero balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    pub product_id: Uuid,
    pub replayed_stock: BigDecimal,
    pub current_stock: BigDecimal,
    pub consistent: bool,
    pub entries: usize,
    pub violations: Vec<LedgerViolation>,
}

fn total_stock_value<'a>(products: impl IntoIterator<Item = &'a Product>) -> BigDecimal {
    products
        .into_iter()
        .fold(BigDecimal::from(0), |acc, p| acc + p.stock_value())
}

fn add_value(map: &mut BTreeMap<String, ValueBreakdown>, key: Uuid, value: &BigDecimal) {
    let slot = map.entry(key.to_string()).or_insert_with(|| ValueBreakdown {
        count: 0,
        value: BigDecimal::from(0),
    });
    slot.count += 1;
    slot.value += value;
}

pub fn summarize_inventory(products: &[Product]) -> InventorySummary {
    let mut category_breakdown = BTreeMap::new();
    let mut supplier_breakdown = BTreeMap::new();
    let mut low_stock_count = 0;
    let mut out_of_stock_count = 0;

    for product in products {
        let value = product.stock_value();
        if alerts::is_low_stock(product) {
            low_stock_count += 1;
        }
        if product.is_out_of_stock() {
            out_of_stock_count += 1;
        }
        if let Some(category) = product.category_id {
            add_value(&mut category_breakdown, category, &value);
        }
        if let Some(supplier) = product.supplier_id {
            add_value(&mut supplier_breakdown, supplier, &value);
        }
    }

    for breakdown in category_breakdown
        .values_mut()
        .chain(supplier_breakdown.values_mut())
    {
        breakdown.value = money(&breakdown.value);
    }

    InventorySummary {
        total_products: products.len() as i64,
        total_value: money(&total_stock_value(products)),
        low_stock_count,
        out_of_stock_count,
        category_breakdown,
        supplier_breakdown,
    }
}

pub fn summarize_transactions(entries: &[InventoryTransaction]) -> TransactionSummary {
    let mut total_in = BigDecimal::from(0);
    let mut total_out = BigDecimal::from(0);
    let mut total_value = BigDecimal::from(0);
    let mut type_breakdown: BTreeMap<String, MovementBreakdown> = BTreeMap::new();
    let mut daily_breakdown: BTreeMap<String, MovementBreakdown> = BTreeMap::new();

    for entry in entries {
        match entry.kind {
            TransactionType::In => total_in += &entry.quantity,
            TransactionType::Out => total_out += &entry.quantity,
            _ => {}
        }
        if let Some(value) = &entry.total_value {
            total_value += value;
        }
        type_breakdown
            .entry(entry.kind.as_str().to_string())
            .or_default()
            .add(entry);
        daily_breakdown
            .entry(entry.transaction_date.format("%Y-%m-%d").to_string())
            .or_default()
            .add(entry);
    }

    TransactionSummary {
        total_transactions: entries.len() as i64,
        total_in,
        total_out,
        total_value: money(&total_value),
        type_breakdown: type_breakdown
            .into_iter()
            .map(|(k, v)| (k, v.rounded()))
            .collect(),
        daily_breakdown: daily_breakdown
            .into_iter()
            .map(|(k, v)| (k, v.rounded()))
            .collect(),
    }
}

/// Replays `entries` (oldest first) from zero and checks every snapshot pair.
pub fn audit_ledger(product: &Product, entries: &[InventoryTransaction]) -> LedgerAudit {
    let mut replayed = BigDecimal::from(0);
    let mut violations = Vec::new();

    for entry in entries {
        if entry.product_id != product.id {
            violations.push(LedgerViolation {
                transaction_id: entry.id,
                message: format!("entry belongs to product {}", entry.product_id),
            });
            continue;
        }
        if entry.previous_stock != replayed {
            violations.push(LedgerViolation {
                transaction_id: entry.id,
                message: format!(
                    "previous stock {} does not follow running balance {}",
                    entry.previous_stock, replayed
                ),
            });
        }
        if let Err(message) = entry.check_consistency() {
            violations.push(LedgerViolation {
                transaction_id: entry.id,
                message,
            });
        }
        replayed += entry.applied_delta();
    }

    let consistent = violations.is_empty() && replayed == product.current_stock;
    LedgerAudit {
        product_id: product.id,
        replayed_stock: replayed,
        current_stock: product.current_stock.clone(),
        consistent,
        entries: entries.len(),
        violations,
    }
}

#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn LedgerStore>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Page<InventoryTransaction>, LedgerError> {
        Ok(self.store.list_transactions(filter).await?)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<InventoryTransaction, LedgerError> {
        Ok(self.store.get_transaction(id).await?)
    }

    pub async fn stock_alerts(&self) -> Result<StockAlerts, LedgerError> {
        alerts::stock_alerts(self.store.as_ref()).await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, LedgerError> {
        let products = self.store.active_products().await?;
        let recent = self
            .store
            .list_transactions(&TransactionFilter {
                limit: RECENT_TRANSACTIONS,
                ..Default::default()
            })
            .await?;
        let summary = summarize_inventory(&products);

        Ok(Dashboard {
            total_products: summary.total_products,
            low_stock_count: summary.low_stock_count,
            out_of_stock_count: summary.out_of_stock_count,
            total_value: summary.total_value,
            recent_transactions: recent.items.into_iter().map(TransactionView::from).collect(),
        })
    }

    pub async fn inventory_summary(&self) -> Result<InventorySummary, LedgerError> {
        let products = self.store.active_products().await?;
        Ok(summarize_inventory(&products))
    }

    pub async fn transaction_summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TransactionSummary, LedgerError> {
        let filter = TransactionFilter {
            start: Some(start),
            end: Some(end),
            order: SortOrder::Asc,
            limit: i64::MAX,
            ..Default::default()
        };
        let page = self.store.list_transactions(&filter).await?;
        Ok(summarize_transactions(&page.items))
    }

    pub async fn low_stock_report(&self) -> Result<Vec<StockReportRow>, LedgerError> {
        let products = self.store.active_products().await?;
        Ok(products
            .iter()
            .filter(|p| alerts::is_low_stock(p))
            .map(StockReportRow::from)
            .collect())
    }

    pub async fn overstock_report(&self) -> Result<Vec<StockReportRow>, LedgerError> {
        let products = self.store.active_products().await?;
        Ok(products
            .iter()
            .filter(|p| alerts::is_over_stock(p))
            .map(StockReportRow::from)
            .collect())
    }

    pub async fn audit_product(&self, product_id: Uuid) -> Result<LedgerAudit, LedgerError> {
        let product = self.store.get_product(product_id).await?;
        let entries = self.store.product_transactions(product_id).await?;
        let audit = audit_ledger(&product, &entries);
        if !audit.consistent {
            tracing::warn!(
                product_id = %product_id,
                replayed = %audit.replayed_stock,
                current = %audit.current_stock,
                violations = audit.violations.len(),
                "Ledger does not reproduce the current balance"
            );
        }
        Ok(audit)
    }
}
