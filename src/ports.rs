//! Storage ports for the ledger. Adapters live in `crate::adapters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{InventoryTransaction, Product, TransactionType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate {0}")]
    Duplicate(String),

    /// Lost a race for the product row: lock timeout, serialization failure,
    /// deadlock or a stale version. Safe to retry.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    pub fn product_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "product",
            id: id.to_string(),
        }
    }

    pub fn product_lookup_failed(key: &str, value: &str) -> Self {
        StoreError::NotFound {
            entity: "product",
            id: format!("with {} {}", key, value),
        }
    }

    pub fn transaction_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "transaction",
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// One-based page selection as it arrives from query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Clamps to `page >= 1` and `1 <= limit <= MAX_PAGE_SIZE`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    TransactionDate,
    CreatedAt,
    Quantity,
    Type,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::TransactionDate => "transaction_date",
            SortField::CreatedAt => "created_at",
            SortField::Quantity => "quantity",
            SortField::Type => "kind",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transactionDate" => Ok(SortField::TransactionDate),
            "createdAt" => Ok(SortField::CreatedAt),
            "quantity" => Ok(SortField::Quantity),
            "type" => Ok(SortField::Type),
            other => Err(format!("cannot sort by '{}'", other)),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub product_id: Option<Uuid>,
    pub kind: Option<TransactionType>,
    /// Inclusive lower bound on `transaction_date`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `transaction_date`.
    pub end: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            product_id: None,
            kind: None,
            start: None,
            end: None,
            sort_by: SortField::TransactionDate,
            order: SortOrder::Desc,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl TransactionFilter {
    pub fn matches(&self, entry: &InventoryTransaction) -> bool {
        self.product_id.map_or(true, |id| entry.product_id == id)
            && self.kind.map_or(true, |kind| entry.kind == kind)
            && self.start.map_or(true, |start| entry.transaction_date >= start)
            && self.end.map_or(true, |end| entry.transaction_date <= end)
    }
}

/// Threshold side a product listing can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockLevel {
    /// `current_stock <= min_stock_level`
    Low,
    /// `current_stock >= max_stock_level`; products without a maximum never match.
    High,
}

impl StockLevel {
    pub fn matches(&self, product: &Product) -> bool {
        match self {
            StockLevel::Low => product.current_stock <= product.min_stock_level,
            StockLevel::High => product
                .max_stock_level
                .as_ref()
                .map_or(false, |max| &product.current_stock >= max),
        }
    }
}

impl std::str::FromStr for StockLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(StockLevel::Low),
            "high" => Ok(StockLevel::High),
            other => Err(format!("unknown stock status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSortField {
    Name,
    Sku,
    CreatedAt,
    CurrentStock,
    SellingPrice,
}

impl ProductSortField {
    pub fn column(&self) -> &'static str {
        match self {
            ProductSortField::Name => "name",
            ProductSortField::Sku => "sku",
            ProductSortField::CreatedAt => "created_at",
            ProductSortField::CurrentStock => "current_stock",
            ProductSortField::SellingPrice => "selling_price",
        }
    }
}

impl std::str::FromStr for ProductSortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(ProductSortField::Name),
            "sku" => Ok(ProductSortField::Sku),
            "createdAt" => Ok(ProductSortField::CreatedAt),
            "currentStock" => Ok(ProductSortField::CurrentStock),
            "sellingPrice" => Ok(ProductSortField::SellingPrice),
            other => Err(format!("cannot sort products by '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductFilter {
    /// Case-insensitive literal match on name, SKU, barcode or description.
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub stock_level: Option<StockLevel>,
    pub include_inactive: bool,
    pub sort_by: ProductSortField,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            search: None,
            category_id: None,
            supplier_id: None,
            stock_level: None,
            include_inactive: false,
            sort_by: ProductSortField::Name,
            order: SortOrder::Asc,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.is_active {
            return false;
        }
        if self.category_id.map_or(false, |id| product.category_id != Some(id))
            || self.supplier_id.map_or(false, |id| product.supplier_id != Some(id))
            || self.stock_level.map_or(false, |level| !level.matches(product))
        {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                let hit = |field: &str| field.to_lowercase().contains(&term);
                hit(&product.name)
                    || hit(&product.sku)
                    || product.barcode.as_deref().map_or(false, hit)
                    || product.description.as_deref().map_or(false, hit)
            }
            None => true,
        }
    }
}

/// Exclusive hold on one product row, opened by [`LedgerStore::begin_mutation`].
/// Dropping the scope without committing discards everything.
#[async_trait]
pub trait MutationScope: Send {
    /// Product state as of the moment the hold was taken.
    fn product(&self) -> &Product;

    /// Appends `entry` and moves the product to `entry.new_stock` (and, for transfers,
    /// to `entry.to_location`) as a single atomic write.
    async fn commit(self: Box<Self>, entry: InventoryTransaction)
        -> StoreResult<InventoryTransaction>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> StoreResult<Product>;

    async fn get_product(&self, id: Uuid) -> StoreResult<Product>;

    /// Active product with exactly this (already normalised) SKU.
    async fn find_by_sku(&self, sku: &str) -> StoreResult<Product>;

    /// Active product carrying this barcode.
    async fn find_by_barcode(&self, barcode: &str) -> StoreResult<Product>;

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Page<Product>>;

    async fn active_products(&self) -> StoreResult<Vec<Product>>;

    async fn deactivate_product(&self, id: Uuid) -> StoreResult<Product>;

    async fn begin_mutation(&self, product_id: Uuid) -> StoreResult<Box<dyn MutationScope>>;

    async fn get_transaction(&self, id: Uuid) -> StoreResult<InventoryTransaction>;

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> StoreResult<Page<InventoryTransaction>>;

    /// Every entry for one product, oldest first.
    async fn product_transactions(&self, product_id: Uuid)
        -> StoreResult<Vec<InventoryTransaction>>;

    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_input() {
        let req = PageRequest::new(Some(0), Some(1_000));
        assert_eq!(req, PageRequest { page: 1, limit: MAX_PAGE_SIZE });
        assert_eq!(PageRequest::new(Some(3), Some(10)).offset(), 20);
        assert_eq!(PageRequest::new(None, None), PageRequest::default());
    }

    #[test]
    fn parses_sort_parameters() {
        assert_eq!("quantity".parse::<SortField>(), Ok(SortField::Quantity));
        assert_eq!("ASC".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("price".parse::<SortField>().is_err());
        assert_eq!(
            "currentStock".parse::<ProductSortField>(),
            Ok(ProductSortField::CurrentStock)
        );
        assert!("low".parse::<StockLevel>().is_ok());
        assert!("normal".parse::<StockLevel>().is_err());
    }

    #[test]
    fn product_filter_narrows_by_category_and_level() {
        let mut product = crate::domain::product::tests::new_product("F-1")
            .into_product()
            .unwrap();
        let category = Uuid::new_v4();
        product.category_id = Some(category);
        product.description = Some("Blue 100% cotton".to_string());

        let by_category = ProductFilter {
            category_id: Some(category),
            ..Default::default()
        };
        assert!(by_category.matches(&product));
        let other_supplier = ProductFilter {
            supplier_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(!other_supplier.matches(&product));

        // stock 0 against a minimum of 5, no maximum
        assert!(StockLevel::Low.matches(&product));
        assert!(!StockLevel::High.matches(&product));

        let by_description = ProductFilter {
            search: Some("100%".to_string()),
            ..Default::default()
        };
        assert!(by_description.matches(&product));
        let wildcard = ProductFilter {
            search: Some("_".to_string()),
            ..Default::default()
        };
        assert!(!wildcard.matches(&product));
    }
}
