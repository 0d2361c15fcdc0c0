//! Postgres implementation of LedgerStore.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{InventoryTransaction, Location, Product, TransactionType};
use crate::ports::{
    LedgerStore, MutationScope, Page, ProductFilter, StockLevel, StoreError, StoreResult,
    TransactionFilter,
};

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps driver errors onto the port's taxonomy. Lock timeouts, serialization
/// failures and deadlocks are retryable conflicts.
fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::Duplicate(db_err.message().to_string()),
            Some("40001") | Some("40P01") | Some("55P03") => {
                return StoreError::Conflict(db_err.message().to_string())
            }
            _ => {}
        }
    }
    StoreError::Backend(err)
}

fn push_transaction_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    let mut separator = " WHERE ";
    if let Some(product_id) = filter.product_id {
        qb.push(separator).push("product_id = ").push_bind(product_id);
        separator = " AND ";
    }
    if let Some(kind) = filter.kind {
        qb.push(separator).push("kind = ").push_bind(kind.as_str());
        separator = " AND ";
    }
    if let Some(start) = filter.start {
        qb.push(separator).push("transaction_date >= ").push_bind(start);
        separator = " AND ";
    }
    if let Some(end) = filter.end {
        qb.push(separator).push("transaction_date <= ").push_bind(end);
    }
}

/// Escapes LIKE metacharacters so the term matches literally under `ESCAPE '\'`.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    let mut separator = " WHERE ";
    if !filter.include_inactive {
        qb.push(separator).push("is_active = TRUE");
        separator = " AND ";
    }
    if let Some(category_id) = filter.category_id {
        qb.push(separator).push("category_id = ").push_bind(category_id);
        separator = " AND ";
    }
    if let Some(supplier_id) = filter.supplier_id {
        qb.push(separator).push("supplier_id = ").push_bind(supplier_id);
        separator = " AND ";
    }
    match filter.stock_level {
        Some(StockLevel::Low) => {
            qb.push(separator).push("current_stock <= min_stock_level");
            separator = " AND ";
        }
        Some(StockLevel::High) => {
            qb.push(separator)
                .push("max_stock_level IS NOT NULL AND current_stock >= max_stock_level");
            separator = " AND ";
        }
        None => {}
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        qb.push(separator).push("(");
        for (i, column) in ["name", "sku", "barcode", "description"].iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column)
                .push(" ILIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, description, category_id, supplier_id, unit,
                cost_price, selling_price, current_stock, min_stock_level, max_stock_level,
                location, tags, is_active, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.category_id)
        .bind(product.supplier_id)
        .bind(product.unit.as_str())
        .bind(&product.cost_price)
        .bind(&product.selling_price)
        .bind(&product.current_stock)
        .bind(&product.min_stock_level)
        .bind(&product.max_stock_level)
        .bind(Json(&product.location))
        .bind(&product.tags)
        .bind(product.is_active)
        .bind(product.version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        row.into_domain()
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.ok_or_else(|| StoreError::product_not_found(id))?
            .into_domain()
    }

    async fn find_by_sku(&self, sku: &str) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE sku = $1 AND is_active = TRUE",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.ok_or_else(|| StoreError::product_lookup_failed("sku", sku))?
            .into_domain()
    }

    async fn find_by_barcode(&self, barcode: &str) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE barcode = $1 AND is_active = TRUE",
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.ok_or_else(|| StoreError::product_lookup_failed("barcode", barcode))?
            .into_domain()
    }

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM products");
        push_product_filters(&mut select, filter);
        select
            .push(" ORDER BY ")
            .push(filter.sort_by.column())
            .push(" ")
            .push(filter.order.keyword())
            .push(", sku ASC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let rows: Vec<ProductRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(ProductRow::into_domain)
                .collect::<StoreResult<_>>()?,
            total,
        })
    }

    async fn active_products(&self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE is_active = TRUE ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.into_iter().map(ProductRow::into_domain).collect()
    }

    async fn deactivate_product(&self, id: Uuid) -> StoreResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.ok_or_else(|| StoreError::product_not_found(id))?
            .into_domain()
    }

    async fn begin_mutation(&self, product_id: Uuid) -> StoreResult<Box<dyn MutationScope>> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // SET does not take bind parameters; the value is a plain integer.
        let set_timeout = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        let product = row
            .ok_or_else(|| StoreError::product_not_found(product_id))?
            .into_domain()?;

        Ok(Box::new(PgMutationScope { tx, product }))
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<InventoryTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM inventory_transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.ok_or_else(|| StoreError::transaction_not_found(id))?
            .into_domain()
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> StoreResult<Page<InventoryTransaction>> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM inventory_transactions");
        push_transaction_filters(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let order = filter.order.keyword();
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM inventory_transactions");
        push_transaction_filters(&mut select, filter);
        select
            .push(" ORDER BY ")
            .push(filter.sort_by.column())
            .push(" ")
            .push(order)
            .push(", created_at ")
            .push(order)
            .push(" LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let rows: Vec<TransactionRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(TransactionRow::into_domain)
                .collect::<StoreResult<_>>()?,
            total,
        })
    }

    async fn product_transactions(
        &self,
        product_id: Uuid,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM inventory_transactions
            WHERE product_id = $1
            ORDER BY transaction_date ASC, created_at ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// Open database transaction holding `FOR UPDATE` on one product row.
struct PgMutationScope {
    tx: Transaction<'static, Postgres>,
    product: Product,
}

#[async_trait]
impl MutationScope for PgMutationScope {
    fn product(&self) -> &Product {
        &self.product
    }

    async fn commit(
        self: Box<Self>,
        entry: InventoryTransaction,
    ) -> StoreResult<InventoryTransaction> {
        let PgMutationScope { mut tx, product } = *self;

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO inventory_transactions (
                id, product_id, kind, quantity, previous_stock, new_stock, unit_price, total_value,
                reference, reference_number, from_location, to_location, reason, notes,
                performed_by, approved_by, status, transaction_date, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(entry.product_id)
        .bind(entry.kind.as_str())
        .bind(&entry.quantity)
        .bind(&entry.previous_stock)
        .bind(&entry.new_stock)
        .bind(&entry.unit_price)
        .bind(&entry.total_value)
        .bind(&entry.reference)
        .bind(&entry.reference_number)
        .bind(entry.from_location.as_ref().map(Json))
        .bind(entry.to_location.as_ref().map(Json))
        .bind(&entry.reason)
        .bind(&entry.notes)
        .bind(entry.performed_by)
        .bind(entry.approved_by)
        .bind(entry.status.as_str())
        .bind(entry.transaction_date)
        .bind(entry.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let relocation = match entry.kind {
            TransactionType::Transfer => entry.to_location.as_ref().map(Json),
            _ => None,
        };
        let updated = sqlx::query(
            r#"
            UPDATE products
            SET current_stock = $1,
                location = COALESCE($2, location),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(&entry.new_stock)
        .bind(relocation)
        .bind(product.id)
        .bind(product.version)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        // Dropping `tx` on these early returns rolls back the ledger insert.
        if updated.rows_affected() != 1 {
            return Err(StoreError::Conflict(format!(
                "product {} moved past version {}",
                product.id, product.version
            )));
        }

        tx.commit().await.map_err(classify)?;
        row.into_domain()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    barcode: Option<String>,
    name: String,
    description: Option<String>,
    category_id: Option<Uuid>,
    supplier_id: Option<Uuid>,
    unit: String,
    cost_price: BigDecimal,
    selling_price: BigDecimal,
    current_stock: BigDecimal,
    min_stock_level: BigDecimal,
    max_stock_level: Option<BigDecimal>,
    location: Json<Location>,
    tags: Vec<String>,
    is_active: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_domain(self) -> StoreResult<Product> {
        let unit = self
            .unit
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("product {}: {}", self.id, e)))?;

        Ok(Product {
            id: self.id,
            sku: self.sku,
            barcode: self.barcode,
            name: self.name,
            description: self.description,
            category_id: self.category_id,
            supplier_id: self.supplier_id,
            unit,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            current_stock: self.current_stock,
            min_stock_level: self.min_stock_level,
            max_stock_level: self.max_stock_level,
            location: self.location.0,
            tags: self.tags,
            is_active: self.is_active,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    product_id: Uuid,
    kind: String,
    quantity: BigDecimal,
    previous_stock: BigDecimal,
    new_stock: BigDecimal,
    unit_price: Option<BigDecimal>,
    total_value: Option<BigDecimal>,
    reference: Option<String>,
    reference_number: Option<String>,
    from_location: Option<Json<Location>>,
    to_location: Option<Json<Location>>,
    reason: String,
    notes: Option<String>,
    performed_by: Uuid,
    approved_by: Option<Uuid>,
    status: String,
    transaction_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<InventoryTransaction> {
        let id = self.id;
        let corrupt = move |e: String| StoreError::Corrupt(format!("transaction {}: {}", id, e));
        let kind = self.kind.parse().map_err(corrupt)?;
        let status = self.status.parse().map_err(corrupt)?;

        Ok(InventoryTransaction {
            id: self.id,
            product_id: self.product_id,
            kind,
            quantity: self.quantity,
            previous_stock: self.previous_stock,
            new_stock: self.new_stock,
            unit_price: self.unit_price,
            total_value: self.total_value,
            reference: self.reference,
            reference_number: self.reference_number,
            from_location: self.from_location.map(|l| l.0),
            to_location: self.to_location.map(|l| l.0),
            reason: self.reason,
            notes: self.notes,
            performed_by: self.performed_by,
            approved_by: self.approved_by,
            status,
            transaction_date: self.transaction_date,
            created_at: self.created_at,
        })
    }
}
