//! In-process implementation of LedgerStore.
//!
//! Product rows and the ledger sit behind one `RwLock`, so a commit publishes the
//! new entry and the new balance together. Mutations additionally hold a per-product
//! mutex for the whole read-validate-commit sequence. A product's mutex only lives in
//! the lock table while someone holds or waits for it.

use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::domain::{InventoryTransaction, Product, TransactionType};
use crate::ports::{
    LedgerStore, MutationScope, Page, ProductFilter, ProductSortField, SortField, SortOrder,
    StoreError, StoreResult, TransactionFilter,
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    transactions: Vec<InventoryTransaction>,
}

type RowLocks = HashMap<Uuid, Arc<Mutex<()>>>;

struct Inner {
    state: RwLock<State>,
    row_locks: SyncMutex<RowLocks>,
    lock_timeout: Duration,
}

impl Inner {
    fn row_locks(&self) -> MutexGuard<'_, RowLocks> {
        self.row_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops the table entry once nobody holds or waits for it.
    fn release_row_lock(&self, product_id: Uuid) {
        let mut locks = self.row_locks();
        if locks
            .get(&product_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&product_id);
        }
    }
}

/// Memory-backed ledger store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                row_locks: SyncMutex::new(HashMap::new()),
                lock_timeout,
            }),
        }
    }

    fn row_lock(&self, product_id: Uuid) -> Arc<Mutex<()>> {
        self.inner.row_locks().entry(product_id).or_default().clone()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

fn paginate<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
    items.iter().skip(offset).take(limit).cloned().collect()
}

fn compare_products(a: &Product, b: &Product, sort_by: ProductSortField) -> Ordering {
    let primary = match sort_by {
        ProductSortField::Name => a.name.cmp(&b.name),
        ProductSortField::Sku => a.sku.cmp(&b.sku),
        ProductSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        ProductSortField::CurrentStock => a
            .current_stock
            .partial_cmp(&b.current_stock)
            .unwrap_or(Ordering::Equal),
        ProductSortField::SellingPrice => a
            .selling_price
            .partial_cmp(&b.selling_price)
            .unwrap_or(Ordering::Equal),
    };
    primary.then_with(|| a.sku.cmp(&b.sku))
}

fn compare_entries(
    a: &InventoryTransaction,
    b: &InventoryTransaction,
    sort_by: SortField,
) -> Ordering {
    let primary = match sort_by {
        SortField::TransactionDate => a.transaction_date.cmp(&b.transaction_date),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Quantity => a
            .quantity
            .partial_cmp(&b.quantity)
            .unwrap_or(Ordering::Equal),
        SortField::Type => a.kind.as_str().cmp(b.kind.as_str()),
    };
    primary.then_with(|| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let mut state = self.inner.state.write().await;

        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Duplicate(format!("sku {}", product.sku)));
        }
        if let Some(barcode) = &product.barcode {
            if state
                .products
                .values()
                .any(|p| p.barcode.as_ref() == Some(barcode))
            {
                return Err(StoreError::Duplicate(format!("barcode {}", barcode)));
            }
        }

        state.products.insert(product.id, product.clone());
        Ok(product.clone())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        self.inner
            .state
            .read()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::product_not_found(id))
    }

    async fn find_by_sku(&self, sku: &str) -> StoreResult<Product> {
        self.inner
            .state
            .read()
            .await
            .products
            .values()
            .find(|p| p.is_active && p.sku == sku)
            .cloned()
            .ok_or_else(|| StoreError::product_lookup_failed("sku", sku))
    }

    async fn find_by_barcode(&self, barcode: &str) -> StoreResult<Product> {
        self.inner
            .state
            .read()
            .await
            .products
            .values()
            .find(|p| p.is_active && p.barcode.as_deref() == Some(barcode))
            .cloned()
            .ok_or_else(|| StoreError::product_lookup_failed("barcode", barcode))
    }

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Page<Product>> {
        let state = self.inner.state.read().await;
        let mut matching: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            let ordering = compare_products(a, b, filter.sort_by);
            match filter.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(Page {
            total: matching.len() as i64,
            items: paginate(&matching, filter.limit, filter.offset),
        })
    }

    async fn active_products(&self) -> StoreResult<Vec<Product>> {
        let state = self.inner.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn deactivate_product(&self, id: Uuid) -> StoreResult<Product> {
        let mut state = self.inner.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::product_not_found(id))?;
        product.is_active = false;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn begin_mutation(&self, product_id: Uuid) -> StoreResult<Box<dyn MutationScope>> {
        // Unknown ids never get a table entry.
        self.get_product(product_id).await?;

        let lock = self.row_lock(product_id);
        let acquired = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned()).await;
        let guard = match acquired {
            Ok(guard) => guard,
            Err(_) => {
                self.inner.release_row_lock(product_id);
                return Err(StoreError::Conflict(format!(
                    "timed out waiting for product {}",
                    product_id
                )));
            }
        };

        let product = match self.get_product(product_id).await {
            Ok(product) => product,
            Err(e) => {
                drop(guard);
                self.inner.release_row_lock(product_id);
                return Err(e);
            }
        };

        Ok(Box::new(MemoryMutationScope {
            inner: self.inner.clone(),
            product,
            guard: Some(guard),
        }))
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<InventoryTransaction> {
        self.inner
            .state
            .read()
            .await
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::transaction_not_found(id))
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> StoreResult<Page<InventoryTransaction>> {
        let state = self.inner.state.read().await;
        let mut matching: Vec<InventoryTransaction> = state
            .transactions
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare_entries(a, b, filter.sort_by);
            match filter.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(Page {
            total: matching.len() as i64,
            items: paginate(&matching, filter.limit, filter.offset),
        })
    }

    async fn product_transactions(
        &self,
        product_id: Uuid,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        let state = self.inner.state.read().await;
        // The log is append-only in commit order, which is the serialized order.
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct MemoryMutationScope {
    inner: Arc<Inner>,
    product: Product,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MemoryMutationScope {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.inner.release_row_lock(self.product.id);
    }
}

#[async_trait]
impl MutationScope for MemoryMutationScope {
    fn product(&self) -> &Product {
        &self.product
    }

    async fn commit(
        self: Box<Self>,
        entry: InventoryTransaction,
    ) -> StoreResult<InventoryTransaction> {
        let mut state = self.inner.state.write().await;

        let current = state
            .products
            .get_mut(&self.product.id)
            .ok_or_else(|| StoreError::product_not_found(self.product.id))?;
        if current.version != self.product.version {
            return Err(StoreError::Conflict(format!(
                "product {} changed from version {} to {}",
                current.id, self.product.version, current.version
            )));
        }

        current.current_stock = entry.new_stock.clone();
        if entry.kind == TransactionType::Transfer {
            if let Some(destination) = &entry.to_location {
                current.location = destination.clone();
            }
        }
        current.version += 1;
        current.updated_at = Utc::now();

        state.transactions.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::tests::new_product;
    use crate::domain::EntryDetails;
    use bigdecimal::BigDecimal;

    fn details() -> EntryDetails {
        EntryDetails {
            performed_by: Uuid::new_v4(),
            reason: "test".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_sku() {
        let store = MemoryLedgerStore::default();
        let product = new_product("DUP").into_product().unwrap();
        store.insert_product(&product).await.unwrap();

        let again = new_product("dup").into_product().unwrap();
        let err = store.insert_product(&again).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn commit_publishes_entry_and_balance_together() {
        let store = MemoryLedgerStore::default();
        let product = new_product("A").into_product().unwrap();
        store.insert_product(&product).await.unwrap();

        let scope = store.begin_mutation(product.id).await.unwrap();
        let entry =
            InventoryTransaction::stock_in(scope.product(), BigDecimal::from(4), None, details());
        let committed = scope.commit(entry).await.unwrap();

        let stored = store.get_product(product.id).await.unwrap();
        assert_eq!(stored.current_stock, committed.new_stock);
        assert_eq!(stored.version, 1);
        assert_eq!(store.get_transaction(committed.id).await.unwrap(), committed);
    }

    #[tokio::test]
    async fn dropped_scope_leaves_no_trace() {
        let store = MemoryLedgerStore::default();
        let product = new_product("A").into_product().unwrap();
        store.insert_product(&product).await.unwrap();

        {
            let _scope = store.begin_mutation(product.id).await.unwrap();
        }

        let stored = store.get_product(product.id).await.unwrap();
        assert_eq!(stored.version, 0);
        assert!(store
            .product_transactions(product.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn second_scope_times_out_as_conflict() {
        let store = MemoryLedgerStore::new(Duration::from_millis(20));
        let product = new_product("A").into_product().unwrap();
        store.insert_product(&product).await.unwrap();

        let _held = store.begin_mutation(product.id).await.unwrap();
        let err = store.begin_mutation(product.id).await.err().unwrap();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let store = MemoryLedgerStore::default();
        for _ in 0..50 {
            let err = store.begin_mutation(Uuid::new_v4()).await.err().unwrap();
            assert!(matches!(err, StoreError::NotFound { .. }));
        }
        assert_eq!(store.inner.row_locks().len(), 0);
    }

    #[tokio::test]
    async fn lock_table_empties_once_scopes_end() {
        let store = MemoryLedgerStore::new(Duration::from_millis(20));
        let product = new_product("A").into_product().unwrap();
        store.insert_product(&product).await.unwrap();

        let held = store.begin_mutation(product.id).await.unwrap();
        assert_eq!(store.inner.row_locks().len(), 1);
        assert!(store.begin_mutation(product.id).await.is_err());
        assert_eq!(store.inner.row_locks().len(), 1);
        drop(held);
        assert_eq!(store.inner.row_locks().len(), 0);

        let scope = store.begin_mutation(product.id).await.unwrap();
        let entry =
            InventoryTransaction::stock_in(scope.product(), BigDecimal::from(1), None, details());
        scope.commit(entry).await.unwrap();
        assert_eq!(store.inner.row_locks().len(), 0);
    }

    #[tokio::test]
    async fn lists_and_filters_products() {
        let store = MemoryLedgerStore::default();
        let first = new_product("AAA").into_product().unwrap();
        let second = new_product("BBB").into_product().unwrap();
        store.insert_product(&first).await.unwrap();
        store.insert_product(&second).await.unwrap();
        store.deactivate_product(second.id).await.unwrap();

        let page = store.list_products(&ProductFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].sku, "AAA");

        let filter = ProductFilter {
            include_inactive: true,
            search: Some("bb".to_string()),
            ..Default::default()
        };
        let page = store.list_products(&filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(!page.items[0].is_active);
    }

    #[tokio::test]
    async fn finds_active_products_by_sku_and_barcode() {
        let store = MemoryLedgerStore::default();
        let mut input = new_product("scan-1");
        input.barcode = Some("4006381333931".to_string());
        let product = input.into_product().unwrap();
        store.insert_product(&product).await.unwrap();

        assert_eq!(store.find_by_sku("SCAN-1").await.unwrap().id, product.id);
        assert_eq!(
            store.find_by_barcode("4006381333931").await.unwrap().id,
            product.id
        );
        assert!(matches!(
            store.find_by_barcode("0000").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));

        store.deactivate_product(product.id).await.unwrap();
        assert!(store.find_by_sku("SCAN-1").await.is_err());
        assert!(store.find_by_barcode("4006381333931").await.is_err());
    }

    #[tokio::test]
    async fn sorts_and_narrows_product_listing() {
        let store = MemoryLedgerStore::default();
        let supplier = Uuid::new_v4();
        for (sku, price) in [("P-1", 9), ("P-2", 3), ("P-3", 6)] {
            let mut input = new_product(sku);
            input.selling_price = BigDecimal::from(price);
            if sku != "P-3" {
                input.supplier_id = Some(supplier);
            }
            store.insert_product(&input.into_product().unwrap()).await.unwrap();
        }

        let filter = ProductFilter {
            sort_by: ProductSortField::SellingPrice,
            order: SortOrder::Desc,
            ..Default::default()
        };
        let skus: Vec<String> = store
            .list_products(&filter)
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(skus, vec!["P-1", "P-3", "P-2"]);

        let filter = ProductFilter {
            supplier_id: Some(supplier),
            stock_level: Some(crate::ports::StockLevel::Low),
            ..Default::default()
        };
        assert_eq!(store.list_products(&filter).await.unwrap().total, 2);

        let filter = ProductFilter {
            stock_level: Some(crate::ports::StockLevel::High),
            ..Default::default()
        };
        assert_eq!(store.list_products(&filter).await.unwrap().total, 0);
    }
}
