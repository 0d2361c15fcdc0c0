use std::sync::Arc;
use uuid::Uuid;

use crate::domain::product::normalize_sku;
use crate::domain::{NewProduct, Product};
use crate::validation::sanitize_string;
use crate::ports::{LedgerStore, Page, ProductFilter};
use crate::services::stock_engine::LedgerError;

/// Product registration and lookup. Stock balances are never written here.
#[derive(Clone)]
pub struct ProductDirectory {
    store: Arc<dyn LedgerStore>,
}

impl ProductDirectory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, request: NewProduct) -> Result<Product, LedgerError> {
        let product = request.into_product()?;
        let created = self.store.insert_product(&product).await?;
        tracing::info!(product_id = %created.id, sku = %created.sku, "Product registered");
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, LedgerError> {
        Ok(self.store.get_product(id).await?)
    }

    /// Looks up an active product by SKU, normalised the way SKUs are stored.
    pub async fn by_sku(&self, sku: &str) -> Result<Product, LedgerError> {
        Ok(self.store.find_by_sku(&normalize_sku(sku)).await?)
    }

    pub async fn by_barcode(&self, barcode: &str) -> Result<Product, LedgerError> {
        Ok(self.store.find_by_barcode(&sanitize_string(barcode)).await?)
    }

    pub async fn list(&self, filter: &ProductFilter) -> Result<Page<Product>, LedgerError> {
        Ok(self.store.list_products(filter).await?)
    }

    /// Soft delete. The ledger for the product stays readable.
    pub async fn deactivate(&self, id: Uuid) -> Result<Product, LedgerError> {
        let product = self.store.deactivate_product(id).await?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "Product deactivated");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryLedgerStore;
    use crate::domain::product::tests::new_product;
    use bigdecimal::BigDecimal;

    fn directory() -> ProductDirectory {
        ProductDirectory::new(Arc::new(MemoryLedgerStore::default()))
    }

    #[tokio::test]
    async fn create_starts_at_zero_stock() {
        let products = directory();
        let created = products.create(new_product(" abc-1 ")).await.unwrap();

        assert_eq!(created.sku, "ABC-1");
        assert_eq!(created.current_stock, BigDecimal::from(0));
        assert_eq!(products.get(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn duplicate_sku_is_rejected() {
        let products = directory();
        products.create(new_product("ABC")).await.unwrap();

        let err = products.create(new_product("abc")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
    }

    #[tokio::test]
    async fn deactivated_products_drop_out_of_default_listing() {
        let products = directory();
        let kept = products.create(new_product("KEEP")).await.unwrap();
        let gone = products.create(new_product("GONE")).await.unwrap();

        let deactivated = products.deactivate(gone.id).await.unwrap();
        assert!(!deactivated.is_active);

        let page = products.list(&ProductFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, kept.id);
    }

    #[tokio::test]
    async fn looks_up_by_sku_in_any_case() {
        let products = directory();
        let mut input = new_product("wid-9");
        input.barcode = Some("5012345678900".to_string());
        let created = products.create(input).await.unwrap();

        assert_eq!(products.by_sku(" wid-9 ").await.unwrap().id, created.id);
        assert_eq!(products.by_barcode("5012345678900").await.unwrap().id, created.id);

        let err = products.by_sku("wid-10").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let err = directory().get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
