//! Response shapes that add derived fields on top of the stored records.

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::domain::{InventoryTransaction, Product, StockStatus};
use crate::ports::Page;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub profit_margin: Option<BigDecimal>,
    pub stock_status: StockStatus,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            profit_margin: product.profit_margin(),
            stock_status: product.stock_status(),
            product,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: InventoryTransaction,
    pub stock_impact: BigDecimal,
}

impl From<InventoryTransaction> for TransactionView {
    fn from(transaction: InventoryTransaction) -> Self {
        Self {
            stock_impact: transaction.stock_impact(),
            transaction,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_products: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<TransactionView>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_transactions: i64,
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

impl ProductPage {
    pub fn new(page: Page<Product>, current_page: i64, limit: i64) -> Self {
        Self {
            total_pages: total_pages(page.total, limit),
            current_page,
            total_products: page.total,
            products: page.items.into_iter().map(ProductView::from).collect(),
        }
    }
}

impl TransactionPage {
    pub fn new(page: Page<InventoryTransaction>, current_page: i64, limit: i64) -> Self {
        Self {
            total_pages: total_pages(page.total, limit),
            current_page,
            total_transactions: page.total,
            transactions: page.items.into_iter().map(TransactionView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::tests::new_product;
    use crate::domain::EntryDetails;
    use uuid::Uuid;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }

    #[test]
    fn product_view_flattens_derived_fields() {
        let product = new_product("VIEW").into_product().unwrap();
        let json = serde_json::to_value(ProductView::from(product)).unwrap();

        assert_eq!(json["sku"], "VIEW");
        assert_eq!(json["profitMargin"], "25.00");
        assert_eq!(json["stockStatus"], "low");
        assert_eq!(json["currentStock"], "0");
    }

    #[test]
    fn transaction_view_carries_signed_impact() {
        let mut product = new_product("VIEW").into_product().unwrap();
        product.current_stock = BigDecimal::from(8);
        let details = EntryDetails {
            performed_by: Uuid::new_v4(),
            reason: "sale".to_string(),
            ..Default::default()
        };
        let entry =
            InventoryTransaction::stock_out(&product, BigDecimal::from(3), None, details).unwrap();

        let json = serde_json::to_value(TransactionView::from(entry)).unwrap();
        assert_eq!(json["type"], "out");
        assert_eq!(json["stockImpact"], "-3");
        assert_eq!(json["newStock"], "5");
    }
}
