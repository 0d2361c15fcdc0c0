//! Low-stock and over-stock alert lists. Pure reads; may trail in-flight mutations.

use serde::Serialize;

use crate::domain::Product;
use crate::ports::LedgerStore;
use crate::schemas::ProductView;
use crate::services::stock_engine::LedgerError;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlerts {
    pub low_stock: Vec<ProductView>,
    pub over_stock: Vec<ProductView>,
}

pub fn is_low_stock(product: &Product) -> bool {
    product.current_stock <= product.min_stock_level
}

pub fn is_over_stock(product: &Product) -> bool {
    product
        .max_stock_level
        .as_ref()
        .map_or(false, |max| &product.current_stock >= max)
}

/// Buckets active products by threshold. A product can sit in both lists when
/// its thresholds overlap.
pub fn collect_alerts<I>(products: I) -> StockAlerts
where
    I: IntoIterator<Item = Product>,
{
    let mut alerts = StockAlerts::default();
    for product in products.into_iter().filter(|p| p.is_active) {
        let low = is_low_stock(&product);
        let over = is_over_stock(&product);
        if low && over {
            alerts.low_stock.push(ProductView::from(product.clone()));
            alerts.over_stock.push(ProductView::from(product));
        } else if low {
            alerts.low_stock.push(ProductView::from(product));
        } else if over {
            alerts.over_stock.push(ProductView::from(product));
        }
    }
    alerts
}

pub async fn stock_alerts(store: &dyn LedgerStore) -> Result<StockAlerts, LedgerError> {
    let products = store.active_products().await?;
    Ok(collect_alerts(products))
}
