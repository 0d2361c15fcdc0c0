//! Framework-agnostic inventory entities.

pub mod product;
pub mod transaction;

pub use product::{Location, NewProduct, Product, StockStatus, Unit};
pub use transaction::{
    EntryDetails, InventoryTransaction, StockError, TransactionStatus, TransactionType,
};

use bigdecimal::BigDecimal;

/// Rounds a money amount to cents and pins the scale so it renders as `"12.50"`.
pub fn money(value: &BigDecimal) -> BigDecimal {
    value.round(2).with_scale(2)
}

/// Pads an exact amount to at least two decimals without rounding it, so `12.5`
/// renders as `"12.50"` while `0.00333` keeps every digit.
pub fn exact_money(value: &BigDecimal) -> BigDecimal {
    let normalized = value.normalized();
    if normalized.as_bigint_and_exponent().1 < 2 {
        normalized.with_scale(2)
    } else {
        normalized
    }
}

pub(crate) fn zero() -> BigDecimal {
    BigDecimal::from(0)
}
