//! Inventory transaction domain entity.
//! Immutable ledger entries describing one applied stock movement each.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::product::{Location, Product};
use super::{exact_money, zero};

/// Kind of stock movement. The sign each kind applies to the balance lives in
/// [`TransactionType::stock_impact`] and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    In,
    Out,
    Adjustment,
    Transfer,
    Return,
    Damage,
    Expiry,
}

impl TransactionType {
    pub const ALL: [TransactionType; 7] = [
        TransactionType::In,
        TransactionType::Out,
        TransactionType::Adjustment,
        TransactionType::Transfer,
        TransactionType::Return,
        TransactionType::Damage,
        TransactionType::Expiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::In => "in",
            TransactionType::Out => "out",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Transfer => "transfer",
            TransactionType::Return => "return",
            TransactionType::Damage => "damage",
            TransactionType::Expiry => "expiry",
        }
    }

    /// Signed quantity this kind contributes to the balance.
    /// Adjustments and transfers carry no implied direction.
    pub fn stock_impact(&self, quantity: &BigDecimal) -> BigDecimal {
        match self {
            TransactionType::In | TransactionType::Return => quantity.clone(),
            TransactionType::Out | TransactionType::Damage | TransactionType::Expiry => {
                -quantity.clone()
            }
            TransactionType::Adjustment | TransactionType::Transfer => zero(),
        }
    }

    /// Kinds that remove stock and therefore need the sufficient-balance check.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            TransactionType::Out | TransactionType::Damage | TransactionType::Expiry
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown transaction type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Completed => "completed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "rejected" => Ok(TransactionStatus::Rejected),
            "completed" => Ok(TransactionStatus::Completed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StockError {
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: BigDecimal,
        available: BigDecimal,
    },

    #[error("transfer requires a destination location")]
    MissingDestination,
}

/// Caller-supplied fields shared by every movement kind. Expected to be sanitized already.
#[derive(Debug, Clone, Default)]
pub struct EntryDetails {
    pub performed_by: Uuid,
    pub reason: String,
    pub notes: Option<String>,
    pub reference: Option<String>,
    pub reference_number: Option<String>,
    pub unit_price: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Magnitude only; direction comes from `kind`, or the snapshot pair for adjustments.
    pub quantity: BigDecimal,
    pub previous_stock: BigDecimal,
    pub new_stock: BigDecimal,
    pub unit_price: Option<BigDecimal>,
    pub total_value: Option<BigDecimal>,
    pub reference: Option<String>,
    pub reference_number: Option<String>,
    pub from_location: Option<Location>,
    pub to_location: Option<Location>,
    pub reason: String,
    pub notes: Option<String>,
    pub performed_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub status: TransactionStatus,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    pub fn stock_in(
        product: &Product,
        quantity: BigDecimal,
        to_location: Option<Location>,
        details: EntryDetails,
    ) -> Self {
        Self::inbound(TransactionType::In, product, quantity, to_location, details)
    }

    pub fn customer_return(
        product: &Product,
        quantity: BigDecimal,
        to_location: Option<Location>,
        details: EntryDetails,
    ) -> Self {
        Self::inbound(TransactionType::Return, product, quantity, to_location, details)
    }

    pub fn stock_out(
        product: &Product,
        quantity: BigDecimal,
        from_location: Option<Location>,
        details: EntryDetails,
    ) -> Result<Self, StockError> {
        Self::outbound(TransactionType::Out, product, quantity, from_location, details)
    }

    pub fn damage(
        product: &Product,
        quantity: BigDecimal,
        from_location: Option<Location>,
        details: EntryDetails,
    ) -> Result<Self, StockError> {
        Self::outbound(TransactionType::Damage, product, quantity, from_location, details)
    }

    pub fn expiry(
        product: &Product,
        quantity: BigDecimal,
        from_location: Option<Location>,
        details: EntryDetails,
    ) -> Result<Self, StockError> {
        Self::outbound(TransactionType::Expiry, product, quantity, from_location, details)
    }

    /// Sets the balance to `new_quantity`; the stored quantity is the absolute difference.
    pub fn adjustment(product: &Product, new_quantity: BigDecimal, details: EntryDetails) -> Self {
        let previous = product.current_stock.clone();
        let quantity = (&new_quantity - &previous).abs();
        let mut entry = Self::build(
            TransactionType::Adjustment,
            product,
            quantity,
            new_quantity,
            details,
        );
        entry.unit_price = None;
        entry.total_value = None;
        entry
    }

    /// Relocates `quantity` units. The balance is unchanged and the product's location
    /// becomes `destination` once committed.
    pub fn transfer(
        product: &Product,
        quantity: BigDecimal,
        destination: Location,
        details: EntryDetails,
    ) -> Result<Self, StockError> {
        if destination.is_empty() {
            return Err(StockError::MissingDestination);
        }
        if quantity > product.current_stock {
            return Err(StockError::InsufficientStock {
                requested: quantity,
                available: product.current_stock.clone(),
            });
        }
        let unchanged = product.current_stock.clone();
        let mut entry = Self::build(TransactionType::Transfer, product, quantity, unchanged, details);
        entry.from_location = Some(product.location.clone());
        entry.to_location = Some(destination);
        Ok(entry)
    }

    fn inbound(
        kind: TransactionType,
        product: &Product,
        quantity: BigDecimal,
        to_location: Option<Location>,
        details: EntryDetails,
    ) -> Self {
        let new_stock = &product.current_stock + kind.stock_impact(&quantity);
        let mut entry = Self::build(kind, product, quantity, new_stock, details);
        entry.to_location = to_location;
        entry
    }

    fn outbound(
        kind: TransactionType,
        product: &Product,
        quantity: BigDecimal,
        from_location: Option<Location>,
        details: EntryDetails,
    ) -> Result<Self, StockError> {
        if quantity > product.current_stock {
            return Err(StockError::InsufficientStock {
                requested: quantity,
                available: product.current_stock.clone(),
            });
        }
        let new_stock = &product.current_stock + kind.stock_impact(&quantity);
        let mut entry = Self::build(kind, product, quantity, new_stock, details);
        entry.from_location = from_location;
        Ok(entry)
    }

    fn build(
        kind: TransactionType,
        product: &Product,
        quantity: BigDecimal,
        new_stock: BigDecimal,
        details: EntryDetails,
    ) -> Self {
        let total_value = match &details.unit_price {
            Some(price) => exact_money(&(price * &quantity)),
            None => exact_money(&zero()),
        };
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id: product.id,
            kind,
            quantity,
            previous_stock: product.current_stock.clone(),
            new_stock,
            unit_price: details.unit_price,
            total_value: Some(total_value),
            reference: details.reference,
            reference_number: details.reference_number,
            from_location: None,
            to_location: None,
            reason: details.reason,
            notes: details.notes,
            performed_by: details.performed_by,
            approved_by: None,
            status: TransactionStatus::Completed,
            transaction_date: now,
            created_at: now,
        }
    }

    /// Impact implied by the type alone (zero for adjustments and transfers).
    pub fn stock_impact(&self) -> BigDecimal {
        self.kind.stock_impact(&self.quantity)
    }

    /// Change this entry actually applied to the balance. Equal to `stock_impact`
    /// for every kind except adjustments, whose delta is caller-set.
    pub fn applied_delta(&self) -> BigDecimal {
        match self.kind {
            TransactionType::Adjustment => &self.new_stock - &self.previous_stock,
            _ => self.stock_impact(),
        }
    }

    /// Checks the snapshot pair against the type's contract.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.quantity < zero() {
            return Err(format!("negative quantity {}", self.quantity));
        }
        if self.previous_stock < zero() || self.new_stock < zero() {
            return Err(format!(
                "negative snapshot {} -> {}",
                self.previous_stock, self.new_stock
            ));
        }
        let delta = &self.new_stock - &self.previous_stock;
        match self.kind {
            TransactionType::Adjustment if delta.abs() != self.quantity => Err(format!(
                "adjustment quantity {} does not match |{} - {}|",
                self.quantity, self.new_stock, self.previous_stock
            )),
            TransactionType::Adjustment => Ok(()),
            _ if delta != self.stock_impact() => Err(format!(
                "{} of {} moved stock {} -> {}",
                self.kind, self.quantity, self.previous_stock, self.new_stock
            )),
            _ => Ok(()),
        }
    }
}
