use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{EntryDetails, InventoryTransaction, Location, Product, StockError};
use crate::ports::{LedgerStore, StoreError};
use crate::validation::{
    self, decimal, sanitize_optional, sanitize_string, ValidationError, NOTES_MAX_LEN,
    PRICE_MAX_SCALE, QUANTITY_MAX_SCALE, REASON_MAX_LEN, REFERENCE_MAX_LEN,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: BigDecimal,
        available: BigDecimal,
    },

    #[error("Stock was modified concurrently; gave up after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                LedgerError::NotFound(format!("{} {}", entity, id))
            }
            StoreError::Duplicate(what) => LedgerError::Duplicate(what),
            StoreError::Conflict(_) => LedgerError::ConcurrencyConflict { attempts: 1 },
            StoreError::Corrupt(_) | StoreError::Backend(_) => {
                LedgerError::Persistence(err.to_string())
            }
        }
    }
}

impl From<StockError> for LedgerError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock {
                requested,
                available,
            } => LedgerError::InsufficientStock {
                requested,
                available,
            },
            StockError::MissingDestination => LedgerError::Validation(ValidationError::new(
                "location",
                "transfer requires a destination location",
            )),
        }
    }
}

/// Stock-in, stock-out, return, damage and expiry requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    #[serde(alias = "product")]
    pub product_id: Uuid,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub quantity: BigDecimal,
    #[serde(default, deserialize_with = "decimal::option::deserialize")]
    pub unit_price: Option<BigDecimal>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    #[serde(alias = "product")]
    pub product_id: Uuid,
    /// Target balance, not a delta.
    #[serde(deserialize_with = "decimal::deserialize")]
    pub quantity: BigDecimal,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(alias = "product")]
    pub product_id: Uuid,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub quantity: BigDecimal,
    pub to_location: Location,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn entry_details(
    actor: Uuid,
    reason: &str,
    notes: Option<String>,
    reference: Option<String>,
    reference_number: Option<String>,
    unit_price: Option<BigDecimal>,
) -> Result<EntryDetails, ValidationError> {
    let reason = sanitize_string(reason);
    validation::validate_required("reason", &reason)?;
    validation::validate_max_len("reason", &reason, REASON_MAX_LEN)?;

    let notes = sanitize_optional(notes);
    validation::validate_optional_max_len("notes", notes.as_deref(), NOTES_MAX_LEN)?;
    let reference = sanitize_optional(reference);
    validation::validate_optional_max_len("reference", reference.as_deref(), REFERENCE_MAX_LEN)?;
    let reference_number = sanitize_optional(reference_number);
    validation::validate_optional_max_len(
        "referenceNumber",
        reference_number.as_deref(),
        REFERENCE_MAX_LEN,
    )?;

    if let Some(price) = &unit_price {
        validation::validate_non_negative("unitPrice", price)?;
        validation::validate_scale("unitPrice", price, PRICE_MAX_SCALE)?;
    }

    Ok(EntryDetails {
        performed_by: actor,
        reason,
        notes,
        reference,
        reference_number,
        unit_price,
    })
}

fn validate_movement_quantity(quantity: &BigDecimal) -> Result<(), ValidationError> {
    validation::validate_positive("quantity", quantity)?;
    validation::validate_scale("quantity", quantity, QUANTITY_MAX_SCALE)
}

/// Validated movement ready to be turned into a ledger entry.
struct Movement {
    product_id: Uuid,
    quantity: BigDecimal,
    location: Option<Location>,
    details: EntryDetails,
}

impl Movement {
    fn parse(actor: Uuid, req: MovementRequest) -> Result<Self, ValidationError> {
        validate_movement_quantity(&req.quantity)?;
        let details = entry_details(
            actor,
            &req.reason,
            req.notes,
            req.reference,
            req.reference_number,
            req.unit_price,
        )?;
        Ok(Self {
            product_id: req.product_id,
            quantity: req.quantity,
            location: req.location.map(Location::sanitized).filter(|l| !l.is_empty()),
            details,
        })
    }
}

/// The only path through which a product's `current_stock` changes.
///
/// Every operation opens a per-product mutation scope, validates against the
/// locked snapshot, and commits the ledger entry together with the new balance.
/// Conflicts (lock timeouts, serialization failures) are retried up to
/// `max_attempts` times before surfacing as [`LedgerError::ConcurrencyConflict`].
#[derive(Clone)]
pub struct StockMutationEngine {
    store: Arc<dyn LedgerStore>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl StockMutationEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    pub async fn stock_in(
        &self,
        actor: Uuid,
        req: MovementRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        let m = Movement::parse(actor, req)?;
        self.apply(m.product_id, |product| {
            Ok(InventoryTransaction::stock_in(
                product,
                m.quantity.clone(),
                m.location.clone(),
                m.details.clone(),
            ))
        })
        .await
    }

    pub async fn stock_out(
        &self,
        actor: Uuid,
        req: MovementRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        let m = Movement::parse(actor, req)?;
        self.apply(m.product_id, |product| {
            Ok(InventoryTransaction::stock_out(
                product,
                m.quantity.clone(),
                m.location.clone(),
                m.details.clone(),
            )?)
        })
        .await
    }

    pub async fn adjust(
        &self,
        actor: Uuid,
        req: AdjustmentRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        validation::validate_non_negative("quantity", &req.quantity)?;
        validation::validate_scale("quantity", &req.quantity, QUANTITY_MAX_SCALE)?;
        let details = entry_details(actor, &req.reason, req.notes, None, None, None)?;
        let target = req.quantity;

        self.apply(req.product_id, |product| {
            Ok(InventoryTransaction::adjustment(
                product,
                target.clone(),
                details.clone(),
            ))
        })
        .await
    }

    pub async fn record_return(
        &self,
        actor: Uuid,
        req: MovementRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        let m = Movement::parse(actor, req)?;
        self.apply(m.product_id, |product| {
            Ok(InventoryTransaction::customer_return(
                product,
                m.quantity.clone(),
                m.location.clone(),
                m.details.clone(),
            ))
        })
        .await
    }

    pub async fn record_damage(
        &self,
        actor: Uuid,
        req: MovementRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        let m = Movement::parse(actor, req)?;
        self.apply(m.product_id, |product| {
            Ok(InventoryTransaction::damage(
                product,
                m.quantity.clone(),
                m.location.clone(),
                m.details.clone(),
            )?)
        })
        .await
    }

    pub async fn record_expiry(
        &self,
        actor: Uuid,
        req: MovementRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        let m = Movement::parse(actor, req)?;
        self.apply(m.product_id, |product| {
            Ok(InventoryTransaction::expiry(
                product,
                m.quantity.clone(),
                m.location.clone(),
                m.details.clone(),
            )?)
        })
        .await
    }

    pub async fn transfer(
        &self,
        actor: Uuid,
        req: TransferRequest,
    ) -> Result<InventoryTransaction, LedgerError> {
        validate_movement_quantity(&req.quantity)?;
        let details = entry_details(
            actor,
            &req.reason,
            req.notes,
            req.reference,
            req.reference_number,
            None,
        )?;
        let destination = req.to_location.sanitized();
        let quantity = req.quantity;

        self.apply(req.product_id, |product| {
            Ok(InventoryTransaction::transfer(
                product,
                quantity.clone(),
                destination.clone(),
                details.clone(),
            )?)
        })
        .await
    }

    /// Runs read-validate-commit under the product's mutation scope, retrying on conflict.
    async fn apply<F>(&self, product_id: Uuid, build: F) -> Result<InventoryTransaction, LedgerError>
    where
        F: Fn(&Product) -> Result<InventoryTransaction, LedgerError> + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            let scope = match self.store.begin_mutation(product_id).await {
                Ok(scope) => scope,
                Err(StoreError::Conflict(reason)) => {
                    self.back_off(product_id, attempt, &reason).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !scope.product().is_active {
                return Err(LedgerError::NotFound(format!("product {}", product_id)));
            }

            let entry = build(scope.product())?;

            match scope.commit(entry).await {
                Ok(committed) => {
                    tracing::info!(
                        product_id = %committed.product_id,
                        transaction_id = %committed.id,
                        kind = %committed.kind,
                        quantity = %committed.quantity,
                        previous_stock = %committed.previous_stock,
                        new_stock = %committed.new_stock,
                        attempt,
                        "Stock mutation applied"
                    );
                    return Ok(committed);
                }
                Err(StoreError::Conflict(reason)) => {
                    self.back_off(product_id, attempt, &reason).await;
                }
                Err(e) => {
                    tracing::error!(product_id = %product_id, error = %e, "Stock mutation failed");
                    return Err(e.into());
                }
            }
        }

        tracing::warn!(
            product_id = %product_id,
            attempts = self.max_attempts,
            "Giving up on stock mutation after repeated conflicts"
        );
        Err(LedgerError::ConcurrencyConflict {
            attempts: self.max_attempts,
        })
    }

    async fn back_off(&self, product_id: Uuid, attempt: u32, reason: &str) {
        tracing::warn!(
            product_id = %product_id,
            attempt,
            reason,
            "Conflicting stock mutation, retrying"
        );
        if attempt < self.max_attempts {
            tokio::time::sleep(self.retry_backoff * attempt).await;
        }
    }
}
