//! Product records: identity, pricing, stocking thresholds and the live balance.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::{
    self, decimal, sanitize_optional, sanitize_string, ValidationError, DESCRIPTION_MAX_LEN,
    PRICE_MAX_SCALE, PRODUCT_NAME_MAX_LEN, QUANTITY_MAX_SCALE, SKU_MAX_LEN,
};

pub const DEFAULT_MIN_STOCK_LEVEL: i32 = 10;

/// Unit of measure a product is stocked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Piece,
    Kg,
    Liter,
    Meter,
    Box,
    Pack,
    Dozen,
    Pair,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Piece => "piece",
            Unit::Kg => "kg",
            Unit::Liter => "liter",
            Unit::Meter => "meter",
            Unit::Box => "box",
            Unit::Pack => "pack",
            Unit::Dozen => "dozen",
            Unit::Pair => "pair",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "piece" => Ok(Unit::Piece),
            "kg" => Ok(Unit::Kg),
            "liter" => Ok(Unit::Liter),
            "meter" => Ok(Unit::Meter),
            "box" => Ok(Unit::Box),
            "pack" => Ok(Unit::Pack),
            "dozen" => Ok(Unit::Dozen),
            "pair" => Ok(Unit::Pair),
            other => Err(ValidationError::new(
                "unit",
                format!("unknown unit of measure '{}'", other),
            )),
        }
    }
}

/// Physical storage position. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub warehouse: Option<String>,
    pub aisle: Option<String>,
    pub shelf: Option<String>,
    pub bin: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.warehouse.is_none() && self.aisle.is_none() && self.shelf.is_none() && self.bin.is_none()
    }

    pub fn sanitized(self) -> Self {
        Self {
            warehouse: sanitize_optional(self.warehouse),
            aisle: sanitize_optional(self.aisle),
            shelf: sanitize_optional(self.shelf),
            bin: sanitize_optional(self.bin),
        }
    }
}

/// Stocking classification derived from thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Low,
    Normal,
    High,
}

impl StockStatus {
    /// `low` wins over `high` when both thresholds are crossed.
    pub fn classify(
        current: &BigDecimal,
        min_level: &BigDecimal,
        max_level: Option<&BigDecimal>,
    ) -> Self {
        if current <= min_level {
            return StockStatus::Low;
        }
        match max_level {
            Some(max) if current >= max => StockStatus::High,
            _ => StockStatus::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub unit: Unit,
    pub cost_price: BigDecimal,
    pub selling_price: BigDecimal,
    pub current_stock: BigDecimal,
    pub min_stock_level: BigDecimal,
    pub max_stock_level: Option<BigDecimal>,
    pub location: Location,
    pub tags: Vec<String>,
    pub is_active: bool,
    /// Bumped on every committed stock mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(
            &self.current_stock,
            &self.min_stock_level,
            self.max_stock_level.as_ref(),
        )
    }

    /// Margin over cost in percent, two decimals. `None` when the cost price is zero.
    pub fn profit_margin(&self) -> Option<BigDecimal> {
        if self.cost_price <= super::zero() {
            return None;
        }
        let margin =
            (&self.selling_price - &self.cost_price) / &self.cost_price * BigDecimal::from(100);
        Some(super::money(&margin))
    }

    pub fn stock_value(&self) -> BigDecimal {
        &self.current_stock * &self.cost_price
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.current_stock <= super::zero()
    }
}

/// SKUs are trimmed and uppercased before they are stored or compared.
pub fn normalize_sku(raw: &str) -> String {
    sanitize_string(raw).to_uppercase()
}

fn default_min_stock_level() -> BigDecimal {
    BigDecimal::from(DEFAULT_MIN_STOCK_LEVEL)
}

/// Product-create request. Opening balances go through stock-in, so there is no stock field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    pub unit: Unit,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub cost_price: BigDecimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub selling_price: BigDecimal,
    #[serde(
        default = "default_min_stock_level",
        deserialize_with = "decimal::deserialize"
    )]
    pub min_stock_level: BigDecimal,
    #[serde(default, deserialize_with = "decimal::option::deserialize")]
    pub max_stock_level: Option<BigDecimal>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewProduct {
    pub fn into_product(self) -> Result<Product, ValidationError> {
        let sku = normalize_sku(&self.sku);
        validation::validate_required("sku", &sku)?;
        validation::validate_max_len("sku", &sku, SKU_MAX_LEN)?;

        let name = sanitize_string(&self.name);
        validation::validate_required("name", &name)?;
        validation::validate_max_len("name", &name, PRODUCT_NAME_MAX_LEN)?;

        let description = sanitize_optional(self.description);
        if let Some(description) = &description {
            validation::validate_max_len("description", description, DESCRIPTION_MAX_LEN)?;
        }

        validation::validate_non_negative("costPrice", &self.cost_price)?;
        validation::validate_scale("costPrice", &self.cost_price, PRICE_MAX_SCALE)?;
        validation::validate_non_negative("sellingPrice", &self.selling_price)?;
        validation::validate_scale("sellingPrice", &self.selling_price, PRICE_MAX_SCALE)?;
        validation::validate_non_negative("minStockLevel", &self.min_stock_level)?;
        validation::validate_scale("minStockLevel", &self.min_stock_level, QUANTITY_MAX_SCALE)?;
        if let Some(max) = &self.max_stock_level {
            validation::validate_non_negative("maxStockLevel", max)?;
            validation::validate_scale("maxStockLevel", max, QUANTITY_MAX_SCALE)?;
        }

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.iter().map(|t| sanitize_string(t)) {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let now = Utc::now();
        Ok(Product {
            id: Uuid::new_v4(),
            sku,
            barcode: sanitize_optional(self.barcode),
            name,
            description,
            category_id: self.category_id,
            supplier_id: self.supplier_id,
            unit: self.unit,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            current_stock: super::zero(),
            min_stock_level: self.min_stock_level,
            max_stock_level: self.max_stock_level,
            location: self.location.sanitized(),
            tags,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_product(sku: &str) -> NewProduct {
        NewProduct {
            sku: sku.to_string(),
            barcode: None,
            name: "Widget".to_string(),
            description: None,
            category_id: None,
            supplier_id: None,
            unit: Unit::Piece,
            cost_price: BigDecimal::from(4),
            selling_price: BigDecimal::from(5),
            min_stock_level: BigDecimal::from(5),
            max_stock_level: None,
            location: Location::default(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn normalizes_sku() {
        assert_eq!(normalize_sku("  ab-12 "), "AB-12");
        let product = new_product(" wid-001 ").into_product().unwrap();
        assert_eq!(product.sku, "WID-001");
        assert_eq!(product.current_stock, BigDecimal::from(0));
        assert!(product.is_active);
    }

    #[test]
    fn rejects_blank_name_and_negative_prices() {
        let mut input = new_product("A1");
        input.name = "   ".to_string();
        assert_eq!(input.into_product().unwrap_err().field, "name");

        let mut input = new_product("A1");
        input.cost_price = BigDecimal::from(-1);
        assert_eq!(input.into_product().unwrap_err().field, "costPrice");
    }

    #[test]
    fn classifies_stock_status() {
        let min = BigDecimal::from(5);
        let max = BigDecimal::from(50);
        assert_eq!(StockStatus::classify(&BigDecimal::from(5), &min, Some(&max)), StockStatus::Low);
        assert_eq!(StockStatus::classify(&BigDecimal::from(0), &min, None), StockStatus::Low);
        assert_eq!(StockStatus::classify(&BigDecimal::from(6), &min, Some(&max)), StockStatus::Normal);
        assert_eq!(StockStatus::classify(&BigDecimal::from(50), &min, Some(&max)), StockStatus::High);
        assert_eq!(StockStatus::classify(&BigDecimal::from(500), &min, None), StockStatus::Normal);
    }

    #[test]
    fn classification_is_repeatable() {
        let mut product = new_product("A1").into_product().unwrap();
        product.current_stock = BigDecimal::from(7);
        assert_eq!(product.stock_status(), product.stock_status());
    }

    #[test]
    fn profit_margin_is_undefined_without_cost() {
        let mut product = new_product("A1").into_product().unwrap();
        assert_eq!(product.profit_margin().unwrap().to_string(), "25.00");

        product.cost_price = BigDecimal::from(0);
        assert!(product.profit_margin().is_none());
    }

    #[test]
    fn parses_units() {
        assert_eq!("kg".parse::<Unit>().unwrap(), Unit::Kg);
        assert!("gallon".parse::<Unit>().is_err());
    }
}
