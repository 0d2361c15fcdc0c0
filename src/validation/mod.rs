use bigdecimal::BigDecimal;
use std::fmt;

pub const SKU_MAX_LEN: usize = 64;
pub const PRODUCT_NAME_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 500;
pub const REASON_MAX_LEN: usize = 200;
pub const NOTES_MAX_LEN: usize = 500;
pub const REFERENCE_MAX_LEN: usize = 100;
pub const QUANTITY_MAX_SCALE: i64 = 3;
pub const PRICE_MAX_SCALE: i64 = 2;
/// Digits allowed before the decimal point of any quantity or amount.
pub const MAX_INTEGER_DIGITS: i64 = 15;
/// Upper bound on the raw scale accepted before rounding checks run.
pub const MAX_RAW_SCALE: i64 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitizes an optional field, treating blank input as absent.
pub fn sanitize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| sanitize_string(&v))
        .filter(|v| !v.is_empty())
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_optional_max_len(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> ValidationResult {
    match value {
        Some(value) => validate_max_len(field, value, max_len),
        None => Ok(()),
    }
}

pub fn validate_positive(field: &'static str, value: &BigDecimal) -> ValidationResult {
    validate_magnitude(field, value)?;
    if value <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_non_negative(field: &'static str, value: &BigDecimal) -> ValidationResult {
    validate_magnitude(field, value)?;
    if value < &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

/// Rejects numbers whose exponent would make later arithmetic explode. Works on the
/// mantissa and exponent only, so it is cheap for any input.
pub fn validate_magnitude(field: &'static str, value: &BigDecimal) -> ValidationResult {
    let (mantissa, scale) = value.as_bigint_and_exponent();
    let mantissa_digits = mantissa.magnitude().to_string().len() as i64;
    if scale > MAX_RAW_SCALE {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", MAX_RAW_SCALE),
        ));
    }
    if mantissa_digits.saturating_sub(scale) > MAX_INTEGER_DIGITS {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} integer digits", MAX_INTEGER_DIGITS),
        ));
    }

    Ok(())
}

pub fn validate_scale(field: &'static str, value: &BigDecimal, max_scale: i64) -> ValidationResult {
    validate_magnitude(field, value)?;
    if &value.with_scale(max_scale) != value {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", max_scale),
        ));
    }

    Ok(())
}

/// Serde helpers accepting a decimal either as a JSON number or a numeric string.
/// Numbers go through their shortest textual form, so `2.5` stays `2.5`.
pub mod decimal {
    use bigdecimal::BigDecimal;
    use serde::{de, Deserialize, Deserializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    /// Longest textual form accepted. Anything longer cannot pass the magnitude
    /// bounds anyway.
    const MAX_TEXT_LEN: usize = 40;

    fn parse<E: de::Error>(raw: Raw) -> Result<BigDecimal, E> {
        let text = match raw {
            Raw::Number(n) => n.to_string(),
            Raw::Text(s) => s.trim().to_string(),
        };
        if text.len() > MAX_TEXT_LEN {
            return Err(E::custom("number is too long"));
        }
        let value = BigDecimal::from_str(&text)
            .map_err(|_| E::custom(format!("'{}' is not a valid number", text)))?;
        super::validate_magnitude("number", &value)
            .map_err(|e| E::custom(format!("'{}' is out of range: {}", text, e.message)))?;
        Ok(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        parse(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<Raw>::deserialize(deserializer)? {
                Some(raw) => parse(raw).map(Some),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
        assert!(validate_optional_max_len("field", None, 0).is_ok());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
        assert_eq!(sanitize_optional(Some("  ".to_string())), None);
    }

    #[test]
    fn validates_quantities() {
        let positive = BigDecimal::from_str("1.25").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);

        assert!(validate_positive("quantity", &positive).is_ok());
        assert!(validate_positive("quantity", &zero).is_err());
        assert!(validate_non_negative("quantity", &zero).is_ok());
        assert!(validate_non_negative("quantity", &negative).is_err());
    }

    #[test]
    fn validates_scale() {
        let fine = BigDecimal::from_str("1.250").unwrap();
        let too_fine = BigDecimal::from_str("1.2501").unwrap();
        assert!(validate_scale("quantity", &fine, 3).is_ok());
        assert!(validate_scale("quantity", &too_fine, 3).is_err());
        assert!(validate_scale("unitPrice", &BigDecimal::from(3), 2).is_ok());
    }

    #[test]
    fn rejects_huge_exponents_without_expanding_them() {
        let huge = BigDecimal::from_str("1e20000000").unwrap();
        assert_eq!(
            validate_scale("quantity", &huge, 3).unwrap_err().message,
            "must have at most 15 integer digits"
        );

        let tiny = BigDecimal::from_str("1e-20000000").unwrap();
        assert!(validate_scale("quantity", &tiny, 3).is_err());

        let widest = BigDecimal::from_str("999999999999999.999").unwrap();
        assert!(validate_scale("quantity", &widest, 3).is_ok());
        let too_wide = BigDecimal::from_str("1000000000000000").unwrap();
        assert!(validate_magnitude("quantity", &too_wide).is_err());
        assert!(validate_magnitude("quantity", &BigDecimal::from_str("0e-5").unwrap()).is_ok());
        assert!(validate_magnitude("quantity", &BigDecimal::from_str("0e20000000").unwrap()).is_err());
        assert!(validate_magnitude("quantity", &BigDecimal::from_str("12e2").unwrap()).is_ok());
    }

    #[test]
    fn decimal_rejects_out_of_range_text() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            #[serde(deserialize_with = "decimal::deserialize")]
            _price: BigDecimal,
        }

        assert!(serde_json::from_str::<Payload>(r#"{"_price": "1e20000000"}"#).is_err());
        let long = format!(r#"{{"_price": "{}"}}"#, "9".repeat(200));
        assert!(serde_json::from_str::<Payload>(&long).is_err());
        assert!(serde_json::from_str::<Payload>(r#"{"_price": "4.25"}"#).is_ok());
    }

    #[test]
    fn decimal_accepts_numbers_and_strings() {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(deserialize_with = "decimal::deserialize")]
            quantity: BigDecimal,
            #[serde(default, deserialize_with = "decimal::option::deserialize")]
            price: Option<BigDecimal>,
        }

        let parsed: Payload = serde_json::from_str(r#"{"quantity": 2.5}"#).unwrap();
        assert_eq!(parsed.quantity.to_string(), "2.5");
        assert!(parsed.price.is_none());

        let parsed: Payload =
            serde_json::from_str(r#"{"quantity": "7", "price": "2.50"}"#).unwrap();
        assert_eq!(parsed.quantity, BigDecimal::from(7));
        assert_eq!(parsed.price.unwrap().to_string(), "2.50");

        assert!(serde_json::from_str::<Payload>(r#"{"quantity": "ten"}"#).is_err());
    }
}
