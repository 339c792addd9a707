//! Value objects: page amounts and display names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LedgerError;

/// Marker trait for value objects.
///
/// Value objects have no identity; two with the same attributes are equal.
/// They are immutable; "changing" one means building a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A strictly positive number of pages moved by one credit or debit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl ValueObject for Amount {}

impl Amount {
    pub fn new(pages: i64) -> Result<Self, LedgerError> {
        if pages <= 0 {
            return Err(LedgerError::invalid_input("amount must be greater than 0"));
        }
        Ok(Self(pages))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Parse an amount from a loosely typed JSON field.
    ///
    /// Accepts integers, integral floats (`5.0`) and strings holding an
    /// integer (`" 5 "`). Fractional numbers, booleans and everything else are
    /// rejected, as are values that are not positive.
    pub fn from_json(value: &Value) -> Result<Self, LedgerError> {
        let pages = match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i
                } else if let Some(f) = n.as_f64() {
                    if f.fract() != 0.0 || f < i64::MIN as f64 || f > i64::MAX as f64 {
                        return Err(LedgerError::invalid_input("amount must be an integer"));
                    }
                    f as i64
                } else {
                    // u64 beyond i64::MAX
                    return Err(LedgerError::invalid_input("amount is too large"));
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| LedgerError::invalid_input("amount must be an integer"))?,
            _ => return Err(LedgerError::invalid_input("amount must be an integer")),
        };
        Self::new(pages)
    }
}

impl TryFrom<i64> for Amount {
    type Error = LedgerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Human-readable account holder name. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl ValueObject for DisplayName {}

impl DisplayName {
    pub fn new(value: impl Into<String>) -> Result<Self, LedgerError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(LedgerError::invalid_input("display name must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DisplayName> for String {
    fn from(value: DisplayName) -> Self {
        value.0
    }
}

impl core::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn amount_must_be_positive() {
        assert!(Amount::new(1).is_ok());
        assert!(matches!(Amount::new(0), Err(LedgerError::InvalidInput(_))));
        assert!(matches!(Amount::new(-5), Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn amount_from_json_accepts_integer_forms() {
        assert_eq!(Amount::from_json(&json!(150)).unwrap().get(), 150);
        assert_eq!(Amount::from_json(&json!(5.0)).unwrap().get(), 5);
        assert_eq!(Amount::from_json(&json!("42")).unwrap().get(), 42);
        assert_eq!(Amount::from_json(&json!(" 7 ")).unwrap().get(), 7);
    }

    #[test]
    fn amount_from_json_rejects_everything_else() {
        for v in [
            json!(2.5),
            json!("2.5"),
            json!("ten"),
            json!(true),
            json!(null),
            json!([1]),
            json!({"n": 1}),
            json!(0),
            json!("-3"),
            json!(u64::MAX),
        ] {
            assert!(
                matches!(Amount::from_json(&v), Err(LedgerError::InvalidInput(_))),
                "expected rejection for {v}"
            );
        }
    }

    #[test]
    fn display_name_rejects_blank() {
        assert!(DisplayName::new("JUAN").is_ok());
        assert!(matches!(DisplayName::new(" \t"), Err(LedgerError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn string_and_number_forms_agree(pages in 1i64..i64::MAX) {
            let from_number = Amount::from_json(&json!(pages)).unwrap();
            let from_string = Amount::from_json(&json!(pages.to_string())).unwrap();
            prop_assert_eq!(from_number, from_string);
        }
    }
}
