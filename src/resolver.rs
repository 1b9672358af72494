//! Resolution of external tagged identifiers (`C00123`, `P00045`) into
//! internal numeric keys.
//!
//! No existence check happens here: a reference to a missing row is rejected
//! by the sink's foreign key at insert time.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::constants::{CUSTOMER_TAG, PRODUCT_TAG};
use crate::types::{CustomerKey, ProductKey};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("'{raw}' does not start with a type tag")]
    MissingTag { raw: String },

    #[error("'{raw}' has tag '{found}', expected '{expected}'")]
    UnexpectedTag {
        raw: String,
        expected: char,
        found: char,
    },

    #[error("'{raw}' has no numeric part after its tag")]
    NonNumeric { raw: String },
}

/// A parsed external identifier: one tag letter followed by digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalId {
    pub tag: char,
    pub number: i64,
}

impl ExternalId {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = raw.trim();
        let mut chars = raw.chars();
        let tag = chars.next().ok_or(IdentifierError::Empty)?;
        if !tag.is_ascii_alphabetic() {
            return Err(IdentifierError::MissingTag {
                raw: raw.to_string(),
            });
        }

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentifierError::NonNumeric {
                raw: raw.to_string(),
            });
        }
        // all-digit strings only fail to parse on overflow
        let number = digits.parse::<i64>().map_err(|_| IdentifierError::NonNumeric {
            raw: raw.to_string(),
        })?;

        Ok(Self {
            tag: tag.to_ascii_uppercase(),
            number,
        })
    }

    fn expect_tag(raw: &str, expected: char) -> Result<i64, IdentifierError> {
        let id = Self::parse(raw)?;
        if id.tag != expected {
            return Err(IdentifierError::UnexpectedTag {
                raw: raw.trim().to_string(),
                expected,
                found: id.tag,
            });
        }
        Ok(id.number)
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag, self.number)
    }
}

pub fn resolve_customer(raw: &str) -> Result<CustomerKey, IdentifierError> {
    ExternalId::expect_tag(raw, CUSTOMER_TAG).map(CustomerKey)
}

pub fn resolve_product(raw: &str) -> Result<ProductKey, IdentifierError> {
    ExternalId::expect_tag(raw, PRODUCT_TAG).map(ProductKey)
}
