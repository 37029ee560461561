//! Human-readable order numbers.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    /// The input does not start with the `ORD-` prefix.
    #[error("order number must start with {prefix}")]
    MissingPrefix {
        /// Expected prefix.
        prefix: &'static str,
    },
    /// The date segment is not a valid `YYYYMMDD` date.
    #[error("order number has an invalid date segment: {0}")]
    InvalidDate(String),
    /// The sequence segment is not a positive number of at least four digits.
    #[error("order number has an invalid sequence segment: {0}")]
    InvalidSequence(String),
}

/// An order number of the form `ORD-YYYYMMDD-NNNN`.
///
/// `YYYYMMDD` is the UTC date the order was placed and `NNNN` the
/// zero-padded, one-based sequence of that order within the day. Sequences
/// above 9999 are written with as many digits as they need.
///
/// ```
/// use chrono::NaiveDate;
/// use orderline_core::OrderNumber;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// let number = OrderNumber::new(date, 7);
/// assert_eq!(number.as_str(), "ORD-20240309-0007");
/// assert_eq!(OrderNumber::parse("ORD-20240309-0007").unwrap(), number);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Prefix shared by every order number.
    pub const PREFIX: &'static str = "ORD-";

    /// Format the order number for a date and one-based daily sequence.
    #[must_use]
    pub fn new(date: NaiveDate, sequence: u32) -> Self {
        Self(format!(
            "{}{}-{sequence:04}",
            Self::PREFIX,
            date.format("%Y%m%d")
        ))
    }

    /// Parse and validate an order number.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix, the date or the sequence segment is malformed.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let rest = s.strip_prefix(Self::PREFIX).ok_or(OrderNumberError::MissingPrefix {
            prefix: Self::PREFIX,
        })?;

        let (date, sequence) = rest
            .split_once('-')
            .ok_or_else(|| OrderNumberError::InvalidSequence(rest.to_owned()))?;

        if date.len() != 8 || NaiveDate::parse_from_str(date, "%Y%m%d").is_err() {
            return Err(OrderNumberError::InvalidDate(date.to_owned()));
        }

        let valid_sequence = sequence.len() >= 4
            && sequence.bytes().all(|b| b.is_ascii_digit())
            && sequence.parse::<u32>().is_ok_and(|n| n > 0);
        if !valid_sequence {
            return Err(OrderNumberError::InvalidSequence(sequence.to_owned()));
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `OrderNumber` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
    }

    #[test]
    fn test_first_order_of_the_day() {
        assert_eq!(OrderNumber::new(date(), 1).as_str(), "ORD-20260131-0001");
    }

    #[test]
    fn test_sequence_widens_past_four_digits() {
        assert_eq!(OrderNumber::new(date(), 12345).as_str(), "ORD-20260131-12345");
    }

    #[test]
    fn test_parse_rejects_malformed_numbers() {
        assert!(matches!(
            OrderNumber::parse("20260131-0001"),
            Err(OrderNumberError::MissingPrefix { .. })
        ));
        assert!(matches!(
            OrderNumber::parse("ORD-20261341-0001"),
            Err(OrderNumberError::InvalidDate(_))
        ));
        assert!(matches!(
            OrderNumber::parse("ORD-20260131-01"),
            Err(OrderNumberError::InvalidSequence(_))
        ));
        assert!(matches!(
            OrderNumber::parse("ORD-20260131-0000"),
            Err(OrderNumberError::InvalidSequence(_))
        ));
        assert!(matches!(
            OrderNumber::parse("ORD-20260131"),
            Err(OrderNumberError::InvalidSequence(_))
        ));
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&OrderNumber::new(date(), 2)).unwrap();
        assert_eq!(json, "\"ORD-20260131-0002\"");
        assert!(serde_json::from_str::<OrderNumber>("\"nope\"").is_err());
    }
}
