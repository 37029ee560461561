//! Shipping address captured on an order.

use serde::{Deserialize, Serialize};

/// Errors that can occur when validating a [`ShippingAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is empty or whitespace.
    #[error("{field} is required")]
    Missing {
        /// Field name.
        field: &'static str,
    },
    /// A field exceeds its column length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Where an order ships to.
///
/// Field limits mirror the `orders` table columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Maximum length of each name field.
    pub const MAX_NAME_LENGTH: usize = 50;
    /// Maximum length of each street line.
    pub const MAX_LINE_LENGTH: usize = 200;
    /// Maximum length of city, state and country.
    pub const MAX_REGION_LENGTH: usize = 100;
    /// Maximum length of the postal code.
    pub const MAX_POSTAL_CODE_LENGTH: usize = 20;

    /// Check every field against its requirements.
    ///
    /// # Errors
    ///
    /// Returns the first field that is missing or too long.
    pub fn validate(&self) -> Result<(), AddressError> {
        required("first_name", &self.first_name, Self::MAX_NAME_LENGTH)?;
        required("last_name", &self.last_name, Self::MAX_NAME_LENGTH)?;
        required("address_line1", &self.address_line1, Self::MAX_LINE_LENGTH)?;
        if let Some(line2) = &self.address_line2 {
            max_length("address_line2", line2, Self::MAX_LINE_LENGTH)?;
        }
        required("city", &self.city, Self::MAX_REGION_LENGTH)?;
        required("state", &self.state, Self::MAX_REGION_LENGTH)?;
        required("postal_code", &self.postal_code, Self::MAX_POSTAL_CODE_LENGTH)?;
        required("country", &self.country, Self::MAX_REGION_LENGTH)?;
        Ok(())
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<(), AddressError> {
    if value.trim().is_empty() {
        return Err(AddressError::Missing { field });
    }
    max_length(field, value, max)
}

fn max_length(field: &'static str, value: &str, max: usize) -> Result<(), AddressError> {
    if value.chars().count() > max {
        return Err(AddressError::TooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            address_line1: "12 St James's Square".to_owned(),
            address_line2: None,
            city: "London".to_owned(),
            state: "Greater London".to_owned(),
            postal_code: "SW1Y 4JH".to_owned(),
            country: "GB".to_owned(),
        }
    }

    #[test]
    fn test_valid_address() {
        assert_eq!(address().validate(), Ok(()));
    }

    #[test]
    fn test_blank_required_field() {
        let mut a = address();
        a.city = "   ".to_owned();
        assert_eq!(a.validate(), Err(AddressError::Missing { field: "city" }));
    }

    #[test]
    fn test_field_too_long() {
        let mut a = address();
        a.postal_code = "9".repeat(21);
        assert_eq!(
            a.validate(),
            Err(AddressError::TooLong {
                field: "postal_code",
                max: 20
            })
        );
    }

    #[test]
    fn test_optional_line_is_length_checked() {
        let mut a = address();
        a.address_line2 = Some("x".repeat(201));
        assert!(matches!(
            a.validate(),
            Err(AddressError::TooLong {
                field: "address_line2",
                ..
            })
        ));
    }
}
