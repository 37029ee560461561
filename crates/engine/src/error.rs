//! Checkout errors and their classification.
//!
//! Every [`CheckoutError`] is either a client problem the user can correct
//! (edit the cart, fix the address) or a system problem. Boundary layers use
//! [`CheckoutError::status_code`] and [`CheckoutError::client_message`] so
//! that the distinction survives and internal details do not leak.

use std::time::Duration;

use thiserror::Error;

use orderline_core::{AddressError, ProductId};

use crate::store::{ORDER_NUMBER_CONSTRAINT, StoreError};

/// Who can fix an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller's input or cart is at fault.
    Client,
    /// The engine or its store is at fault.
    System,
}

/// Why a checkout did not produce an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user's cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line asks for more than is in stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// A cart line's product is no longer sold.
    #[error("Product {product_id} is no longer available")]
    ProductUnavailable { product_id: ProductId },

    /// The shipping address failed validation.
    #[error("Invalid shipping address: {0}")]
    InvalidShippingAddress(#[from] AddressError),

    /// Order notes exceed the stored length.
    #[error("Order notes must be at most {max} characters")]
    NotesTooLong { max: usize },

    /// The minted order number collided twice.
    #[error("Order number already taken")]
    DuplicateOrderNumber,

    /// A transaction was begun twice on the same unit of work.
    #[error("A transaction is already active")]
    TransactionAlreadyActive,

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The checkout did not finish within its deadline.
    #[error("Checkout timed out after {0:?}")]
    TimedOut(Duration),

    /// Anything else.
    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl CheckoutError {
    /// Who can fix this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyCart
            | Self::InsufficientStock { .. }
            | Self::ProductUnavailable { .. }
            | Self::InvalidShippingAddress(_)
            | Self::NotesTooLong { .. } => ErrorClass::Client,
            Self::DuplicateOrderNumber
            | Self::TransactionAlreadyActive
            | Self::StoreUnavailable(_)
            | Self::TimedOut(_)
            | Self::Unknown(_) => ErrorClass::System,
        }
    }

    /// Whether the error is the caller's to fix.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self.class(), ErrorClass::Client)
    }

    /// Whether the same request may succeed if tried again unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateOrderNumber | Self::StoreUnavailable(_) | Self::TimedOut(_)
        )
    }

    /// HTTP status a boundary layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::EmptyCart | Self::NotesTooLong { .. } => 400,
            Self::InsufficientStock { .. } | Self::ProductUnavailable { .. } => 409,
            Self::InvalidShippingAddress(_) => 422,
            Self::DuplicateOrderNumber | Self::StoreUnavailable(_) => 503,
            Self::TimedOut(_) => 504,
            Self::TransactionAlreadyActive | Self::Unknown(_) => 500,
        }
    }

    /// Message safe to show an end user.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::DuplicateOrderNumber | Self::StoreUnavailable(_) | Self::TimedOut(_) => {
                "Checkout is temporarily unavailable, please try again".to_string()
            }
            Self::TransactionAlreadyActive | Self::Unknown(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Send system errors to Sentry.
    pub(crate) fn report(&self) {
        if self.class() == ErrorClass::System {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Checkout failed"
            );
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TransactionAlreadyActive => Self::TransactionAlreadyActive,
            ref e if e.is_unique_violation_of(ORDER_NUMBER_CONSTRAINT) => {
                Self::DuplicateOrderNumber
            }
            ref e if e.is_transient() => Self::StoreUnavailable(e.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_problems_are_client_errors() {
        let err = CheckoutError::InsufficientStock {
            product_id: ProductId::generate(),
            requested: 6,
            available: 5,
        };
        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.status_code(), 409);
        assert!(!err.is_retryable());
        assert!(err.client_message().contains("requested 6, available 5"));

        assert_eq!(CheckoutError::EmptyCart.status_code(), 400);
    }

    #[test]
    fn test_system_errors_hide_details() {
        let err = CheckoutError::Unknown("relation \"orders\" does not exist".to_string());
        assert_eq!(err.class(), ErrorClass::System);
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_store_errors_map_to_checkout_errors() {
        let dup = CheckoutError::from(StoreError::UniqueViolation {
            constraint: ORDER_NUMBER_CONSTRAINT.to_string(),
        });
        assert!(matches!(dup, CheckoutError::DuplicateOrderNumber));
        assert!(dup.is_retryable());

        let down = CheckoutError::from(StoreError::Unavailable("connection reset".to_string()));
        assert!(matches!(down, CheckoutError::StoreUnavailable(_)));
        assert_eq!(down.status_code(), 503);

        let busy = CheckoutError::from(StoreError::TransactionAlreadyActive);
        assert!(matches!(busy, CheckoutError::TransactionAlreadyActive));

        let other = CheckoutError::from(StoreError::DataCorruption("bad row".to_string()));
        assert!(matches!(other, CheckoutError::Unknown(_)));
    }

    #[test]
    fn test_timeout_is_gateway_timeout() {
        let err = CheckoutError::TimedOut(Duration::from_secs(30));
        assert_eq!(err.class(), ErrorClass::System);
        assert_eq!(err.status_code(), 504);
        assert!(err.is_retryable());
    }
}
