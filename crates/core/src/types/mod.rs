//! Core types for Orderline.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod id;
pub mod money;
pub mod order_number;
pub mod status;

pub use address::{AddressError, ShippingAddress};
pub use id::*;
pub use money::Money;
pub use order_number::{OrderNumber, OrderNumberError};
pub use status::*;
