//! Orderline Core - Shared domain types.
//!
//! This crate provides the value types used across all Orderline components:
//! - `engine` - Checkout transaction engine and order service
//! - `cli` - Command-line tools for migrations, seeding and checkout runs
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no async runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, order numbers,
//!   shipping addresses and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
