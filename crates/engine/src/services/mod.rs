//! Business logic layer.
//!
//! - [`checkout`] - Turns a cart into a committed order
//! - [`orders`] - Order lookups, fulfilment status and cancellation
//! - [`events`] - Notifications published after checkout commits

pub mod checkout;
pub mod events;
pub mod orders;
