//! Loading the cart at checkout time.

use tracing::debug;

use orderline_core::UserId;

use crate::error::CheckoutError;
use crate::models::CheckoutLine;
use crate::store::{CartQueries, Store};
use crate::unit_of_work::UnitOfWork;

/// Read the user's cart joined with current product price and stock.
///
/// # Errors
///
/// `EmptyCart` if the cart has no lines, `ProductUnavailable` if a line's
/// product has been deactivated, or a store error.
pub async fn load_for_checkout<S: Store>(
    uow: &mut UnitOfWork<S>,
    user_id: UserId,
) -> Result<Vec<CheckoutLine>, CheckoutError> {
    let lines = uow.transaction()?.checkout_lines(user_id).await?;

    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if let Some(line) = lines.iter().find(|line| !line.product.is_active) {
        return Err(CheckoutError::ProductUnavailable {
            product_id: line.product.id,
        });
    }

    debug!(lines = lines.len(), "Cart snapshot loaded");
    Ok(lines)
}
