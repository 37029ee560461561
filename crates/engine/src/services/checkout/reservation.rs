//! Stock reservation.
//!
//! Each line is checked against the snapshot first, then reserved with a
//! conditional decrement that only succeeds if the stock is still there at
//! write time. Decrements stay uncommitted until the checkout commits, so a
//! later failure undoes every earlier reservation.

use tracing::{debug, info};

use crate::error::CheckoutError;
use crate::models::{CheckoutLine, Product};
use crate::store::{StockLedger, Store, Table};
use crate::unit_of_work::UnitOfWork;

/// Reserve stock for every line, stopping at the first shortfall.
///
/// # Errors
///
/// `InsufficientStock` for the first line that cannot be covered, or a store
/// error.
pub async fn reserve_stock<S: Store>(
    uow: &mut UnitOfWork<S>,
    lines: &[CheckoutLine],
) -> Result<(), CheckoutError> {
    let tx = uow.transaction()?;
    for line in lines {
        reserve_line(tx, line).await?;
    }
    Ok(())
}

async fn reserve_line<T>(tx: &mut T, line: &CheckoutLine) -> Result<(), CheckoutError>
where
    T: StockLedger + Table<Product>,
{
    let product_id = line.product.id;
    let requested = line.requested();

    if requested > line.product.stock_quantity {
        return Err(CheckoutError::InsufficientStock {
            product_id,
            requested,
            available: line.product.stock_quantity,
        });
    }

    if tx.decrement_stock(product_id, requested).await? {
        debug!(%product_id, requested, "Stock reserved");
        return Ok(());
    }

    // Another checkout took the stock after the snapshot was read.
    let available = Table::<Product>::find(tx, product_id)
        .await?
        .map_or(0, |product| product.stock_quantity);
    info!(%product_id, requested, available, "Lost stock race");
    Err(CheckoutError::InsufficientStock {
        product_id,
        requested,
        available,
    })
}
