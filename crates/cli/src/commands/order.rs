//! Order inspection and fulfilment commands.

use orderline_core::{OrderId, OrderNumber, OrderStatus, UserId};
use orderline_engine::{EngineConfig, OrderService};

use super::{connect, print_json};

/// Print an order and its lines.
///
/// # Errors
///
/// Returns an error if the order does not exist or the store fails.
pub async fn show(
    config: &EngineConfig,
    number: &OrderNumber,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = OrderService::new(connect(config).await?);
    print_json(&service.get_order_by_number(number).await?)?;
    Ok(())
}

/// Print a user's orders.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list(config: &EngineConfig, user_id: UserId) -> Result<(), Box<dyn std::error::Error>> {
    let service = OrderService::new(connect(config).await?);
    print_json(&service.orders_for_user(user_id).await?)?;
    Ok(())
}

/// Cancel an order.
///
/// # Errors
///
/// Returns an error if the order is missing, already past the point of
/// cancellation, or the store fails.
pub async fn cancel(config: &EngineConfig, id: OrderId) -> Result<(), Box<dyn std::error::Error>> {
    let service = OrderService::new(connect(config).await?);
    print_json(&service.cancel_order(id).await?)?;
    Ok(())
}

/// Move an order to `status`.
///
/// # Errors
///
/// Returns an error if the order is missing or the store fails.
pub async fn set_status(
    config: &EngineConfig,
    id: OrderId,
    status: OrderStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = OrderService::new(connect(config).await?);
    print_json(&service.update_status(id, status).await?)?;
    Ok(())
}
