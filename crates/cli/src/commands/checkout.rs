//! Quote and place orders from the command line.

use orderline_core::{ShippingAddress, UserId};
use orderline_engine::{CheckoutService, EngineConfig, PlaceOrderRequest};

use super::{connect, print_json};

/// Print the totals for the user's current cart.
///
/// # Errors
///
/// Returns an error if the cart is empty or the store fails.
pub async fn quote(config: &EngineConfig, user_id: UserId) -> Result<(), Box<dyn std::error::Error>> {
    let service = CheckoutService::new(connect(config).await?, config.checkout);
    let totals = service.quote(user_id).await?;
    print_json(&totals)?;
    Ok(())
}

/// Place an order and print it.
///
/// # Errors
///
/// Returns the checkout error, with its client-facing message for problems
/// the user can fix.
pub async fn place(
    config: &EngineConfig,
    user_id: UserId,
    shipping_address: ShippingAddress,
    notes: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = CheckoutService::new(connect(config).await?, config.checkout);

    let mut request = PlaceOrderRequest::new(shipping_address);
    request.notes = notes;

    match service.place_order(user_id, request).await {
        Ok(placed) => {
            print_json(&placed)?;
            Ok(())
        }
        Err(err) if err.is_client_error() => Err(format!(
            "{} ({})",
            err.client_message(),
            err.status_code()
        )
        .into()),
        Err(err) => Err(err.into()),
    }
}
