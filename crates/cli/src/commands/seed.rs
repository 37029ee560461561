//! Seed the catalog with sample products and fill a sample cart.
//!
//! Seeding is idempotent: products whose SKU already exists are left alone.

use tracing::info;

use orderline_core::{Money, UserId};
use orderline_engine::models::{CartLine, Product};
use orderline_engine::store::Entity;
use orderline_engine::{EngineConfig, Store, StoreError, UnitOfWork};

/// Name, SKU, price in cents, stock.
const CATALOG: &[(&str, &str, i64, i32)] = &[
    ("Espresso Beans 1kg", "BEAN-ESP-1KG", 2400, 40),
    ("Pour-over Kettle", "KTL-PO-1L", 4500, 10),
    ("Paper Filters (100)", "FLT-100", 500, 200),
    ("Ceramic Dripper", "DRP-CER", 2200, 5),
];

/// SKU and quantity of each sample cart line.
const SAMPLE_CART: &[(&str, i32)] = &[("BEAN-ESP-1KG", 2), ("FLT-100", 1)];

/// Seed the configured database.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a write fails.
pub async fn run(
    config: &EngineConfig,
    user: Option<UserId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::connect(config).await?;
    let products = catalog(&store).await?;
    if let Some(user_id) = user {
        sample_cart(&store, user_id, &products).await?;
    }
    Ok(())
}

/// Insert any missing catalog products and return the whole catalog.
///
/// # Errors
///
/// Returns a store error if a read or write fails.
pub async fn catalog<S: Store>(store: &S) -> Result<Vec<Product>, StoreError> {
    let mut uow = UnitOfWork::new(store.clone());
    let mut products: Vec<Product> = uow.get_all().await?;

    let mut added = 0;
    for &(name, sku, cents, stock) in CATALOG {
        if products.iter().any(|p| p.sku == sku) {
            continue;
        }
        products.push(uow.add(Product::new(name, sku, Money::from_cents(cents), stock)));
        added += 1;
    }

    uow.persist().await?;
    info!(added, total = products.len(), "Catalog seeded");
    Ok(products)
}

/// Put the sample lines in a user's cart.
///
/// # Errors
///
/// Returns a store error if a product is missing or the cart already holds
/// one of the products.
pub async fn sample_cart<S: Store>(
    store: &S,
    user_id: UserId,
    products: &[Product],
) -> Result<Vec<CartLine>, StoreError> {
    let mut uow = UnitOfWork::new(store.clone());

    let mut lines = Vec::with_capacity(SAMPLE_CART.len());
    for &(sku, quantity) in SAMPLE_CART {
        let product = products
            .iter()
            .find(|p| p.sku == sku)
            .ok_or_else(|| StoreError::NotFound {
                kind: Product::KIND,
                id: sku.to_string(),
            })?;
        lines.push(uow.add(CartLine::new(user_id, product.id, quantity)));
    }

    uow.persist().await?;
    info!(%user_id, lines = lines.len(), "Cart seeded");
    Ok(lines)
}
