//! Shared fixtures for unit tests.

use chrono::Utc;
use storefront_core::Product;

/// An active product with the given id, price and stock.
pub(crate) fn product(id: &str, price_cents: i64, stock: i64) -> Product {
    let now = Utc::now();
    Product {
        id: id.to_string(),
        code: format!("CODE-{}", id.to_uppercase()),
        title: format!("Product {}", id),
        description: format!("Description of {}", id),
        price_cents,
        stock,
        category: "general".to_string(),
        is_active: true,
        thumbnails: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}
