//! # Cart Repository
//!
//! Carts with optimistic versioning. A save is one transaction:
//!
//! ```text
//! version == 0 ─▶ INSERT carts ... ON CONFLICT DO NOTHING   (0 rows → conflict)
//! version  > 0 ─▶ UPDATE carts SET version = version + 1
//!                  WHERE id = ? AND version = ?              (0 rows → conflict)
//!              ─▶ DELETE cart_lines; INSERT each line with its position
//!              ─▶ COMMIT
//! ```
//!
//! Line order is the `position` column, so a reloaded cart lists its lines
//! exactly as they were saved. Reads take the header and the lines inside one
//! transaction, so a cart never pairs one version with another's lines.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use storefront_core::{Cart, CartLine, CartOwner};
use storefront_engine::{CartStore, StoreResult};
use tracing::debug;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: String,
    owner: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self, lines: Vec<CartLine>) -> Cart {
        Cart {
            id: self.id,
            owner: CartOwner::from(self.owner),
            lines,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Repository for carts and their lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Loads a cart with its lines in saved order.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Cart>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CartRow>(
            "SELECT id, owner, version, created_at, updated_at FROM carts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, (String, i64)>(
            "SELECT product_id, quantity FROM cart_lines WHERE cart_id = ?1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(product_id, quantity)| CartLine::new(product_id, quantity))
        .collect();

        tx.commit().await?;
        Ok(Some(row.into_cart(lines)))
    }

    /// Saves `cart` if the stored version still equals `cart.version`.
    ///
    /// ## Returns
    /// The new version (`cart.version + 1`).
    ///
    /// ## Errors
    /// `DbError::VersionConflict` when another writer got there first, or
    /// when a version-0 cart already exists.
    pub async fn save(&self, cart: &Cart) -> DbResult<i64> {
        let new_version = cart.version + 1;
        let mut tx = self.pool.begin().await?;

        let result = if cart.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO carts (id, owner, version, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&cart.id)
            .bind(cart.owner.as_str())
            .bind(new_version)
            .bind(cart.created_at)
            .bind(cart.updated_at)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE carts
                SET owner = ?2, version = version + 1, updated_at = ?3
                WHERE id = ?1 AND version = ?4
                "#,
            )
            .bind(&cart.id)
            .bind(cart.owner.as_str())
            .bind(cart.updated_at)
            .bind(cart.version)
            .execute(&mut *tx)
            .await?
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(cart_id = %cart.id, expected = cart.version, "Cart version conflict");
            return Err(DbError::VersionConflict {
                id: cart.id.clone(),
                expected: cart.version,
            });
        }

        sqlx::query("DELETE FROM cart_lines WHERE cart_id = ?1")
            .bind(&cart.id)
            .execute(&mut *tx)
            .await?;

        for (position, line) in cart.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_lines (cart_id, product_id, quantity, position)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&cart.id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            cart_id = %cart.id,
            version = new_version,
            lines = cart.lines.len(),
            "Cart saved"
        );
        Ok(new_version)
    }

    /// Deletes a cart; its lines go with it.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM carts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every cart, oldest first.
    pub async fn list(&self) -> DbResult<Vec<Cart>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, CartRow>(
            "SELECT id, owner, version, created_at, updated_at FROM carts \
             ORDER BY created_at, id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut lines: HashMap<String, Vec<CartLine>> = HashMap::new();
        let all_lines = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT cart_id, product_id, quantity FROM cart_lines ORDER BY cart_id, position",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        for (cart_id, product_id, quantity) in all_lines {
            lines
                .entry(cart_id)
                .or_default()
                .push(CartLine::new(product_id, quantity));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let cart_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_cart(cart_lines)
            })
            .collect())
    }
}

#[async_trait]
impl CartStore for CartRepository {
    async fn find_cart(&self, id: &str) -> StoreResult<Option<Cart>> {
        Ok(self.get_by_id(id).await?)
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<i64> {
        Ok(self.save(cart).await?)
    }

    async fn delete_cart(&self, id: &str) -> StoreResult<bool> {
        Ok(self.delete(id).await?)
    }

    async fn list_carts(&self) -> StoreResult<Vec<Cart>> {
        Ok(self.list().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
