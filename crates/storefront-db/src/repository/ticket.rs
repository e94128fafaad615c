//! # Ticket Repository
//!
//! Persists finished purchases. A ticket row holds the header and the failed
//! lines (JSON); purchased lines go to `ticket_lines` in cart order.
//! Tickets are written once and never updated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use storefront_core::{PurchaseResult, PurchasedLine};
use storefront_engine::{PurchaseSink, StoreResult};
use tracing::info;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    code: String,
    cart_id: String,
    purchaser: String,
    amount_cents: i64,
    failed_lines: String,
    purchased_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct TicketLineRow {
    product_id: String,
    title: String,
    unit_price_cents: i64,
    quantity: i64,
    line_total_cents: i64,
}

impl From<TicketLineRow> for PurchasedLine {
    fn from(row: TicketLineRow) -> Self {
        PurchasedLine {
            product_id: row.product_id,
            title: row.title,
            unit_price_cents: row.unit_price_cents,
            quantity: row.quantity,
            line_total_cents: row.line_total_cents,
        }
    }
}

/// Repository for purchase tickets.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Writes a ticket and its purchased lines in one transaction.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the ticket code was already used.
    pub async fn insert(&self, ticket: &PurchaseResult) -> DbResult<()> {
        let failed = serde_json::to_string(&ticket.failed)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tickets (code, cart_id, purchaser, amount_cents, failed_lines, purchased_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&ticket.ticket_code)
        .bind(&ticket.cart_id)
        .bind(&ticket.purchaser)
        .bind(ticket.total_cents)
        .bind(failed)
        .bind(ticket.purchased_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("ticket_code", &ticket.ticket_code)
            }
            other => other,
        })?;

        for (position, line) in ticket.purchased.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO ticket_lines (
                    ticket_code, position, product_id, title,
                    unit_price_cents, quantity, line_total_cents
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&ticket.ticket_code)
            .bind(position as i64)
            .bind(&line.product_id)
            .bind(&line.title)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .bind(line.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            ticket = %ticket.ticket_code,
            purchaser = %ticket.purchaser,
            amount_cents = ticket.total_cents,
            "Ticket recorded"
        );
        Ok(())
    }

    /// Loads a ticket by its code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<PurchaseResult>> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT code, cart_id, purchaser, amount_cents, failed_lines, purchased_at \
             FROM tickets WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// All tickets of one purchaser, newest first.
    pub async fn list_for_purchaser(&self, purchaser: &str) -> DbResult<Vec<PurchaseResult>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            "SELECT code, cart_id, purchaser, amount_cents, failed_lines, purchased_at \
             FROM tickets WHERE purchaser = ?1 ORDER BY purchased_at DESC, code",
        )
        .bind(purchaser)
        .fetch_all(&self.pool)
        .await?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in rows {
            tickets.push(self.hydrate(row).await?);
        }
        Ok(tickets)
    }

    async fn hydrate(&self, row: TicketRow) -> DbResult<PurchaseResult> {
        let purchased = sqlx::query_as::<_, TicketLineRow>(
            "SELECT product_id, title, unit_price_cents, quantity, line_total_cents \
             FROM ticket_lines WHERE ticket_code = ?1 ORDER BY position",
        )
        .bind(&row.code)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PurchasedLine::from)
        .collect();

        Ok(PurchaseResult {
            ticket_code: row.code,
            cart_id: row.cart_id,
            purchaser: row.purchaser,
            total_cents: row.amount_cents,
            purchased,
            failed: serde_json::from_str(&row.failed_lines)?,
            purchased_at: row.purchased_at,
        })
    }
}

#[async_trait]
impl PurchaseSink for TicketRepository {
    async fn record_purchase(&self, result: &PurchaseResult) -> StoreResult<()> {
        Ok(self.insert(result).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use storefront_core::{FailedLine, FailureReason};

    fn ticket(code: &str, purchaser: &str, at: DateTime<Utc>) -> PurchaseResult {
        PurchaseResult::new(
            code.to_string(),
            "c-1".to_string(),
            purchaser.to_string(),
            vec![
                PurchasedLine {
                    product_id: "a".into(),
                    title: "Mate gourd".into(),
                    unit_price_cents: 1200,
                    quantity: 2,
                    line_total_cents: 2400,
                },
                PurchasedLine {
                    product_id: "b".into(),
                    title: "Bombilla".into(),
                    unit_price_cents: 800,
                    quantity: 1,
                    line_total_cents: 800,
                },
            ],
            vec![FailedLine {
                product_id: "c".into(),
                quantity: 3,
                reason: FailureReason::InsufficientStock { available: 1 },
            }],
            at,
        )
    }

    async fn repo() -> TicketRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().tickets()
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let repo = repo().await;
        let t = ticket("T-1", "ana@example.com", Utc::now());
        repo.insert(&t).await.unwrap();

        let loaded = repo.get_by_code("T-1").await.unwrap().unwrap();
        assert_eq!(loaded.total_cents, 3200);
        assert_eq!(loaded.purchased, t.purchased);
        assert_eq!(loaded.failed, t.failed);
        assert!(repo.get_by_code("T-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ticket_code_is_unique() {
        let repo = repo().await;
        let t = ticket("T-1", "ana@example.com", Utc::now());
        repo.insert(&t).await.unwrap();

        assert!(matches!(
            repo.insert(&t).await,
            Err(DbError::UniqueViolation { ref field, .. }) if field == "ticket_code"
        ));
    }

    #[tokio::test]
    async fn test_list_for_purchaser_newest_first() {
        let repo = repo().await;
        let now = Utc::now();
        repo.insert(&ticket("T-1", "ana", now)).await.unwrap();
        repo.insert(&ticket("T-2", "ana", now + chrono::Duration::seconds(5)))
            .await
            .unwrap();
        repo.insert(&ticket("T-3", "bob", now)).await.unwrap();

        let codes: Vec<String> = repo
            .list_for_purchaser("ana")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.ticket_code)
            .collect();
        assert_eq!(codes, vec!["T-2", "T-1"]);
    }
}
