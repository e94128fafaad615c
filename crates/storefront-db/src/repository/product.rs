//! # Product Repository
//!
//! Catalog storage and the conditional stock decrement.
//!
//! ## The Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products                                                        │
//! │     SET stock = stock - :qty                                            │
//! │   WHERE id = :id AND stock >= :qty     ← check and write in ONE stmt   │
//! │  RETURNING ...                          ← row only when it applied     │
//! │                                                                         │
//! │  Checkout A (qty 3) ──┐                                                 │
//! │                       ├─▶ stock 5 ─▶ A: 2 left, B: no row (short)       │
//! │  Checkout B (qty 3) ──┘                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite serializes writers, so the `WHERE` sees the latest committed stock
//! and two checkouts can never both pass it for the same units.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use storefront_core::{PriceSort, Product, ProductQuery};
use storefront_engine::{CatalogAdminStore, CatalogStore, StoreResult};
use tracing::debug;

use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, code, title, description, price_cents, stock, category, \
     is_active, thumbnails, created_at, updated_at";

/// Raw `products` row; thumbnails are a JSON array in a TEXT column.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    code: String,
    title: String,
    description: String,
    price_cents: i64,
    stock: i64,
    category: String,
    is_active: bool,
    thumbnails: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            code: row.code,
            title: row.title,
            description: row.description,
            price_cents: row.price_cents,
            stock: row.stock,
            category: row.category,
            is_active: row.is_active,
            thumbnails: serde_json::from_str(&row.thumbnails)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);

        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Gets a product by its code (stored upper-case).
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE code = ?1", PRODUCT_COLUMNS);

        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Inserts a new product.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when the code (or id) is taken.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, code = %product.code, "Inserting product");

        let thumbnails = serde_json::to_string(&product.thumbnails)?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, code, title, description, price_cents, stock, category,
                is_active, thumbnails, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.code)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(&product.category)
        .bind(product.is_active)
        .bind(thumbnails)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_on_product(e, product))?;

        Ok(())
    }

    /// Overwrites every column of an existing product.
    ///
    /// Returns false if no row had that id.
    pub async fn update(&self, product: &Product) -> DbResult<bool> {
        debug!(id = %product.id, "Updating product");

        let thumbnails = serde_json::to_string(&product.thumbnails)?;

        let result = sqlx::query(
            r#"
            UPDATE products SET
                code = ?2,
                title = ?3,
                description = ?4,
                price_cents = ?5,
                stock = ?6,
                category = ?7,
                is_active = ?8,
                thumbnails = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.code)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(&product.category)
        .bind(product.is_active)
        .bind(thumbnails)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_on_product(e, product))?;

        Ok(result.rows_affected() > 0)
    }

    /// Hard delete. Cart lines pointing at the product are left alone.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Takes `quantity` units when at least that many are in stock.
    ///
    /// Returns the updated product, or `None` when the product is missing or
    /// short. Never reads before writing.
    pub async fn decrement_stock(&self, id: &str, quantity: i64) -> DbResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET stock = stock - ?2, updated_at = ?3 \
             WHERE id = ?1 AND stock >= ?2 RETURNING {}",
            PRODUCT_COLUMNS
        );

        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .bind(quantity)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let product = Product::try_from(row)?;
                debug!(id = %id, quantity, stock = product.stock, "Stock decremented");
                Ok(Some(product))
            }
            None => {
                debug!(id = %id, quantity, "Stock decrement refused");
                Ok(None)
            }
        }
    }

    /// Current stock, `None` for a missing product.
    pub async fn stock_of(&self, id: &str) -> DbResult<Option<i64>> {
        let stock = sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(stock)
    }

    /// One page of products matching `query`, plus the total match count.
    ///
    /// Without a price sort, products come back in insertion order.
    pub async fn list(&self, query: &ProductQuery) -> DbResult<(Vec<Product>, u64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM products", PRODUCT_COLUMNS));
        push_filters(&mut select, query);

        select.push(match query.sort {
            Some(PriceSort::Asc) => " ORDER BY price_cents ASC, rowid ASC",
            Some(PriceSort::Desc) => " ORDER BY price_cents DESC, rowid ASC",
            None => " ORDER BY rowid ASC",
        });
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset()));

        let products = select
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Product::try_from)
            .collect::<DbResult<Vec<_>>>()?;

        Ok((products, total.max(0) as u64))
    }
}

/// Appends the WHERE clause shared by the count and the page query.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ProductQuery) {
    qb.push(" WHERE 1 = 1");

    if let Some(category) = &query.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }

    if let Some(active) = query.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }

    if let Some(term) = query.search.as_deref().map(str::trim) {
        if !term.is_empty() {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            qb.push(" AND (LOWER(title) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(description) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(category) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
    }
}

/// Escapes LIKE wildcards so search text matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Attaches the offending value to a unique violation on `products`.
fn unique_on_product(err: sqlx::Error, product: &Product) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { field, .. } if field.ends_with("code") => {
            DbError::duplicate("code", &product.code)
        }
        DbError::UniqueViolation { .. } => DbError::duplicate("id", &product.id),
        other => other,
    }
}

// =============================================================================
// Store Ports
// =============================================================================

#[async_trait]
impl CatalogStore for ProductRepository {
    async fn find_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.get_by_id(id).await?)
    }

    async fn decrement_stock_if_available(
        &self,
        id: &str,
        quantity: i64,
    ) -> StoreResult<Option<Product>> {
        Ok(self.decrement_stock(id, quantity).await?)
    }

    async fn current_stock(&self, id: &str) -> StoreResult<Option<i64>> {
        Ok(self.stock_of(id).await?)
    }
}

#[async_trait]
impl CatalogAdminStore for ProductRepository {
    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        Ok(self.insert(product).await?)
    }

    async fn update_product(&self, product: &Product) -> StoreResult<bool> {
        Ok(self.update(product).await?)
    }

    async fn delete_product(&self, id: &str) -> StoreResult<bool> {
        Ok(self.delete(id).await?)
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Product>> {
        Ok(self.get_by_code(code).await?)
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<(Vec<Product>, u64)> {
        Ok(self.list(query).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use storefront_core::NewProduct;

    fn product(n: u32, price_cents: i64, stock: i64, category: &str) -> Product {
        NewProduct {
            title: format!("Yerba {}", n),
            description: "Loose leaf, 500g".to_string(),
            code: format!("yb-{}", n),
            price_cents,
            stock,
            category: category.to_string(),
            thumbnails: vec![format!("https://img.example/{}.png", n)],
            is_active: None,
        }
        .into_product(format!("p-{}", n), Utc::now())
    }

    async fn repo() -> ProductRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().products()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = repo().await;
        let p = product(1, 450, 7, "tea");
        repo.insert(&p).await.unwrap();

        let loaded = repo.get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(loaded.code, "YB-1");
        assert_eq!(loaded.thumbnails, p.thumbnails);
        assert!(loaded.is_active);
        assert_eq!(repo.get_by_code("YB-1").await.unwrap().unwrap().id, "p-1");
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code() {
        let repo = repo().await;
        repo.insert(&product(1, 100, 1, "tea")).await.unwrap();

        let mut dup = product(2, 100, 1, "tea");
        dup.code = "YB-1".to_string();

        match repo.insert(&dup).await {
            Err(DbError::UniqueViolation { field, value }) => {
                assert_eq!(field, "code");
                assert_eq!(value, "YB-1");
            }
            other => panic!("expected unique violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decrement_only_when_available() {
        let repo = repo().await;
        repo.insert(&product(1, 100, 5, "tea")).await.unwrap();

        let after = repo.decrement_stock("p-1", 3).await.unwrap().unwrap();
        assert_eq!(after.stock, 2);

        assert!(repo.decrement_stock("p-1", 3).await.unwrap().is_none());
        assert_eq!(repo.stock_of("p-1").await.unwrap(), Some(2));

        assert!(repo.decrement_stock("missing", 1).await.unwrap().is_none());
        assert_eq!(repo.stock_of("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo().await;
        let mut p = product(1, 100, 5, "tea");
        repo.insert(&p).await.unwrap();

        p.price_cents = 250;
        p.is_active = false;
        assert!(repo.update(&p).await.unwrap());
        let loaded = repo.get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(loaded.price_cents, 250);
        assert!(!loaded.is_active);

        assert!(repo.delete("p-1").await.unwrap());
        assert!(!repo.delete("p-1").await.unwrap());
        assert!(!repo.update(&p).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_sort_and_pages() {
        let repo = repo().await;
        repo.insert(&product(1, 300, 1, "tea")).await.unwrap();
        repo.insert(&product(2, 100, 1, "mugs")).await.unwrap();
        repo.insert(&product(3, 200, 1, "tea")).await.unwrap();
        let mut inactive = product(4, 50, 1, "tea");
        inactive.is_active = false;
        repo.insert(&inactive).await.unwrap();

        // Insertion order without a sort.
        let (all, total) = repo.list(&ProductQuery::default()).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(
            all.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p-1", "p-2", "p-3", "p-4"]
        );

        let query = ProductQuery {
            category: Some("tea".into()),
            is_active: Some(true),
            sort: Some(PriceSort::Desc),
            limit: 1,
            page: 2,
            ..Default::default()
        };
        let (page, total) = repo.list(&query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].price_cents, 200);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_literal() {
        let repo = repo().await;
        repo.insert(&product(1, 100, 1, "tea")).await.unwrap();
        let mut odd = product(2, 100, 1, "tea");
        odd.title = "100% Mate".to_string();
        repo.insert(&odd).await.unwrap();

        let search = |s: &str| ProductQuery {
            search: Some(s.to_string()),
            ..Default::default()
        };

        assert_eq!(repo.list(&search("YERBA")).await.unwrap().1, 1);
        assert_eq!(repo.list(&search("loose LEAF")).await.unwrap().1, 2);
        assert_eq!(repo.list(&search("0%")).await.unwrap().0[0].id, "p-2");
        assert_eq!(repo.list(&search("%")).await.unwrap().1, 1);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
