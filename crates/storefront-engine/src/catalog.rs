//! # Catalog Service
//!
//! Product administration and browsing. Writes require the admin capability,
//! which the caller boundary derives from its own auth and passes in as a
//! plain `bool`.

use std::sync::Arc;

use chrono::Utc;
use storefront_core::validation::validate_id;
use storefront_core::{
    normalize_code, CoreError, NewProduct, Product, ProductPage, ProductQuery, ProductUpdate,
    ValidationError,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, StoreError};
use crate::events::{EventObserver, NoopObserver, StorefrontEvent};
use crate::store::CatalogAdminStore;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogAdminStore>,
    observer: Arc<dyn EventObserver>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogAdminStore>) -> Self {
        CatalogService {
            store,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Adds a product. Codes are unique, compared upper-case.
    pub async fn create_product(&self, is_admin: bool, input: NewProduct) -> EngineResult<Product> {
        require_admin(is_admin, "create_product")?;
        input.validate()?;

        let code = normalize_code(&input.code);
        if self.store.find_by_code(&code).await?.is_some() {
            return Err(duplicate_code(code));
        }

        let product = input.into_product(Uuid::new_v4().to_string(), Utc::now());
        self.store
            .insert_product(&product)
            .await
            .map_err(duplicate_as_validation)?;

        info!(product_id = %product.id, code = %product.code, "Product created");
        self.observer.notify(StorefrontEvent::ProductCreated {
            product: product.clone(),
        });
        Ok(product)
    }

    /// Partially updates a product.
    pub async fn update_product(
        &self,
        is_admin: bool,
        id: &str,
        update: ProductUpdate,
    ) -> EngineResult<Product> {
        require_admin(is_admin, "update_product")?;
        validate_id("product_id", id)?;
        update.validate()?;

        let mut product = self
            .store
            .find_product(id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))?;

        if let Some(code) = update.normalized_code() {
            if let Some(owner) = self.store.find_by_code(&code).await? {
                if owner.id != product.id {
                    return Err(duplicate_code(code));
                }
            }
        }

        let stock_before = product.stock;
        update.apply(&mut product, Utc::now());

        let found = self
            .store
            .update_product(&product)
            .await
            .map_err(duplicate_as_validation)?;
        if !found {
            return Err(CoreError::ProductNotFound(id.to_string()).into());
        }

        debug!(product_id = %id, "Product updated");
        if product.stock != stock_before {
            self.observer.notify(StorefrontEvent::StockChanged {
                product_id: product.id.clone(),
                stock: product.stock,
            });
        }
        self.observer.notify(StorefrontEvent::ProductUpdated {
            product: product.clone(),
        });
        Ok(product)
    }

    /// Hard-deletes a product. Carts keep their lines; checkout reports them
    /// as missing.
    pub async fn delete_product(&self, is_admin: bool, id: &str) -> EngineResult<()> {
        require_admin(is_admin, "delete_product")?;
        validate_id("product_id", id)?;

        if !self.store.delete_product(id).await? {
            return Err(CoreError::ProductNotFound(id.to_string()).into());
        }

        info!(product_id = %id, "Product deleted");
        self.observer.notify(StorefrontEvent::ProductDeleted {
            product_id: id.to_string(),
        });
        Ok(())
    }

    pub async fn get_product(&self, id: &str) -> EngineResult<Product> {
        validate_id("product_id", id)?;

        self.store
            .find_product(id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()).into())
    }

    /// One page of the catalog.
    pub async fn list_products(&self, query: ProductQuery) -> EngineResult<ProductPage> {
        query.validate()?;

        let (products, total) = self.store.list_products(&query).await?;
        Ok(ProductPage::new(products, total, query.page, query.limit))
    }
}

fn require_admin(is_admin: bool, action: &str) -> Result<(), CoreError> {
    if is_admin {
        Ok(())
    } else {
        Err(CoreError::forbidden(action))
    }
}

fn duplicate_code(code: String) -> EngineError {
    ValidationError::Duplicate {
        field: "code".to_string(),
        value: code,
    }
    .into()
}

/// A unique-constraint race at the store is reported like the pre-check.
fn duplicate_as_validation(err: StoreError) -> EngineError {
    match err {
        StoreError::Duplicate { field, value } => ValidationError::Duplicate { field, value }.into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastObserver;
    use crate::memory::InMemoryCatalog;
    use storefront_core::{ErrorKind, PriceSort};

    fn new_product(code: &str, price_cents: i64) -> NewProduct {
        NewProduct {
            title: format!("Product {}", code),
            description: "A product".to_string(),
            code: code.to_string(),
            price_cents,
            stock: 10,
            category: "misc".to_string(),
            thumbnails: vec![],
            is_active: None,
        }
    }

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(InMemoryCatalog::new()))
    }

    #[tokio::test]
    async fn test_admin_capability_required() {
        let service = service();

        let err = service
            .create_product(false, new_product("a-1", 100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let p = service.create_product(true, new_product("a-1", 100)).await.unwrap();
        assert_eq!(
            service.delete_product(false, &p.id).await.unwrap_err().kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            service
                .update_product(false, &p.id, ProductUpdate::default())
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::Forbidden
        );
    }

    #[tokio::test]
    async fn test_duplicate_code_case_insensitive() {
        let service = service();
        service.create_product(true, new_product("mate", 100)).await.unwrap();

        let err = service
            .create_product(true, new_product("MATE", 100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_code_to_taken_code() {
        let service = service();
        service.create_product(true, new_product("one", 100)).await.unwrap();
        let two = service.create_product(true, new_product("two", 100)).await.unwrap();

        let err = service
            .update_product(
                true,
                &two.id,
                ProductUpdate {
                    code: Some("one".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Re-saving its own code is fine.
        let same = service
            .update_product(
                true,
                &two.id,
                ProductUpdate {
                    code: Some("two".into()),
                    price_cents: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.price_cents, 50);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let service = service();
        let p = service.create_product(true, new_product("x", 100)).await.unwrap();

        assert_eq!(service.get_product(&p.id).await.unwrap().code, "X");
        service.delete_product(true, &p.id).await.unwrap();
        assert_eq!(
            service.get_product(&p.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            service.delete_product(true, &p.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_list_products_paging() {
        let service = service();
        for i in 0..12 {
            service
                .create_product(true, new_product(&format!("p{}", i), 100 * (12 - i)))
                .await
                .unwrap();
        }

        let page = service
            .list_products(ProductQuery {
                page: 2,
                sort: Some(PriceSort::Asc),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_docs, 12);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.products.len(), 2);
        assert_eq!(page.products[0].price_cents, 1100);
        assert!(!page.has_next_page);
        assert_eq!(page.prev_page, Some(1));

        let err = service
            .list_products(ProductQuery {
                limit: 0,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_events_after_commit() {
        let observer = Arc::new(BroadcastObserver::new(8));
        let mut rx = observer.subscribe();
        let service = service().with_observer(observer);

        let p = service.create_product(true, new_product("ev", 100)).await.unwrap();
        service
            .update_product(
                true,
                &p.id,
                ProductUpdate {
                    stock: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), StorefrontEvent::ProductCreated { .. }));
        assert_eq!(
            rx.recv().await.unwrap(),
            StorefrontEvent::StockChanged {
                product_id: p.id.clone(),
                stock: 3
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), StorefrontEvent::ProductUpdated { .. }));
    }
}
