use std::sync::Arc;
use tracing::{info, instrument};
use crate::domain::aggregates::{Product, ProductDraft, ProductStatus};
use crate::domain::events::EventBus;
use crate::session::Session;
use crate::store::MarketplaceStore;
use crate::{MarketplaceError, Result};

/// Product submission, moderation and browsing.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn MarketplaceStore>,
    events: EventBus,
}

impl CatalogService {
    pub fn new(store: Arc<dyn MarketplaceStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    #[instrument(skip(self, session, draft), fields(name = %draft.name))]
    pub async fn submit_product(&self, session: &Session, draft: ProductDraft) -> Result<Product> {
        let seller = session.seller()?;
        let mut product = Product::submit(draft, seller.vendor_id, seller.business_name)?;
        self.store.insert_product(&product).await?;
        info!(product_id = product.id(), vendor_id = seller.vendor_id, "product submitted for review");
        self.events.publish_all(product.take_events()).await;
        Ok(product)
    }

    pub async fn approve_product(&self, session: &Session, id: &str) -> Result<Product> {
        session.require_admin()?;
        self.moderate(id, ProductStatus::Approved).await
    }

    pub async fn reject_product(&self, session: &Session, id: &str) -> Result<Product> {
        session.require_admin()?;
        self.moderate(id, ProductStatus::Rejected).await
    }

    #[instrument(skip(self))]
    async fn moderate(&self, id: &str, decision: ProductStatus) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        let changed = match decision {
            ProductStatus::Approved => product.approve()?,
            ProductStatus::Rejected => product.reject()?,
            ProductStatus::Pending => return Err(MarketplaceError::InvalidTransition("products cannot return to pending".into())),
        };
        if changed {
            self.store.save_product(&product).await?;
            info!(product_id = id, status = decision.as_str(), "product moderated");
            self.events.publish_all(product.take_events()).await;
        }
        Ok(product)
    }

    pub async fn get_product(&self, id: &str) -> Result<Product> {
        self.store.product(id).await?.ok_or_else(|| MarketplaceError::ProductNotFound(id.to_string()))
    }

    /// Approved products matching `query` on name or description, in submission order.
    /// A `category` of `None` or `"all"` disables the category filter.
    pub async fn search_products(&self, query: &str, category: Option<&str>) -> Result<Vec<Product>> {
        let needle = query.trim().to_lowercase();
        let category = category.filter(|c| !c.is_empty() && *c != "all");
        Ok(self
            .store
            .products()
            .await?
            .into_iter()
            .filter(|p| p.is_approved())
            .filter(|p| category.map_or(true, |c| p.category() == c))
            .filter(|p| p.matches(&needle))
            .collect())
    }

    /// Every product of a vendor regardless of status, for the vendor's own dashboard.
    pub async fn vendor_products(&self, vendor_id: &str) -> Result<Vec<Product>> {
        Ok(self.store.products().await?.into_iter().filter(|p| p.vendor_id() == vendor_id).collect())
    }

    /// Distinct categories of approved products in first-seen order.
    pub async fn categories(&self) -> Result<Vec<String>> {
        let mut seen: Vec<String> = Vec::new();
        for p in self.store.products().await?.iter().filter(|p| p.is_approved()) {
            if !seen.iter().any(|c| c == p.category()) { seen.push(p.category().to_string()); }
        }
        Ok(seen)
    }

    pub async fn pending_products(&self) -> Result<Vec<Product>> {
        Ok(self.store.products().await?.into_iter().filter(|p| p.status() == ProductStatus::Pending).collect())
    }
}
