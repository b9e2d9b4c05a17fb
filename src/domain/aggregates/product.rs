//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::value_objects::{new_id, Money};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: String,
    name: String,
    description: String,
    price: Money,
    images: Vec<String>,
    category: String,
    vendor_id: String,
    vendor_name: String,
    rating: Decimal,
    stock: u32,
    status: ProductStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Pending, Approved, Rejected }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}

/// Vendor-supplied product submission.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: i64,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductDraft {
    /// Trims text fields and runs the field rules plus the price bounds.
    pub fn normalized(mut self) -> Result<Self, ProductError> {
        self.name = self.name.trim().to_string();
        self.category = self.category.trim().to_string();
        self.description = self.description.trim().to_string();
        self.validate().map_err(|e| ProductError::Invalid(e.to_string()))?;
        if self.price <= Decimal::ZERO { return Err(ProductError::Invalid("price must be greater than zero".into())); }
        if self.price > Money::MAX_PRICE.amount() {
            return Err(ProductError::Invalid(format!("price must not exceed {}", Money::MAX_PRICE)));
        }
        Ok(self)
    }
}

impl Product {
    /// Creates a pending product owned by `vendor_id`.
    pub fn submit(draft: ProductDraft, vendor_id: impl Into<String>, vendor_name: impl Into<String>) -> Result<Self, ProductError> {
        let draft = draft.normalized()?;
        let stock = u32::try_from(draft.stock).map_err(|_| ProductError::Invalid("stock out of range".into()))?;
        let now = Utc::now();
        let mut product = Self {
            id: new_id(), name: draft.name, description: draft.description, price: Money::new(draft.price).round_cents(),
            images: draft.images, category: draft.category, vendor_id: vendor_id.into(), vendor_name: vendor_name.into(),
            rating: Decimal::ZERO, stock, status: ProductStatus::Pending, created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Submitted { product_id: product.id.clone(), vendor_id: product.vendor_id.clone() }));
        Ok(product)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> &str { &self.description }
    pub fn price(&self) -> Money { self.price }
    pub fn images(&self) -> &[String] { &self.images }
    pub fn category(&self) -> &str { &self.category }
    pub fn vendor_id(&self) -> &str { &self.vendor_id }
    pub fn vendor_name(&self) -> &str { &self.vendor_name }
    pub fn rating(&self) -> Decimal { self.rating }
    pub fn stock(&self) -> u32 { self.stock }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_approved(&self) -> bool { self.status == ProductStatus::Approved }

    /// Case-insensitive substring match on name or description; `needle` must be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty() || self.name.to_lowercase().contains(needle) || self.description.to_lowercase().contains(needle)
    }

    /// Returns `Ok(false)` when the product was already approved.
    pub fn approve(&mut self) -> Result<bool, ProductError> {
        match self.status {
            ProductStatus::Approved => Ok(false),
            ProductStatus::Rejected => Err(ProductError::InvalidTransition { from: self.status, to: ProductStatus::Approved }),
            ProductStatus::Pending => {
                self.status = ProductStatus::Approved;
                self.touch();
                self.raise_event(DomainEvent::Product(ProductEvent::Approved { product_id: self.id.clone() }));
                Ok(true)
            }
        }
    }

    /// Returns `Ok(false)` when the product was already rejected.
    pub fn reject(&mut self) -> Result<bool, ProductError> {
        match self.status {
            ProductStatus::Rejected => Ok(false),
            ProductStatus::Approved => Err(ProductError::InvalidTransition { from: self.status, to: ProductStatus::Rejected }),
            ProductStatus::Pending => {
                self.status = ProductStatus::Rejected;
                self.touch();
                self.raise_event(DomainEvent::Product(ProductEvent::Rejected { product_id: self.id.clone() }));
                Ok(true)
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }

    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { Invalid(String), InvalidTransition { from: ProductStatus, to: ProductStatus } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(m) => write!(f, "Invalid product: {m}"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move product from {} to {}", from.as_str(), to.as_str()),
        }
    }
}

#[cfg(test)]
pub(crate) fn draft(name: &str, price: Decimal, category: &str) -> ProductDraft {
    ProductDraft { name: name.into(), description: format!("{name} description"), price, category: category.into(), stock: 10, images: vec![] }
}
