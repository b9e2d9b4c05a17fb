//! Caller identity passed explicitly to every core operation.
//!
//! Authentication belongs to the hosted identity provider; by the time a request reaches
//! this crate the caller has been resolved to exactly one role.

use serde::{Deserialize, Serialize};
use crate::{MarketplaceError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Session {
    Customer { user_id: String, email: String, name: String },
    Vendor { user_id: String, vendor_id: String, email: String, business_name: String },
    Admin { user_id: String },
}

/// Customer fields borrowed out of a [`Session`].
pub struct Buyer<'a> {
    pub user_id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
}

/// Vendor fields borrowed out of a [`Session`].
pub struct Seller<'a> {
    pub user_id: &'a str,
    pub vendor_id: &'a str,
    pub email: &'a str,
    pub business_name: &'a str,
}

impl Session {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Customer { user_id, .. } | Self::Vendor { user_id, .. } | Self::Admin { user_id } => user_id,
        }
    }

    pub fn role(&self) -> &'static str {
        match self { Self::Customer { .. } => "customer", Self::Vendor { .. } => "vendor", Self::Admin { .. } => "admin" }
    }

    pub fn buyer(&self) -> Result<Buyer<'_>> {
        match self {
            Self::Customer { user_id, email, name } => Ok(Buyer { user_id, email, name }),
            other => Err(MarketplaceError::Forbidden(format!("{} cannot shop", other.role()))),
        }
    }

    pub fn seller(&self) -> Result<Seller<'_>> {
        match self {
            Self::Vendor { user_id, vendor_id, email, business_name } => Ok(Seller { user_id, vendor_id, email, business_name }),
            other => Err(MarketplaceError::Forbidden(format!("{} is not a vendor", other.role()))),
        }
    }

    /// Admins see every vendor; a vendor only sees itself.
    pub fn require_vendor_access(&self, vendor_id: &str) -> Result<()> {
        match self {
            Self::Admin { .. } => Ok(()),
            Self::Vendor { vendor_id: own, .. } if own == vendor_id => Ok(()),
            other => Err(MarketplaceError::Forbidden(format!("{} cannot view vendor {vendor_id}", other.role()))),
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        match self {
            Self::Admin { .. } => Ok(()),
            other => Err(MarketplaceError::Forbidden(format!("{} is not an admin", other.role()))),
        }
    }
}
