//! HTTP surface for the storefront, vendor dashboard, admin panel and processor webhooks.
//!
//! Authentication is delegated to the hosted identity provider sitting in front of this
//! service; it forwards the resolved caller in `x-user-*` headers.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use crate::domain::aggregates::{AccountStatus, CheckoutDetails, Order, OrderStatus, Payout, PayoutStatus, Product, ProductDraft, Vendor};
use crate::domain::settlement::VendorEarnings;
use crate::services::{AccountLink, CartView, CheckoutRedirect, DashboardStats, Marketplace, PayoutRequest};
use crate::session::Session;
use crate::MarketplaceError;

type ApiResult<T> = std::result::Result<Json<T>, MarketplaceError>;

pub fn router(marketplace: Marketplace) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "marketplace-settlement"})) }))
        .route("/api/v1/products", get(search_products).post(submit_product))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/products/:id/approve", post(approve_product))
        .route("/api/v1/products/:id/reject", post(reject_product))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_to_cart))
        .route("/api/v1/cart/items/:product_id", put(update_quantity).delete(remove_from_cart))
        .route("/api/v1/checkout", post(create_checkout))
        .route("/api/v1/webhooks/payments", post(payment_webhook))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/vendors/connect", post(connect_vendor))
        .route("/api/v1/vendors/:id", get(get_vendor))
        .route("/api/v1/vendors/:id/products", get(vendor_products))
        .route("/api/v1/vendors/:id/earnings", get(vendor_earnings))
        .route("/api/v1/payouts", get(list_payouts).post(create_payout))
        .route("/api/v1/payouts/:id/status", put(update_payout_status))
        .route("/api/v1/admin/dashboard", get(dashboard))
        .route("/api/v1/admin/pending-products", get(pending_products))
        .route("/api/v1/admin/pending-payouts", get(pending_payouts))
        .route("/api/v1/admin/payouts/:id/process", post(process_payout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(marketplace)
}

// =============================================================================
// Errors and caller identity
// =============================================================================

fn status_for(e: &MarketplaceError) -> StatusCode {
    use MarketplaceError::*;
    match e {
        Validation(_) | EmptyCart | InvalidAddress(_) | InvalidQuantity => StatusCode::BAD_REQUEST,
        Forbidden(_) => StatusCode::FORBIDDEN,
        ProductNotFound(_) | ItemNotFound | OrderNotFound(_) | VendorNotFound(_) | PayoutNotFound(_) | CheckoutNotFound(_) => StatusCode::NOT_FOUND,
        ProductUnavailable(_) | InvalidTransition(_) | InsufficientEarnings { .. } | PayoutAlreadySettled(_) | VendorNotPayable(_)
        | PeriodOverlap | PaymentMismatch { .. } => StatusCode::CONFLICT,
        PaymentSession(_) | CheckoutSession(_) | Gateway(_) => StatusCode::BAD_GATEWAY,
        StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            match self {
                MarketplaceError::StorageError(_) => "Internal server error".to_string(),
                other => other.to_string(),
            }
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        };
        (status, Json(json!({"error": status.canonical_reason().unwrap_or("Error"), "message": message}))).into_response()
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = MarketplaceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        let user_id = header("x-user-id").ok_or_else(|| MarketplaceError::Forbidden("missing caller identity".into()))?;
        let email = header("x-user-email").unwrap_or_default();
        let name = header("x-user-name").unwrap_or_default();
        match header("x-user-role").as_deref() {
            Some("customer") => Ok(Session::Customer { user_id, email, name }),
            Some("vendor") => {
                let vendor_id = header("x-vendor-id").ok_or_else(|| MarketplaceError::Forbidden("vendor session without vendor id".into()))?;
                Ok(Session::Vendor { user_id, vendor_id, email, business_name: name })
            }
            Some("admin") => Ok(Session::Admin { user_id }),
            other => Err(MarketplaceError::Forbidden(format!("unknown role {}", other.unwrap_or("(none)")))),
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams { pub q: Option<String>, pub category: Option<String> }

async fn search_products(State(m): State<Marketplace>, Query(p): Query<SearchParams>) -> ApiResult<Vec<Product>> {
    Ok(Json(m.catalog.search_products(p.q.as_deref().unwrap_or(""), p.category.as_deref()).await?))
}

async fn submit_product(State(m): State<Marketplace>, session: Session, Json(draft): Json<ProductDraft>) -> Result<(StatusCode, Json<Product>), MarketplaceError> {
    Ok((StatusCode::CREATED, Json(m.catalog.submit_product(&session, draft).await?)))
}

async fn get_product(State(m): State<Marketplace>, Path(id): Path<String>) -> ApiResult<Product> {
    Ok(Json(m.catalog.get_product(&id).await?))
}

async fn approve_product(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<Product> {
    Ok(Json(m.catalog.approve_product(&session, &id).await?))
}

async fn reject_product(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<Product> {
    Ok(Json(m.catalog.reject_product(&session, &id).await?))
}

async fn list_categories(State(m): State<Marketplace>) -> ApiResult<Vec<String>> {
    Ok(Json(m.catalog.categories().await?))
}

async fn vendor_products(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<Vec<Product>> {
    session.require_vendor_access(&id)?;
    Ok(Json(m.catalog.vendor_products(&id).await?))
}

// =============================================================================
// Cart and checkout
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest { pub product_id: String }

#[derive(Debug, Deserialize)]
pub struct QuantityRequest { pub quantity: i64 }

async fn get_cart(State(m): State<Marketplace>, session: Session) -> ApiResult<CartView> {
    Ok(Json(m.carts.get_cart(&session).await?))
}

async fn add_to_cart(State(m): State<Marketplace>, session: Session, Json(r): Json<AddToCartRequest>) -> ApiResult<CartView> {
    Ok(Json(m.carts.add_to_cart(&session, &r.product_id).await?))
}

async fn update_quantity(State(m): State<Marketplace>, session: Session, Path(product_id): Path<String>, Json(r): Json<QuantityRequest>) -> ApiResult<CartView> {
    Ok(Json(m.carts.update_quantity(&session, &product_id, r.quantity).await?))
}

async fn remove_from_cart(State(m): State<Marketplace>, session: Session, Path(product_id): Path<String>) -> ApiResult<CartView> {
    Ok(Json(m.carts.remove_from_cart(&session, &product_id).await?))
}

async fn clear_cart(State(m): State<Marketplace>, session: Session) -> ApiResult<CartView> {
    Ok(Json(m.carts.clear_cart(&session).await?))
}

async fn create_checkout(State(m): State<Marketplace>, session: Session, Json(details): Json<CheckoutDetails>) -> ApiResult<CheckoutRedirect> {
    Ok(Json(m.checkout.create_checkout_session(&session, details).await?))
}

/// Notifications from the payment processor.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentWebhook {
    #[serde(rename_all = "camelCase")]
    PaymentConfirmed { checkout_token: String, amount_captured_minor: i64 },
    #[serde(rename_all = "camelCase")]
    AccountUpdated { external_account_id: String, status: AccountStatus, charges_enabled: bool, payouts_enabled: bool },
    #[serde(rename_all = "camelCase")]
    TransferSettled { external_transfer_id: String, outcome: PayoutStatus, reason: Option<String> },
}

async fn payment_webhook(State(m): State<Marketplace>, Json(event): Json<PaymentWebhook>) -> ApiResult<serde_json::Value> {
    let body = match event {
        PaymentWebhook::PaymentConfirmed { checkout_token, amount_captured_minor } => {
            let order = m.checkout.confirm_payment(&checkout_token, amount_captured_minor).await?;
            json!({"received": true, "orderId": order.id()})
        }
        PaymentWebhook::AccountUpdated { external_account_id, status, charges_enabled, payouts_enabled } => {
            let vendor = m.settlement.account_status_changed(&external_account_id, status, charges_enabled, payouts_enabled).await?;
            json!({"received": true, "vendorId": vendor.id()})
        }
        PaymentWebhook::TransferSettled { external_transfer_id, outcome, reason } => {
            let payout = m.settlement.transfer_settled(&external_transfer_id, outcome, reason).await?;
            json!({"received": true, "payoutId": payout.id()})
        }
    };
    Ok(Json(body))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest { pub status: OrderStatus }

async fn list_orders(State(m): State<Marketplace>, session: Session) -> ApiResult<Vec<Order>> {
    match &session {
        Session::Admin { .. } => Ok(Json(m.orders.list_orders(&session).await?)),
        _ => Ok(Json(m.orders.customer_orders(&session).await?)),
    }
}

async fn get_order(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<Order> {
    Ok(Json(m.orders.view_order(&session, &id).await?))
}

async fn update_order_status(State(m): State<Marketplace>, session: Session, Path(id): Path<String>, Json(r): Json<OrderStatusRequest>) -> ApiResult<Order> {
    Ok(Json(m.orders.update_order_status(&session, &id, r.status).await?))
}

// =============================================================================
// Vendors and payouts
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutFilter { pub vendor_id: Option<String> }

#[derive(Debug, Deserialize)]
pub struct PayoutStatusRequest { pub status: PayoutStatus }

async fn connect_vendor(State(m): State<Marketplace>, session: Session) -> ApiResult<AccountLink> {
    Ok(Json(m.settlement.connect_vendor_account(&session).await?))
}

async fn get_vendor(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<Vendor> {
    session.require_vendor_access(&id)?;
    Ok(Json(m.settlement.get_vendor(&id).await?))
}

async fn vendor_earnings(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<VendorEarnings> {
    session.require_vendor_access(&id)?;
    Ok(Json(m.settlement.vendor_earnings(&id).await?))
}

async fn list_payouts(State(m): State<Marketplace>, session: Session, Query(f): Query<PayoutFilter>) -> ApiResult<Vec<Payout>> {
    let vendor_id = match &session {
        Session::Vendor { vendor_id, .. } => Some(vendor_id.clone()),
        _ => {
            session.require_admin()?;
            f.vendor_id
        }
    };
    Ok(Json(m.settlement.list_payouts(vendor_id.as_deref()).await?))
}

async fn create_payout(State(m): State<Marketplace>, session: Session, Json(r): Json<PayoutRequest>) -> Result<(StatusCode, Json<Payout>), MarketplaceError> {
    Ok((StatusCode::CREATED, Json(m.settlement.create_payout(&session, r).await?)))
}

async fn update_payout_status(State(m): State<Marketplace>, session: Session, Path(id): Path<String>, Json(r): Json<PayoutStatusRequest>) -> ApiResult<Payout> {
    Ok(Json(m.settlement.update_payout_status(&session, &id, r.status).await?))
}

// =============================================================================
// Admin
// =============================================================================

async fn dashboard(State(m): State<Marketplace>, session: Session) -> ApiResult<DashboardStats> {
    Ok(Json(m.admin.dashboard(&session).await?))
}

async fn pending_products(State(m): State<Marketplace>, session: Session) -> ApiResult<Vec<Product>> {
    Ok(Json(m.admin.pending_products(&session).await?))
}

async fn pending_payouts(State(m): State<Marketplace>, session: Session) -> ApiResult<Vec<Payout>> {
    Ok(Json(m.admin.pending_payouts(&session).await?))
}

async fn process_payout(State(m): State<Marketplace>, session: Session, Path(id): Path<String>) -> ApiResult<Payout> {
    Ok(Json(m.admin.process_payout(&session, &id).await?))
}
