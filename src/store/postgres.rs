//! PostgreSQL store. Records live as JSONB documents next to the columns queried on.
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgQueryResult};
use sqlx::types::Json;
use crate::domain::aggregates::{Cart, Checkout, Order, Payout, Product, Vendor};
use crate::{MarketplaceError, Result};
use super::{MarketplaceStore, OrderPlacement};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and applies pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("connected to postgres, migrations applied");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    async fn one<T>(&self, sql: &str, key: &str) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + Unpin + 'static,
    {
        let row = sqlx::query_as::<_, (Json<T>,)>(sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|(Json(doc),)| doc))
    }

    async fn many<T>(&self, sql: &str, key: Option<&str>) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Send + Unpin + 'static,
    {
        let mut query = sqlx::query_as::<_, (Json<T>,)>(sql);
        if let Some(key) = key {
            query = query.bind(key.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(Json(doc),)| doc).collect())
    }
}

/// Updates of records that were never inserted fail the same way they do in memory.
fn updated(result: PgQueryResult, what: &str) -> Result<()> {
    require_row(result.rows_affected(), what)
}

fn require_row(rows_affected: u64, what: &str) -> Result<()> {
    if rows_affected == 0 { return Err(MarketplaceError::StorageError(format!("{what} does not exist"))); }
    Ok(())
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, vendor_id, status, doc) VALUES ($1, $2, $3, $4)")
            .bind(product.id()).bind(product.vendor_id()).bind(product.status().as_str()).bind(Json(product))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        let result = sqlx::query("UPDATE products SET status = $2, doc = $3 WHERE id = $1")
            .bind(product.id()).bind(product.status().as_str()).bind(Json(product))
            .execute(&self.pool).await?;
        updated(result, "product")
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        self.one("SELECT doc FROM products WHERE id = $1", id).await
    }

    async fn products(&self) -> Result<Vec<Product>> {
        self.many("SELECT doc FROM products ORDER BY seq", None).await
    }

    async fn cart(&self, buyer_id: &str) -> Result<Option<Cart>> {
        self.one("SELECT doc FROM carts WHERE buyer_id = $1", buyer_id).await
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query("INSERT INTO carts (buyer_id, doc) VALUES ($1, $2) ON CONFLICT (buyer_id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = NOW()")
            .bind(cart.buyer_id()).bind(Json(cart))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn checkout(&self, token: &str) -> Result<Option<Checkout>> {
        self.one("SELECT doc FROM checkouts WHERE token = $1", token).await
    }

    async fn save_checkout(&self, checkout: &Checkout) -> Result<()> {
        sqlx::query("INSERT INTO checkouts (token, buyer_id, doc) VALUES ($1, $2, $3) ON CONFLICT (token) DO UPDATE SET doc = EXCLUDED.doc")
            .bind(checkout.token()).bind(checkout.buyer_id()).bind(Json(checkout))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderPlacement> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO orders (id, customer_id, source_token, status, vendor_ids, doc) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (customer_id, source_token) DO NOTHING",
        )
        .bind(order.id()).bind(order.customer_id()).bind(order.source_token()).bind(order.status().as_str())
        .bind(order.vendor_ids()).bind(Json(order))
        .execute(&mut *tx).await?
        .rows_affected();

        if inserted == 0 {
            let (Json(existing),) = sqlx::query_as::<_, (Json<Order>,)>("SELECT doc FROM orders WHERE customer_id = $1 AND source_token = $2")
                .bind(order.customer_id()).bind(order.source_token())
                .fetch_one(&mut *tx).await?;
            tx.rollback().await?;
            return Ok(OrderPlacement::Existing(existing));
        }

        let cart = sqlx::query_as::<_, (Json<Cart>,)>("SELECT doc FROM carts WHERE buyer_id = $1 FOR UPDATE")
            .bind(order.customer_id())
            .fetch_optional(&mut *tx).await?;
        if let Some((Json(mut cart),)) = cart {
            if cart.checkout_token() == order.source_token() {
                cart.clear();
                sqlx::query("UPDATE carts SET doc = $2, updated_at = NOW() WHERE buyer_id = $1")
                    .bind(order.customer_id()).bind(Json(&cart))
                    .execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(OrderPlacement::Created(order.clone()))
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, doc = $3 WHERE id = $1")
            .bind(order.id()).bind(order.status().as_str()).bind(Json(order))
            .execute(&self.pool).await?;
        updated(result, "order")
    }

    async fn order(&self, id: &str) -> Result<Option<Order>> {
        self.one("SELECT doc FROM orders WHERE id = $1", id).await
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        self.many("SELECT doc FROM orders ORDER BY seq", None).await
    }

    async fn customer_orders(&self, customer_id: &str) -> Result<Vec<Order>> {
        self.many("SELECT doc FROM orders WHERE customer_id = $1 ORDER BY seq", Some(customer_id)).await
    }

    async fn vendor_orders(&self, vendor_id: &str) -> Result<Vec<Order>> {
        self.many("SELECT doc FROM orders WHERE $1 = ANY(vendor_ids) ORDER BY seq", Some(vendor_id)).await
    }

    async fn save_vendor(&self, vendor: &Vendor) -> Result<()> {
        sqlx::query(
            "INSERT INTO vendors (id, external_account_id, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET external_account_id = EXCLUDED.external_account_id, doc = EXCLUDED.doc",
        )
        .bind(vendor.id()).bind(vendor.external_account_id()).bind(Json(vendor))
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn vendor(&self, id: &str) -> Result<Option<Vendor>> {
        self.one("SELECT doc FROM vendors WHERE id = $1", id).await
    }

    async fn vendor_by_account(&self, external_account_id: &str) -> Result<Option<Vendor>> {
        self.one("SELECT doc FROM vendors WHERE external_account_id = $1", external_account_id).await
    }

    async fn vendors(&self) -> Result<Vec<Vendor>> {
        self.many("SELECT doc FROM vendors ORDER BY seq", None).await
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<()> {
        sqlx::query("INSERT INTO payouts (id, vendor_id, status, external_transfer_id, doc) VALUES ($1, $2, $3, $4, $5)")
            .bind(payout.id()).bind(payout.vendor_id()).bind(payout.status().as_str()).bind(payout.external_transfer_id()).bind(Json(payout))
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn save_payout(&self, payout: &Payout) -> Result<()> {
        let result = sqlx::query("UPDATE payouts SET status = $2, external_transfer_id = $3, doc = $4 WHERE id = $1")
            .bind(payout.id()).bind(payout.status().as_str()).bind(payout.external_transfer_id()).bind(Json(payout))
            .execute(&self.pool).await?;
        updated(result, "payout")
    }

    async fn payout(&self, id: &str) -> Result<Option<Payout>> {
        self.one("SELECT doc FROM payouts WHERE id = $1", id).await
    }

    async fn payout_by_transfer(&self, external_transfer_id: &str) -> Result<Option<Payout>> {
        self.one("SELECT doc FROM payouts WHERE external_transfer_id = $1", external_transfer_id).await
    }

    async fn payouts(&self, vendor_id: Option<&str>) -> Result<Vec<Payout>> {
        match vendor_id {
            Some(v) => self.many("SELECT doc FROM payouts WHERE vendor_id = $1 ORDER BY seq", Some(v)).await,
            None => self.many("SELECT doc FROM payouts ORDER BY seq", None).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_without_row_is_a_storage_error() {
        assert!(require_row(1, "payout").is_ok());
        match require_row(0, "payout") {
            Err(MarketplaceError::StorageError(msg)) => assert_eq!(msg, "payout does not exist"),
            other => panic!("expected storage error, got {other:?}"),
        }
    }
}
