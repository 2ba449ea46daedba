use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartToken, CouponId, Money, OrderId, ProductId, UserId};
use domain::{
    AbandonedCart, Cart, CartItem, Coupon, CouponUsage, CustomerInfo, DiscountKind, Experiment,
    Order, OrderLine, OrderNumber, PaymentStatus, Product, Variant,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CommerceStore, CouponOutcomes, StoreTransaction},
};

const COUPON_COLUMNS: &str = "id, code, kind, value, min_order_amount, max_discount_amount, \
     usage_limit, per_user_limit, starts_at, expires_at, is_active, created_at";

const EXPERIMENT_COLUMNS: &str = "key, name, enabled, traffic_percent, split_percent_a, \
     force_variant, coupon_code_a, coupon_code_b, version, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, customer, lines, subtotal, discount, \
     total_amount, coupon_code, payment_status, created_at";

const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

/// PostgreSQL-backed commerce store.
#[derive(Clone)]
pub struct PostgresCommerceStore {
    pool: PgPool,
}

impl PostgresCommerceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the SQL migrations shipped with the workspace.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Atomic scope backed by a PostgreSQL transaction.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn non_negative<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T> {
    T::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price")?),
        stock_limited: row.try_get("stock_limited")?,
        available_quantity: non_negative(
            i64::from(row.try_get::<i32, _>("available_quantity")?),
            "available_quantity",
        )?,
    })
}

fn row_to_coupon(row: &PgRow) -> Result<Coupon> {
    let kind: String = row.try_get("kind")?;
    let limit = |column: &str| -> Result<Option<u32>> {
        row.try_get::<Option<i32>, _>(column)?
            .map(|v| non_negative(i64::from(v), column))
            .transpose()
    };

    Ok(Coupon {
        id: CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
        code: row.try_get("code")?,
        kind: kind.parse::<DiscountKind>().map_err(StoreError::InvalidData)?,
        value: row.try_get("value")?,
        min_order_amount: row
            .try_get::<Option<i64>, _>("min_order_amount")?
            .map(Money::from_cents),
        max_discount_amount: row
            .try_get::<Option<i64>, _>("max_discount_amount")?
            .map(Money::from_cents),
        usage_limit: limit("usage_limit")?,
        per_user_limit: limit("per_user_limit")?,
        starts_at: row.try_get("starts_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_experiment(row: &PgRow) -> Result<Experiment> {
    let force_variant = row
        .try_get::<Option<String>, _>("force_variant")?
        .map(|v| v.parse::<Variant>().map_err(StoreError::InvalidData))
        .transpose()?;

    Ok(Experiment {
        key: row.try_get("key")?,
        name: row.try_get("name")?,
        enabled: row.try_get("enabled")?,
        traffic_percent: non_negative(
            i64::from(row.try_get::<i16, _>("traffic_percent")?),
            "traffic_percent",
        )?,
        split_percent_a: non_negative(
            i64::from(row.try_get::<i16, _>("split_percent_a")?),
            "split_percent_a",
        )?,
        force_variant,
        coupon_code_a: row.try_get("coupon_code_a")?,
        coupon_code_b: row.try_get("coupon_code_b")?,
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let customer: CustomerInfo = serde_json::from_value(row.try_get("customer")?)?;
    let lines: Vec<OrderLine> = serde_json::from_value(row.try_get("lines")?)?;
    let payment_status: String = row.try_get("payment_status")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: OrderNumber::from_string(row.try_get::<String, _>("order_number")?),
        customer,
        lines,
        subtotal: Money::from_cents(row.try_get("subtotal")?),
        discount: Money::from_cents(row.try_get("discount")?),
        total_amount: Money::from_cents(row.try_get("total_amount")?),
        coupon_code: row.try_get("coupon_code")?,
        payment_status: payment_status
            .parse::<PaymentStatus>()
            .map_err(StoreError::InvalidData)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: non_negative(i64::from(row.try_get::<i32, _>("quantity")?), "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price")?),
    })
}

fn is_order_number_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.constraint() == Some(ORDER_NUMBER_CONSTRAINT))
}

fn i32_from(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

async fn upsert_experiment<'e, E>(executor: E, experiment: &Experiment) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO experiments (key, name, enabled, traffic_percent, split_percent_a,
                                 force_variant, coupon_code_a, coupon_code_b, version, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (key) DO UPDATE SET
            name = EXCLUDED.name,
            enabled = EXCLUDED.enabled,
            traffic_percent = EXCLUDED.traffic_percent,
            split_percent_a = EXCLUDED.split_percent_a,
            force_variant = EXCLUDED.force_variant,
            coupon_code_a = EXCLUDED.coupon_code_a,
            coupon_code_b = EXCLUDED.coupon_code_b,
            version = EXCLUDED.version,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&experiment.key)
    .bind(&experiment.name)
    .bind(experiment.enabled)
    .bind(i16::from(experiment.traffic_percent))
    .bind(i16::from(experiment.split_percent_a))
    .bind(experiment.force_variant.map(|v| v.as_str()))
    .bind(&experiment.coupon_code_a)
    .bind(&experiment.coupon_code_b)
    .bind(experiment.version)
    .bind(experiment.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn find_coupon_for_update(&mut self, code: &str) -> Result<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_coupon).transpose()
    }

    async fn count_coupon_usages(&mut self, coupon_id: CouponId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1")
            .bind(coupon_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?;
        non_negative(count, "usage count")
    }

    async fn count_user_coupon_usages(
        &mut self,
        coupon_id: CouponId,
        user_id: &UserId,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
        )
        .bind(coupon_id.as_uuid())
        .bind(user_id.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        non_negative(count, "usage count")
    }

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price, stock_limited, available_quantity FROM products WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn decrement_stock(&mut self, id: &ProductId, quantity: u32) -> Result<u64> {
        let quantity = i32_from(quantity, "quantity")?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET available_quantity = available_quantity - $2
            WHERE id = $1 AND stock_limited AND available_quantity >= $2
            "#,
        )
        .bind(id.as_str())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn next_order_sequence(&mut self) -> Result<i64> {
        let value: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(value)
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(number.as_str())
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer, lines, subtotal, discount,
                                total_amount, coupon_code, payment_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(serde_json::to_value(&order.customer)?)
        .bind(serde_json::to_value(&order.lines)?)
        .bind(order.subtotal.cents())
        .bind(order.discount.cents())
        .bind(order.total_amount.cents())
        .bind(&order.coupon_code)
        .bind(order.payment_status.as_str())
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_order_number_conflict(&err) => Err(StoreError::OrderNumberConflict(
                order.order_number.to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupon_usages (id, coupon_id, order_id, user_id, discount_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(usage.id.as_uuid())
        .bind(usage.coupon_id.as_uuid())
        .bind(usage.order_id.as_uuid())
        .bind(usage.user_id.as_ref().map(UserId::as_str))
        .bind(usage.discount_amount.cents())
        .bind(usage.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_experiment_for_update(&mut self, key: &str) -> Result<Option<Experiment>> {
        let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE key = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_experiment).transpose()
    }

    async fn save_experiment(&mut self, experiment: &Experiment) -> Result<()> {
        upsert_experiment(&mut *self.tx, experiment).await
    }

    async fn set_coupon_active(&mut self, code: &str, active: bool) -> Result<u64> {
        let result = sqlx::query("UPDATE coupons SET is_active = $2 WHERE code = $1")
            .bind(code)
            .bind(active)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for PostgresCommerceStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_cart(&self, token: &CartToken) -> Result<Option<Cart>> {
        let marker: Option<Option<String>> =
            sqlx::query_scalar("SELECT applied_coupon_code FROM carts WHERE token = $1")
                .bind(token.as_str())
                .fetch_optional(&self.pool)
                .await?;
        let Some(applied_coupon) = marker else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, quantity, unit_price
            FROM cart_items
            WHERE cart_token = $1
            ORDER BY position ASC
            "#,
        )
        .bind(token.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Cart {
            token: token.clone(),
            items: rows
                .iter()
                .map(row_to_cart_item)
                .collect::<Result<Vec<_>>>()?,
            applied_coupon,
        }))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO carts (token, applied_coupon_code)
            VALUES ($1, $2)
            ON CONFLICT (token) DO UPDATE
            SET applied_coupon_code = EXCLUDED.applied_coupon_code, updated_at = NOW()
            "#,
        )
        .bind(cart.token.as_str())
        .bind(&cart.applied_coupon)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_token = $1")
            .bind(cart.token.as_str())
            .execute(&mut *tx)
            .await?;

        for item in &cart.items {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_token, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(cart.token.as_str())
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(i32_from(item.quantity, "quantity")?)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_applied_coupon(&self, token: &CartToken, code: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (token, applied_coupon_code)
            VALUES ($1, $2)
            ON CONFLICT (token) DO UPDATE
            SET applied_coupon_code = EXCLUDED.applied_coupon_code, updated_at = NOW()
            "#,
        )
        .bind(token.as_str())
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_cart_abandoned(&self, token: &CartToken, at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO carts (token) VALUES ($1) ON CONFLICT (token) DO NOTHING")
            .bind(token.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO abandoned_carts (cart_token, tracked_at, recovered_at)
            VALUES ($1, $2, NULL)
            ON CONFLICT (cart_token) DO UPDATE
            SET tracked_at = EXCLUDED.tracked_at, recovered_at = NULL
            "#,
        )
        .bind(token.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_cart_recovered(&self, token: &CartToken, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE abandoned_carts SET recovered_at = $2
            WHERE cart_token = $1 AND recovered_at IS NULL
            "#,
        )
        .bind(token.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn abandoned_cart(&self, token: &CartToken) -> Result<Option<AbandonedCart>> {
        let row = sqlx::query(
            "SELECT tracked_at, recovered_at FROM abandoned_carts WHERE cart_token = $1",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(AbandonedCart {
                token: token.clone(),
                tracked_at: row.try_get("tracked_at")?,
                recovered_at: row.try_get("recovered_at")?,
            })
        })
        .transpose()
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price, stock_limited, available_quantity FROM products WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, stock_limited, available_quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                stock_limited = EXCLUDED.stock_limited,
                available_quantity = EXCLUDED.available_quantity
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock_limited)
        .bind(i32_from(product.available_quantity, "available_quantity")?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let usage_limit = coupon
            .usage_limit
            .map(|v| i32_from(v, "usage_limit"))
            .transpose()?;
        let per_user_limit = coupon
            .per_user_limit
            .map(|v| i32_from(v, "per_user_limit"))
            .transpose()?;

        let sql = format!(
            "INSERT INTO coupons ({COUPON_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(coupon.id.as_uuid())
            .bind(&coupon.code)
            .bind(coupon.kind.as_str())
            .bind(coupon.value)
            .bind(coupon.min_order_amount.map(|m| m.cents()))
            .bind(coupon.max_discount_amount.map(|m| m.cents()))
            .bind(usage_limit)
            .bind(per_user_limit)
            .bind(coupon.starts_at)
            .bind(coupon.expires_at)
            .bind(coupon.is_active)
            .bind(coupon.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_coupon).transpose()
    }

    async fn coupon_usage_count(&self, coupon_id: CouponId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1")
            .bind(coupon_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        non_negative(count, "usage count")
    }

    async fn paid_coupon_outcomes(
        &self,
        code: &str,
        since: DateTime<Utc>,
    ) -> Result<CouponOutcomes> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS paid_orders,
                   COALESCE(SUM(u.discount_amount), 0)::BIGINT AS discount_total,
                   COALESCE(SUM(o.total_amount), 0)::BIGINT AS gross_revenue
            FROM coupon_usages u
            JOIN coupons c ON c.id = u.coupon_id
            JOIN orders o ON o.id = u.order_id
            WHERE c.code = $1 AND o.payment_status = 'paid' AND u.created_at >= $2
            "#,
        )
        .bind(code)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(CouponOutcomes {
            paid_orders: non_negative(row.try_get::<i64, _>("paid_orders")?, "paid_orders")?,
            discount_total: Money::from_cents(row.try_get("discount_total")?),
            gross_revenue: Money::from_cents(row.try_get("gross_revenue")?),
        })
    }

    async fn get_experiment(&self, key: &str) -> Result<Option<Experiment>> {
        let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE key = $1");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_experiment).transpose()
    }

    async fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        upsert_experiment(&self.pool, experiment).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn order_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        non_negative(count, "order count")
    }

    async fn transition_payment_status(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $3 WHERE id = $1 AND payment_status = $2",
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::not_found("order", id))
        }
    }
}
