use async_trait::async_trait;
use common::{
    AgentId, CatalogItemId, LineItemId, Money, NoticeId, OrderId, OrderStatus, UserId, VendorId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Binding, CatalogItem, DeliveryAgent, HistoryEntry, LineItem, OrderQuery, OrderRecord, Result,
    StoreError, VendorNotice,
    store::{StockDeduction, Store, StoreTx},
};

const ORDER_COLUMNS: &str =
    "id, user_id, total_cents, address, phone, status, payment_method, created_at, assigned_agent";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }
}

/// Transaction over a [`PostgresStore`]. Rolls back when dropped.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

fn count_to_u32(table: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::CorruptRow {
        table,
        reason: format!("count out of range: {value}"),
    })
}

fn parse_status(table: &'static str, value: &str) -> Result<OrderStatus> {
    value
        .parse()
        .map_err(|e: common::ParseStatusError| StoreError::CorruptRow {
            table,
            reason: e.to_string(),
        })
}

fn row_to_catalog_item(row: PgRow) -> Result<CatalogItem> {
    Ok(CatalogItem {
        id: CatalogItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: count_to_u32("catalog_items", row.try_get("stock")?)?,
        vendor_id: row
            .try_get::<Option<Uuid>, _>("vendor_id")?
            .map(VendorId::from_uuid),
        image: row.try_get("image")?,
    })
}

fn row_to_line_item(row: PgRow) -> Result<LineItem> {
    let binding = match row.try_get::<Option<Uuid>, _>("order_id")? {
        Some(order_id) => Binding::Order(OrderId::from_uuid(order_id)),
        None => Binding::Cart,
    };
    Ok(LineItem {
        id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        item_id: CatalogItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
        quantity: count_to_u32("line_items", row.try_get("quantity")?)?,
        binding,
    })
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let status: String = row.try_get("status")?;
    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        status: parse_status("orders", &status)?,
        payment_method: row.try_get("payment_method")?,
        created_at: row.try_get("created_at")?,
        assigned_agent: row
            .try_get::<Option<Uuid>, _>("assigned_agent")?
            .map(AgentId::from_uuid),
    })
}

fn row_to_notice(row: PgRow) -> Result<VendorNotice> {
    Ok(VendorNotice {
        id: NoticeId::from_uuid(row.try_get::<Uuid, _>("id")?),
        vendor_id: VendorId::from_uuid(row.try_get::<Uuid, _>("vendor_id")?),
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
        read: row.try_get("read")?,
    })
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn catalog_item(&mut self, id: CatalogItemId) -> Result<Option<CatalogItem>> {
        let row = sqlx::query(
            "SELECT id, title, author, price_cents, stock, vendor_id, image FROM catalog_items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_catalog_item).transpose()
    }

    async fn put_catalog_item(&mut self, item: &CatalogItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_items (id, title, author, price_cents, stock, vendor_id, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                author = EXCLUDED.author,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                vendor_id = EXCLUDED.vendor_id,
                image = EXCLUDED.image
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.title)
        .bind(&item.author)
        .bind(item.price.cents())
        .bind(i64::from(item.stock))
        .bind(item.vendor_id.map(|v| v.as_uuid()))
        .bind(&item.image)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn deduct_stock(&mut self, id: CatalogItemId, quantity: u32) -> Result<StockDeduction> {
        // Conditional decrement; the row lock is held until the transaction ends.
        let remaining: Option<i64> = sqlx::query_scalar(
            "UPDATE catalog_items SET stock = stock - $2 WHERE id = $1 AND stock >= $2 RETURNING stock",
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(StockDeduction::Deducted {
                remaining: count_to_u32("catalog_items", remaining)?,
            });
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM catalog_items WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => Ok(StockDeduction::Insufficient {
                available: count_to_u32("catalog_items", available)?,
            }),
            None => Ok(StockDeduction::Missing),
        }
    }

    async fn set_stock(&mut self, id: CatalogItemId, stock: u32) -> Result<bool> {
        let result = sqlx::query("UPDATE catalog_items SET stock = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(stock))
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn restock(&mut self, id: CatalogItemId, quantity: u32) -> Result<Option<u32>> {
        let stock: Option<i64> = sqlx::query_scalar(
            "UPDATE catalog_items SET stock = LEAST(stock + $2, $3) WHERE id = $1 RETURNING stock",
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .bind(i64::from(u32::MAX))
        .fetch_optional(&mut *self.tx)
        .await?;

        stock.map(|s| count_to_u32("catalog_items", s)).transpose()
    }

    async fn delivery_agent(&mut self, id: AgentId) -> Result<Option<DeliveryAgent>> {
        let row = sqlx::query("SELECT id, name, phone, area FROM delivery_agents WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(DeliveryAgent {
                id: AgentId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                phone: row.try_get("phone")?,
                area: row.try_get("area")?,
            })),
            None => Ok(None),
        }
    }

    async fn put_delivery_agent(&mut self, agent: &DeliveryAgent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_agents (id, name, phone, area)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                area = EXCLUDED.area
            "#,
        )
        .bind(agent.id.as_uuid())
        .bind(&agent.name)
        .bind(&agent.phone)
        .bind(&agent.area)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>> {
        let row = sqlx::query(
            "SELECT id, user_id, item_id, quantity, order_id FROM line_items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_line_item).transpose()
    }

    async fn line_item_for_update(&mut self, id: LineItemId) -> Result<Option<LineItem>> {
        let row = sqlx::query(
            "SELECT id, user_id, item_id, quantity, order_id FROM line_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_line_item).transpose()
    }

    async fn cart_lines(&mut self, user: UserId) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, item_id, quantity, order_id
            FROM line_items
            WHERE user_id = $1 AND order_id IS NULL
            ORDER BY seq ASC
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_line_item).collect()
    }

    async fn cart_lines_for_update(&mut self, user: UserId) -> Result<Vec<LineItem>> {
        // Rows bound by a transaction we waited on fail the re-checked
        // `order_id IS NULL` predicate and drop out of the result.
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, item_id, quantity, order_id
            FROM line_items
            WHERE user_id = $1 AND order_id IS NULL
            ORDER BY seq ASC
            FOR UPDATE
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_line_item).collect()
    }

    async fn cart_line(&mut self, user: UserId, item: CatalogItemId) -> Result<Option<LineItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, item_id, quantity, order_id
            FROM line_items
            WHERE user_id = $1 AND item_id = $2 AND order_id IS NULL
            FOR UPDATE
            "#,
        )
        .bind(user.as_uuid())
        .bind(item.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_line_item).transpose()
    }

    async fn insert_line_item(&mut self, line: &LineItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO line_items (id, user_id, item_id, quantity, order_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.user_id.as_uuid())
        .bind(line.item_id.as_uuid())
        .bind(i64::from(line.quantity))
        .bind(line.order_id().map(|o| o.as_uuid()))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn set_line_quantity(&mut self, id: LineItemId, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE line_items SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_line_item(&mut self, id: LineItemId) -> Result<()> {
        sqlx::query("DELETE FROM line_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn bind_line_item(&mut self, id: LineItemId, order: OrderId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE line_items SET order_id = $2 WHERE id = $1 AND order_id IS NULL")
                .bind(id.as_uuid())
                .bind(order.as_uuid())
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, item_id, quantity, order_id
            FROM line_items
            WHERE order_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(order.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_line_item).collect()
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_cents, address, phone, status, payment_method, created_at, assigned_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total.cents())
        .bind(&order.address)
        .bind(&order.phone)
        .bind(order.status.as_str())
        .bind(&order.payment_method)
        .bind(order.created_at)
        .bind(order.assigned_agent.map(|a| a.as_uuid()))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn claim_order(
        &mut self,
        id: OrderId,
        agent: AgentId,
        allowed: &[OrderStatus],
        status: OrderStatus,
    ) -> Result<bool> {
        let allowed: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET assigned_agent = $2, status = $3
            WHERE id = $1 AND assigned_agent IS NULL AND status = ANY($4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(agent.as_uuid())
        .bind(status.as_str())
        .bind(allowed)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_orders(&mut self, query: &OrderQuery) -> Result<Vec<OrderRecord>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE 1=1");
        let mut param_count = 0;

        if query.user.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.user_id = ${param_count}"));
        }
        if query.vendor.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM line_items l JOIN catalog_items c ON c.id = l.item_id \
                 WHERE l.order_id = o.id AND c.vendor_id = ${param_count})"
            ));
        }
        if query.agent.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.assigned_agent = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }
        if query.unassigned_only {
            sql.push_str(" AND o.assigned_agent IS NULL");
        }

        sql.push_str(" ORDER BY o.created_at DESC");

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(user) = query.user {
            sqlx_query = sqlx_query.bind(user.as_uuid());
        }
        if let Some(vendor) = query.vendor {
            sqlx_query = sqlx_query.bind(vendor.as_uuid());
        }
        if let Some(agent) = query.agent {
            sqlx_query = sqlx_query.bind(agent.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }

        let rows = sqlx_query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool> {
        // line_items and order_history cascade.
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query("INSERT INTO order_history (order_id, status, recorded_at) VALUES ($1, $2, $3)")
            .bind(entry.order_id.as_uuid())
            .bind(entry.status.as_str())
            .bind(entry.recorded_at)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn history(&mut self, order: OrderId) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, status, recorded_at
            FROM order_history
            WHERE order_id = $1
            ORDER BY recorded_at ASC, seq ASC
            "#,
        )
        .bind(order.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(HistoryEntry {
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    status: parse_status("order_history", &status)?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    async fn insert_vendor_notice(&mut self, notice: &VendorNotice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vendor_notices (id, vendor_id, message, created_at, read)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notice.id.as_uuid())
        .bind(notice.vendor_id.as_uuid())
        .bind(&notice.message)
        .bind(notice.created_at)
        .bind(notice.read)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn vendor_notices(&mut self, vendor: VendorId) -> Result<Vec<VendorNotice>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_id, message, created_at, read
            FROM vendor_notices
            WHERE vendor_id = $1
            ORDER BY created_at DESC, seq DESC
            "#,
        )
        .bind(vendor.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_notice).collect()
    }

    async fn mark_notice_read(&mut self, id: NoticeId) -> Result<bool> {
        let result = sqlx::query("UPDATE vendor_notices SET read = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_vendor_notices_read(&mut self, vendor: VendorId) -> Result<u64> {
        let result =
            sqlx::query("UPDATE vendor_notices SET read = TRUE WHERE vendor_id = $1 AND NOT read")
                .bind(vendor.as_uuid())
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
