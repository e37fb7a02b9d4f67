use {
    crate::domain::error::SettlementError,
    crate::domain::money::MoneyAmount,
    crate::domain::order::{NewOrder, Order, OrderStatus, ServiceKind},
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    service_kind: String,
    title: String,
    description: String,
    budget_cents: Option<i64>,
    status: String,
    timeline: Option<String>,
    attachments: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = SettlementError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            service_kind: ServiceKind::try_from(row.service_kind.as_str())?,
            title: row.title,
            description: row.description,
            budget: row.budget_cents.map(MoneyAmount::new).transpose()?,
            status: OrderStatus::try_from(row.status.as_str())?,
            timeline: row.timeline,
            attachments: row.attachments,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, user_id, service_kind, title, description, budget_cents, status, \
                       timeline, attachments, created_at, updated_at";

pub async fn insert(ex: impl sqlx::PgExecutor<'_>, order: &NewOrder) -> Result<(), SettlementError> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, service_kind, title, description, budget_cents,
                            status, timeline, attachments)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
        "#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.service_kind.as_str())
    .bind(&order.title)
    .bind(&order.description)
    .bind(order.budget.map(|b| b.cents()))
    .bind(order.timeline.as_deref())
    .bind(&order.attachments)
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn get(
    ex: impl sqlx::PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<Order>, SettlementError> {
    let row: Option<OrderRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(ex)
            .await?;

    row.map(Order::try_from).transpose()
}

pub async fn set_status(
    ex: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    status: OrderStatus,
) -> Result<bool, SettlementError> {
    let result = sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status.as_str())
        .bind(id)
        .execute(ex)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Orders with payment history are financial records; deletion is refused,
/// not cascaded.
pub async fn delete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<bool, SettlementError> {
    let has_payments: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payments WHERE order_id = $1)")
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;

    if has_payments {
        return Err(SettlementError::InvalidRequest(
            "order has payments and cannot be deleted".into(),
        ));
    }

    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}
