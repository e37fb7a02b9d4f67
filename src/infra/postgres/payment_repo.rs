use {
    crate::domain::error::SettlementError,
    crate::domain::money::MoneyAmount,
    crate::domain::payment::{NewPayment, Payment, PaymentMethod, PaymentStatus},
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    amount_cents: i64,
    method: String,
    status: String,
    external_txn_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = SettlementError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment::from_db(
            row.id,
            row.order_id,
            MoneyAmount::new(row.amount_cents)?,
            PaymentMethod::try_from(row.method.as_str())?,
            PaymentStatus::try_from(row.status.as_str())?,
            row.external_txn_id,
            row.created_at,
            row.updated_at,
        ))
    }
}

const COLUMNS: &str =
    "id, order_id, amount_cents, method, status, external_txn_id, created_at, updated_at";

pub async fn insert(
    ex: impl sqlx::PgExecutor<'_>,
    payment: &NewPayment,
) -> Result<(), SettlementError> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, amount_cents, method, status)
        VALUES ($1, $2, $3, $4, 'pending')
        "#,
    )
    .bind(payment.id())
    .bind(payment.order_id())
    .bind(payment.amount().cents())
    .bind(payment.method().as_str())
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn get(
    ex: impl sqlx::PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<Payment>, SettlementError> {
    let row: Option<PaymentRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(ex)
            .await?;

    row.map(Payment::try_from).transpose()
}

/// Match a callback to its payment row: by the provider's transaction
/// reference first, then by the merchant correlation id (our payment id) for
/// providers that assign their reference asynchronously.
pub async fn find_for_settlement(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    external_txn_id: &str,
    correlation_id: Option<Uuid>,
) -> Result<Option<Payment>, SettlementError> {
    let row: Option<PaymentRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM payments WHERE external_txn_id = $1"))
            .bind(external_txn_id)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some(row) = row {
        return Ok(Some(Payment::try_from(row)?));
    }

    let Some(correlation_id) = correlation_id else {
        return Ok(None);
    };

    let row: Option<PaymentRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM payments WHERE id = $1"))
            .bind(correlation_id)
            .fetch_optional(&mut **tx)
            .await?;

    row.map(Payment::try_from).transpose()
}

/// Record one webhook delivery. Returns `false` when the event id was seen
/// before: the idempotency gate for at-least-once delivery.
pub async fn record_provider_event(
    ex: impl sqlx::PgExecutor<'_>,
    event_id: &str,
    provider: &str,
    external_ref: &str,
    event_kind: &str,
    payload: &serde_json::Value,
) -> Result<bool, SettlementError> {
    let result = sqlx::query(
        r#"
        INSERT INTO provider_events (event_id, provider, external_ref, event_kind, payload)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(provider)
    .bind(external_ref)
    .bind(event_kind)
    .bind(payload)
    .execute(ex)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Compare-and-swap status update: only flips the row when it is still in
/// `from`. Of N concurrent deliveries exactly one sees rows_affected == 1;
/// everyone else observes the already-settled row. The sole write path for
/// `payments.status`.
pub async fn cas_status(
    ex: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    from: PaymentStatus,
    to: PaymentStatus,
    external_txn_id: Option<&str>,
) -> Result<bool, SettlementError> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = $1,
            external_txn_id = COALESCE(external_txn_id, $2),
            updated_at = now()
        WHERE id = $3 AND status = $4
        "#,
    )
    .bind(to.as_str())
    .bind(external_txn_id)
    .bind(id)
    .bind(from.as_str())
    .execute(ex)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persist the provider's transaction reference from checkout creation.
/// Never overwrites a reference that is already set.
pub async fn set_external_txn_id(
    ex: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    external_txn_id: &str,
) -> Result<(), SettlementError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET external_txn_id = $1, updated_at = now()
        WHERE id = $2 AND external_txn_id IS NULL
        "#,
    )
    .bind(external_txn_id)
    .bind(id)
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn completed_total(
    ex: impl sqlx::PgExecutor<'_>,
    order_id: Uuid,
) -> Result<i64, SettlementError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
        FROM payments
        WHERE order_id = $1 AND status = 'completed'
        "#,
    )
    .bind(order_id)
    .fetch_one(ex)
    .await?;

    Ok(total)
}

/// Best-effort double-submit guard: is there already an identical pending
/// payment created after `since`?
pub async fn has_recent_pending_duplicate(
    ex: impl sqlx::PgExecutor<'_>,
    order_id: Uuid,
    amount: MoneyAmount,
    method: PaymentMethod,
    since: DateTime<Utc>,
) -> Result<bool, SettlementError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM payments
            WHERE order_id = $1 AND amount_cents = $2 AND method = $3
              AND status = 'pending' AND created_at > $4
        )
        "#,
    )
    .bind(order_id)
    .bind(amount.cents())
    .bind(method.as_str())
    .bind(since)
    .fetch_one(ex)
    .await?;

    Ok(exists)
}

/// Sweep pending rows older than the cutoff to failed. Returns the swept ids
/// so the caller can audit each one.
pub async fn expire_stale(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Uuid>, SettlementError> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE payments
        SET status = 'failed', updated_at = now()
        WHERE status = 'pending' AND created_at < $1
        RETURNING id
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut **tx)
    .await?;

    Ok(ids)
}

/// Serialize all settlement processing for one external reference.
/// Advisory lock works even when the payment row doesn't exist yet, so
/// there is no insert race to handle.
pub async fn lock_external_ref(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    external_ref: &str,
) -> Result<(), SettlementError> {
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut **tx)
        .await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(external_ref)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
