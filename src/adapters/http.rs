//! HTTP surface. Client/admin identity arrives via `x-user-id` /
//! `x-admin-id` headers set by the portal's session layer in front of this
//! service; provider callbacks are authenticated by signature only.

use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            audit::NewAuditEntry,
            error::SettlementError,
            money::MoneyAmount,
            order::{Balance, NewOrder, Order, OrderStatus, ServiceKind},
            payment::{Payment, PaymentMethod, PaymentStatus},
            provider::CheckoutData,
        },
        infra::postgres::{audit_repo::insert_audit_entry, order_repo, payment_repo},
        services::settlement::{CallbackResult, InitiatePayment, Requester},
    },
    axum::{
        Json,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

fn uuid_header(headers: &HeaderMap, name: &str) -> Option<Uuid> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

fn client_id(headers: &HeaderMap) -> Result<Uuid, SettlementError> {
    uuid_header(headers, "x-user-id").ok_or_else(|| {
        SettlementError::Unauthorized("missing or malformed x-user-id header".into())
    })
}

fn admin_id(headers: &HeaderMap) -> Result<Uuid, SettlementError> {
    uuid_header(headers, "x-admin-id").ok_or_else(|| {
        SettlementError::Unauthorized("missing or malformed x-admin-id header".into())
    })
}

fn requester(headers: &HeaderMap) -> Result<Requester, SettlementError> {
    if let Some(admin) = uuid_header(headers, "x-admin-id") {
        return Ok(Requester::Admin(admin));
    }
    client_id(headers).map(Requester::Client)
}

// ── Orders ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateOrderBody {
    pub service_kind: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget_cents: Option<i64>,
    pub timeline: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let user_id = client_id(&headers)?;
    let kind = ServiceKind::try_from(body.service_kind.as_str())?;
    let budget = body.budget_cents.map(MoneyAmount::new).transpose()?;

    let mut order = NewOrder::new(user_id, kind, body.title, body.description, budget)?;
    order.timeline = body.timeline;

    let mut tx = state.pool.begin().await.map_err(SettlementError::from)?;
    order_repo::insert(&mut *tx, &order).await?;
    insert_audit_entry(
        &mut *tx,
        &NewAuditEntry::order(
            order.id,
            "created",
            &format!("client:{user_id}"),
            serde_json::json!({
                "service_kind": order.service_kind.as_str(),
                "budget_cents": order.budget.map(|b| b.cents()),
            }),
        ),
    )
    .await?;
    tx.commit().await.map_err(SettlementError::from)?;

    let created = order_repo::get(&state.pool, order.id)
        .await?
        .ok_or_else(|| SettlementError::InvalidRequest(format!("unknown order: {}", order.id)))?;

    tracing::info!(order_id = %created.id, "order created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
pub struct SetOrderStatusBody {
    pub status: String,
}

pub async fn set_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SetOrderStatusBody>,
) -> Result<Json<Order>, ApiError> {
    let admin = admin_id(&headers)?;
    let status = OrderStatus::try_from(body.status.as_str())?;

    let mut tx = state.pool.begin().await.map_err(SettlementError::from)?;
    let updated = order_repo::set_status(&mut *tx, id, status).await?;
    if !updated {
        return Err(SettlementError::InvalidRequest(format!("unknown order: {id}")).into());
    }
    insert_audit_entry(
        &mut *tx,
        &NewAuditEntry::order(
            id,
            "status_changed",
            &format!("admin:{admin}"),
            serde_json::json!({ "new_status": status.as_str() }),
        ),
    )
    .await?;
    tx.commit().await.map_err(SettlementError::from)?;

    let order = order_repo::get(&state.pool, id)
        .await?
        .ok_or_else(|| SettlementError::InvalidRequest(format!("unknown order: {id}")))?;
    Ok(Json(order))
}

pub async fn order_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Balance>, ApiError> {
    let balance = state.settlement.get_balance(id).await?;
    Ok(Json(balance))
}

// ── Payments ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct InitiatePaymentBody {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub method: String,
}

#[derive(Serialize)]
pub struct InitiatedPaymentResponse {
    pub payment: Payment,
    pub checkout: CheckoutData,
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InitiatePaymentBody>,
) -> Result<(StatusCode, Json<InitiatedPaymentResponse>), ApiError> {
    let requester = requester(&headers)?;
    let method = PaymentMethod::try_from(body.method.as_str())?;
    let amount = MoneyAmount::new(body.amount_cents)?;

    let initiated = state
        .settlement
        .initiate_payment(InitiatePayment {
            order_id: body.order_id,
            amount,
            method,
            requester,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiatedPaymentResponse {
            payment: initiated.payment,
            checkout: initiated.checkout,
        }),
    ))
}

/// Polling endpoint: the canonical status straight from the payment store,
/// never inferred client-side.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Payment>, ApiError> {
    let requester = requester(&headers)?;
    let payment = payment_repo::get(&state.pool, id)
        .await?
        .ok_or_else(|| SettlementError::UnknownPayment(id.to_string()))?;

    if let Requester::Client(user_id) = requester {
        let order = order_repo::get(&state.pool, payment.order_id())
            .await?
            .ok_or_else(|| SettlementError::UnknownPayment(id.to_string()))?;
        if order.user_id != user_id {
            return Err(
                SettlementError::Unauthorized("payment belongs to another client".into()).into(),
            );
        }
    }

    Ok(Json(payment))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Payment>, ApiError> {
    let admin = admin_id(&headers)?;
    let payment = state.settlement.refund(id, admin).await?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct OverrideStatusBody {
    pub status: String,
}

/// Manual settlement for bank transfers and operational fixes.
pub async fn override_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<OverrideStatusBody>,
) -> Result<Json<Payment>, ApiError> {
    let admin = admin_id(&headers)?;
    let status = PaymentStatus::try_from(body.status.as_str())?;
    let payment = state.settlement.override_status(id, status, admin).await?;
    Ok(Json(payment))
}

// ── Provider callbacks ─────────────────────────────────────────────────────

fn provider_from_path(provider: &str) -> Result<PaymentMethod, SettlementError> {
    match provider {
        "crypto-pay" => Ok(PaymentMethod::CryptoPay),
        "card" => Ok(PaymentMethod::Card),
        "wallet" => Ok(PaymentMethod::Wallet),
        other => Err(SettlementError::InvalidRequest(format!(
            "unknown provider: {other}"
        ))),
    }
}

#[tracing::instrument(name = "callback", skip_all, fields(provider = %provider))]
pub async fn provider_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let method = provider_from_path(&provider)?;
    let signature = state
        .settlement
        .callback_signature_header(method)
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok());

    let result = state
        .settlement
        .apply_provider_callback(method, body.as_bytes(), signature)
        .await?;

    let status = match result {
        CallbackResult::Applied { payment_id, status } => {
            tracing::info!(payment_id = %payment_id, status = %status, "callback applied");
            "applied"
        }
        CallbackResult::AlreadySettled { payment_id } => {
            tracing::info!(payment_id = %payment_id, "callback no-op, payment already settled");
            "already_settled"
        }
        CallbackResult::Duplicate => "duplicate",
        CallbackResult::Ignored { ref event_kind } => {
            tracing::info!(event_kind = %event_kind, "callback ignored");
            "ignored"
        }
    };

    Ok(Json(serde_json::json!({ "status": status })))
}
