//! The order-payment orchestrator: the single authority for creating payment
//! attempts and applying status transitions.
//!
//! All writes to `payments.status` go through the repository's
//! compare-and-swap update, so concurrent webhook deliveries, admin actions
//! and the stale sweep cannot double-apply a transition or its side effects.

use {
    crate::domain::{
        audit::NewAuditEntry,
        error::SettlementError,
        id::ExternalTxnId,
        money::MoneyAmount,
        notify::Notifier,
        order::Balance,
        payment::{NewPayment, Payment, PaymentMethod, PaymentStatus},
        provider::{CallbackEvent, Checkout, CheckoutData, NormalizedCallback, ProviderRegistry},
    },
    crate::infra::postgres::{audit_repo::insert_audit_entry, order_repo, payment_repo},
    chrono::Utc,
    sqlx::PgPool,
    std::sync::Arc,
    std::time::Duration,
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct SettlementSettings {
    /// Window for the best-effort double-submit guard on initiate.
    pub duplicate_guard: Duration,
    /// Slack before a completed total above budget is flagged.
    pub overpay_tolerance_cents: i64,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            duplicate_guard: Duration::from_secs(30),
            overpay_tolerance_cents: 0,
        }
    }
}

/// Who is asking. Clients may only touch their own orders; admins may touch
/// any.
#[derive(Debug, Clone, Copy)]
pub enum Requester {
    Client(Uuid),
    Admin(Uuid),
}

impl Requester {
    fn actor(&self) -> String {
        match self {
            Self::Client(id) => format!("client:{id}"),
            Self::Admin(id) => format!("admin:{id}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub order_id: Uuid,
    pub amount: MoneyAmount,
    pub method: PaymentMethod,
    pub requester: Requester,
}

#[derive(Debug)]
pub struct InitiatedPayment {
    pub payment: Payment,
    pub checkout: CheckoutData,
}

/// What applying one callback did.
#[derive(Debug)]
pub enum CallbackResult {
    /// The transition was applied; side effects fired exactly once, here.
    Applied {
        payment_id: Uuid,
        status: PaymentStatus,
    },
    /// The row was already terminal; idempotent no-op.
    AlreadySettled { payment_id: Uuid },
    /// This event id was processed before (provider redelivery).
    Duplicate,
    /// Unknown provider vocabulary; recorded, nothing applied.
    Ignored { event_kind: String },
}

pub struct Settlement {
    pool: PgPool,
    registry: ProviderRegistry,
    notifier: Arc<dyn Notifier>,
    settings: SettlementSettings,
}

impl Settlement {
    pub fn new(
        pool: PgPool,
        registry: ProviderRegistry,
        notifier: Arc<dyn Notifier>,
        settings: SettlementSettings,
    ) -> Self {
        Self {
            pool,
            registry,
            notifier,
            settings,
        }
    }

    /// Which HTTP header carries the signature for this provider's
    /// callbacks. `None` when no adapter is registered for the method.
    pub fn callback_signature_header(&self, method: PaymentMethod) -> Option<&'static str> {
        self.registry.get(method).map(|a| a.signature_header())
    }

    /// Create a pending payment and obtain provider checkout data.
    ///
    /// The row is committed before the provider call: if the provider is
    /// down, the pending row stays (the stale sweep reclaims it) and the
    /// caller gets `ProviderUnavailable` to retry with a fresh attempt.
    pub async fn initiate_payment(
        &self,
        req: InitiatePayment,
    ) -> Result<InitiatedPayment, SettlementError> {
        let new_payment = NewPayment::new(req.order_id, req.amount, req.method)?;

        // Resolve the adapter up front so an unsupported method creates no row.
        let adapter = match req.method {
            PaymentMethod::BankTransfer => None,
            method => Some(self.registry.get(method).ok_or_else(|| {
                SettlementError::InvalidRequest(format!("no provider registered for {method}"))
            })?),
        };

        let actor = req.requester.actor();
        let mut tx = self.pool.begin().await?;

        let order = order_repo::get(&mut *tx, req.order_id)
            .await?
            .ok_or_else(|| {
                SettlementError::InvalidRequest(format!("unknown order: {}", req.order_id))
            })?;
        if let Requester::Client(user_id) = req.requester {
            if order.user_id != user_id {
                return Err(SettlementError::Unauthorized(
                    "order belongs to another client".into(),
                ));
            }
        }

        let since = Utc::now() - self.settings.duplicate_guard;
        if payment_repo::has_recent_pending_duplicate(
            &mut *tx,
            req.order_id,
            req.amount,
            req.method,
            since,
        )
        .await?
        {
            return Err(SettlementError::InvalidRequest(
                "an identical payment was just initiated; wait before retrying".into(),
            ));
        }

        payment_repo::insert(&mut *tx, &new_payment).await?;
        insert_audit_entry(
            &mut *tx,
            &NewAuditEntry::payment(
                Some(new_payment.id()),
                None,
                "created",
                &actor,
                serde_json::json!({
                    "order_id": req.order_id,
                    "amount_cents": req.amount.cents(),
                    "method": req.method.as_str(),
                }),
            ),
        )
        .await?;
        tx.commit().await?;

        let checkout = match adapter {
            None => Checkout {
                external_txn_id: None,
                data: CheckoutData::BankInstructions {
                    reference: new_payment.id().to_string(),
                },
            },
            Some(adapter) => {
                adapter
                    .create_checkout(new_payment.id(), new_payment.amount())
                    .await?
            }
        };

        if let Some(ext) = &checkout.external_txn_id {
            payment_repo::set_external_txn_id(&self.pool, new_payment.id(), ext.as_str()).await?;
        }

        let payment = payment_repo::get(&self.pool, new_payment.id())
            .await?
            .ok_or_else(|| SettlementError::UnknownPayment(new_payment.id().to_string()))?;

        tracing::info!(
            payment_id = %payment.id(),
            order_id = %req.order_id,
            method = %req.method,
            "payment initiated"
        );

        Ok(InitiatedPayment {
            payment,
            checkout: checkout.data,
        })
    }

    /// Authenticate, normalize and apply one provider callback.
    ///
    /// Dedup by event id, advisory lock per external reference, then a
    /// CAS status update: of N concurrent deliveries exactly one observes
    /// the pending-to-terminal transition and fires side effects.
    pub async fn apply_provider_callback(
        &self,
        method: PaymentMethod,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackResult, SettlementError> {
        let adapter = self.registry.get(method).ok_or_else(|| {
            SettlementError::InvalidRequest(format!("no provider registered for {method}"))
        })?;
        let provider = method.as_str();
        let actor = format!("webhook:{provider}");

        let Some(sig) = signature else {
            self.audit_rejected_callback(provider, "missing signature header")
                .await;
            return Err(SettlementError::UnauthorizedCallback(
                "missing signature header".into(),
            ));
        };
        if !adapter.verify_signature(body, sig) {
            self.audit_rejected_callback(provider, "signature mismatch")
                .await;
            return Err(SettlementError::UnauthorizedCallback(
                "signature mismatch".into(),
            ));
        }

        let cb = match adapter.normalize_callback(body)? {
            CallbackEvent::Ignored {
                event_id,
                event_kind,
                raw,
            } => {
                return self
                    .record_ignored_event(provider, &actor, event_id.as_str(), &event_kind, &raw)
                    .await;
            }
            CallbackEvent::Settlement(cb) => cb,
        };

        self.apply_settlement_event(provider, &actor, cb).await
    }

    async fn apply_settlement_event(
        &self,
        provider: &str,
        actor: &str,
        cb: NormalizedCallback,
    ) -> Result<CallbackResult, SettlementError> {
        let target = cb.status.to_payment_status();
        let mut tx = self.pool.begin().await?;
        payment_repo::lock_external_ref(&mut tx, cb.external_txn_id.as_str()).await?;

        let is_new = payment_repo::record_provider_event(
            &mut *tx,
            cb.event_id.as_str(),
            provider,
            cb.external_txn_id.as_str(),
            &cb.event_kind,
            &cb.raw,
        )
        .await?;
        if !is_new {
            tx.commit().await?;
            tracing::info!(event_id = %cb.event_id, "duplicate event, already processed");
            return Ok(CallbackResult::Duplicate);
        }

        let payment = payment_repo::find_for_settlement(
            &mut tx,
            cb.external_txn_id.as_str(),
            cb.correlation_id,
        )
        .await?;
        let Some(payment) = payment else {
            // Roll back so the event is NOT marked seen: the provider will
            // retry on its own policy, and a retry must get a real attempt,
            // not a dedup no-op. The audit record is written outside the tx.
            tx.rollback().await?;
            insert_audit_entry(
                &self.pool,
                &NewAuditEntry::payment(
                    None,
                    Some(cb.external_txn_id.to_string()),
                    "unknown_payment",
                    actor,
                    serde_json::json!({
                        "event_id": cb.event_id.as_str(),
                        "event_kind": cb.event_kind,
                    }),
                ),
            )
            .await?;
            return Err(SettlementError::UnknownPayment(
                cb.external_txn_id.to_string(),
            ));
        };

        if payment.status().is_terminal() {
            self.audit_noop(&mut tx, &payment, &cb, actor).await?;
            tx.commit().await?;
            return Ok(CallbackResult::AlreadySettled {
                payment_id: payment.id(),
            });
        }

        if !payment.status().can_transition_to(&target) {
            insert_audit_entry(
                &mut *tx,
                &NewAuditEntry::payment(
                    Some(payment.id()),
                    Some(cb.external_txn_id.to_string()),
                    "anomaly",
                    actor,
                    serde_json::json!({
                        "event_id": cb.event_id.as_str(),
                        "current_status": payment.status().as_str(),
                        "incoming_status": target.as_str(),
                    }),
                ),
            )
            .await?;
            tx.commit().await?;
            tracing::warn!(
                payment_id = %payment.id(),
                from = %payment.status(),
                to = %target,
                "invalid status transition from callback"
            );
            return Err(SettlementError::InvalidTransition {
                from: *payment.status(),
                to: target,
            });
        }

        let won = payment_repo::cas_status(
            &mut *tx,
            payment.id(),
            PaymentStatus::Pending,
            target,
            Some(cb.external_txn_id.as_str()),
        )
        .await?;
        if !won {
            self.audit_noop(&mut tx, &payment, &cb, actor).await?;
            tx.commit().await?;
            return Ok(CallbackResult::AlreadySettled {
                payment_id: payment.id(),
            });
        }

        let amount_mismatch = cb
            .amount
            .is_some_and(|reported| reported != payment.amount());
        if amount_mismatch {
            tracing::warn!(
                payment_id = %payment.id(),
                stored_cents = payment.amount().cents(),
                reported_cents = cb.amount.map(|a| a.cents()),
                "callback amount differs from stored payment amount"
            );
        }

        insert_audit_entry(
            &mut *tx,
            &NewAuditEntry::payment(
                Some(payment.id()),
                Some(cb.external_txn_id.to_string()),
                "status_changed",
                actor,
                serde_json::json!({
                    "event_id": cb.event_id.as_str(),
                    "event_kind": cb.event_kind,
                    "old_status": payment.status().as_str(),
                    "new_status": target.as_str(),
                    "stored_amount_cents": payment.amount().cents(),
                    "reported_amount_cents": cb.amount.map(|a| a.cents()),
                    "amount_mismatch": amount_mismatch,
                }),
            ),
        )
        .await?;
        tx.commit().await?;

        // Side effects only on the transition that actually changed state.
        self.notifier
            .notify(
                &format!("payment.{}", target.as_str()),
                serde_json::json!({
                    "payment_id": payment.id(),
                    "order_id": payment.order_id(),
                    "amount_cents": payment.amount().cents(),
                    "status": target.as_str(),
                }),
            )
            .await;
        if target == PaymentStatus::Completed {
            self.flag_overpayment(payment.order_id()).await;
        }

        tracing::info!(
            payment_id = %payment.id(),
            status = %target,
            "payment settled from callback"
        );
        Ok(CallbackResult::Applied {
            payment_id: payment.id(),
            status: target,
        })
    }

    /// Derived balance view; never read from a stored total.
    pub async fn get_balance(&self, order_id: Uuid) -> Result<Balance, SettlementError> {
        let order = order_repo::get(&self.pool, order_id)
            .await?
            .ok_or_else(|| {
                SettlementError::InvalidRequest(format!("unknown order: {order_id}"))
            })?;
        let paid = payment_repo::completed_total(&self.pool, order_id).await?;

        Ok(Balance {
            budget_cents: order.budget.map(|b| b.cents()),
            paid_cents: paid,
            remaining_cents: order.budget.map(|b| b.cents() - paid),
        })
    }

    /// Two-phase refund: the provider-side refund must succeed before the
    /// local record is flipped. On provider failure the row stays completed.
    pub async fn refund(
        &self,
        payment_id: Uuid,
        admin_id: Uuid,
    ) -> Result<Payment, SettlementError> {
        let payment = payment_repo::get(&self.pool, payment_id)
            .await?
            .ok_or_else(|| SettlementError::UnknownPayment(payment_id.to_string()))?;
        if *payment.status() != PaymentStatus::Completed {
            return Err(SettlementError::InvalidTransition {
                from: *payment.status(),
                to: PaymentStatus::Refunded,
            });
        }

        // Bank transfers are refunded out-of-band; everything else goes
        // through the provider first.
        if payment.method() != PaymentMethod::BankTransfer {
            let adapter = self.registry.get(payment.method()).ok_or_else(|| {
                SettlementError::InvalidRequest(format!(
                    "no provider registered for {}",
                    payment.method()
                ))
            })?;
            let ext = payment.external_txn_id().ok_or_else(|| {
                SettlementError::InvalidRequest(
                    "payment has no external transaction reference".into(),
                )
            })?;
            let ext = ExternalTxnId::new(ext)?;
            adapter.refund_payment(&ext, payment.amount()).await?;
        }

        let mut tx = self.pool.begin().await?;
        let won = payment_repo::cas_status(
            &mut *tx,
            payment_id,
            PaymentStatus::Completed,
            PaymentStatus::Refunded,
            None,
        )
        .await?;
        if !won {
            let current = payment_repo::get(&mut *tx, payment_id)
                .await?
                .map(|p| *p.status())
                .unwrap_or(PaymentStatus::Completed);
            return Err(SettlementError::InvalidTransition {
                from: current,
                to: PaymentStatus::Refunded,
            });
        }
        insert_audit_entry(
            &mut *tx,
            &NewAuditEntry::payment(
                Some(payment_id),
                payment.external_txn_id().map(String::from),
                "refunded",
                &format!("admin:{admin_id}"),
                serde_json::json!({
                    "amount_cents": payment.amount().cents(),
                    "method": payment.method().as_str(),
                }),
            ),
        )
        .await?;
        tx.commit().await?;

        self.notifier
            .notify(
                "payment.refunded",
                serde_json::json!({
                    "payment_id": payment_id,
                    "order_id": payment.order_id(),
                    "amount_cents": payment.amount().cents(),
                }),
            )
            .await;

        tracing::info!(payment_id = %payment_id, "payment refunded");
        payment_repo::get(&self.pool, payment_id)
            .await?
            .ok_or_else(|| SettlementError::UnknownPayment(payment_id.to_string()))
    }

    /// Manual settlement for methods without callbacks (bank transfers) and
    /// for operational overrides. Same partial order, same CAS guard as the
    /// webhook path.
    pub async fn override_status(
        &self,
        payment_id: Uuid,
        target: PaymentStatus,
        admin_id: Uuid,
    ) -> Result<Payment, SettlementError> {
        if !matches!(target, PaymentStatus::Completed | PaymentStatus::Failed) {
            return Err(SettlementError::InvalidRequest(
                "override can only settle a pending payment".into(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let payment = payment_repo::get(&mut *tx, payment_id)
            .await?
            .ok_or_else(|| SettlementError::UnknownPayment(payment_id.to_string()))?;
        if !payment.status().can_transition_to(&target) {
            return Err(SettlementError::InvalidTransition {
                from: *payment.status(),
                to: target,
            });
        }

        let won =
            payment_repo::cas_status(&mut *tx, payment_id, PaymentStatus::Pending, target, None)
                .await?;
        if !won {
            let current = payment_repo::get(&mut *tx, payment_id)
                .await?
                .map(|p| *p.status())
                .unwrap_or(*payment.status());
            return Err(SettlementError::InvalidTransition {
                from: current,
                to: target,
            });
        }
        insert_audit_entry(
            &mut *tx,
            &NewAuditEntry::payment(
                Some(payment_id),
                payment.external_txn_id().map(String::from),
                "status_overridden",
                &format!("admin:{admin_id}"),
                serde_json::json!({
                    "old_status": payment.status().as_str(),
                    "new_status": target.as_str(),
                }),
            ),
        )
        .await?;
        tx.commit().await?;

        self.notifier
            .notify(
                &format!("payment.{}", target.as_str()),
                serde_json::json!({
                    "payment_id": payment_id,
                    "order_id": payment.order_id(),
                    "amount_cents": payment.amount().cents(),
                    "status": target.as_str(),
                }),
            )
            .await;
        if target == PaymentStatus::Completed {
            self.flag_overpayment(payment.order_id()).await;
        }

        tracing::info!(payment_id = %payment_id, status = %target, "payment status overridden");
        payment_repo::get(&self.pool, payment_id)
            .await?
            .ok_or_else(|| SettlementError::UnknownPayment(payment_id.to_string()))
    }

    /// Sweep pending payments older than `older_than` to failed. Their
    /// checkout references are stale; a retrying client gets a fresh row.
    pub async fn expire_stale_payments(
        &self,
        older_than: Duration,
    ) -> Result<u64, SettlementError> {
        let cutoff = Utc::now() - older_than;
        let mut tx = self.pool.begin().await?;
        let ids = payment_repo::expire_stale(&mut tx, cutoff).await?;
        for id in &ids {
            insert_audit_entry(
                &mut *tx,
                &NewAuditEntry::payment(
                    Some(*id),
                    None,
                    "expired",
                    "sweeper",
                    serde_json::json!({ "ttl_secs": older_than.as_secs() }),
                ),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    async fn audit_noop(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &Payment,
        cb: &NormalizedCallback,
        actor: &str,
    ) -> Result<(), SettlementError> {
        insert_audit_entry(
            &mut **tx,
            &NewAuditEntry::payment(
                Some(payment.id()),
                Some(cb.external_txn_id.to_string()),
                "event_received",
                actor,
                serde_json::json!({
                    "event_id": cb.event_id.as_str(),
                    "event_kind": cb.event_kind,
                    "current_status": payment.status().as_str(),
                    "noop": true,
                }),
            ),
        )
        .await
    }

    async fn record_ignored_event(
        &self,
        provider: &str,
        actor: &str,
        event_id: &str,
        event_kind: &str,
        raw: &serde_json::Value,
    ) -> Result<CallbackResult, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let is_new =
            payment_repo::record_provider_event(&mut *tx, event_id, provider, "", event_kind, raw)
                .await?;
        if !is_new {
            tx.commit().await?;
            return Ok(CallbackResult::Duplicate);
        }
        insert_audit_entry(
            &mut *tx,
            &NewAuditEntry::payment(
                None,
                None,
                "event_received",
                actor,
                serde_json::json!({
                    "event_id": event_id,
                    "event_kind": event_kind,
                    "passthrough": true,
                }),
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(CallbackResult::Ignored {
            event_kind: event_kind.to_string(),
        })
    }

    /// Security-relevant: rejected callbacks are audited even though the
    /// caller only sees a generic error.
    async fn audit_rejected_callback(&self, provider: &str, reason: &str) {
        let entry = NewAuditEntry::payment(
            None,
            None,
            "unauthorized_callback",
            &format!("webhook:{provider}"),
            serde_json::json!({ "reason": reason }),
        );
        if let Err(e) = insert_audit_entry(&self.pool, &entry).await {
            tracing::error!(error = %e, "failed to audit rejected callback");
        }
    }

    async fn flag_overpayment(&self, order_id: Uuid) {
        let result: Result<(), SettlementError> = async {
            let Some(order) = order_repo::get(&self.pool, order_id).await? else {
                return Ok(());
            };
            let Some(budget) = order.budget else {
                return Ok(());
            };
            let paid = payment_repo::completed_total(&self.pool, order_id).await?;
            if paid > budget.cents() + self.settings.overpay_tolerance_cents {
                tracing::warn!(
                    order_id = %order_id,
                    paid_cents = paid,
                    budget_cents = budget.cents(),
                    "order paid beyond budget tolerance"
                );
                insert_audit_entry(
                    &self.pool,
                    &NewAuditEntry::order(
                        order_id,
                        "overpayment_flagged",
                        "settlement",
                        serde_json::json!({
                            "paid_cents": paid,
                            "budget_cents": budget.cents(),
                            "tolerance_cents": self.settings.overpay_tolerance_cents,
                        }),
                    ),
                )
                .await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!(order_id = %order_id, error = %e, "overpayment check failed");
        }
    }
}
