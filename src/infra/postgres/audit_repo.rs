use {crate::domain::audit::NewAuditEntry, crate::domain::error::SettlementError};

pub async fn insert_audit_entry(
    ex: impl sqlx::PgExecutor<'_>,
    entry: &NewAuditEntry,
) -> Result<(), SettlementError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_type, entity_id, external_ref, action, actor, detail)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.external_ref.as_deref())
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(&entry.detail)
    .execute(ex)
    .await?;

    Ok(())
}
