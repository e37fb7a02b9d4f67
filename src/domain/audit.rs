use uuid::Uuid;

/// Append-only audit record. Written inside the same transaction as the
/// state change it describes.
pub struct NewAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub external_ref: Option<String>,
    pub action: String,
    pub actor: String,
    pub detail: serde_json::Value,
}

impl NewAuditEntry {
    pub fn payment(
        entity_id: Option<Uuid>,
        external_ref: Option<String>,
        action: &str,
        actor: &str,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: "payment".to_string(),
            entity_id,
            external_ref,
            action: action.to_string(),
            actor: actor.to_string(),
            detail,
        }
    }

    pub fn order(entity_id: Uuid, action: &str, actor: &str, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: "order".to_string(),
            entity_id: Some(entity_id),
            external_ref: None,
            action: action.to_string(),
            actor: actor.to_string(),
            detail,
        }
    }
}
