use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::database::manager::DatabaseError;
use crate::filter::{Filter, FindOptions};
use crate::schema::EntityKind;

/// A stored record: a flat JSON object keyed by field name
pub type Document = Map<String, Value>;

/// Persistence primitive, as seen by journals and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Find,
    Count,
    Create,
    UpdateMany,
    DeleteMany,
}

/// A unit of work against a store.
///
/// Sessions from [`Store::session`] apply each call immediately. Sessions
/// from [`Store::transaction`] apply nothing until [`Session::commit`];
/// dropping one uncommitted discards its changes.
#[async_trait]
pub trait Session: Send {
    async fn find(&mut self, entity: EntityKind, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, DatabaseError>;

    async fn count(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError>;

    /// Insert one record, returning it with system fields assigned
    async fn create(&mut self, entity: EntityKind, document: Document) -> Result<Document, DatabaseError>;

    /// Merge `changes` into every matching record; returns the number affected
    async fn update_many(&mut self, entity: EntityKind, filter: &Filter, changes: &Document) -> Result<u64, DatabaseError>;

    async fn delete_many(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    /// Whether uncommitted work is undone when the session is dropped
    fn is_transactional(&self) -> bool;

    async fn find_one(&mut self, entity: EntityKind, filter: &Filter) -> Result<Option<Document>, DatabaseError> {
        let options = FindOptions { limit: Some(1), ..Default::default() };
        Ok(self.find(entity, filter, &options).await?.into_iter().next())
    }

    /// Identifiers of every matching record
    async fn find_ids(&mut self, entity: EntityKind, filter: &Filter) -> Result<Vec<String>, DatabaseError> {
        let rows = self.find(entity, filter, &FindOptions::ids_only()).await?;
        rows.iter()
            .map(|row| match row.get(crate::schema::ID_FIELD) {
                Some(Value::String(id)) => Ok(id.clone()),
                Some(other) => Ok(other.to_string()),
                None => Err(DatabaseError::InvalidDocument(format!("{} record without id", entity))),
            })
            .collect()
    }

    async fn create_many(&mut self, entity: EntityKind, documents: Vec<Document>) -> Result<Vec<Document>, DatabaseError> {
        let mut created = Vec::with_capacity(documents.len());
        for document in documents {
            created.push(self.create(entity, document).await?);
        }
        Ok(created)
    }
}

/// Source of sessions. Implemented by Postgres and by the in-memory store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn session(&self) -> Result<Box<dyn Session>, DatabaseError>;

    /// Open an atomic session. Stores without transactions return an
    /// autocommit session whose `is_transactional()` is false.
    async fn transaction(&self) -> Result<Box<dyn Session>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// Strip fields callers may not set directly
pub fn sanitize_changes(document: &Document) -> Document {
    document
        .iter()
        .filter(|(key, _)| {
            let reserved = crate::schema::SYSTEM_FIELDS.contains(&key.as_str());
            if reserved {
                tracing::warn!("Attempted to set system field '{}' - ignoring", key);
            }
            !reserved
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Assign system fields to a record about to be inserted.
/// A caller-provided `id` is kept; flags default to active and not deleted.
pub fn stamp_new(mut document: Document) -> Document {
    let now = Value::String(chrono::Utc::now().to_rfc3339());
    document
        .entry(crate::schema::ID_FIELD)
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    document.insert("createdAt".to_string(), now.clone());
    document.insert("updatedAt".to_string(), now);
    document.entry("isDeleted").or_insert(Value::Bool(false));
    document.entry("isActive").or_insert(Value::Bool(true));
    document
}

/// Changes to merge into existing records, with `updatedAt` refreshed
pub fn stamp_update(changes: &Document) -> Document {
    let mut stamped = sanitize_changes(changes);
    stamped.insert("updatedAt".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
    stamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamp_new_fills_defaults_but_keeps_given_values() {
        let doc = stamp_new(json!({ "id": "r1", "isActive": false }).as_object().cloned().unwrap());
        assert_eq!(doc["id"], json!("r1"));
        assert_eq!(doc["isActive"], json!(false));
        assert_eq!(doc["isDeleted"], json!(false));
        assert!(doc.contains_key("createdAt"));

        let generated = stamp_new(Document::new());
        assert!(uuid::Uuid::parse_str(generated["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn stamp_update_refreshes_timestamp() {
        let changes = json!({ "isDeleted": true, "updatedAt": "1999" });
        let stamped = stamp_update(changes.as_object().unwrap());
        assert_eq!(stamped["isDeleted"], json!(true));
        assert_ne!(stamped["updatedAt"], json!("1999"));
    }

    #[test]
    fn sanitize_drops_system_fields() {
        let changes = json!({ "id": "x", "createdAt": "now", "name": "bus" });
        let clean = sanitize_changes(changes.as_object().unwrap());
        assert_eq!(clean.len(), 1);
        assert_eq!(clean["name"], json!("bus"));
    }
}
