use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::database::manager::DatabaseError;
use crate::database::store::{stamp_new, stamp_update, Document, Session, Store, StoreOp};
use crate::filter::{Filter, FilterOrder, FindOptions};
use crate::schema::EntityKind;

/// One recorded persistence call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub op: StoreOp,
    pub entity: EntityKind,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<EntityKind, Vec<Document>>,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    journal: Vec<JournalEntry>,
    failures: Vec<(StoreOp, EntityKind)>,
}

impl State {
    /// Journal the call, then fail it if a failure was injected for it
    fn record(&mut self, op: StoreOp, entity: EntityKind) -> Result<(), DatabaseError> {
        self.journal.push(JournalEntry { op, entity });
        if self.failures.contains(&(op, entity)) {
            return Err(DatabaseError::QueryError(format!("injected failure: {:?} on {}", op, entity)));
        }
        Ok(())
    }
}

/// In-process store of JSON documents.
///
/// Used by the test suite and for running the API without Postgres.
/// Transactional sessions take the store lock for their whole lifetime and
/// work on a private copy of the tables, written back on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    without_transactions: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `transaction()` hands out autocommit sessions, like a
    /// backend that cannot span collections atomically
    pub fn non_transactional() -> Self {
        Self { without_transactions: true, ..Self::default() }
    }

    /// Insert records directly, bypassing the journal and injected failures
    pub async fn seed(&self, entity: EntityKind, documents: Vec<Document>) -> Vec<Document> {
        let mut state = self.state.lock().await;
        let table = state.tables.rows.entry(entity).or_default();
        documents
            .into_iter()
            .map(|doc| {
                let doc = stamp_new(doc);
                table.push(doc.clone());
                doc
            })
            .collect()
    }

    /// Snapshot of every committed record of `entity`
    pub async fn rows(&self, entity: EntityKind) -> Vec<Document> {
        let state = self.state.lock().await;
        state.tables.rows.get(&entity).cloned().unwrap_or_default()
    }

    pub async fn fail_on(&self, op: StoreOp, entity: EntityKind) {
        self.state.lock().await.failures.push((op, entity));
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().await.journal.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn session(&self) -> Result<Box<dyn Session>, DatabaseError> {
        Ok(Box::new(MemorySession { state: self.state.clone() }))
    }

    async fn transaction(&self) -> Result<Box<dyn Session>, DatabaseError> {
        if self.without_transactions {
            return self.session().await;
        }
        let guard = self.state.clone().lock_owned().await;
        let scratch = guard.tables.clone();
        Ok(Box::new(MemoryTransaction { guard, scratch }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

impl Tables {
    fn table(&self, entity: EntityKind) -> &[Document] {
        self.rows.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    fn find(&self, entity: EntityKind, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let mut matched: Vec<&Document> = self.table(entity).iter().filter(|doc| filter.matches(doc)).collect();
        if !options.order.is_empty() {
            matched.sort_by(|a, b| FilterOrder::compare(a, b, &options.order));
        }
        let offset = options.offset.unwrap_or(0).max(0) as usize;
        let limit = options.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|doc| match &options.select {
                Some(columns) if !columns.is_empty() => columns
                    .iter()
                    .filter_map(|c| doc.get(c).map(|v| (c.clone(), v.clone())))
                    .collect(),
                _ => doc.clone(),
            })
            .collect()
    }

    fn count(&self, entity: EntityKind, filter: &Filter) -> u64 {
        self.table(entity).iter().filter(|doc| filter.matches(doc)).count() as u64
    }

    fn create(&mut self, entity: EntityKind, document: Document) -> Result<Document, DatabaseError> {
        let document = stamp_new(document);
        let table = self.rows.entry(entity).or_default();
        let id = document.get(crate::schema::ID_FIELD);
        if table.iter().any(|existing| existing.get(crate::schema::ID_FIELD) == id) {
            return Err(DatabaseError::DuplicateKey(format!(
                "{}: {}",
                entity,
                id.unwrap_or(&Value::Null)
            )));
        }
        table.push(document.clone());
        Ok(document)
    }

    fn update_many(&mut self, entity: EntityKind, filter: &Filter, changes: &Document) -> u64 {
        let changes = stamp_update(changes);
        let mut affected = 0;
        if let Some(table) = self.rows.get_mut(&entity) {
            for doc in table.iter_mut().filter(|doc| filter.matches(doc)) {
                for (key, value) in &changes {
                    doc.insert(key.clone(), value.clone());
                }
                affected += 1;
            }
        }
        affected
    }

    fn delete_many(&mut self, entity: EntityKind, filter: &Filter) -> u64 {
        match self.rows.get_mut(&entity) {
            Some(table) => {
                let before = table.len();
                table.retain(|doc| !filter.matches(doc));
                (before - table.len()) as u64
            }
            None => 0,
        }
    }
}

/// Autocommit session: every call locks, applies and releases
struct MemorySession {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn find(&mut self, entity: EntityKind, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, DatabaseError> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::Find, entity)?;
        Ok(state.tables.find(entity, filter, options))
    }

    async fn count(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::Count, entity)?;
        Ok(state.tables.count(entity, filter))
    }

    async fn create(&mut self, entity: EntityKind, document: Document) -> Result<Document, DatabaseError> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::Create, entity)?;
        state.tables.create(entity, document)
    }

    async fn update_many(&mut self, entity: EntityKind, filter: &Filter, changes: &Document) -> Result<u64, DatabaseError> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::UpdateMany, entity)?;
        Ok(state.tables.update_many(entity, filter, changes))
    }

    async fn delete_many(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::DeleteMany, entity)?;
        Ok(state.tables.delete_many(entity, filter))
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }

    fn is_transactional(&self) -> bool {
        false
    }
}

/// Isolated session; changes land only on commit
struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    scratch: Tables,
}

#[async_trait]
impl Session for MemoryTransaction {
    async fn find(&mut self, entity: EntityKind, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, DatabaseError> {
        self.guard.record(StoreOp::Find, entity)?;
        Ok(self.scratch.find(entity, filter, options))
    }

    async fn count(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError> {
        self.guard.record(StoreOp::Count, entity)?;
        Ok(self.scratch.count(entity, filter))
    }

    async fn create(&mut self, entity: EntityKind, document: Document) -> Result<Document, DatabaseError> {
        self.guard.record(StoreOp::Create, entity)?;
        self.scratch.create(entity, document)
    }

    async fn update_many(&mut self, entity: EntityKind, filter: &Filter, changes: &Document) -> Result<u64, DatabaseError> {
        self.guard.record(StoreOp::UpdateMany, entity)?;
        Ok(self.scratch.update_many(entity, filter, changes))
    }

    async fn delete_many(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError> {
        self.guard.record(StoreOp::DeleteMany, entity)?;
        Ok(self.scratch.delete_many(entity, filter))
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTransaction { mut guard, scratch } = *self;
        guard.tables = scratch;
        Ok(())
    }

    fn is_transactional(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn crud_roundtrip() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let mut session = store.session().await?;

        let created = session.create(EntityKind::Trip, doc(json!({ "tripKind": "bus", "distance": 4 }))).await?;
        assert_eq!(created["isDeleted"], json!(false));

        let changes = doc(json!({ "distance": 9 }));
        assert_eq!(session.update_many(EntityKind::Trip, &Filter::eq("tripKind", "bus"), &changes).await?, 1);
        let found = session.find_one(EntityKind::Trip, &Filter::All).await?.unwrap();
        assert_eq!(found["distance"], json!(9));

        assert_eq!(session.delete_many(EntityKind::Trip, &Filter::All).await?, 1);
        assert_eq!(session.count(EntityKind::Trip, &Filter::All).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn find_applies_order_paging_and_projection() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store
            .seed(
                EntityKind::State,
                (1..=5).map(|n| doc(json!({ "id": format!("s{}", n), "rank": n }))).collect(),
            )
            .await;
        let mut session = store.session().await?;
        let options = FindOptions {
            select: Some(vec!["id".to_string()]),
            order: FilterOrder::validate_and_parse(&json!({ "rank": -1 }))?,
            limit: Some(2),
            offset: Some(1),
        };
        let rows = session.find(EntityKind::State, &Filter::All, &options).await?;
        assert_eq!(rows, vec![doc(json!({ "id": "s4" })), doc(json!({ "id": "s3" }))]);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_transaction_discards_changes() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.seed(EntityKind::Role, vec![doc(json!({ "id": "r1" }))]).await;
        {
            let mut tx = store.transaction().await?;
            assert!(tx.is_transactional());
            tx.delete_many(EntityKind::Role, &Filter::All).await?;
        }
        assert_eq!(store.rows(EntityKind::Role).await.len(), 1);

        let mut tx = store.transaction().await?;
        tx.delete_many(EntityKind::Role, &Filter::All).await?;
        tx.commit().await?;
        assert!(store.rows(EntityKind::Role).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_are_journaled() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::Count, EntityKind::Banner).await;
        let mut session = store.session().await?;
        assert!(session.count(EntityKind::Banner, &Filter::All).await.is_err());
        assert!(session.count(EntityKind::Trip, &Filter::All).await.is_ok());
        assert_eq!(
            store.journal().await,
            vec![
                JournalEntry { op: StoreOp::Count, entity: EntityKind::Banner },
                JournalEntry { op: StoreOp::Count, entity: EntityKind::Trip },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let mut session = store.session().await?;
        session.create(EntityKind::User, doc(json!({ "id": "u1" }))).await?;
        let err = session.create(EntityKind::User, doc(json!({ "id": "u1" }))).await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey(_)));
        Ok(())
    }
}
