use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::error::CascadeError;
use super::report::{Report, ReportConvention, SelfReferencePolicy};
use crate::config::CONFIG;
use crate::database::{DatabaseError, Document, Session, Store};
use crate::filter::Filter;
use crate::schema::{EntityKind, EntityDescriptor};

/// Terminal action applied to every matched set
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Count,
    /// Merge the body (conventionally `{isDeleted: true, updatedBy: <actor>}`)
    SoftDelete(Document),
    Delete,
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Count)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Count => "count",
            Operation::SoftDelete(_) => "soft-delete",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOptions {
    /// Wrap mutating cascades in one store transaction
    pub transactional: bool,
    pub report_keys: ReportConvention,
    pub self_reference: SelfReferencePolicy,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            transactional: true,
            report_keys: ReportConvention::default(),
            self_reference: SelfReferencePolicy::default(),
        }
    }
}

impl CascadeOptions {
    pub fn from_config() -> Self {
        Self {
            transactional: CONFIG.cascade.transactional,
            report_keys: CONFIG.cascade.report_keys,
            self_reference: CONFIG.cascade.self_reference,
        }
    }
}

/// Store call that failed, and the entity it targeted
struct StepFailure {
    entity: EntityKind,
    source: DatabaseError,
}

type StepResult<T> = Result<T, StepFailure>;

trait AtEntity<T> {
    fn at(self, entity: EntityKind) -> StepResult<T>;
}

impl<T> AtEntity<T> for Result<T, DatabaseError> {
    fn at(self, entity: EntityKind) -> StepResult<T> {
        self.map_err(|source| StepFailure { entity, source })
    }
}

/// Applies count / soft-delete / delete to a root entity and everything that
/// references it, driven by the static descriptor table.
#[derive(Clone)]
pub struct CascadeResolver {
    store: Arc<dyn Store>,
    options: CascadeOptions,
}

impl CascadeResolver {
    pub fn new(store: Arc<dyn Store>, options: CascadeOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> CascadeOptions {
        self.options
    }

    pub async fn count(&self, entity: EntityKind, filter: &Filter) -> Result<Report, CascadeError> {
        self.run(entity, filter, &Operation::Count).await
    }

    pub async fn soft_delete(&self, entity: EntityKind, filter: &Filter, update_body: Document) -> Result<Report, CascadeError> {
        self.run(entity, filter, &Operation::SoftDelete(update_body)).await
    }

    pub async fn delete(&self, entity: EntityKind, filter: &Filter) -> Result<Report, CascadeError> {
        self.run(entity, filter, &Operation::Delete).await
    }

    /// Entry point for callers holding a type name and a JSON where-clause.
    /// Both are validated before the store is touched.
    pub async fn run_named(&self, entity: &str, where_data: &Value, operation: &Operation) -> Result<Report, CascadeError> {
        let entity: EntityKind = entity.parse()?;
        let filter = Filter::from_json(where_data)?;
        self.run(entity, &filter, operation).await
    }

    pub async fn run(&self, entity: EntityKind, filter: &Filter, operation: &Operation) -> Result<Report, CascadeError> {
        let started = Instant::now();
        let opened = if operation.is_mutation() && self.options.transactional {
            self.store.transaction().await
        } else {
            self.store.session().await
        };
        let mut session = opened.map_err(|source| CascadeError::Persistence {
            action: operation.name(),
            entity,
            source,
            applied: Box::default(),
            rolled_back: false,
        })?;
        let transactional = session.is_transactional();

        let mut report = Report::new();
        let outcome = self.walk(session.as_mut(), entity, filter, operation, &mut report).await;
        let outcome = match outcome {
            Ok(()) => session.commit().await.at(entity),
            Err(failure) => {
                // Dropping an uncommitted transactional session undoes its work
                drop(session);
                Err(failure)
            }
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    entity = %entity,
                    action = operation.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cascade complete: {}",
                    report
                );
                Ok(report)
            }
            Err(StepFailure { entity: failed_on, source }) => {
                report.mark_partial();
                tracing::error!(
                    entity = %entity,
                    failed_on = %failed_on,
                    action = operation.name(),
                    rolled_back = transactional,
                    "Cascade failed after {}: {}",
                    report,
                    source
                );
                Err(CascadeError::Persistence {
                    action: operation.name(),
                    entity: failed_on,
                    source,
                    applied: Box::new(report),
                    rolled_back: transactional,
                })
            }
        }
    }

    async fn walk(
        &self,
        session: &mut dyn Session,
        entity: EntityKind,
        filter: &Filter,
        operation: &Operation,
        report: &mut Report,
    ) -> StepResult<()> {
        let descriptor = entity.descriptor();

        if !descriptor.has_dependents() {
            let affected = act(session, entity, filter, operation).await.at(entity)?;
            report.add(entity.name(), affected);
            report.set_root_count(affected);
            return Ok(());
        }

        // Root ids are read once, before anything is mutated
        let ids = session.find_ids(entity, filter).await.at(entity)?;
        if ids.is_empty() {
            report.add(entity.name(), 0);
            return Ok(());
        }

        for dependency in descriptor.dependents {
            let dependent_filter = references_to(dependency.fields, &ids);
            let affected = act(session, dependency.entity, &dependent_filter, operation)
                .await
                .at(dependency.entity)?;
            tracing::debug!("Cascade {} {}: {} {}", operation.name(), entity, dependency.entity, affected);
            report.add(dependency.entity.name(), affected);
        }

        if let Some(field) = descriptor.self_reference {
            let affected = self.act_on_descendants(session, descriptor, field, &ids, operation).await?;
            report.add(entity.name(), affected);
        }

        let root_affected = match operation {
            Operation::Count => ids.len() as u64,
            _ => act(session, entity, &Filter::by_ids(&ids), operation).await.at(entity)?,
        };
        report.set_root_count(root_affected);

        let include_root = match self.options.report_keys {
            ReportConvention::Normalized => true,
            ReportConvention::Legacy => operation.is_mutation() && report.contains(entity.name()),
        };
        if include_root {
            report.add(entity.name(), root_affected);
        }
        Ok(())
    }

    async fn act_on_descendants(
        &self,
        session: &mut dyn Session,
        descriptor: &EntityDescriptor,
        field: &'static str,
        root_ids: &[String],
        operation: &Operation,
    ) -> StepResult<u64> {
        let entity = descriptor.kind;
        let filter = match self.options.self_reference {
            SelfReferencePolicy::OneHop => references_to(&[field], root_ids),
            SelfReferencePolicy::Transitive => {
                let descendants = collect_descendants(session, entity, field, root_ids).await.at(entity)?;
                Filter::by_ids(&descendants)
            }
        };
        act(session, entity, &filter, operation).await.at(entity)
    }
}

/// `OR(field_1 IN ids, ..., field_n IN ids)`
fn references_to(fields: &[&str], ids: &[String]) -> Filter {
    Filter::or(fields.iter().map(|field| Filter::any_of(*field, ids.iter().cloned())).collect())
}

/// Every record below `root_ids` through `field`, excluding the roots.
/// Walks one level at a time; the visited set stops on cycles.
async fn collect_descendants(
    session: &mut dyn Session,
    entity: EntityKind,
    field: &str,
    root_ids: &[String],
) -> Result<Vec<String>, DatabaseError> {
    let mut visited: HashSet<String> = root_ids.iter().cloned().collect();
    let mut descendants = Vec::new();
    let mut frontier = root_ids.to_vec();

    while !frontier.is_empty() {
        let children = session.find_ids(entity, &Filter::any_of(field, frontier)).await?;
        frontier = children.into_iter().filter(|id| visited.insert(id.clone())).collect();
        descendants.extend(frontier.iter().cloned());
    }
    Ok(descendants)
}

async fn act(session: &mut dyn Session, entity: EntityKind, filter: &Filter, operation: &Operation) -> Result<u64, DatabaseError> {
    match operation {
        Operation::Count => session.count(entity, filter).await,
        Operation::SoftDelete(body) => session.update_many(entity, filter, body).await,
        Operation::Delete => session.delete_many(entity, filter).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn references_filter_covers_every_field() {
        let ids = vec!["u1".to_string()];
        let filter = references_to(&["userId", "addedBy"], &ids);
        assert!(filter.matches(&doc(json!({ "addedBy": "u1" }))));
        assert!(filter.matches(&doc(json!({ "userId": "u1" }))));
        assert!(!filter.matches(&doc(json!({ "updatedBy": "u1" }))));
    }

    #[tokio::test]
    async fn leaf_soft_delete_applies_update_body() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.seed(EntityKind::Banner, vec![doc(json!({ "id": "b1" })), doc(json!({ "id": "b2" }))]).await;
        let resolver = CascadeResolver::new(Arc::new(store.clone()), CascadeOptions::default());

        let report = resolver
            .soft_delete(EntityKind::Banner, &Filter::by_id("b1"), doc(json!({ "isDeleted": true, "updatedBy": "admin" })))
            .await?;
        assert_eq!(serde_json::to_value(&report)?, json!({ "banner": 1 }));

        let rows = store.rows(EntityKind::Banner).await;
        let b1 = rows.iter().find(|r| r["id"] == json!("b1")).unwrap();
        assert_eq!(b1["isDeleted"], json!(true));
        assert_eq!(b1["updatedBy"], json!("admin"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_names_fail_before_io() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let resolver = CascadeResolver::new(Arc::new(store.clone()), CascadeOptions::default());
        let err = resolver.run_named("vehicle", &json!({}), &Operation::Delete).await.unwrap_err();
        assert!(matches!(err, CascadeError::UnknownEntity(_)));
        assert!(store.journal().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn descendants_stop_on_cycles() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store
            .seed(
                EntityKind::Category,
                vec![
                    doc(json!({ "id": "a", "parentCategoryId": "c" })),
                    doc(json!({ "id": "b", "parentCategoryId": "a" })),
                    doc(json!({ "id": "c", "parentCategoryId": "b" })),
                ],
            )
            .await;
        let mut session = store.session().await?;
        let found = collect_descendants(session.as_mut(), EntityKind::Category, "parentCategoryId", &["a".to_string()]).await?;
        assert_eq!(found, vec!["b".to_string(), "c".to_string()]);
        Ok(())
    }
}
