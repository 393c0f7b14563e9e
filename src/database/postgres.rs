use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Instant;

use crate::config::CONFIG;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::store::{stamp_new, stamp_update, Document, Session, Store};
use crate::filter::{Filter, FilterOrder, FilterWhere, FindOptions, SqlParam};
use crate::schema::EntityKind;

/// Postgres-backed store: one table per entity, records exchanged as JSON
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store over the shared pool from `DATABASE_URL`
    pub async fn from_env() -> Result<Self, DatabaseError> {
        Ok(Self::new(DatabaseManager::main_pool().await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn session(&self) -> Result<Box<dyn Session>, DatabaseError> {
        Ok(Box::new(PgSession { conn: Connection::Pool(self.pool.clone()) }))
    }

    async fn transaction(&self) -> Result<Box<dyn Session>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { conn: Connection::Transaction(tx) }))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

enum Connection {
    Pool(PgPool),
    /// Rolled back by sqlx when dropped uncommitted
    Transaction(Transaction<'static, Postgres>),
}

pub struct PgSession {
    conn: Connection,
}

impl PgSession {
    async fn fetch_documents(&mut self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Document>, DatabaseError> {
        let started = Instant::now();
        let query = bind_params(sqlx::query(sql), params);
        let rows = match &mut self.conn {
            Connection::Pool(pool) => query.fetch_all(&*pool).await?,
            Connection::Transaction(tx) => query.fetch_all(&mut **tx).await?,
        };
        log_query(sql, started);

        rows.iter()
            .map(|row| match row.try_get::<Value, _>("row")? {
                Value::Object(doc) => Ok(doc),
                other => Err(DatabaseError::InvalidDocument(format!("expected object row, got {}", other))),
            })
            .collect()
    }

    async fn execute(&mut self, sql: &str, params: Vec<SqlParam>) -> Result<u64, DatabaseError> {
        let started = Instant::now();
        let query = bind_params(sqlx::query(sql), params);
        let result = match &mut self.conn {
            Connection::Pool(pool) => query.execute(&*pool).await?,
            Connection::Transaction(tx) => query.execute(&mut **tx).await?,
        };
        log_query(sql, started);
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn find(&mut self, entity: EntityKind, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, DatabaseError> {
        let sql_result = build_select(entity, filter, options)?;
        self.fetch_documents(&sql_result.0, sql_result.1).await
    }

    async fn count(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError> {
        let table = entity.table();
        let (where_clause, params) = FilterWhere::generate(filter, table, 0)?;
        let sql = format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", table, where_clause);

        let started = Instant::now();
        let query = bind_params(sqlx::query(&sql), params);
        let row = match &mut self.conn {
            Connection::Pool(pool) => query.fetch_one(&*pool).await?,
            Connection::Transaction(tx) => query.fetch_one(&mut **tx).await?,
        };
        log_query(&sql, started);
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn create(&mut self, entity: EntityKind, document: Document) -> Result<Document, DatabaseError> {
        let document = stamp_new(document);
        let table = entity.table();
        let columns = quoted_columns(document.keys())?;
        let sql = format!(
            "WITH inserted AS (INSERT INTO \"{table}\" ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::\"{table}\", $1) RETURNING *) \
             SELECT to_jsonb(inserted) AS row FROM inserted",
            table = table,
            columns = columns,
        );
        self.fetch_documents(&sql, vec![SqlParam::Json(Value::Object(document))])
            .await
            .map_err(|e| match e {
                DatabaseError::Sqlx(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    DatabaseError::DuplicateKey(format!("{}: {}", entity, db_err.message()))
                }
                other => other,
            })?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::QueryError(format!("insert into {} returned no row", table)))
    }

    async fn update_many(&mut self, entity: EntityKind, filter: &Filter, changes: &Document) -> Result<u64, DatabaseError> {
        let changes = stamp_update(changes);
        let table = entity.table();
        let assignments = changes
            .keys()
            .map(|key| {
                crate::filter::filter::validate_column(key)?;
                Ok(format!("\"{key}\" = p.\"{key}\"", key = key))
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?;
        let (where_clause, mut params) = FilterWhere::generate(filter, table, 1)?;
        let sql = format!(
            "UPDATE \"{table}\" SET {assignments} FROM jsonb_populate_record(NULL::\"{table}\", $1) AS p WHERE {where_clause}",
            table = table,
            assignments = assignments.join(", "),
            where_clause = where_clause,
        );
        params.insert(0, SqlParam::Json(Value::Object(changes)));
        self.execute(&sql, params).await
    }

    async fn delete_many(&mut self, entity: EntityKind, filter: &Filter) -> Result<u64, DatabaseError> {
        let table = entity.table();
        let (where_clause, params) = FilterWhere::generate(filter, table, 0)?;
        let sql = format!("DELETE FROM \"{}\" WHERE {}", table, where_clause);
        self.execute(&sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        if let Connection::Transaction(tx) = self.conn {
            tx.commit().await?;
        }
        Ok(())
    }

    fn is_transactional(&self) -> bool {
        matches!(self.conn, Connection::Transaction(_))
    }
}

fn quoted_columns<'a>(keys: impl Iterator<Item = &'a String>) -> Result<String, DatabaseError> {
    let columns = keys
        .map(|key| {
            crate::filter::filter::validate_column(key)?;
            Ok(format!("\"{}\"", key))
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;
    Ok(columns.join(", "))
}

fn build_select(entity: EntityKind, filter: &Filter, options: &FindOptions) -> Result<(String, Vec<SqlParam>), DatabaseError> {
    let table = entity.table();
    let select = match &options.select {
        Some(columns) if !columns.is_empty() => quoted_columns(columns.iter())?,
        _ => "*".to_string(),
    };
    let (where_clause, params) = FilterWhere::generate(filter, table, 0)?;
    let mut inner = format!("SELECT {} FROM \"{}\" WHERE {}", select, table, where_clause);

    let order = FilterOrder::generate(&options.order)?;
    if !order.is_empty() {
        inner.push(' ');
        inner.push_str(&order);
    }
    if let Some(limit) = options.limit {
        inner.push_str(&format!(" LIMIT {}", limit.max(0)));
    }
    if let Some(offset) = options.offset {
        inner.push_str(&format!(" OFFSET {}", offset.max(0)));
    }
    Ok((format!("SELECT to_jsonb(t) AS row FROM ({}) t", inner), params))
}

fn bind_params<'q>(mut query: Query<'q, Postgres, PgArguments>, params: Vec<SqlParam>) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Json(value) => query.bind(value),
            SqlParam::Text(text) => query.bind(text),
            SqlParam::TextArray(texts) => query.bind(texts),
        };
    }
    query
}

fn log_query(sql: &str, started: Instant) {
    let elapsed = started.elapsed();
    if CONFIG.database.enable_query_logging {
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "SQL: {}", sql);
    }
    if CONFIG.database.enable_slow_query_warning && elapsed.as_millis() as u64 >= CONFIG.database.slow_query_threshold_ms {
        tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow query: {}", sql);
    }
}
