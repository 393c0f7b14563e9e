use clap::{Args, ValueEnum};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::cascade::{CascadeError, CascadeOptions, CascadeResolver, Operation, Report, ReportConvention, SelfReferencePolicy};
use crate::cli::utils::{format_table, output_error, output_success};
use crate::cli::OutputFormat;
use crate::database::{PgStore, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CascadeAction {
    Count,
    SoftDelete,
    Delete,
}

#[derive(Debug, Args)]
pub struct CascadeArgs {
    #[arg(value_enum, help = "What to do with matching records")]
    pub action: CascadeAction,

    #[arg(help = "Root entity type, e.g. user, role, category")]
    pub entity: String,

    #[arg(long = "where", default_value = "{}", help = "JSON filter selecting root records")]
    pub where_clause: String,

    #[arg(long, help = "User id recorded as updatedBy on soft-delete")]
    pub actor: Option<String>,

    #[arg(long, help = "Always report the root's own count under its key")]
    pub normalized: bool,

    #[arg(long, help = "Follow self references through the whole subtree")]
    pub transitive: bool,

    #[arg(long, help = "Apply each step immediately instead of in one transaction")]
    pub no_transaction: bool,
}

impl CascadeArgs {
    pub fn options(&self) -> CascadeOptions {
        let mut options = CascadeOptions::from_config();
        if self.normalized {
            options.report_keys = ReportConvention::Normalized;
        }
        if self.transitive {
            options.self_reference = SelfReferencePolicy::Transitive;
        }
        if self.no_transaction {
            options.transactional = false;
        }
        options
    }

    pub fn operation(&self) -> Operation {
        match self.action {
            CascadeAction::Count => Operation::Count,
            CascadeAction::Delete => Operation::Delete,
            CascadeAction::SoftDelete => {
                let mut body = Map::new();
                body.insert("isDeleted".to_string(), Value::Bool(true));
                body.insert(
                    "updatedBy".to_string(),
                    self.actor.clone().map(Value::String).unwrap_or(Value::Null),
                );
                Operation::SoftDelete(body)
            }
        }
    }
}

/// Run the cascade described by `args` against `store`
pub async fn execute(store: Arc<dyn Store>, args: &CascadeArgs) -> Result<Report, CascadeError> {
    let where_data: Value = serde_json::from_str(&args.where_clause).map_err(crate::filter::FilterError::from)?;
    let resolver = CascadeResolver::new(store, args.options());
    resolver.run_named(&args.entity, &where_data, &args.operation()).await
}

pub async fn handle(args: CascadeArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(PgStore::from_env().await?);

    match execute(store, &args).await {
        Ok(report) => {
            let message = format!("{} {}: {} records", args.operation().name(), args.entity, report.total());
            match output_format {
                OutputFormat::Json => output_success(&output_format, &message, Some(serde_json::to_value(&report)?)),
                OutputFormat::Text => {
                    output_success(&output_format, &message, None)?;
                    let rows: Vec<(String, String)> = report.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
                    println!("{}", format_table(&rows));
                    Ok(())
                }
            }
        }
        Err(err) => {
            let applied = err.applied().map(serde_json::to_value).transpose()?;
            output_error(&output_format, &err.to_string(), applied)?;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::schema::EntityKind;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: CascadeArgs,
    }

    fn parse(argv: &[&str]) -> CascadeArgs {
        TestCli::parse_from(std::iter::once("tripctl").chain(argv.iter().copied())).args
    }

    #[test]
    fn parses_soft_delete_with_actor() {
        let args = parse(&["soft-delete", "user", "--where", r#"{"id":"u1"}"#, "--actor", "admin"]);
        assert_eq!(args.action, CascadeAction::SoftDelete);
        match args.operation() {
            Operation::SoftDelete(body) => assert_eq!(body["updatedBy"], json!("admin")),
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[tokio::test]
    async fn executes_against_any_store() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store
            .seed(
                EntityKind::ProjectRoute,
                vec![json!({ "id": "p1" }).as_object().cloned().unwrap()],
            )
            .await;
        store
            .seed(
                EntityKind::RouteRole,
                vec![json!({ "routeId": "p1" }).as_object().cloned().unwrap()],
            )
            .await;

        let args = parse(&["count", "projectRoute", "--where", r#"{"_id":"p1"}"#]);
        let report = execute(Arc::new(store), &args).await?;
        assert_eq!(serde_json::to_value(&report)?, json!({ "routeRole": 1 }));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_malformed_where() {
        let args = parse(&["delete", "trip", "--where", "{not json"]);
        let err = execute(Arc::new(MemoryStore::new()), &args).await.unwrap_err();
        assert!(matches!(err, CascadeError::Filter(_)));
    }
}
