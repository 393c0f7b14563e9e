use serde_json::{json, Value};

use crate::cli::{utils::format_table, OutputFormat};
use crate::schema::EntityKind;

fn describe(kind: EntityKind) -> Value {
    let descriptor = kind.descriptor();
    json!({
        "entity": kind.name(),
        "table": kind.table(),
        "dependents": descriptor
            .references()
            .iter()
            .map(|d| json!({ "entity": d.entity.name(), "fields": d.fields }))
            .collect::<Vec<_>>(),
        "ownerField": descriptor.owner_field,
    })
}

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let entities: Vec<Value> = EntityKind::ALL.iter().map(|k| describe(*k)).collect();
            println!("{}", serde_json::to_string_pretty(&entities)?);
        }
        OutputFormat::Text => {
            let rows: Vec<(String, String)> = EntityKind::ALL
                .iter()
                .map(|kind| {
                    let refs = kind.descriptor().references();
                    let summary = if refs.is_empty() {
                        "-".to_string()
                    } else {
                        refs.iter()
                            .map(|d| format!("{}({})", d.entity, d.fields.join("|")))
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    (kind.name().to_string(), summary)
                })
                .collect();
            println!("{}", format_table(&rows));
        }
    }
    Ok(())
}
