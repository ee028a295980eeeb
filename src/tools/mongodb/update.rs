//! Update tools: `update-many` and `rename-collection`.

use async_trait::async_trait;
use bson::{doc, Document};
use serde::Deserialize;
use serde_json::{json, Value};

use super::collection_schema;
use super::index_check::ensure_index_used;
use crate::error::{code_names, ToolError};
use crate::mongo::{bson_to_json, to_document};
use crate::tools::{
    error_result, parse_args, to_json_text, OperationKind, Tool, ToolCategory, ToolContext,
    ToolResult,
};

#[derive(Debug, Deserialize)]
struct UpdateManyArgs {
    database: String,
    collection: String,
    #[serde(default)]
    filter: Option<Value>,
    update: Value,
    #[serde(default)]
    upsert: bool,
}

/// `update-many`
#[derive(Debug, Clone, Copy)]
pub struct UpdateMany;

#[async_trait]
impl Tool for UpdateMany {
    fn name(&self) -> &'static str {
        "update-many"
    }

    fn description(&self) -> &'static str {
        "Updates all documents that match the specified filter for a collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "filter": {
                    "type": "object",
                    "description": "The selection criteria for the update, matching the syntax of the filter argument of db.collection.updateOne()"
                },
                "update": {
                    "type": "object",
                    "description": "An update document describing the modifications to apply using update operator expressions"
                },
                "upsert": {
                    "type": "boolean",
                    "default": false,
                    "description": "Controls whether to insert a new document if no documents match the filter"
                }
            }),
            &["update"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Update
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let UpdateManyArgs {
            database,
            collection,
            filter,
            update,
            upsert,
        } = parse_args(args)?;
        let filter = filter.map(to_document).transpose()?.unwrap_or_default();
        let update = to_document(update)?;
        let provider = ctx.provider().await?;

        if ctx.config().index_check {
            let command = doc! {
                "update": collection.as_str(),
                "updates": [{ "q": filter.clone(), "u": update.clone(), "upsert": upsert, "multi": true }],
            };
            ensure_index_used(provider.as_ref(), &database, &collection, "updateMany", command)
                .await?;
        }

        let summary = provider
            .update_many(&database, &collection, filter, update, upsert)
            .await?;

        if summary.matched_count == 0 && summary.upserted_id.is_none() {
            return Ok(ToolResult::text("No documents matched the filter."));
        }

        let mut message = format!("Matched {} document(s).", summary.matched_count);
        if summary.modified_count > 0 {
            message = format!("{message} Modified {} document(s).", summary.modified_count);
        }
        if let Some(id) = summary.upserted_id {
            message = format!(
                "{message} Upserted 1 document with id: {}.",
                to_json_text(&bson_to_json(id))
            );
        }
        Ok(ToolResult::text(message))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameArgs {
    database: String,
    collection: String,
    new_name: String,
    #[serde(default)]
    drop_target: bool,
}

/// `rename-collection`
#[derive(Debug, Clone, Copy)]
pub struct RenameCollection;

impl RenameCollection {
    fn not_renamed(args: &Value, message: String) -> ToolResult {
        let field = |name: &str| args.get(name).cloned().unwrap_or(Value::Null);
        ToolResult::error(message).with_structured(json!({
            "database": field("database"),
            "oldCollection": field("collection"),
            "newCollection": field("newName"),
            "renamed": false,
        }))
    }
}

#[async_trait]
impl Tool for RenameCollection {
    fn name(&self) -> &'static str {
        "rename-collection"
    }

    fn description(&self) -> &'static str {
        "Renames a collection in a MongoDB database"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "newName": { "type": "string", "description": "The new name for the collection" },
                "dropTarget": {
                    "type": "boolean",
                    "default": false,
                    "description": "If true, drops the target collection if it exists"
                }
            }),
            &["newName"],
        )
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "database": { "type": "string" },
                "oldCollection": { "type": "string" },
                "newCollection": { "type": "string" },
                "renamed": { "type": "boolean" }
            },
            "required": ["database", "oldCollection", "newCollection", "renamed"]
        }))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Update
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let RenameArgs {
            database,
            collection,
            new_name,
            drop_target,
        } = parse_args(args)?;
        let provider = ctx.provider().await?;
        let command: Document = doc! {
            "renameCollection": format!("{database}.{collection}"),
            "to": format!("{database}.{new_name}"),
            "dropTarget": drop_target,
        };
        provider.run_command_with_check("admin", command).await?;

        Ok(ToolResult::text(format!(
            "Collection \"{collection}\" renamed to \"{new_name}\" in database \"{database}\"."
        ))
        .with_structured(json!({
            "database": database,
            "oldCollection": collection,
            "newCollection": new_name,
            "renamed": true,
        })))
    }

    fn handle_error(&self, error: ToolError, args: &Value) -> ToolResult {
        let namespace = crate::tools::namespace_of(args);
        let new_name = args.get("newName").and_then(Value::as_str).unwrap_or("");

        match error.as_backend() {
            Some(backend) if backend.has_code_name(code_names::NAMESPACE_NOT_FOUND) => {
                Self::not_renamed(
                    args,
                    format!("Cannot rename \"{namespace}\" because it doesn't exist."),
                )
            }
            Some(backend) if backend.has_code_name(code_names::NAMESPACE_EXISTS) => {
                Self::not_renamed(
                    args,
                    format!(
                        "Cannot rename \"{namespace}\" to \"{new_name}\" because the target collection already exists. If you want to overwrite it, set the \"dropTarget\" argument to true."
                    ),
                )
            }
            _ => error_result(self.name(), args, &error),
        }
    }
}
