//! Delete tools. All of them require confirmation by default.

use async_trait::async_trait;
use bson::doc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::index_check::ensure_index_used;
use super::{collection_schema, database_schema, CollectionArgs, DatabaseArgs};
use crate::error::ToolError;
use crate::mongo::to_document;
use crate::tools::{parse_args, OperationKind, Tool, ToolCategory, ToolContext, ToolResult};

const CONFIRM_PROMPT: &str = "**Do you confirm the execution of the action?**";

fn arg<'a>(args: &'a Value, name: &str) -> &'a str {
    args.get(name).and_then(Value::as_str).unwrap_or("")
}

#[derive(Debug, Deserialize)]
struct DeleteManyArgs {
    database: String,
    collection: String,
    #[serde(default)]
    filter: Option<Value>,
}

/// `delete-many`
#[derive(Debug, Clone, Copy)]
pub struct DeleteMany;

#[async_trait]
impl Tool for DeleteMany {
    fn name(&self) -> &'static str {
        "delete-many"
    }

    fn description(&self) -> &'static str {
        "Removes all documents that match the filter from a MongoDB collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "filter": {
                    "type": "object",
                    "description": "The query filter, specifying the deletion criteria. Matches the syntax of the filter argument of db.collection.deleteMany()"
                }
            }),
            &[],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Delete
    }

    fn confirmation_message(&self, args: &Value) -> String {
        let filter = args
            .get("filter")
            .and_then(|filter| serde_json::to_string_pretty(filter).ok())
            .unwrap_or_else(|| "{}".to_string());
        format!(
            "You are about to delete documents from the `{}` collection in the `{}` database with the following filter:\n\n```json\n{filter}\n```\n\nThis operation will permanently remove all documents matching the filter.\n\n{CONFIRM_PROMPT}",
            arg(args, "collection"),
            arg(args, "database"),
        )
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DeleteManyArgs {
            database,
            collection,
            filter,
        } = parse_args(args)?;
        let filter = filter.map(to_document).transpose()?.unwrap_or_default();
        let provider = ctx.provider().await?;

        if ctx.config().index_check {
            let command = doc! {
                "delete": collection.as_str(),
                "deletes": [{ "q": filter.clone(), "limit": 0 }],
            };
            ensure_index_used(provider.as_ref(), &database, &collection, "deleteMany", command)
                .await?;
        }

        let deleted = provider
            .delete_many(&database, &collection, filter)
            .await?;
        Ok(ToolResult::text(format!(
            "Deleted `{deleted}` document(s) from collection \"{collection}\""
        )))
    }
}

/// `drop-collection`
#[derive(Debug, Clone, Copy)]
pub struct DropCollection;

#[async_trait]
impl Tool for DropCollection {
    fn name(&self) -> &'static str {
        "drop-collection"
    }

    fn description(&self) -> &'static str {
        "Removes a collection or view from the database. The method also removes any indexes \
         associated with the dropped collection."
    }

    fn input_schema(&self) -> Value {
        collection_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Delete
    }

    fn confirmation_message(&self, args: &Value) -> String {
        format!(
            "You are about to drop the `{}` collection from the `{}` database:\n\nThis operation will permanently remove the collection and all its data, including indexes.\n\n{CONFIRM_PROMPT}",
            arg(args, "collection"),
            arg(args, "database"),
        )
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let CollectionArgs {
            database,
            collection,
        } = parse_args(args)?;
        let provider = ctx.provider().await?;
        provider.drop_collection(&database, &collection).await?;

        Ok(ToolResult::text(format!(
            "Successfully dropped collection \"{collection}\" from database \"{database}\""
        )))
    }
}

/// `drop-database`
#[derive(Debug, Clone, Copy)]
pub struct DropDatabase;

#[async_trait]
impl Tool for DropDatabase {
    fn name(&self) -> &'static str {
        "drop-database"
    }

    fn description(&self) -> &'static str {
        "Removes the specified database, deleting the associated data files"
    }

    fn input_schema(&self) -> Value {
        database_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Delete
    }

    fn confirmation_message(&self, args: &Value) -> String {
        format!(
            "You are about to drop the `{}` database:\n\nThis operation will permanently remove the database and ALL its collections, documents, and indexes.\n\n{CONFIRM_PROMPT}",
            arg(args, "database"),
        )
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DatabaseArgs { database } = parse_args(args)?;
        let provider = ctx.provider().await?;
        provider.drop_database(&database).await?;

        Ok(ToolResult::text(format!(
            "Successfully dropped database \"{database}\""
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DropIndexArgs {
    database: String,
    collection: String,
    index_name: String,
}

/// `drop-index`
#[derive(Debug, Clone, Copy)]
pub struct DropIndex;

#[async_trait]
impl Tool for DropIndex {
    fn name(&self) -> &'static str {
        "drop-index"
    }

    fn description(&self) -> &'static str {
        "Drop an index for the provided database and collection."
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "indexName": { "type": "string", "description": "The name of the index to be dropped." }
            }),
            &["indexName"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Delete
    }

    fn confirmation_message(&self, args: &Value) -> String {
        format!(
            "You are about to drop the `{}` index from the `{}.{}` namespace:\n\nThis operation will permanently remove the index and might affect the performance of queries relying on this index.\n\n{CONFIRM_PROMPT}",
            arg(args, "indexName"),
            arg(args, "database"),
            arg(args, "collection"),
        )
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DropIndexArgs {
            database,
            collection,
            index_name,
        } = parse_args(args)?;
        let provider = ctx.provider().await?;
        provider
            .run_command_with_check(
                &database,
                doc! { "dropIndexes": collection.as_str(), "index": index_name.as_str() },
            )
            .await?;

        Ok(ToolResult::text(format!(
            "Successfully dropped the index with name \"{index_name}\" from the provided namespace \"{database}.{collection}\"."
        )))
    }
}
