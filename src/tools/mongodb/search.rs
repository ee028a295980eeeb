//! Search index tools.

use async_trait::async_trait;
use bson::Document;
use serde_json::{json, Value};

use super::{collection_schema, CollectionArgs};
use crate::error::{code_names, ToolError};
use crate::mongo::to_json;
use crate::tools::{
    error_result, parse_args, OperationKind, Tool, ToolCategory, ToolContext, ToolResult,
};

/// The parts of a search index status worth showing: the aggregate status
/// rather than the per-node one, and the definition the index was built from.
fn summarise(index: &Document) -> Value {
    json!({
        "name": index.get_str("name").unwrap_or("default"),
        "type": index.get_str("type").unwrap_or("UNKNOWN"),
        "status": index.get_str("status").unwrap_or("UNKNOWN"),
        "queryable": index.get_bool("queryable").unwrap_or(false),
        "latestDefinition": index
            .get_document("latestDefinition")
            .cloned()
            .map_or(Value::Null, to_json),
    })
}

/// `list-search-indexes`
#[derive(Debug, Clone, Copy)]
pub struct ListSearchIndexes;

#[async_trait]
impl Tool for ListSearchIndexes {
    fn name(&self) -> &'static str {
        "list-search-indexes"
    }

    fn description(&self) -> &'static str {
        "Describes the search and vector search indexes for a single collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let CollectionArgs {
            database,
            collection,
        } = parse_args(args)?;
        let provider = ctx.provider().await?;
        let indexes = provider.list_search_indexes(&database, &collection).await?;

        if indexes.is_empty() {
            return Ok(ToolResult::untrusted(
                "Could not retrieve search indexes",
                Some(format!(
                    "There are no search or vector search indexes in {database}.{collection}"
                )),
            ));
        }

        let lines: Vec<String> = indexes.iter().map(|index| summarise(index).to_string()).collect();
        Ok(ToolResult::untrusted(
            format!(
                "Found {} search and vector search indexes in {database}.{collection}",
                indexes.len()
            ),
            Some(lines.join("\n")),
        ))
    }

    fn handle_error(&self, error: ToolError, args: &Value) -> ToolResult {
        let search_disabled = error
            .as_backend()
            .is_some_and(|backend| backend.has_code_name(code_names::SEARCH_NOT_ENABLED));
        if search_disabled {
            return ToolResult::error(
                "This MongoDB cluster does not support Search Indexes. Make sure you are using an Atlas Cluster, either remotely in Atlas or using the Atlas Local image, or your cluster supports MongoDB Search.",
            );
        }
        error_result(self.name(), args, &error)
    }
}
