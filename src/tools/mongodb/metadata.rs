//! Metadata tools: databases, collections, indexes, statistics, logs and plans.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use serde::Deserialize;
use serde_json::{json, Value};

use super::read::{
    aggregate_command, byte_cap, count_command, find_command, AggregateOptions, CountOptions,
    FindOptions, DEFAULT_RESPONSE_BYTES_LIMIT,
};
use super::{collection_schema, database_schema, CollectionArgs, DatabaseArgs};
use crate::error::{code_names, ToolError};
use crate::mongo::{
    bson_size, drain_until_max_bytes, infer_schema, to_document, to_documents, to_json,
};
use crate::tools::{
    error_result, parse_args, to_json_text, OperationKind, Tool, ToolCategory, ToolContext,
    ToolResult,
};

fn is_namespace_not_found(error: &ToolError) -> bool {
    error
        .as_backend()
        .is_some_and(|backend| backend.has_code_name(code_names::NAMESPACE_NOT_FOUND))
}

/// `list-databases`
#[derive(Debug, Clone, Copy)]
pub struct ListDatabases;

#[async_trait]
impl Tool for ListDatabases {
    fn name(&self) -> &'static str {
        "list-databases"
    }

    fn description(&self) -> &'static str {
        "List all databases for a MongoDB connection"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "databases": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "size": { "type": "integer" }
                        }
                    }
                },
                "totalCount": { "type": "integer" }
            }
        }))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<ToolResult, ToolError> {
        let provider = ctx.provider().await?;
        let databases = provider.list_databases().await?;

        let lines: Vec<String> = databases
            .iter()
            .map(|db| format!("Name: {}, Size: {} bytes", db.name, db.size_on_disk))
            .collect();
        let structured = json!({
            "databases": databases
                .iter()
                .map(|db| json!({ "name": db.name, "size": db.size_on_disk }))
                .collect::<Vec<_>>(),
            "totalCount": databases.len(),
        });

        Ok(ToolResult::untrusted(
            format!("Found {} databases", databases.len()),
            (!lines.is_empty()).then(|| lines.join("\n")),
        )
        .with_structured(structured))
    }
}

/// `list-collections`
#[derive(Debug, Clone, Copy)]
pub struct ListCollections;

#[async_trait]
impl Tool for ListCollections {
    fn name(&self) -> &'static str {
        "list-collections"
    }

    fn description(&self) -> &'static str {
        "List all collections for a given database"
    }

    fn input_schema(&self) -> Value {
        database_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DatabaseArgs { database } = parse_args(args)?;
        let provider = ctx.provider().await?;
        let collections = provider.list_collections(&database).await?;

        if collections.is_empty() {
            return Ok(ToolResult::text(format!(
                "Found 0 collections for database \"{database}\". To create a collection, use the \"create-collection\" tool."
            )));
        }

        let lines: Vec<String> = collections.iter().map(|name| format!("\"{name}\"")).collect();
        Ok(ToolResult::untrusted(
            format!(
                "Found {} collections for database \"{database}\".",
                collections.len()
            ),
            Some(lines.join("\n")),
        ))
    }
}

/// `collection-indexes`
#[derive(Debug, Clone, Copy)]
pub struct CollectionIndexes;

#[async_trait]
impl Tool for CollectionIndexes {
    fn name(&self) -> &'static str {
        "collection-indexes"
    }

    fn description(&self) -> &'static str {
        "Describe the indexes for a collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(json!({}), &[])
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "classicIndexes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "key": { "type": "object" }
                        }
                    }
                },
                "classicIndexesCount": { "type": "integer" }
            }
        }))
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
        let reply = provider
            .run_command_with_check(&database, doc! { "listIndexes": collection.as_str() })
            .await?;

        let indexes: Vec<Value> = reply
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"))
            .map(|batch| {
                batch
                    .iter()
                    .filter_map(Bson::as_document)
                    .map(|index| {
                        json!({
                            "name": index.get_str("name").unwrap_or_default(),
                            "key": index.get_document("key").cloned().map(to_json).unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let rendered = Value::Array(indexes.clone());
        Ok(ToolResult::untrusted(
            format!(
                "Found {} classic indexes in the collection \"{collection}\":",
                indexes.len()
            ),
            (!indexes.is_empty()).then(|| to_json_text(&rendered)),
        )
        .with_structured(json!({
            "classicIndexesCount": indexes.len(),
            "classicIndexes": indexes,
        })))
    }

    fn handle_error(&self, error: ToolError, args: &Value) -> ToolResult {
        if is_namespace_not_found(&error) {
            return ToolResult::error(format!(
                "The indexes for \"{}\" cannot be determined because the collection does not exist.",
                crate::tools::namespace_of(args)
            ));
        }
        error_result(self.name(), args, &error)
    }
}

/// Largest `$sample` size `collection-schema` will request.
const MAX_SCHEMA_SAMPLE_SIZE: i64 = 50_000;

const fn default_sample_size() -> i64 {
    50
}

const fn default_schema_bytes_limit() -> i64 {
    DEFAULT_RESPONSE_BYTES_LIMIT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaArgs {
    database: String,
    collection: String,
    #[serde(default = "default_sample_size")]
    sample_size: i64,
    #[serde(default = "default_schema_bytes_limit")]
    response_bytes_limit: i64,
}

/// `collection-schema`
#[derive(Debug, Clone, Copy)]
pub struct CollectionSchema;

#[async_trait]
impl Tool for CollectionSchema {
    fn name(&self) -> &'static str {
        "collection-schema"
    }

    fn description(&self) -> &'static str {
        "Describe the schema for a collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "sampleSize": {
                    "type": "integer",
                    "default": default_sample_size(),
                    "description": "Number of documents to sample for schema inference"
                },
                "responseBytesLimit": {
                    "type": "integer",
                    "default": DEFAULT_RESPONSE_BYTES_LIMIT,
                    "description": "The maximum number of bytes to return in the response. This value is capped by the server's configured maxBytesPerQuery and cannot be exceeded."
                }
            }),
            &[],
        )
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "schema": { "type": "object" },
                "fieldsCount": { "type": "integer" }
            }
        }))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let SchemaArgs {
            database,
            collection,
            sample_size,
            response_bytes_limit,
        } = parse_args(args)?;
        let provider = ctx.provider().await?;
        let max_bytes = byte_cap(response_bytes_limit, ctx.config().max_bytes_per_query);

        let sample = doc! { "$sample": { "size": sample_size.clamp(1, MAX_SCHEMA_SAMPLE_SIZE) } };
        let mut cursor = provider.aggregate(&database, &collection, vec![sample]).await?;
        let documents =
            drain_until_max_bytes(cursor.as_mut(), max_bytes, &ctx.cancel, bson_size).await?;
        let schema = infer_schema(&documents);

        if schema.is_empty() {
            return Ok(ToolResult::text(format!(
                "Could not deduce the schema for \"{database}.{collection}\". This may be because it doesn't exist or is empty."
            ))
            .with_structured(json!({ "schema": {}, "fieldsCount": 0 })));
        }

        let fields_count = schema.len();
        let schema = Value::Object(schema);
        Ok(ToolResult::untrusted(
            format!(
                "Found {fields_count} fields in the schema for \"{database}.{collection}\". Note that this schema is inferred from a sample and may not represent the full schema of the collection."
            ),
            Some(schema.to_string()),
        )
        .with_structured(json!({ "schema": schema, "fieldsCount": fields_count })))
    }
}

/// `collection-storage-size`
#[derive(Debug, Clone, Copy)]
pub struct CollectionStorageSize;

impl CollectionStorageSize {
    /// Scales a byte count to the largest unit it exceeds.
    fn human_size(bytes: f64) -> (f64, &'static str) {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;
        const GB: f64 = MB * 1024.0;

        if bytes > GB {
            (bytes / GB, "GB")
        } else if bytes > MB {
            (bytes / MB, "MB")
        } else if bytes > KB {
            (bytes / KB, "KB")
        } else {
            (bytes, "bytes")
        }
    }
}

#[async_trait]
impl Tool for CollectionStorageSize {
    fn name(&self) -> &'static str {
        "collection-storage-size"
    }

    fn description(&self) -> &'static str {
        "Gets the size of the collection"
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
        let pipeline = vec![
            doc! { "$collStats": { "storageStats": {} } },
            doc! { "$group": { "_id": Bson::Null, "value": { "$sum": "$storageStats.size" } } },
        ];

        let mut cursor = provider.aggregate(&database, &collection, pipeline).await?;
        let bytes = cursor
            .try_next()
            .await?
            .and_then(|group| match group.get("value") {
                Some(Bson::Int32(n)) => Some(f64::from(*n)),
                #[allow(clippy::cast_precision_loss)]
                Some(Bson::Int64(n)) => Some(*n as f64),
                Some(Bson::Double(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or(0.0);

        let (value, units) = Self::human_size(bytes);
        Ok(ToolResult::text(format!(
            "The size of \"{database}.{collection}\" is `{value:.2} {units}`"
        )))
    }

    fn handle_error(&self, error: ToolError, args: &Value) -> ToolResult {
        if is_namespace_not_found(&error) {
            return ToolResult::text(format!(
                "The size of \"{}\" cannot be determined because the collection does not exist.",
                crate::tools::namespace_of(args)
            ));
        }
        error_result(self.name(), args, &error)
    }
}

/// `db-stats`
#[derive(Debug, Clone, Copy)]
pub struct DbStats;

#[async_trait]
impl Tool for DbStats {
    fn name(&self) -> &'static str {
        "db-stats"
    }

    fn description(&self) -> &'static str {
        "Returns statistics that reflect the use state of a single database"
    }

    fn input_schema(&self) -> Value {
        database_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DatabaseArgs { database } = parse_args(args)?;
        let provider = ctx.provider().await?;
        let stats = provider
            .run_command_with_check(&database, doc! { "dbStats": 1, "scale": 1 })
            .await?;

        Ok(ToolResult::untrusted(
            format!("Statistics for database {database}"),
            Some(to_json_text(&to_json(stats))),
        ))
    }
}

/// The operation `explain` analyses.
#[derive(Debug, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "lowercase")]
enum ExplainMethod {
    Aggregate(AggregateOptions),
    Find(FindOptions),
    Count(CountOptions),
}

impl ExplainMethod {
    const fn name(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Find(_) => "find",
            Self::Count(_) => "count",
        }
    }

    fn into_command(self, collection: &str) -> Result<Document, ToolError> {
        match self {
            Self::Aggregate(options) => Ok(aggregate_command(
                collection,
                &to_documents(options.pipeline)?,
            )),
            Self::Find(options) => {
                let limit = (options.limit > 0).then_some(options.limit);
                Ok(find_command(collection, &options.into_query(limit)?))
            }
            Self::Count(options) => {
                let filter = options.query.map(to_document).transpose()?.unwrap_or_default();
                Ok(count_command(collection, &filter))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplainArgs {
    database: String,
    collection: String,
    method: Vec<ExplainMethod>,
    #[serde(default = "default_verbosity")]
    verbosity: String,
}

fn default_verbosity() -> String {
    "queryPlanner".to_string()
}

/// `explain`
#[derive(Debug, Clone, Copy)]
pub struct Explain;

#[async_trait]
impl Tool for Explain {
    fn name(&self) -> &'static str {
        "explain"
    }

    fn description(&self) -> &'static str {
        "Returns statistics describing the execution of the winning plan chosen by the query \
         optimizer for the evaluated method"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "method": {
                    "type": "array",
                    "minItems": 1,
                    "description": "The method and its arguments to run",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "enum": ["aggregate", "find", "count"] },
                            "arguments": { "type": "object" }
                        },
                        "required": ["name", "arguments"]
                    }
                },
                "verbosity": {
                    "type": "string",
                    "enum": ["queryPlanner", "queryPlannerExtended", "executionStats", "allPlansExecution"],
                    "default": "queryPlanner",
                    "description": "The verbosity of the explain plan, defaults to queryPlanner. If the user wants to know how fast is a query in execution time, use executionStats."
                }
            }),
            &["method"],
        )
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "explainResult": { "type": "object" },
                "method": { "type": "string" },
                "verbosity": { "type": "string" }
            },
            "required": ["explainResult", "method", "verbosity"]
        }))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ExplainArgs {
            database,
            collection,
            method,
            verbosity,
        } = parse_args(args)?;
        let method = method.into_iter().next().ok_or_else(|| {
            ToolError::InvalidArguments(
                "No method provided. Expected one of the following: `aggregate`, `find`, or `count`"
                    .to_string(),
            )
        })?;
        let name = method.name();
        let command = method.into_command(&collection)?;
        let provider = ctx.provider().await?;

        let plan = provider
            .run_command_with_check(
                &database,
                doc! { "explain": command, "verbosity": verbosity.as_str() },
            )
            .await?;
        let plan = to_json(plan);

        Ok(ToolResult::untrusted(
            format!(
                "Here is some information about the winning plan chosen by the query optimizer for running the given `{name}` operation in \"{database}.{collection}\". The execution plan was run with the following verbosity: \"{verbosity}\". This information can be used to understand how the query was executed and to optimize the query performance."
            ),
            Some(to_json_text(&plan)),
        )
        .with_structured(json!({
            "explainResult": plan,
            "method": name,
            "verbosity": verbosity,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct LogsArgs {
    #[serde(rename = "type", default = "default_log_type")]
    log_type: String,
    #[serde(default = "default_log_limit")]
    limit: usize,
}

fn default_log_type() -> String {
    "global".to_string()
}

const fn default_log_limit() -> usize {
    50
}

/// `mongodb-logs`
#[derive(Debug, Clone, Copy)]
pub struct MongoDbLogs;

#[async_trait]
impl Tool for MongoDbLogs {
    fn name(&self) -> &'static str {
        "mongodb-logs"
    }

    fn description(&self) -> &'static str {
        "Returns the most recent logged mongod events"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["global", "startupWarnings"],
                    "default": "global",
                    "description": "The type of logs to return. Global returns all recent log entries, while startupWarnings returns only warnings and errors from when the process started."
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 1024,
                    "default": 50,
                    "description": "The maximum number of log entries to return."
                }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Metadata
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let LogsArgs { log_type, limit } = parse_args(args)?;
        let provider = ctx.provider().await?;
        let reply = provider
            .run_command_with_check("admin", doc! { "getLog": log_type.as_str() })
            .await?;

        let logs: Vec<&str> = reply
            .get_array("log")
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(Bson::as_str)
                    .take(limit)
                    .map(str::trim_end)
                    .collect()
            })
            .unwrap_or_default();
        let total = match reply.get("totalLinesWritten") {
            Some(Bson::Int32(n)) => i64::from(*n),
            Some(Bson::Int64(n)) => *n,
            _ => i64::try_from(logs.len()).unwrap_or(i64::MAX),
        };

        let mut message = format!("Found: {total} messages");
        if total > i64::try_from(limit).unwrap_or(i64::MAX) {
            message = format!("{message} (showing only the first {limit})");
        }
        Ok(ToolResult::untrusted(message, Some(logs.join("\n"))))
    }
}
