//! Query tools: `find`, `count` and `aggregate`.
//!
//! `find` and `aggregate` stream their results through
//! [`drain_until_max_bytes`] and count the full result set concurrently.
//! The count is best effort: if it fails or takes longer than
//! [`COUNT_TIMEOUT`] the description says the total is indeterminable.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use serde::Deserialize;
use serde_json::{json, Value};

use super::index_check::ensure_index_used;
use super::{collection_schema, CollectionArgs};
use crate::error::ToolError;
use crate::mongo::{
    bson_size, drain_until_max_bytes, to_document, to_documents, to_json, DocumentCursor,
    FindQuery, ServiceProvider,
};
use crate::tools::{
    parse_args, to_json_text, OperationKind, Tool, ToolCategory, ToolContext, ToolResult,
};

/// Upper bound on the concurrent count of a query's full result set.
pub const COUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default `responseBytesLimit`.
pub const DEFAULT_RESPONSE_BYTES_LIMIT: i64 = 1024 * 1024;

const DEFAULT_FIND_LIMIT: i64 = 10;

const fn default_find_limit() -> i64 {
    DEFAULT_FIND_LIMIT
}

const fn default_response_bytes_limit() -> i64 {
    DEFAULT_RESPONSE_BYTES_LIMIT
}

/// Effective byte ceiling; a non-positive value on either side disables that side.
#[must_use]
pub const fn byte_cap(requested: i64, configured: i64) -> i64 {
    match (requested > 0, configured > 0) {
        (true, true) if requested < configured => requested,
        (_, true) => configured,
        (true, false) => requested,
        (false, false) => 0,
    }
}

fn optional_document(value: Option<Value>) -> Result<Option<Document>, ToolError> {
    value.map(to_document).transpose()
}

fn has_write_stage(pipeline: &[Document]) -> bool {
    pipeline
        .iter()
        .any(|stage| stage.contains_key("$out") || stage.contains_key("$merge"))
}

/// `find` options, shared with `explain`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOptions {
    /// Query filter.
    #[serde(default)]
    pub filter: Option<Value>,
    /// Projection.
    #[serde(default)]
    pub projection: Option<Value>,
    /// Maximum number of documents to return.
    #[serde(default = "default_find_limit")]
    pub limit: i64,
    /// Sort specification.
    #[serde(default)]
    pub sort: Option<Value>,
    /// Byte ceiling requested by the caller.
    #[serde(default = "default_response_bytes_limit")]
    pub response_bytes_limit: i64,
}

impl FindOptions {
    /// Converts the options into a query with the given limit.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] on malformed extended JSON.
    pub fn into_query(self, limit: Option<i64>) -> Result<FindQuery, ToolError> {
        Ok(FindQuery {
            filter: optional_document(self.filter)?.unwrap_or_default(),
            projection: optional_document(self.projection)?,
            sort: optional_document(self.sort)?,
            limit,
        })
    }
}

/// `find` command equivalent to `query`, for explain.
#[must_use]
pub fn find_command(collection: &str, query: &FindQuery) -> Document {
    let mut command = doc! { "find": collection, "filter": query.filter.clone() };
    if let Some(projection) = &query.projection {
        command.insert("projection", projection.clone());
    }
    if let Some(sort) = &query.sort {
        command.insert("sort", sort.clone());
    }
    if let Some(limit) = query.limit {
        command.insert("limit", limit);
    }
    command
}

/// `count` command, for explain.
#[must_use]
pub fn count_command(collection: &str, filter: &Document) -> Document {
    doc! { "count": collection, "query": filter.clone() }
}

/// `aggregate` command, for explain.
#[must_use]
pub fn aggregate_command(collection: &str, pipeline: &[Document]) -> Document {
    let stages: Vec<Bson> = pipeline.iter().cloned().map(Bson::Document).collect();
    doc! { "aggregate": collection, "pipeline": stages, "cursor": {} }
}

/// `count` options, shared with `explain`.
#[derive(Debug, Default, Deserialize)]
pub struct CountOptions {
    /// Query filter.
    #[serde(default)]
    pub query: Option<Value>,
}

/// `aggregate` options, shared with `explain`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOptions {
    /// Pipeline stages.
    pub pipeline: Vec<Value>,
    /// Byte ceiling requested by the caller.
    #[serde(default = "default_response_bytes_limit")]
    pub response_bytes_limit: i64,
}

/// Drains `cursor` within `max_bytes` while `count` runs.
async fn drain_with_count<C>(
    ctx: &ToolContext,
    cursor: &mut DocumentCursor,
    max_bytes: i64,
    count: C,
) -> Result<(Option<u64>, Vec<Document>), ToolError>
where
    C: std::future::Future<Output = Option<u64>>,
{
    let count = async {
        tokio::time::timeout(COUNT_TIMEOUT, count)
            .await
            .ok()
            .flatten()
    };
    let (total, documents) = tokio::join!(
        count,
        drain_until_max_bytes(cursor.as_mut(), max_bytes, &ctx.cancel, bson_size)
    );
    Ok((total, documents?))
}

fn describe_results(prefix: String, total: Option<u64>, documents: Vec<Document>) -> ToolResult {
    let total = total.map_or_else(|| "indeterminable number of".to_string(), |n| n.to_string());
    let description = format!("{prefix} {total} documents.");
    if documents.is_empty() {
        return ToolResult::untrusted(description, None);
    }

    let description = format!(
        "{description} Returning {} documents while respecting the applied limits.",
        documents.len()
    );
    let rendered = Value::Array(documents.into_iter().map(to_json).collect());
    ToolResult::untrusted(description, Some(to_json_text(&rendered)))
}

#[derive(Debug, Deserialize)]
struct FindArgs {
    #[serde(flatten)]
    namespace: CollectionArgs,
    #[serde(flatten)]
    options: FindOptions,
}

/// `find`: runs a query and returns the matching documents.
#[derive(Debug, Clone, Copy)]
pub struct Find;

#[async_trait]
impl Tool for Find {
    fn name(&self) -> &'static str {
        "find"
    }

    fn description(&self) -> &'static str {
        "Run a find query against a MongoDB collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "filter": {
                    "type": "object",
                    "description": "The query filter, matching the syntax of the query argument of db.collection.find()"
                },
                "projection": {
                    "type": "object",
                    "description": "The projection, matching the syntax of the projection argument of db.collection.find()"
                },
                "limit": {
                    "type": "integer",
                    "default": DEFAULT_FIND_LIMIT,
                    "description": "The maximum number of documents to return"
                },
                "sort": {
                    "type": "object",
                    "description": "A document, describing the sort order, matching the syntax of the sort argument of cursor.sort(). The keys of the object are the fields to sort on, while the values are the sort directions (1 for ascending, -1 for descending)."
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

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let FindArgs { namespace, options } = parse_args(args)?;
        let CollectionArgs {
            database,
            collection,
        } = namespace;
        let provider = ctx.provider().await?;
        let config = ctx.config();

        let max_documents = i64::try_from(config.max_documents_per_query).unwrap_or(i64::MAX);
        let applied_limit = if options.limit > 0 {
            options.limit.min(max_documents)
        } else {
            max_documents
        };
        let max_bytes = byte_cap(options.response_bytes_limit, config.max_bytes_per_query);
        let query = options.into_query(Some(applied_limit))?;

        if config.index_check {
            ensure_index_used(
                provider.as_ref(),
                &database,
                &collection,
                "find",
                find_command(&collection, &query),
            )
            .await?;
        }

        let filter = query.filter.clone();
        let mut cursor = provider.find(&database, &collection, query).await?;
        let count = async {
            provider
                .count_documents(&database, &collection, filter)
                .await
                .ok()
        };
        let (total, documents) = drain_with_count(ctx, &mut cursor, max_bytes, count).await?;

        Ok(describe_results(
            format!("Query on collection \"{collection}\" resulted in"),
            total,
            documents,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct CountArgs {
    #[serde(flatten)]
    namespace: CollectionArgs,
    #[serde(flatten)]
    options: CountOptions,
}

/// `count`: counts the documents matching a query.
#[derive(Debug, Clone, Copy)]
pub struct Count;

#[async_trait]
impl Tool for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn description(&self) -> &'static str {
        "Gets the number of documents in a MongoDB collection using db.collection.count() and \
         query as an optional filter parameter"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "query": {
                    "type": "object",
                    "description": "A filter/query parameter. Allows users to filter the documents to count. Matches the syntax of the filter argument of db.collection.count()."
                }
            }),
            &[],
        )
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "database": { "type": "string" },
                "collection": { "type": "string" },
                "count": { "type": "integer" }
            },
            "required": ["database", "collection", "count"]
        }))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let CountArgs { namespace, options } = parse_args(args)?;
        let CollectionArgs {
            database,
            collection,
        } = namespace;
        let has_query = options.query.is_some();
        let filter = optional_document(options.query)?.unwrap_or_default();
        let provider = ctx.provider().await?;

        if ctx.config().index_check {
            ensure_index_used(
                provider.as_ref(),
                &database,
                &collection,
                "count",
                count_command(&collection, &filter),
            )
            .await?;
        }

        let count = provider
            .count_documents(&database, &collection, filter)
            .await?;
        let matched = if has_query { " that matched the query" } else { "" };

        Ok(ToolResult::text(format!(
            "Found {count} documents in the collection \"{collection}\"{matched}."
        ))
        .with_structured(json!({
            "database": database,
            "collection": collection,
            "count": count,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct AggregateArgs {
    #[serde(flatten)]
    namespace: CollectionArgs,
    #[serde(flatten)]
    options: AggregateOptions,
}

/// `aggregate`: runs an aggregation pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Aggregate;

impl Aggregate {
    async fn count_results(
        provider: &dyn ServiceProvider,
        database: &str,
        collection: &str,
        mut pipeline: Vec<Document>,
    ) -> Option<u64> {
        pipeline.push(doc! { "$count": "totalDocuments" });
        let mut cursor = provider.aggregate(database, collection, pipeline).await.ok()?;
        let counted = cursor.try_next().await.ok()?;
        // An empty result set has no `$count` document.
        let Some(counted) = counted else {
            return Some(0);
        };
        match counted.get("totalDocuments") {
            Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
            Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl Tool for Aggregate {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn description(&self) -> &'static str {
        "Run an aggregation against a MongoDB collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "pipeline": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "An array of aggregation stages to execute"
                },
                "responseBytesLimit": {
                    "type": "integer",
                    "default": DEFAULT_RESPONSE_BYTES_LIMIT,
                    "description": "The maximum number of bytes to return in the response. This value is capped by the server's configured maxBytesPerQuery and cannot be exceeded."
                }
            }),
            &["pipeline"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let AggregateArgs { namespace, options } = parse_args(args)?;
        let CollectionArgs {
            database,
            collection,
        } = namespace;
        let pipeline = to_documents(options.pipeline)?;
        let config = ctx.config();
        let writes = has_write_stage(&pipeline);

        if config.read_only && writes {
            return Err(ToolError::ForbiddenWriteOperation(
                "In readOnly mode you can not run pipelines with $out or $merge stages."
                    .to_string(),
            ));
        }

        let provider = ctx.provider().await?;

        if config.index_check {
            ensure_index_used(
                provider.as_ref(),
                &database,
                &collection,
                "aggregate",
                aggregate_command(&collection, &pipeline),
            )
            .await?;
        }

        let mut capped = pipeline.clone();
        if !writes {
            let max_documents = i64::try_from(config.max_documents_per_query).unwrap_or(i64::MAX);
            capped.push(doc! { "$limit": max_documents });
        }
        let max_bytes = byte_cap(options.response_bytes_limit, config.max_bytes_per_query);

        let mut cursor = provider.aggregate(&database, &collection, capped).await?;
        let count = async {
            if writes {
                None
            } else {
                Self::count_results(provider.as_ref(), &database, &collection, pipeline).await
            }
        };
        let (total, documents) = drain_with_count(ctx, &mut cursor, max_bytes, count).await?;

        Ok(describe_results(
            "The aggregation resulted in".to_string(),
            total,
            documents,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::config::Config;
    use crate::testing::{test_session, MockConnector, MockProvider};

    fn context(config: Config, provider: MockProvider) -> (Arc<MockProvider>, ToolContext) {
        let connector = Arc::new(MockConnector::new());
        let provider = Arc::new(provider);
        connector.prepare(Arc::clone(&provider));
        let config = Config {
            connection_string: Some("mongodb://localhost".into()),
            ..config
        };
        let ctx = ToolContext {
            session: test_session(config, &connector),
            cancel: CancellationToken::new(),
        };
        (provider, ctx)
    }

    fn people() -> MockProvider {
        let provider = MockProvider::new();
        provider.seed(
            "db",
            "people",
            (0..30)
                .map(|i| doc! { "_id": i, "team": if i % 2 == 0 { "red" } else { "blue" } })
                .collect(),
        );
        provider
    }

    #[test]
    fn byte_cap_takes_the_smaller_enabled_side() {
        assert_eq!(byte_cap(1000, 5000), 1000);
        assert_eq!(byte_cap(9000, 5000), 5000);
        assert_eq!(byte_cap(0, 5000), 5000);
        assert_eq!(byte_cap(1000, 0), 1000);
        assert_eq!(byte_cap(-1, -1), 0);
    }

    #[tokio::test]
    async fn find_respects_the_document_cap() {
        let config = Config {
            max_documents_per_query: 5,
            ..Config::default()
        };
        let (_, ctx) = context(config, people());

        let result = Find
            .execute(
                &ctx,
                json!({ "database": "db", "collection": "people", "filter": { "team": "red" }, "limit": 50 }),
            )
            .await
            .unwrap();

        assert_eq!(
            result.content[0].as_text(),
            "Query on collection \"people\" resulted in 15 documents. Returning 5 documents while respecting the applied limits."
        );
        assert!(result.content[1].is_untrusted());
    }

    #[tokio::test]
    async fn find_respects_the_byte_cap() {
        let (_, ctx) = context(Config::default(), people());
        let one = bson_size(&doc! { "_id": 0, "team": "red" }).unwrap();
        let limit = i64::try_from(one * 3).unwrap();

        let result = Find
            .execute(
                &ctx,
                json!({ "database": "db", "collection": "people", "responseBytesLimit": limit }),
            )
            .await
            .unwrap();

        assert!(result.content[0]
            .as_text()
            .ends_with("Returning 2 documents while respecting the applied limits."));
    }

    #[tokio::test]
    async fn find_without_results_has_no_data_block() {
        let (_, ctx) = context(Config::default(), people());

        let result = Find
            .execute(
                &ctx,
                json!({ "database": "db", "collection": "people", "filter": { "team": "green" } }),
            )
            .await
            .unwrap();

        assert_eq!(result.content.len(), 1);
        assert_eq!(
            result.text_content(),
            "Query on collection \"people\" resulted in 0 documents."
        );
    }

    #[tokio::test]
    async fn failed_count_is_indeterminable() {
        let provider = people();
        provider.fail("count_documents", crate::error::BackendError::new("timeout"));
        let (_, ctx) = context(Config::default(), provider);

        let result = Find
            .execute(&ctx, json!({ "database": "db", "collection": "people", "limit": 1 }))
            .await
            .unwrap();

        assert!(result.content[0]
            .as_text()
            .contains("resulted in indeterminable number of documents."));
    }

    #[tokio::test]
    async fn find_with_index_check_refuses_collection_scans() {
        let provider = people();
        provider.reply(
            "explain",
            Ok(doc! { "queryPlanner": { "winningPlan": { "stage": "COLLSCAN" } } }),
        );
        let config = Config {
            index_check: true,
            ..Config::default()
        };
        let (provider, ctx) = context(config, provider);

        let error = Find
            .execute(&ctx, json!({ "database": "db", "collection": "people" }))
            .await
            .unwrap_err();

        assert!(matches!(error, ToolError::ForbiddenCollscan { .. }));
        assert!(!provider.calls().contains(&"find".to_string()));
    }

    #[tokio::test]
    async fn count_reports_matches() {
        let (_, ctx) = context(Config::default(), people());

        let all = Count
            .execute(&ctx, json!({ "database": "db", "collection": "people" }))
            .await
            .unwrap();
        assert_eq!(
            all.text_content(),
            "Found 30 documents in the collection \"people\"."
        );

        let blue = Count
            .execute(
                &ctx,
                json!({ "database": "db", "collection": "people", "query": { "team": "blue" } }),
            )
            .await
            .unwrap();
        assert_eq!(
            blue.text_content(),
            "Found 15 documents in the collection \"people\" that matched the query."
        );
        assert_eq!(blue.structured_content.unwrap()["count"], 15);
    }

    #[tokio::test]
    async fn aggregate_caps_and_counts() {
        let config = Config {
            max_documents_per_query: 4,
            ..Config::default()
        };
        let (provider, ctx) = context(config, people());

        let result = Aggregate
            .execute(
                &ctx,
                json!({
                    "database": "db",
                    "collection": "people",
                    "pipeline": [{ "$match": { "team": "blue" } }]
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            result.content[0].as_text(),
            "The aggregation resulted in 15 documents. Returning 4 documents while respecting the applied limits."
        );
        assert_eq!(
            provider.calls().iter().filter(|c| *c == "aggregate").count(),
            2
        );
    }

    #[tokio::test]
    async fn read_only_aggregate_rejects_write_stages() {
        let config = Config {
            read_only: true,
            ..Config::default()
        };
        let (provider, ctx) = context(config, people());

        let error = Aggregate
            .execute(
                &ctx,
                json!({
                    "database": "db",
                    "collection": "people",
                    "pipeline": [{ "$match": {} }, { "$out": "copy" }]
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, ToolError::ForbiddenWriteOperation(_)));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn explain_commands_carry_the_query() {
        let query = FindQuery {
            filter: doc! { "a": 1 },
            sort: Some(doc! { "a": -1 }),
            limit: Some(3),
            ..FindQuery::default()
        };
        assert_eq!(
            find_command("c", &query),
            doc! { "find": "c", "filter": { "a": 1 }, "sort": { "a": -1 }, "limit": 3_i64 }
        );
        assert_eq!(
            aggregate_command("c", &[doc! { "$match": {} }]),
            doc! { "aggregate": "c", "pipeline": [{ "$match": {} }], "cursor": {} }
        );
    }
}
