//! Create tools: collections, documents and indexes.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{collection_schema, CollectionArgs};
use crate::error::ToolError;
use crate::mongo::{to_document, to_documents};
use crate::tools::{parse_args, OperationKind, Tool, ToolCategory, ToolContext, ToolResult};

/// `create-collection`
#[derive(Debug, Clone, Copy)]
pub struct CreateCollection;

#[async_trait]
impl Tool for CreateCollection {
    fn name(&self) -> &'static str {
        "create-collection"
    }

    fn description(&self) -> &'static str {
        "Creates a new collection in a database. If the database doesn't exist, it will be \
         created automatically."
    }

    fn input_schema(&self) -> Value {
        collection_schema(json!({}), &[])
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "database": { "type": "string" },
                "collection": { "type": "string" },
                "created": { "type": "boolean" }
            },
            "required": ["database", "collection", "created"]
        }))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let CollectionArgs {
            database,
            collection,
        } = parse_args(args)?;
        let provider = ctx.provider().await?;
        provider.create_collection(&database, &collection).await?;

        Ok(ToolResult::text(format!(
            "Collection \"{collection}\" created in database \"{database}\"."
        ))
        .with_structured(json!({
            "database": database,
            "collection": collection,
            "created": true,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct InsertManyArgs {
    database: String,
    collection: String,
    documents: Vec<Value>,
}

fn render_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `insert-many`
#[derive(Debug, Clone, Copy)]
pub struct InsertMany;

#[async_trait]
impl Tool for InsertMany {
    fn name(&self) -> &'static str {
        "insert-many"
    }

    fn description(&self) -> &'static str {
        "Insert an array of documents into a MongoDB collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "documents": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "The array of documents to insert, matching the syntax of the document argument of db.collection.insertMany()"
                }
            }),
            &["documents"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let InsertManyArgs {
            database,
            collection,
            documents,
        } = parse_args(args)?;
        let documents = to_documents(documents)?;
        let provider = ctx.provider().await?;
        let ids = provider
            .insert_many(&database, &collection, documents)
            .await?;

        let ids: Vec<String> = ids.iter().map(render_id).collect();
        Ok(ToolResult::untrusted(
            "Documents were inserted successfully.",
            Some(format!(
                "Inserted `{}` document(s) into {database}.{collection}.\nInserted IDs: {}",
                ids.len(),
                ids.join(", ")
            )),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum IndexDefinition {
    Classic { keys: Value },
}

#[derive(Debug, Deserialize)]
struct CreateIndexArgs {
    database: String,
    collection: String,
    #[serde(default)]
    name: Option<String>,
    definition: Vec<IndexDefinition>,
}

/// Server-style default name: `field_direction` pairs joined by `_`.
fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Bson::String(s) => format!("{field}_{s}"),
            Bson::Int32(n) => format!("{field}_{n}"),
            Bson::Int64(n) => format!("{field}_{n}"),
            Bson::Double(n) => format!("{field}_{n}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// `create-index`
#[derive(Debug, Clone, Copy)]
pub struct CreateIndex;

#[async_trait]
impl Tool for CreateIndex {
    fn name(&self) -> &'static str {
        "create-index"
    }

    fn description(&self) -> &'static str {
        "Create an index for a collection"
    }

    fn input_schema(&self) -> Value {
        collection_schema(
            json!({
                "name": { "type": "string", "description": "The name of the index" },
                "definition": {
                    "type": "array",
                    "minItems": 1,
                    "description": "The index definition. Use 'classic' for standard indexes.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "type": { "const": "classic" },
                            "keys": { "type": "object", "description": "The index definition" }
                        },
                        "required": ["type", "keys"]
                    }
                }
            }),
            &["definition"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let CreateIndexArgs {
            database,
            collection,
            name,
            definition,
        } = parse_args(args)?;
        let Some(IndexDefinition::Classic { keys }) = definition.into_iter().next() else {
            return Err(ToolError::InvalidArguments(
                "Index definition not provided. Expected one of the following: `classic`"
                    .to_string(),
            ));
        };
        let keys = to_document(keys)?;
        let name = name.unwrap_or_else(|| default_index_name(&keys));
        let provider = ctx.provider().await?;

        provider
            .run_command_with_check(
                &database,
                doc! {
                    "createIndexes": collection.as_str(),
                    "indexes": [{ "key": keys, "name": name.as_str() }],
                },
            )
            .await?;

        Ok(ToolResult::text(format!(
            "Created the index \"{name}\" on collection \"{collection}\" in database \"{database}\""
        )))
    }
}
