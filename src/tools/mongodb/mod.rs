//! Tools operating on a MongoDB deployment.
//!
//! # Modules
//!
//! - [`connect`]: `connect` and `switch-connection`
//! - [`metadata`]: Databases, collections, schemas, indexes, statistics, logs and query plans
//! - [`search`]: `list-search-indexes`
//! - [`read`]: `find`, `count` and `aggregate`
//! - [`create`]: Collections, documents and indexes
//! - [`update`]: `update-many` and `rename-collection`
//! - [`delete`]: `delete-many` and the drop tools
//! - [`index_check`]: Collection scan detection

pub mod connect;
pub mod create;
pub mod delete;
pub mod index_check;
pub mod metadata;
pub mod read;
pub mod search;
pub mod update;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::Tool;

/// Arguments naming a database.
#[derive(Debug, Deserialize)]
pub struct DatabaseArgs {
    /// Database name.
    pub database: String,
}

/// Arguments naming a collection.
#[derive(Debug, Deserialize)]
pub struct CollectionArgs {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

/// Input schema with a `database` property plus `extra` properties.
#[must_use]
pub fn database_schema(extra: Value, required: &[&str]) -> Value {
    object_schema(
        json!({
            "database": { "type": "string", "description": "Database name" }
        }),
        extra,
        ["database"].iter().chain(required).copied().collect(),
    )
}

/// Input schema with `database` and `collection` properties plus `extra` properties.
#[must_use]
pub fn collection_schema(extra: Value, required: &[&str]) -> Value {
    object_schema(
        json!({
            "database": { "type": "string", "description": "Database name" },
            "collection": { "type": "string", "description": "Collection name" }
        }),
        extra,
        ["database", "collection"].iter().chain(required).copied().collect(),
    )
}

fn object_schema(mut properties: Value, extra: Value, required: Vec<&str>) -> Value {
    if let (Some(properties), Value::Object(extra)) = (properties.as_object_mut(), extra) {
        properties.extend(extra);
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// The MongoDB tools in declaration order.
#[must_use]
pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(connect::Connect),
        Arc::new(connect::SwitchConnection),
        Arc::new(metadata::ListDatabases),
        Arc::new(metadata::ListCollections),
        Arc::new(metadata::CollectionIndexes),
        Arc::new(search::ListSearchIndexes),
        Arc::new(metadata::CollectionSchema),
        Arc::new(metadata::CollectionStorageSize),
        Arc::new(metadata::DbStats),
        Arc::new(metadata::Explain),
        Arc::new(metadata::MongoDbLogs),
        Arc::new(read::Find),
        Arc::new(read::Count),
        Arc::new(read::Aggregate),
        Arc::new(create::CreateCollection),
        Arc::new(create::InsertMany),
        Arc::new(create::CreateIndex),
        Arc::new(update::UpdateMany),
        Arc::new(update::RenameCollection),
        Arc::new(delete::DeleteMany),
        Arc::new(delete::DropCollection),
        Arc::new(delete::DropDatabase),
        Arc::new(delete::DropIndex),
    ]
}
