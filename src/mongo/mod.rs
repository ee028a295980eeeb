//! MongoDB backend adapter.
//!
//! Tools never talk to the driver directly. They go through the narrow
//! [`ServiceProvider`] capability, which the connection manager hands out
//! while a connection is live, and which tests replace with an in-memory
//! implementation.
//!
//! # Modules
//!
//! - [`cursor`]: Byte-bounded cursor draining
//! - [`driver`]: [`ServiceProvider`] and [`Connector`] on the `mongodb` crate
//! - [`schema`]: Schema inference from sampled documents

pub mod cursor;
pub mod driver;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use serde_json::Value;

use crate::connection::AuthType;
use crate::error::{BackendError, ToolError};

pub use cursor::{bson_size, drain_until_max_bytes, CursorSource, VecCursor};
pub use schema::infer_schema;

/// A database as reported by `listDatabases`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Size on disk in bytes.
    pub size_on_disk: u64,
}

/// Parameters of a `find` query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Query filter.
    pub filter: Document,
    /// Optional projection.
    pub projection: Option<Document>,
    /// Optional sort specification.
    pub sort: Option<Document>,
    /// Optional limit on the number of documents.
    pub limit: Option<i64>,
}

/// Outcome of an `updateMany`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSummary {
    /// Documents matching the filter.
    pub matched_count: u64,
    /// Documents actually modified.
    pub modified_count: u64,
    /// Identifier of an upserted document, if one was inserted.
    pub upserted_id: Option<Bson>,
}

/// Cursor over query results.
pub type DocumentCursor = Box<dyn CursorSource<Document>>;

/// The database operations tools may invoke on a live connection.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Lists all databases.
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, BackendError>;

    /// Lists the collection names of a database.
    async fn list_collections(&self, database: &str) -> Result<Vec<String>, BackendError>;

    /// Creates a collection.
    async fn create_collection(&self, database: &str, collection: &str)
        -> Result<(), BackendError>;

    /// Drops a collection.
    async fn drop_collection(&self, database: &str, collection: &str) -> Result<(), BackendError>;

    /// Drops a database.
    async fn drop_database(&self, database: &str) -> Result<(), BackendError>;

    /// Counts the documents matching `filter`.
    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, BackendError>;

    /// Inserts documents and returns their identifiers in insertion order.
    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, BackendError>;

    /// Deletes the documents matching `filter` and returns how many were removed.
    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, BackendError>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateSummary, BackendError>;

    /// Opens a cursor over the results of a `find`.
    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: FindQuery,
    ) -> Result<DocumentCursor, BackendError>;

    /// Opens a cursor over the results of an aggregation pipeline.
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<DocumentCursor, BackendError>;

    /// Lists the search and vector search indexes of a collection.
    async fn list_search_indexes(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<Document>, BackendError>;

    /// Runs a database command and fails unless the reply reports `ok: 1`.
    async fn run_command_with_check(
        &self,
        database: &str,
        command: Document,
    ) -> Result<Document, BackendError>;

    /// Releases the connection.
    async fn close(&self) -> Result<(), BackendError>;
}

/// Login prompt relayed from an interactive OIDC device flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcPrompt {
    /// URL the user opens to authenticate.
    pub login_url: String,
    /// Code the user enters at that URL.
    pub user_code: String,
}

/// Callback through which a connector reports OIDC login prompts.
pub type OidcPromptSink = Arc<dyn Fn(OidcPrompt) + Send + Sync>;

/// What a [`Connector`] needs to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// MongoDB connection string.
    pub connection_string: String,
    /// Application name used when the connection string has none.
    pub app_name: String,
    /// Authentication mechanism inferred from the connection string.
    pub auth_type: AuthType,
}

/// Opens backend connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects and verifies the deployment is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid or the
    /// deployment cannot be reached or authenticated against.
    async fn connect(
        &self,
        request: &ConnectRequest,
        prompts: OidcPromptSink,
    ) -> Result<Arc<dyn ServiceProvider>, BackendError>;
}

/// Converts a JSON argument (relaxed or canonical extended JSON) into a document.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] if `value` is not an object or
/// contains malformed extended JSON.
pub fn to_document(value: Value) -> Result<Document, ToolError> {
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected an object, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

/// Converts a list of JSON objects into documents.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] if any element is not an object.
pub fn to_documents(values: Vec<Value>) -> Result<Vec<Document>, ToolError> {
    values.into_iter().map(to_document).collect()
}

/// Renders a document as relaxed extended JSON.
#[must_use]
pub fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// Renders a BSON value as relaxed extended JSON.
#[must_use]
pub fn bson_to_json(value: Bson) -> Value {
    value.into_relaxed_extjson()
}

/// Returns `true` if a command reply reports success.
#[must_use]
pub fn reply_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(ok)) => (*ok - 1.0).abs() < f64::EPSILON,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        Some(Bson::Boolean(ok)) => *ok,
        _ => false,
    }
}
