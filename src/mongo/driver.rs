//! [`ServiceProvider`] implemented on the official `mongodb` driver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Cursor};
use tracing::debug;

use super::{
    reply_ok, ConnectRequest, Connector, CursorSource, DatabaseInfo, DocumentCursor, FindQuery,
    OidcPromptSink, ServiceProvider, UpdateSummary,
};
use crate::error::BackendError;

/// Opens connections with the `mongodb` driver.
#[derive(Debug, Clone, Default)]
pub struct DriverConnector {
    server_selection_timeout: Option<Duration>,
}

impl DriverConnector {
    /// Creates a connector using the driver defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            server_selection_timeout: None,
        }
    }

    /// Bounds how long the driver waits for a suitable server.
    #[must_use]
    pub const fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
        _prompts: OidcPromptSink,
    ) -> Result<Arc<dyn ServiceProvider>, BackendError> {
        let mut options = ClientOptions::parse(&request.connection_string).await?;
        if options.app_name.is_none() {
            options.app_name = Some(request.app_name.clone());
        }
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options)?;
        // The driver connects lazily; ping so failures surface here.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        debug!(auth_type = %request.auth_type, "MongoDB connection established");
        Ok(Arc::new(DriverServiceProvider { client }))
    }
}

/// A live driver connection.
#[derive(Debug, Clone)]
pub struct DriverServiceProvider {
    client: Client,
}

impl DriverServiceProvider {
    fn collection(&self, database: &str, collection: &str) -> mongodb::Collection<Document> {
        self.client.database(database).collection(collection)
    }
}

#[async_trait]
impl ServiceProvider for DriverServiceProvider {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, BackendError> {
        let databases = self.client.list_databases().await?;
        Ok(databases
            .into_iter()
            .map(|spec| DatabaseInfo {
                name: spec.name,
                size_on_disk: spec.size_on_disk,
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, BackendError> {
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn create_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<(), BackendError> {
        Ok(self
            .client
            .database(database)
            .create_collection(collection)
            .await?)
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> Result<(), BackendError> {
        Ok(self.collection(database, collection).drop().await?)
    }

    async fn drop_database(&self, database: &str) -> Result<(), BackendError> {
        Ok(self.client.database(database).drop().await?)
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, BackendError> {
        Ok(self
            .collection(database, collection)
            .count_documents(filter)
            .await?)
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, BackendError> {
        let result = self
            .collection(database, collection)
            .insert_many(documents)
            .await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, BackendError> {
        let result = self
            .collection(database, collection)
            .delete_many(filter)
            .await?;
        Ok(result.deleted_count)
    }

    async fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateSummary, BackendError> {
        let result = self
            .collection(database, collection)
            .update_many(filter, update)
            .upsert(upsert)
            .await?;
        Ok(UpdateSummary {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: FindQuery,
    ) -> Result<DocumentCursor, BackendError> {
        let coll = self.collection(database, collection);
        let mut action = coll.find(query.filter);
        if let Some(projection) = query.projection {
            action = action.projection(projection);
        }
        if let Some(sort) = query.sort {
            action = action.sort(sort);
        }
        if let Some(limit) = query.limit {
            action = action.limit(limit);
        }
        let cursor = action.await?;
        Ok(Box::new(DriverCursor { cursor }))
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<DocumentCursor, BackendError> {
        let cursor = self
            .collection(database, collection)
            .aggregate(pipeline)
            .await?;
        Ok(Box::new(DriverCursor { cursor }))
    }

    async fn list_search_indexes(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<Document>, BackendError> {
        let coll = self.collection(database, collection);
        let cursor = coll.list_search_indexes().await?;
        Ok(cursor.try_collect().await?)
    }

    async fn run_command_with_check(
        &self,
        database: &str,
        command: Document,
    ) -> Result<Document, BackendError> {
        let reply = self.client.database(database).run_command(command).await?;
        if reply_ok(&reply) {
            Ok(reply)
        } else {
            let message = reply
                .get_str("errmsg")
                .unwrap_or("command failed")
                .to_string();
            match (reply.get_i32("code"), reply.get_str("codeName")) {
                (Ok(code), Ok(name)) => Err(BackendError::with_code(code, name, message)),
                _ => Err(BackendError::new(message)),
            }
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.client.clone().shutdown().immediate(true).await;
        Ok(())
    }
}

struct DriverCursor {
    cursor: Cursor<Document>,
}

#[async_trait]
impl CursorSource<Document> for DriverCursor {
    async fn try_next(&mut self) -> Result<Option<Document>, BackendError> {
        Ok(self.cursor.try_next().await?)
    }
}
