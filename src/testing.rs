//! In-memory test doubles shared by the unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};

use crate::atlas::ApiClient;
use crate::atlas_local::{AtlasLocalClient, AtlasLocalError, Deployment};
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionOptions};
use crate::error::BackendError;
use crate::mongo::{
    ConnectRequest, Connector, DatabaseInfo, DocumentCursor, FindQuery, OidcPrompt, OidcPromptSink,
    ServiceProvider, UpdateSummary, VecCursor,
};
use crate::session::Session;
use crate::tools::confirmation::{Confirmation, Confirmer};

/// What the next [`MockConnector::connect`] call does.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(String),
    Hang,
    Delay(Duration),
    Prompt(OidcPrompt),
}

/// Connector handing out [`MockProvider`]s.
///
/// Every attempt creates (or takes a prepared) provider before acting on its
/// outcome, so tests can inspect handles of attempts that failed or were
/// superseded. Attempts without a queued outcome succeed.
#[derive(Default)]
pub struct MockConnector {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    prepared: Mutex<VecDeque<Arc<MockProvider>>>,
    providers: Mutex<Vec<Arc<MockProvider>>>,
    closed_before: Mutex<Vec<usize>>,
    requests: Mutex<Vec<ConnectRequest>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Queues a provider to be returned by the next attempt.
    pub fn prepare(&self, provider: Arc<MockProvider>) {
        self.prepared.lock().unwrap().push_back(provider);
    }

    pub fn provider(&self, attempt: usize) -> Arc<MockProvider> {
        Arc::clone(&self.providers.lock().unwrap()[attempt])
    }

    pub fn attempts(&self) -> usize {
        self.providers.lock().unwrap().len()
    }

    /// Total number of closes observed when `attempt` started.
    pub fn closed_before_attempt(&self, attempt: usize) -> usize {
        self.closed_before.lock().unwrap()[attempt]
    }

    pub fn request(&self, attempt: usize) -> ConnectRequest {
        self.requests.lock().unwrap()[attempt].clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
        prompts: OidcPromptSink,
    ) -> Result<Arc<dyn ServiceProvider>, BackendError> {
        let provider = {
            let mut providers = self.providers.lock().unwrap();
            let closed = providers
                .iter()
                .map(|p| p.closed.load(Ordering::SeqCst))
                .sum();
            self.closed_before.lock().unwrap().push(closed);
            self.requests.lock().unwrap().push(request.clone());
            let provider = self
                .prepared
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Arc::new(MockProvider::new()));
            providers.push(Arc::clone(&provider));
            provider
        };

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockOutcome::Succeed);

        match outcome {
            MockOutcome::Succeed => Ok(provider),
            MockOutcome::Fail(message) => Err(BackendError::new(message)),
            MockOutcome::Hang => std::future::pending().await,
            MockOutcome::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(provider)
            }
            MockOutcome::Prompt(prompt) => {
                prompts(prompt);
                Ok(provider)
            }
        }
    }
}

type Namespaces = BTreeMap<String, BTreeMap<String, Vec<Document>>>;

/// In-memory [`ServiceProvider`].
///
/// Filters support top-level equality only. Aggregations understand
/// `$match`, `$limit` and `$count`; other stages pass documents through.
/// Commands answer with a registered reply, or `{ok: 1}`.
#[derive(Default)]
pub struct MockProvider {
    pub closed: AtomicUsize,
    pub fail_close: AtomicBool,
    data: Mutex<Namespaces>,
    replies: Mutex<HashMap<String, Result<Document, BackendError>>>,
    failures: Mutex<HashMap<String, BackendError>>,
    calls: Mutex<Vec<String>>,
    commands: Mutex<Vec<Document>>,
    search_indexes: Mutex<HashMap<String, Vec<Document>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        self.data
            .lock()
            .unwrap()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    pub fn seed_search_indexes(&self, database: &str, collection: &str, indexes: Vec<Document>) {
        self.search_indexes
            .lock()
            .unwrap()
            .insert(format!("{database}.{collection}"), indexes);
    }

    /// Makes the command whose first key is `name` answer with `reply`.
    pub fn reply(&self, name: &str, reply: Result<Document, BackendError>) {
        self.replies.lock().unwrap().insert(name.to_string(), reply);
    }

    /// Makes every call of `operation` fail with `error`.
    pub fn fail(&self, operation: &str, error: BackendError) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation.to_string(), error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<Document> {
        self.commands.lock().unwrap().clone()
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.data
            .lock()
            .unwrap()
            .get(database)
            .and_then(|db| db.get(collection))
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, operation: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self.failures.lock().unwrap().get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn matching(&self, database: &str, collection: &str, filter: &Document) -> Vec<Document> {
        self.documents(database, collection)
            .into_iter()
            .filter(|document| matches(document, filter))
            .collect()
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

#[async_trait]
impl ServiceProvider for MockProvider {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, BackendError> {
        self.record("list_databases")?;
        let data = self.data.lock().unwrap();
        Ok(data
            .iter()
            .map(|(name, collections)| DatabaseInfo {
                name: name.clone(),
                size_on_disk: collections
                    .values()
                    .flatten()
                    .filter_map(|document| bson::to_vec(document).ok())
                    .map(|bytes| bytes.len() as u64)
                    .sum(),
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, BackendError> {
        self.record("list_collections")?;
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(&self, database: &str, collection: &str) -> Result<(), BackendError> {
        self.record("create_collection")?;
        self.seed(database, collection, Vec::new());
        Ok(())
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> Result<(), BackendError> {
        self.record("drop_collection")?;
        if let Some(collections) = self.data.lock().unwrap().get_mut(database) {
            collections.remove(collection);
        }
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> Result<(), BackendError> {
        self.record("drop_database")?;
        self.data.lock().unwrap().remove(database);
        Ok(())
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, BackendError> {
        self.record("count_documents")?;
        Ok(self.matching(database, collection, &filter).len() as u64)
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, BackendError> {
        self.record("insert_many")?;
        let mut ids = Vec::with_capacity(documents.len());
        let documents = documents
            .into_iter()
            .map(|mut document| {
                if !document.contains_key("_id") {
                    document.insert("_id", ObjectId::new());
                }
                ids.push(document.get("_id").cloned().unwrap_or(Bson::Null));
                document
            })
            .collect();
        self.seed(database, collection, documents);
        Ok(ids)
    }

    async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, BackendError> {
        self.record("delete_many")?;
        let mut data = self.data.lock().unwrap();
        let Some(documents) = data.get_mut(database).and_then(|db| db.get_mut(collection)) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|document| !matches(document, &filter));
        Ok((before - documents.len()) as u64)
    }

    async fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateSummary, BackendError> {
        self.record("update_many")?;
        let set = update.get_document("$set").cloned().unwrap_or_default();
        let mut data = self.data.lock().unwrap();
        let documents = data
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        let mut matched = 0;
        let mut modified = 0;
        for document in documents.iter_mut().filter(|d| matches(d, &filter)) {
            matched += 1;
            let before = document.clone();
            for (key, value) in &set {
                document.insert(key.clone(), value.clone());
            }
            if *document != before {
                modified += 1;
            }
        }

        let mut upserted_id = None;
        if matched == 0 && upsert {
            let mut document = filter.clone();
            document.extend(set);
            let id = Bson::ObjectId(ObjectId::new());
            document.insert("_id", id.clone());
            documents.push(document);
            upserted_id = Some(id);
        }

        Ok(UpdateSummary {
            matched_count: matched,
            modified_count: modified,
            upserted_id,
        })
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: FindQuery,
    ) -> Result<DocumentCursor, BackendError> {
        self.record("find")?;
        let mut documents = self.matching(database, collection, &query.filter);
        if let Some(limit) = query.limit.filter(|limit| *limit > 0) {
            documents.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(Box::new(VecCursor::new(documents)))
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<DocumentCursor, BackendError> {
        self.record("aggregate")?;
        let mut documents = self.documents(database, collection);
        for stage in &pipeline {
            if let Ok(filter) = stage.get_document("$match") {
                documents.retain(|document| matches(document, filter));
            } else if let Some(limit) = stage.get("$limit").and_then(Bson::as_i64).or_else(|| {
                stage.get("$limit").and_then(Bson::as_i32).map(i64::from)
            }) {
                documents.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            } else if let Ok(field) = stage.get_str("$count") {
                let mut counted = Document::new();
                counted.insert(field, documents.len() as i64);
                documents = vec![counted];
            }
        }
        Ok(Box::new(VecCursor::new(documents)))
    }

    async fn list_search_indexes(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<Document>, BackendError> {
        self.record("list_search_indexes")?;
        Ok(self
            .search_indexes
            .lock()
            .unwrap()
            .get(&format!("{database}.{collection}"))
            .cloned()
            .unwrap_or_default())
    }

    async fn run_command_with_check(
        &self,
        _database: &str,
        command: Document,
    ) -> Result<Document, BackendError> {
        let name = command.keys().next().cloned().unwrap_or_default();
        self.record(&name)?;
        self.commands.lock().unwrap().push(command);
        self.replies
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Ok(doc! { "ok": 1 }))
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            Err(BackendError::new("socket already closed"))
        } else {
            Ok(())
        }
    }
}

/// Records every request and answers with a fixed [`Confirmation`].
pub struct MockConfirmer {
    answer: Confirmation,
    asked: Mutex<Vec<(String, String)>>,
}

impl MockConfirmer {
    pub fn new(answer: Confirmation) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmer for MockConfirmer {
    async fn confirm(&self, tool: &str, message: &str) -> Confirmation {
        self.asked
            .lock()
            .unwrap()
            .push((tool.to_string(), message.to_string()));
        self.answer
    }
}

/// In-memory [`AtlasLocalClient`].
#[derive(Default)]
pub struct MockAtlasLocal {
    deployments: Mutex<Vec<Deployment>>,
}

impl MockAtlasLocal {
    pub fn with_deployments(names: &[&str]) -> Self {
        let deployments = names
            .iter()
            .enumerate()
            .map(|(index, name)| Deployment {
                name: (*name).to_string(),
                id: format!("c0ffee{index:02}"),
                state: "running".to_string(),
                mongodb_version: "8.0.4".to_string(),
            })
            .collect();
        Self {
            deployments: Mutex::new(deployments),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.deployments
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }
}

#[async_trait]
impl AtlasLocalClient for MockAtlasLocal {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, AtlasLocalError> {
        Ok(self.deployments.lock().unwrap().clone())
    }

    async fn create_deployment(&self, name: &str) -> Result<(), AtlasLocalError> {
        crate::atlas_local::validate_deployment_name(name)?;
        let mut deployments = self.deployments.lock().unwrap();
        let id = format!("c0ffee{:02}", deployments.len());
        deployments.push(Deployment {
            name: name.to_string(),
            id,
            state: "running".to_string(),
            mongodb_version: "8.0.4".to_string(),
        });
        Ok(())
    }

    async fn delete_deployment(&self, name: &str) -> Result<(), AtlasLocalError> {
        let mut deployments = self.deployments.lock().unwrap();
        let before = deployments.len();
        deployments.retain(|d| d.name != name);
        if deployments.len() == before {
            return Err(AtlasLocalError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn connection_string(&self, name_or_id: &str) -> Result<String, AtlasLocalError> {
        let deployments = self.deployments.lock().unwrap();
        let index = deployments
            .iter()
            .position(|d| d.name == name_or_id || d.id == name_or_id)
            .ok_or_else(|| AtlasLocalError::NotFound(name_or_id.to_string()))?;
        Ok(format!(
            "mongodb://localhost:{}/?directConnection=true",
            32768 + index
        ))
    }
}

/// Builds a session over `connector` with no Atlas or local deployment client.
pub fn test_session(config: Config, connector: &Arc<MockConnector>) -> Arc<Session> {
    test_session_with(config, connector, None, None)
}

pub fn test_session_with(
    config: Config,
    connector: &Arc<MockConnector>,
    api_client: Option<Arc<ApiClient>>,
    atlas_local: Option<Arc<dyn AtlasLocalClient>>,
) -> Arc<Session> {
    let options = ConnectionOptions {
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        browser_auth: config.browser,
    };
    let manager = ConnectionManager::new(Arc::clone(connector) as Arc<dyn Connector>, options);
    Session::new(Arc::new(config), manager, api_client, atlas_local)
}
