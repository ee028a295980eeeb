//! HTTP client for the Atlas Admin API v2.
//!
//! Requests are authenticated with a service account through the OAuth 2.0
//! client-credentials grant. The access token is cached until shortly
//! before it expires.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::models::{
    AccessListEntry, AdvisorResponse, Alert, ClusterDescription, DatabaseUser,
    DropIndexSuggestions, IpInfo, Paginated, Project, SchemaAdvice, SlowQueries,
    SuggestedIndexes,
};
use super::ApiError;

/// Media type selecting the API version.
const ATLAS_ACCEPT: &str = "application/vnd.atlas.2025-03-12+json";

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN_S: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_S: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_S) > now
    }
}

/// Atlas Admin API client.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl ApiClient {
    /// Creates a client for `base_url` (e.g. `https://cloud.mongodb.com/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(ATLAS_ACCEPT),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("mongodb-mcp-server/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        Ok(Self {
            http,
            base_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        })
    }

    /// Returns the configured base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists the projects the service account can see.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn list_projects(&self) -> Result<Paginated<Project>, ApiError> {
        self.get("/groups").await
    }

    /// Lists the clusters of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn list_clusters(
        &self,
        project_id: &str,
    ) -> Result<Paginated<ClusterDescription>, ApiError> {
        self.get(&format!("/groups/{project_id}/clusters")).await
    }

    /// Fetches one cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn get_cluster(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<ClusterDescription, ApiError> {
        self.get(&format!("/groups/{project_id}/clusters/{cluster_name}"))
            .await
    }

    /// Creates a cluster from a raw cluster description.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn create_cluster(
        &self,
        project_id: &str,
        description: &serde_json::Value,
    ) -> Result<ClusterDescription, ApiError> {
        self.post(&format!("/groups/{project_id}/clusters"), description)
            .await
    }

    /// Lists the IP access list of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn list_access_list(
        &self,
        project_id: &str,
    ) -> Result<Paginated<AccessListEntry>, ApiError> {
        self.get(&format!("/groups/{project_id}/accessList")).await
    }

    /// Adds entries to the IP access list of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it; an
    /// existing entry yields [`ApiError::Status`] with status 409.
    pub async fn create_access_list(
        &self,
        project_id: &str,
        entries: &[AccessListEntry],
    ) -> Result<Paginated<AccessListEntry>, ApiError> {
        self.post(&format!("/groups/{project_id}/accessList"), entries)
            .await
    }

    /// Lists the database users of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn list_database_users(
        &self,
        project_id: &str,
    ) -> Result<Paginated<DatabaseUser>, ApiError> {
        self.get(&format!("/groups/{project_id}/databaseUsers"))
            .await
    }

    /// Creates a database user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn create_database_user(
        &self,
        project_id: &str,
        user: &DatabaseUser,
    ) -> Result<DatabaseUser, ApiError> {
        self.post(&format!("/groups/{project_id}/databaseUsers"), user)
            .await
    }

    /// Deletes a password database user authenticating against `admin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn delete_database_user(
        &self,
        project_id: &str,
        username: &str,
    ) -> Result<(), ApiError> {
        let url = self.api_url(&format!(
            "/groups/{project_id}/databaseUsers/admin/{username}"
        ));
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    /// Lists the alerts of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn list_alerts(&self, project_id: &str) -> Result<Paginated<Alert>, ApiError> {
        self.get(&format!("/groups/{project_id}/alerts")).await
    }

    /// Returns the public IPv4 address Atlas sees for this machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn current_ip(&self) -> Result<String, ApiError> {
        let url = format!("{}api/private/ipinfo", self.base_url);
        let request = self.http.get(url).header(ACCEPT, "application/json");
        let info: IpInfo = self.execute(request).await?.json().await?;
        Ok(info.current_ipv4_address)
    }

    /// Fetches the indexes the performance advisor suggests for a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn suggested_indexes(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<SuggestedIndexes, ApiError> {
        let response: AdvisorResponse<SuggestedIndexes> = self
            .get(&format!(
                "/groups/{project_id}/clusters/{cluster_name}/performanceAdvisor/suggestedIndexes"
            ))
            .await?;
        Ok(response.content)
    }

    /// Fetches the hidden, redundant and unused indexes of a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn drop_index_suggestions(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<DropIndexSuggestions, ApiError> {
        let response: AdvisorResponse<DropIndexSuggestions> = self
            .get(&format!(
                "/groups/{project_id}/clusters/{cluster_name}/performanceAdvisor/dropIndexSuggestions"
            ))
            .await?;
        Ok(response.content)
    }

    /// Fetches schema recommendations for a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn schema_advice(
        &self,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<SchemaAdvice, ApiError> {
        let response: AdvisorResponse<SchemaAdvice> = self
            .get(&format!(
                "/groups/{project_id}/clusters/{cluster_name}/performanceAdvisor/schemaAdvice"
            ))
            .await?;
        Ok(response.content)
    }

    /// Fetches slow query logs of one process, optionally limited to queries
    /// since `since` and to the given namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn slow_queries(
        &self,
        project_id: &str,
        process_id: &str,
        since: Option<DateTime<Utc>>,
        namespaces: &[String],
    ) -> Result<SlowQueries, ApiError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(since) = since {
            query.push(("since", since.timestamp_millis().to_string()));
        }
        query.extend(namespaces.iter().map(|ns| ("namespaces", ns.clone())));

        let path = format!("/groups/{project_id}/processes/{process_id}/performanceAdvisor/slowQueryLogs");
        let request = self.http.get(self.api_url(&path)).query(&query);
        Ok(self.execute(request).await?.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.http.get(self.api_url(path));
        Ok(self.execute(request).await?.json().await?)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.api_url(path)).json(body);
        Ok(self.execute(request).await?.json().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: format!("{status} {body}").trim().to_string(),
        })
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        debug!("Requesting Atlas access token");
        let response = self
            .http
            .post(format!("{}api/oauth/token", self.base_url))
            .header(ACCEPT, "application/json")
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("{status} {body}").trim().to_string()));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_S);
        let value = token.access_token;
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: now + Duration::seconds(lifetime),
        });
        Ok(value)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}api/atlas/v2{path}", self.base_url)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
