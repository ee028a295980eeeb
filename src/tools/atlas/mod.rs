//! Atlas Admin API tools.
//!
//! Registered only when service account credentials are configured. Project
//! IDs and cluster names are validated by the argument schemas before a
//! request is made.

mod connect;
mod create;
mod read;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::Tool;
use crate::atlas::{ApiClient, ApiError};
use crate::error::ToolError;
use crate::tools::ToolContext;

pub use connect::ConnectCluster;
pub use create::{CreateAccessList, CreateDbUser, CreateFreeCluster};
pub use read::{
    GetPerformanceAdvisor, InspectAccessList, InspectCluster, ListAlerts, ListClusters, ListDbUsers,
    ListProjects,
};

/// 24 hex digits, the shape of every Atlas object ID.
const OBJECT_ID_PATTERN: &str = "^[0-9a-fA-F]{24}$";
const CLUSTER_NAME_PATTERN: &str = "^[a-zA-Z0-9_-]+$";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArgs {
    project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterArgs {
    project_id: String,
    cluster_name: String,
}

fn project_id_property(description: &str) -> Value {
    json!({
        "type": "string",
        "minLength": 1,
        "pattern": OBJECT_ID_PATTERN,
        "description": description
    })
}

fn cluster_name_property(description: &str) -> Value {
    json!({
        "type": "string",
        "minLength": 1,
        "maxLength": 64,
        "pattern": CLUSTER_NAME_PATTERN,
        "description": description
    })
}

/// Object schema with `projectId` plus `extra` properties.
fn project_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = Map::new();
    properties.insert("projectId".into(), project_id_property("Atlas project ID"));
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }

    let required: Vec<&str> = ["projectId"].iter().chain(required).copied().collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Object schema with `projectId`, `clusterName` and `extra` properties.
fn cluster_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = Map::new();
    properties.insert("clusterName".into(), cluster_name_property("Atlas cluster name"));
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }

    let required: Vec<&str> = ["clusterName"].iter().chain(required).copied().collect();
    project_schema(Value::Object(properties), &required)
}

/// The session's API client.
///
/// Atlas tools are only registered with credentials, so a missing client
/// means the session was built by hand.
fn api(ctx: &ToolContext) -> Result<&ApiClient, ToolError> {
    ctx.session.api_client().ok_or_else(|| {
        ToolError::Atlas(ApiError::Unexpected(
            "This tool requires Atlas API credentials. Set apiClientId and apiClientSecret."
                .to_string(),
        ))
    })
}

/// The Atlas tools in declaration order.
#[must_use]
pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListProjects),
        Arc::new(ListClusters),
        Arc::new(InspectCluster),
        Arc::new(InspectAccessList),
        Arc::new(CreateAccessList),
        Arc::new(ListDbUsers),
        Arc::new(CreateDbUser),
        Arc::new(ListAlerts),
        Arc::new(GetPerformanceAdvisor),
        Arc::new(CreateFreeCluster),
        Arc::new(ConnectCluster),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::atlas::ApiClient;
    use crate::config::Config;
    use crate::testing::{test_session_with, MockConnector};
    use crate::tools::ToolContext;

    pub const PROJECT: &str = "65a1b2c3d4e5f60718293a4b";

    /// Starts a mock Atlas API that hands out tokens and reports a public IP.
    pub async fn mock_atlas() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "t", "expires_in": 3600 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/private/ipinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "currentIpv4Address": "203.0.113.7" })),
            )
            .mount(&server)
            .await;
        server
    }

    pub fn atlas_context(server: &MockServer, config: Config) -> (Arc<MockConnector>, ToolContext) {
        let connector = Arc::new(MockConnector::new());
        let api = ApiClient::new(&server.uri(), "id", "secret").unwrap();
        let ctx = ToolContext {
            session: test_session_with(config, &connector, Some(Arc::new(api)), None),
            cancel: CancellationToken::new(),
        };
        (connector, ctx)
    }
}
