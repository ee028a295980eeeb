//! `atlas-connect-cluster`: connects through a short-lived database user.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::create::generate_password;
use super::{api, cluster_schema, ClusterArgs};
use crate::atlas::models::{DatabaseUser, DatabaseUserRole, UserScope};
use crate::atlas::{ensure_current_ip_in_access_list, ApiClient, ApiError};
use crate::config::Config;
use crate::connection::{AtlasClusterInfo, ConnectionSettings, ConnectionState};
use crate::error::ToolError;
use crate::tools::{
    parse_args, OperationKind, Tool, ToolCategory, ToolContent, ToolContext, ToolResult,
};

/// Whether the temporary user only needs read access.
///
/// Read-only mode always yields a read-only user. Otherwise the user is
/// read-only when every write kind is disabled and reads are not.
fn read_only_role(config: &Config) -> bool {
    if config.read_only {
        return true;
    }
    let disabled = |kind: &str| config.disabled_tools.iter().any(|d| d == kind);
    let writes_disabled = disabled("create") && disabled("update") && disabled("delete");
    let reads_enabled = !disabled("read") && !disabled("metadata");
    writes_disabled && reads_enabled
}

/// Embeds credentials into a cluster connection string and authenticates
/// against `admin`.
fn with_credentials(
    connection_string: &str,
    username: &str,
    password: &str,
) -> Result<String, ToolError> {
    let (scheme, rest) = connection_string.split_once("://").ok_or_else(|| {
        ToolError::Atlas(ApiError::Unexpected(format!(
            "Invalid cluster connection string: {connection_string}"
        )))
    })?;

    let (hosts, tail) = match rest.find(['/', '?']) {
        Some(at) => rest.split_at(at),
        None => (rest, ""),
    };
    let tail = match tail {
        "" | "/" => "/?authSource=admin".to_string(),
        t if t.contains('?') => format!("{t}&authSource=admin"),
        t => format!("{t}?authSource=admin"),
    };
    Ok(format!("{scheme}://{username}:{password}@{hosts}{tail}"))
}

/// `atlas-connect-cluster`
#[derive(Debug, Clone, Copy)]
pub struct ConnectCluster;

impl ConnectCluster {
    async fn create_temporary_user(
        api: &ApiClient,
        config: &Config,
        project_id: &str,
        cluster_name: &str,
    ) -> Result<(AtlasClusterInfo, String), ToolError> {
        let username = format!("mcpUser{}", Uuid::new_v4().as_u128() % 100_000);
        let password = generate_password();
        let lifetime = i64::try_from(config.atlas_temporary_database_user_lifetime_ms)
            .unwrap_or(i64::MAX);
        let expiry_date = Utc::now() + Duration::milliseconds(lifetime);
        let role_name = if read_only_role(config) {
            "readAnyDatabase"
        } else {
            "readWriteAnyDatabase"
        };

        let user = DatabaseUser {
            username: username.clone(),
            database_name: "admin".to_string(),
            roles: vec![DatabaseUserRole {
                role_name: role_name.to_string(),
                database_name: "admin".to_string(),
                collection_name: None,
            }],
            scopes: vec![UserScope {
                kind: "CLUSTER".to_string(),
                name: cluster_name.to_string(),
            }],
            password: Some(password.clone()),
            delete_after_date: Some(expiry_date),
        };
        api.create_database_user(project_id, &user).await?;
        debug!(username, role_name, "Created temporary Atlas database user");

        let info = AtlasClusterInfo {
            username,
            project_id: project_id.to_string(),
            cluster_name: cluster_name.to_string(),
            expiry_date,
        };
        Ok((info, password))
    }
}

#[async_trait]
impl Tool for ConnectCluster {
    fn name(&self) -> &'static str {
        "atlas-connect-cluster"
    }

    fn description(&self) -> &'static str {
        "Connect to MongoDB Atlas cluster"
    }

    fn input_schema(&self) -> Value {
        cluster_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Connect
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ClusterArgs {
            project_id,
            cluster_name,
        } = parse_args(args)?;
        let api = api(ctx)?;
        let session = &ctx.session;

        let current = session.connection().current_state();
        if current.is_connected()
            && current
                .atlas()
                .is_some_and(|a| a.project_id == project_id && a.cluster_name == cluster_name)
        {
            return Ok(ToolResult::text(format!(
                "Connected to cluster \"{cluster_name}\"."
            )));
        }

        ensure_current_ip_in_access_list(api, &project_id).await;
        session.disconnect().await;

        let cluster = api.get_cluster(&project_id, &cluster_name).await?;
        let Some(cluster_connection_string) = cluster.connection_string() else {
            return Err(ToolError::Atlas(ApiError::Unexpected(
                "Connection string not available".to_string(),
            )));
        };

        let (atlas, password) =
            Self::create_temporary_user(api, ctx.config(), &project_id, &cluster_name).await?;
        let settings = ConnectionSettings {
            connection_string: with_credentials(
                cluster_connection_string,
                &atlas.username,
                &password,
            )?,
            atlas: Some(atlas.clone()),
        };

        debug!(cluster_name, "Connecting to Atlas cluster");
        match session.connect(settings).await {
            ConnectionState::Connected { .. } => Ok(ToolResult::text(format!(
                "Connected to cluster \"{cluster_name}\"."
            ))),
            ConnectionState::Errored { reason } => {
                if let Err(error) = api
                    .delete_database_user(&project_id, &atlas.username)
                    .await
                {
                    warn!(error = %error, "Failed to delete temporary Atlas database user");
                }
                Err(ToolError::Connection(format!(
                    "Failed to connect to cluster \"{cluster_name}\": {reason}. Provisioning a new database user can take a few seconds; retry the connection shortly."
                )))
            }
            ConnectionState::Connecting { .. } | ConnectionState::Disconnected => {
                Ok(ToolResult::blocks(vec![
                    ToolContent::text(format!(
                        "Attempting to connect to cluster \"{cluster_name}\"..."
                    )),
                    ToolContent::text(
                        "Warning: Provisioning a user and connecting to the cluster may take more time, please check again in a few seconds.",
                    ),
                    ToolContent::text(
                        "Warning: Make sure your IP address was enabled in the allow list setting of the Atlas cluster.",
                    ),
                ]))
            }
        }
    }
}
