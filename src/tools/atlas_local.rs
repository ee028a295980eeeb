//! Local Atlas deployment tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, OperationKind, Tool, ToolCategory, ToolContext, ToolResult};
use crate::atlas_local::{AtlasLocalClient, AtlasLocalError};
use crate::connection::{ConnectionSettings, ConnectionState};
use crate::error::ToolError;

fn client(ctx: &ToolContext) -> Result<&dyn AtlasLocalClient, ToolError> {
    ctx.session.atlas_local().ok_or_else(|| {
        ToolError::AtlasLocal(AtlasLocalError::CommandFailed {
            command: "info".to_string(),
            stderr: "Docker is not available".to_string(),
        })
    })
}

fn deployment_name_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "deploymentName": { "type": "string", "minLength": 1, "description": description }
        },
        "required": ["deploymentName"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentArgs {
    deployment_name: String,
}

/// `atlas-local-list-deployments`
#[derive(Debug, Clone, Copy)]
pub struct ListDeployments;

#[async_trait]
impl Tool for ListDeployments {
    fn name(&self) -> &'static str {
        "atlas-local-list-deployments"
    }

    fn description(&self) -> &'static str {
        "List MongoDB Atlas local deployments"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::AtlasLocal
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<ToolResult, ToolError> {
        let deployments = client(ctx)?.list_deployments().await?;
        if deployments.is_empty() {
            return Ok(ToolResult::text("No deployments found."));
        }

        let rows = deployments
            .iter()
            .map(|d| {
                let name = if d.name.is_empty() { "Unknown" } else { &d.name };
                format!("{name} | {} | {}", d.state, d.mongodb_version)
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::untrusted(
            format!("Found {} deployments:", deployments.len()),
            Some(format!(
                "Deployment Name | State | MongoDB Version\n\
                 ----------------|----------------|----------------\n\
                 {rows}"
            )),
        ))
    }
}

/// `atlas-local-create-deployment`
#[derive(Debug, Clone, Copy)]
pub struct CreateDeployment;

#[async_trait]
impl Tool for CreateDeployment {
    fn name(&self) -> &'static str {
        "atlas-local-create-deployment"
    }

    fn description(&self) -> &'static str {
        "Create a MongoDB Atlas local deployment"
    }

    fn input_schema(&self) -> Value {
        deployment_name_schema("Name of the deployment to create")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::AtlasLocal
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DeploymentArgs { deployment_name } = parse_args(args)?;
        client(ctx)?.create_deployment(&deployment_name).await?;
        Ok(ToolResult::text(format!(
            "Deployment {deployment_name} created."
        )))
    }
}

/// `atlas-local-delete-deployment`
#[derive(Debug, Clone, Copy)]
pub struct DeleteDeployment;

#[async_trait]
impl Tool for DeleteDeployment {
    fn name(&self) -> &'static str {
        "atlas-local-delete-deployment"
    }

    fn description(&self) -> &'static str {
        "Delete a MongoDB Atlas local deployment"
    }

    fn input_schema(&self) -> Value {
        deployment_name_schema("Name of the deployment to delete")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::AtlasLocal
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Delete
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DeploymentArgs { deployment_name } = parse_args(args)?;
        client(ctx)?.delete_deployment(&deployment_name).await?;
        Ok(ToolResult::text(format!(
            "Deployment \"{deployment_name}\" deleted successfully."
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectDeploymentArgs {
    deployment_id_or_name: String,
}

/// `atlas-local-connect-deployment`
#[derive(Debug, Clone, Copy)]
pub struct ConnectDeployment;

#[async_trait]
impl Tool for ConnectDeployment {
    fn name(&self) -> &'static str {
        "atlas-local-connect-deployment"
    }

    fn description(&self) -> &'static str {
        "Connect to a MongoDB Atlas Local deployment"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "deploymentIdOrName": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Name or ID of the deployment to connect to"
                }
            },
            "required": ["deploymentIdOrName"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::AtlasLocal
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Connect
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ConnectDeploymentArgs {
            deployment_id_or_name,
        } = parse_args(args)?;
        let connection_string = client(ctx)?
            .connection_string(&deployment_id_or_name)
            .await?;

        match ctx
            .session
            .connect(ConnectionSettings::new(connection_string))
            .await
        {
            ConnectionState::Errored { reason } => Err(ToolError::Connection(format!(
                "Failed to connect to Atlas Local deployment \"{deployment_id_or_name}\": {reason}"
            ))),
            _ => Ok(ToolResult::text(format!(
                "Successfully connected to Atlas Local deployment \"{deployment_id_or_name}\"."
            ))),
        }
    }
}

/// The local deployment tools in declaration order.
#[must_use]
pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListDeployments),
        Arc::new(CreateDeployment),
        Arc::new(DeleteDeployment),
        Arc::new(ConnectDeployment),
    ]
}
