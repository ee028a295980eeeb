//! Local Atlas deployments managed through Docker.
//!
//! A local deployment is a `mongodb/mongodb-atlas-local` container labelled
//! so it can be told apart from unrelated containers. Availability of the
//! Docker CLI is checked once at startup; when it is missing the server runs
//! without the `atlas-local` tools.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Image used for new deployments.
pub const ATLAS_LOCAL_IMAGE: &str = "mongodb/mongodb-atlas-local:latest";

/// Label identifying containers created as local deployments.
pub const DEPLOYMENT_LABEL: &str = "mongodb-atlas-local=container";

/// Port `mongod` listens on inside the container.
const MONGODB_PORT: u16 = 27017;

/// Errors from the local deployment manager.
#[derive(Error, Debug)]
pub enum AtlasLocalError {
    /// The container CLI could not be started.
    #[error("failed to run docker: {0}")]
    Io(#[from] std::io::Error),

    /// The container CLI exited with an error.
    #[error("docker {command} failed: {stderr}")]
    CommandFailed {
        /// Subcommand that failed.
        command: String,
        /// Error output.
        stderr: String,
    },

    /// No deployment with that name or ID exists.
    #[error("deployment \"{0}\" not found")]
    NotFound(String),

    /// The deployment name cannot be used as a container name.
    #[error("invalid deployment name \"{0}\": use letters, digits, '_', '.' or '-', starting with a letter or digit")]
    InvalidName(String),

    /// The deployment exists but does not expose MongoDB on a host port.
    #[error("deployment \"{0}\" has no published MongoDB port")]
    NoPublishedPort(String),
}

/// A local deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Container name.
    pub name: String,
    /// Container ID.
    pub id: String,
    /// Container state, e.g. `running`.
    pub state: String,
    /// MongoDB version, when the image reports it.
    pub mongodb_version: String,
}

/// Manages local deployments.
#[async_trait]
pub trait AtlasLocalClient: Send + Sync {
    /// Lists existing deployments.
    async fn list_deployments(&self) -> Result<Vec<Deployment>, AtlasLocalError>;

    /// Creates and starts a deployment.
    async fn create_deployment(&self, name: &str) -> Result<(), AtlasLocalError>;

    /// Removes a deployment and its container.
    async fn delete_deployment(&self, name: &str) -> Result<(), AtlasLocalError>;

    /// Returns a connection string for a deployment, by name or container ID.
    async fn connection_string(&self, name_or_id: &str) -> Result<String, AtlasLocalError>;
}

/// [`AtlasLocalClient`] driving the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerAtlasLocal {
    program: String,
}

impl DockerAtlasLocal {
    /// Returns a client if a Docker daemon answers, `None` otherwise.
    pub async fn detect() -> Option<Arc<dyn AtlasLocalClient>> {
        let client = Self {
            program: "docker".to_string(),
        };
        match client
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await
        {
            Ok(version) => {
                info!(docker = version.trim(), "Docker available, enabling local deployments");
                Some(Arc::new(client))
            }
            Err(error) => {
                debug!(error = %error, "Docker not available, local deployment tools disabled");
                None
            }
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, AtlasLocalError> {
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(AtlasLocalError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn find(&self, name_or_id: &str) -> Result<Deployment, AtlasLocalError> {
        self.list_deployments()
            .await?
            .into_iter()
            .find(|deployment| {
                deployment.name == name_or_id
                    || (!name_or_id.is_empty() && deployment.id.starts_with(name_or_id))
            })
            .ok_or_else(|| AtlasLocalError::NotFound(name_or_id.to_string()))
    }
}

#[async_trait]
impl AtlasLocalClient for DockerAtlasLocal {
    async fn list_deployments(&self) -> Result<Vec<Deployment>, AtlasLocalError> {
        let filter = format!("label={DEPLOYMENT_LABEL}");
        let output = self
            .run(&["ps", "-a", "--filter", &filter, "--format", "{{json .}}"])
            .await?;
        Ok(parse_deployments(&output))
    }

    async fn create_deployment(&self, name: &str) -> Result<(), AtlasLocalError> {
        validate_deployment_name(name)?;
        let port = format!("127.0.0.1::{MONGODB_PORT}");
        self.run(&[
            "run",
            "--detach",
            "--name",
            name,
            "--label",
            DEPLOYMENT_LABEL,
            "--label",
            "creation-source=MCPServer",
            "--publish",
            &port,
            ATLAS_LOCAL_IMAGE,
        ])
        .await?;
        info!(deployment = name, "Local deployment created");
        Ok(())
    }

    async fn delete_deployment(&self, name: &str) -> Result<(), AtlasLocalError> {
        let deployment = self.find(name).await?;
        self.run(&["rm", "--force", "--volumes", &deployment.id])
            .await?;
        info!(deployment = name, "Local deployment deleted");
        Ok(())
    }

    async fn connection_string(&self, name_or_id: &str) -> Result<String, AtlasLocalError> {
        let deployment = self.find(name_or_id).await?;
        let output = self
            .run(&["port", &deployment.id, &MONGODB_PORT.to_string()])
            .await?;
        let port =
            parse_host_port(&output).ok_or(AtlasLocalError::NoPublishedPort(deployment.name))?;
        Ok(format!("mongodb://localhost:{port}/?directConnection=true"))
    }
}

/// Checks that `name` is usable as a container name.
///
/// # Errors
///
/// Returns [`AtlasLocalError::InvalidName`] otherwise.
pub fn validate_deployment_name(name: &str) -> Result<(), AtlasLocalError> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = NAME.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]{0,63}$").ok());
    if pattern.as_ref().is_some_and(|pattern| pattern.is_match(name)) {
        Ok(())
    } else {
        Err(AtlasLocalError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn parse_deployments(output: &str) -> Vec<Deployment> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<PsLine>(line).ok())
        .map(|line| {
            let version = line
                .labels
                .split(',')
                .find_map(|label| label.strip_prefix("version="))
                .unwrap_or("unknown")
                .to_string();
            Deployment {
                name: line.names.split(',').next().unwrap_or_default().to_string(),
                id: line.id,
                state: line.state,
                mongodb_version: version,
            }
        })
        .collect()
}

fn parse_host_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_ps_json_lines() {
        let output = concat!(
            r#"{"ID":"3f2a9c","Names":"local1","State":"running","Labels":"mongodb-atlas-local=container,version=8.0.4"}"#,
            "\n",
            r#"{"ID":"77bb01","Names":"local2","State":"exited","Labels":"mongodb-atlas-local=container"}"#,
            "\n\n",
        );

        let deployments = parse_deployments(output);

        assert_eq!(deployments.len(), 2);
        assert_eq!(deployments[0].name, "local1");
        assert_eq!(deployments[0].mongodb_version, "8.0.4");
        assert_eq!(deployments[1].state, "exited");
        assert_eq!(deployments[1].mongodb_version, "unknown");
    }

    #[test]
    fn skips_garbage_lines() {
        assert!(parse_deployments("not json\n").is_empty());
    }

    #[test]
    fn parses_published_port() {
        assert_eq!(parse_host_port("127.0.0.1:32768\n"), Some(32768));
        assert_eq!(parse_host_port("0.0.0.0:5000\n[::]:5000\n"), Some(5000));
        assert_eq!(parse_host_port(""), None);
    }

    #[test]
    fn deployment_names_follow_container_rules() {
        assert!(validate_deployment_name("local-dev_1.test").is_ok());
        assert!(validate_deployment_name("").is_err());
        assert!(validate_deployment_name("-leading-dash").is_err());
        assert!(validate_deployment_name("has space").is_err());
        assert!(validate_deployment_name(&"a".repeat(65)).is_err());
    }
}
