//! Atlas tools that create resources.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{api, cluster_schema, project_schema, CLUSTER_NAME_PATTERN};
use crate::atlas::access_list::current_ip_entry;
use crate::atlas::ensure_current_ip_in_access_list;
use crate::atlas::models::{AccessListEntry, DatabaseUser, DatabaseUserRole, UserScope};
use crate::error::ToolError;
use crate::tools::{
    parse_args, OperationKind, Tool, ToolCategory, ToolContent, ToolContext, ToolResult,
};

const DEFAULT_ACCESS_LIST_COMMENT: &str = "Added by Atlas MCP";
const CONFIRM_PROMPT: &str = "**Do you confirm the execution of the action?**";
const IPV4_PATTERN: &str = r"^(\d{1,3}\.){3}\d{1,3}$";
const CIDR_PATTERN: &str = r"^(\d{1,3}\.){3}\d{1,3}/\d{1,2}$";

fn project_of(args: &Value) -> &str {
    args.get("projectId").and_then(Value::as_str).unwrap_or("")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessListArgs {
    project_id: String,
    #[serde(default)]
    ip_addresses: Vec<String>,
    #[serde(default)]
    cidr_blocks: Vec<String>,
    #[serde(default)]
    current_ip_address: bool,
    #[serde(default)]
    comment: Option<String>,
}

/// `atlas-create-access-list`
#[derive(Debug, Clone, Copy)]
pub struct CreateAccessList;

#[async_trait]
impl Tool for CreateAccessList {
    fn name(&self) -> &'static str {
        "atlas-create-access-list"
    }

    fn description(&self) -> &'static str {
        "Allow Ip/CIDR ranges to access your MongoDB Atlas clusters."
    }

    fn input_schema(&self) -> Value {
        project_schema(
            json!({
                "ipAddresses": {
                    "type": "array",
                    "items": { "type": "string", "pattern": IPV4_PATTERN },
                    "description": "IP addresses to allow access from"
                },
                "cidrBlocks": {
                    "type": "array",
                    "items": { "type": "string", "pattern": CIDR_PATTERN },
                    "description": "CIDR blocks to allow access from"
                },
                "currentIpAddress": {
                    "type": "boolean",
                    "default": false,
                    "description": "Add the current IP address"
                },
                "comment": {
                    "type": "string",
                    "default": DEFAULT_ACCESS_LIST_COMMENT,
                    "description": "Comment for the access list entries"
                }
            }),
            &[],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    fn confirmation_message(&self, args: &Value) -> String {
        let list = |name: &str| {
            args.get(name)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let mut entries: Vec<String> = list("ipAddresses")
            .into_iter()
            .map(|ip| format!("- IP address: `{ip}`"))
            .collect();
        entries.extend(
            list("cidrBlocks")
                .into_iter()
                .map(|cidr| format!("- CIDR block: `{cidr}`")),
        );
        if args.get("currentIpAddress").and_then(Value::as_bool) == Some(true) {
            entries.push("- The current IP address".to_string());
        }

        format!(
            "You are about to add the following entries to the access list for Atlas project `{}`:\n\n{}\n\n{CONFIRM_PROMPT}",
            project_of(args),
            entries.join("\n")
        )
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let AccessListArgs {
            project_id,
            ip_addresses,
            cidr_blocks,
            current_ip_address,
            comment,
        } = parse_args(args)?;
        if ip_addresses.is_empty() && cidr_blocks.is_empty() && !current_ip_address {
            return Err(ToolError::InvalidArguments(
                "One of ipAddresses, cidrBlocks, currentIpAddress must be provided.".to_string(),
            ));
        }

        let api = api(ctx)?;
        let comment = comment.unwrap_or_else(|| DEFAULT_ACCESS_LIST_COMMENT.to_string());
        let mut entries: Vec<AccessListEntry> = ip_addresses
            .into_iter()
            .map(|ip| AccessListEntry {
                ip_address: Some(ip),
                cidr_block: None,
                comment: Some(comment.clone()),
            })
            .chain(cidr_blocks.into_iter().map(|cidr| AccessListEntry {
                ip_address: None,
                cidr_block: Some(cidr),
                comment: Some(comment.clone()),
            }))
            .collect();
        if current_ip_address {
            entries.push(current_ip_entry(api, &comment).await?);
        }

        api.create_access_list(&project_id, &entries).await?;
        Ok(ToolResult::text(format!(
            "IP/CIDR ranges added to access list for project {project_id}."
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleArgs {
    role_name: String,
    #[serde(default = "admin_database")]
    database_name: String,
    #[serde(default)]
    collection_name: Option<String>,
}

fn admin_database() -> String {
    "admin".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbUserArgs {
    project_id: String,
    username: String,
    #[serde(default)]
    password: Option<String>,
    roles: Vec<RoleArgs>,
    #[serde(default)]
    clusters: Vec<String>,
}

/// Random password for users created without one.
pub(super) fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `atlas-create-db-user`
#[derive(Debug, Clone, Copy)]
pub struct CreateDbUser;

#[async_trait]
impl Tool for CreateDbUser {
    fn name(&self) -> &'static str {
        "atlas-create-db-user"
    }

    fn description(&self) -> &'static str {
        "Create an MongoDB Atlas database user"
    }

    fn input_schema(&self) -> Value {
        project_schema(
            json!({
                "username": {
                    "type": "string",
                    "minLength": 1,
                    "maxLength": 100,
                    "pattern": r"^[a-zA-Z0-9._-]+$",
                    "description": "Username for the new user"
                },
                "password": {
                    "type": "string",
                    "description": "Password for the new user. If the user hasn't supplied an explicit password, leave it unset and under no circumstances try to generate it."
                },
                "roles": {
                    "type": "array",
                    "description": "Roles for the new user",
                    "items": {
                        "type": "object",
                        "properties": {
                            "roleName": { "type": "string", "description": "Role name" },
                            "databaseName": {
                                "type": "string",
                                "default": "admin",
                                "description": "Database name"
                            },
                            "collectionName": { "type": "string", "description": "Collection name" }
                        },
                        "required": ["roleName"]
                    }
                },
                "clusters": {
                    "type": "array",
                    "items": { "type": "string", "pattern": CLUSTER_NAME_PATTERN },
                    "description": "Clusters to assign the user to, leave empty for access to all clusters"
                }
            }),
            &["username", "roles"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    fn confirmation_message(&self, args: &Value) -> String {
        let username = args.get("username").and_then(Value::as_str).unwrap_or("");
        let password = if args.get("password").is_some() {
            "provided"
        } else {
            "generated"
        };
        let roles = args
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .map(|role| {
                        format!(
                            "- `{}` on `{}`",
                            role.get("roleName").and_then(Value::as_str).unwrap_or(""),
                            role.get("databaseName").and_then(Value::as_str).unwrap_or("admin"),
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        let clusters = args
            .get("clusters")
            .and_then(Value::as_array)
            .filter(|clusters| !clusters.is_empty())
            .map_or_else(
                || "All clusters in the project".to_string(),
                |clusters| {
                    clusters
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            );

        format!(
            "You are about to create a database user in Atlas project `{}`:\n\n**Username**: `{username}`\n\n**Password**: {password}\n\n**Access Permissions**:\n{roles}\n\n**Cluster Access**: {clusters}\n\n{CONFIRM_PROMPT}",
            project_of(args)
        )
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DbUserArgs {
            project_id,
            username,
            password,
            roles,
            clusters,
        } = parse_args(args)?;
        let api = api(ctx)?;
        ensure_current_ip_in_access_list(api, &project_id).await;

        let generated = password.is_none();
        let password = password.unwrap_or_else(generate_password);
        let user = DatabaseUser {
            username: username.clone(),
            database_name: "admin".to_string(),
            roles: roles
                .into_iter()
                .map(|role| DatabaseUserRole {
                    role_name: role.role_name,
                    database_name: role.database_name,
                    collection_name: role.collection_name,
                })
                .collect(),
            scopes: clusters
                .into_iter()
                .map(|name| UserScope {
                    kind: "CLUSTER".to_string(),
                    name,
                })
                .collect(),
            password: Some(password.clone()),
            delete_after_date: None,
        };
        api.create_database_user(&project_id, &user).await?;

        let message = if generated {
            format!("User \"{username}\" created successfully with password: `{password}`.")
        } else {
            format!("User \"{username}\" created successfully.")
        };
        Ok(ToolResult::text(message))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FreeClusterArgs {
    project_id: String,
    cluster_name: String,
    #[serde(default = "default_region")]
    region: String,
}

fn default_region() -> String {
    "US_EAST_1".to_string()
}

/// `atlas-create-free-cluster`
#[derive(Debug, Clone, Copy)]
pub struct CreateFreeCluster;

#[async_trait]
impl Tool for CreateFreeCluster {
    fn name(&self) -> &'static str {
        "atlas-create-free-cluster"
    }

    fn description(&self) -> &'static str {
        "Create a free MongoDB Atlas cluster"
    }

    fn input_schema(&self) -> Value {
        cluster_schema(
            json!({
                "region": {
                    "type": "string",
                    "default": "US_EAST_1",
                    "pattern": CLUSTER_NAME_PATTERN,
                    "description": "Region of the cluster"
                }
            }),
            &[],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Create
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let FreeClusterArgs {
            project_id,
            cluster_name,
            region,
        } = parse_args(args)?;
        let api = api(ctx)?;

        let description = json!({
            "name": cluster_name,
            "clusterType": "REPLICASET",
            "replicationSpecs": [{
                "zoneName": "Zone 1",
                "regionConfigs": [{
                    "providerName": "TENANT",
                    "backingProviderName": "AWS",
                    "regionName": region,
                    "electableSpecs": { "instanceSize": "M0" }
                }]
            }],
            "terminationProtectionEnabled": false
        });

        ensure_current_ip_in_access_list(api, &project_id).await;
        api.create_cluster(&project_id, &description).await?;

        Ok(ToolResult::blocks(vec![
            ToolContent::text(format!(
                "Cluster \"{cluster_name}\" has been created in region \"{region}\"."
            )),
            ToolContent::text("Double check your access lists to enable your current IP."),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use crate::config::Config;
    use crate::tools::atlas::testing::{atlas_context, mock_atlas, PROJECT};

    #[tokio::test]
    async fn adds_addresses_blocks_and_current_ip() {
        let server = mock_atlas().await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/accessList")))
            .and(body_json(json!([
                { "ipAddress": "198.51.100.1", "comment": "office" },
                { "cidrBlock": "10.0.0.0/8", "comment": "office" },
                { "ipAddress": "203.0.113.7", "comment": "office" }
            ])))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "results": [] })))
            .expect(1)
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = CreateAccessList
            .execute(
                &ctx,
                json!({
                    "projectId": PROJECT,
                    "ipAddresses": ["198.51.100.1"],
                    "cidrBlocks": ["10.0.0.0/8"],
                    "currentIpAddress": true,
                    "comment": "office"
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            result.text_content(),
            format!("IP/CIDR ranges added to access list for project {PROJECT}.")
        );
    }

    #[tokio::test]
    async fn access_list_needs_at_least_one_entry() {
        let server = mock_atlas().await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let error = CreateAccessList
            .execute(&ctx, json!({ "projectId": PROJECT }))
            .await
            .unwrap_err();

        assert!(matches!(error, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn db_user_gets_a_generated_password() {
        let server = mock_atlas().await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/accessList")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/databaseUsers")))
            .and(body_partial_json(json!({
                "username": "reporter",
                "databaseName": "admin",
                "roles": [{ "roleName": "read", "databaseName": "shop" }],
                "scopes": [{ "type": "CLUSTER", "name": "Cluster0" }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "username": "reporter",
                "databaseName": "admin"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = CreateDbUser
            .execute(
                &ctx,
                json!({
                    "projectId": PROJECT,
                    "username": "reporter",
                    "roles": [{ "roleName": "read", "databaseName": "shop" }],
                    "clusters": ["Cluster0"]
                }),
            )
            .await
            .unwrap();

        assert!(result
            .text_content()
            .starts_with("User \"reporter\" created successfully with password: `"));
    }

    #[tokio::test]
    async fn free_cluster_uses_the_shared_tier() {
        let server = mock_atlas().await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/accessList")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/clusters")))
            .and(body_partial_json(json!({
                "name": "Sandbox",
                "replicationSpecs": [{
                    "regionConfigs": [{
                        "providerName": "TENANT",
                        "backingProviderName": "AWS",
                        "regionName": "US_EAST_1",
                        "electableSpecs": { "instanceSize": "M0" }
                    }]
                }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "name": "Sandbox" })))
            .expect(1)
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = CreateFreeCluster
            .execute(&ctx, json!({ "projectId": PROJECT, "clusterName": "Sandbox" }))
            .await
            .unwrap();

        assert_eq!(
            result.content[0].as_text(),
            "Cluster \"Sandbox\" has been created in region \"US_EAST_1\"."
        );
        assert_eq!(result.content.len(), 2);
    }

    #[test]
    fn confirmation_lists_every_entry() {
        let message = CreateAccessList.confirmation_message(&json!({
            "projectId": PROJECT,
            "ipAddresses": ["198.51.100.1"],
            "currentIpAddress": true
        }));

        assert!(message.contains("- IP address: `198.51.100.1`"));
        assert!(message.contains("- The current IP address"));
        assert!(message.ends_with(CONFIRM_PROMPT));

        let message = CreateDbUser.confirmation_message(&json!({
            "projectId": PROJECT,
            "username": "reporter",
            "roles": [{ "roleName": "read" }]
        }));
        assert!(message.contains("**Password**: generated"));
        assert!(message.contains("- `read` on `admin`"));
        assert!(message.contains("All clusters in the project"));
    }
}
