//! Read-only Atlas tools.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{api, cluster_schema, project_schema, ClusterArgs, ProjectArgs};
use crate::atlas::models::{ClusterDescription, DatabaseUser};
use crate::atlas::{ApiClient, ApiError};
use crate::error::ToolError;
use crate::tools::{parse_args, OperationKind, Tool, ToolCategory, ToolContext, ToolResult};

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map_or_else(
        || "N/A".to_string(),
        |date| date.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

fn cluster_rows(clusters: &[ClusterDescription]) -> String {
    let rows = clusters
        .iter()
        .map(|cluster| {
            format!(
                "{} | {} | {} | {} | {} | {}",
                cluster.name.as_deref().unwrap_or("N/A"),
                cluster.instance_type(),
                cluster.instance_size().unwrap_or("N/A"),
                cluster.state_name.as_deref().unwrap_or("UNKNOWN"),
                cluster.mongodb_version.as_deref().unwrap_or("N/A"),
                cluster.connection_string().unwrap_or("N/A"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Cluster Name | Cluster Type | Tier | State | MongoDB Version | Connection String\n\
         ----------------|----------------|----------------|----------------|----------------|----------------\n\
         {rows}"
    )
}

/// `atlas-list-projects`
#[derive(Debug, Clone, Copy)]
pub struct ListProjects;

#[async_trait]
impl Tool for ListProjects {
    fn name(&self) -> &'static str {
        "atlas-list-projects"
    }

    fn description(&self) -> &'static str {
        "List MongoDB Atlas projects"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<ToolResult, ToolError> {
        let projects = api(ctx)?.list_projects().await?;
        if projects.results.is_empty() {
            return Ok(ToolResult::text(
                "No projects found in your MongoDB Atlas account.",
            ));
        }

        let rows = projects
            .results
            .iter()
            .map(|p| format!("{} | {} | {}", p.name, p.id, format_date(p.created)))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::untrusted(
            format!("Found {} projects", projects.results.len()),
            Some(format!(
                "Project Name | Project ID | Created At\n\
                 ----------------| ----------------| ----------------\n\
                 {rows}"
            )),
        ))
    }
}

/// `atlas-list-clusters`
#[derive(Debug, Clone, Copy)]
pub struct ListClusters;

#[async_trait]
impl Tool for ListClusters {
    fn name(&self) -> &'static str {
        "atlas-list-clusters"
    }

    fn description(&self) -> &'static str {
        "List MongoDB Atlas clusters of a project"
    }

    fn input_schema(&self) -> Value {
        project_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ProjectArgs { project_id } = parse_args(args)?;
        let clusters = api(ctx)?.list_clusters(&project_id).await?;
        if clusters.results.is_empty() {
            return Ok(ToolResult::text(format!(
                "No clusters found in project {project_id}."
            )));
        }

        Ok(ToolResult::untrusted(
            format!(
                "Found {} clusters in project {project_id}",
                clusters.results.len()
            ),
            Some(cluster_rows(&clusters.results)),
        ))
    }
}

/// `atlas-inspect-cluster`
#[derive(Debug, Clone, Copy)]
pub struct InspectCluster;

#[async_trait]
impl Tool for InspectCluster {
    fn name(&self) -> &'static str {
        "atlas-inspect-cluster"
    }

    fn description(&self) -> &'static str {
        "Inspect MongoDB Atlas cluster"
    }

    fn input_schema(&self) -> Value {
        cluster_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ClusterArgs {
            project_id,
            cluster_name,
        } = parse_args(args)?;
        let cluster = api(ctx)?.get_cluster(&project_id, &cluster_name).await?;

        Ok(ToolResult::untrusted(
            format!("Cluster details for {cluster_name}"),
            Some(cluster_rows(std::slice::from_ref(&cluster))),
        ))
    }
}

/// `atlas-inspect-access-list`
#[derive(Debug, Clone, Copy)]
pub struct InspectAccessList;

#[async_trait]
impl Tool for InspectAccessList {
    fn name(&self) -> &'static str {
        "atlas-inspect-access-list"
    }

    fn description(&self) -> &'static str {
        "Inspect Ip/CIDR ranges with access to your MongoDB Atlas clusters."
    }

    fn input_schema(&self) -> Value {
        project_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ProjectArgs { project_id } = parse_args(args)?;
        let entries = api(ctx)?.list_access_list(&project_id).await?;
        if entries.results.is_empty() {
            return Ok(ToolResult::text("No access list entries found."));
        }

        let rows = entries
            .results
            .iter()
            .map(|entry| {
                format!(
                    "{} | {} | {}",
                    entry.ip_address.as_deref().unwrap_or(""),
                    entry.cidr_block.as_deref().unwrap_or(""),
                    entry.comment.as_deref().unwrap_or(""),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::untrusted(
            format!("Found {} access list entries", entries.results.len()),
            Some(format!("IP ADDRESS | CIDR | COMMENT\n------|------|------\n{rows}")),
        ))
    }
}

fn describe_roles(user: &DatabaseUser) -> String {
    if user.roles.is_empty() {
        return "N/A".to_string();
    }
    user.roles
        .iter()
        .map(|role| match &role.collection_name {
            Some(collection) => format!("{}@{}:{collection}", role.role_name, role.database_name),
            None => format!("{}@{}", role.role_name, role.database_name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_scopes(user: &DatabaseUser) -> String {
    if user.scopes.is_empty() {
        return "All clusters".to_string();
    }
    user.scopes
        .iter()
        .map(|scope| format!("{}:{}", scope.kind, scope.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `atlas-list-db-users`
#[derive(Debug, Clone, Copy)]
pub struct ListDbUsers;

#[async_trait]
impl Tool for ListDbUsers {
    fn name(&self) -> &'static str {
        "atlas-list-db-users"
    }

    fn description(&self) -> &'static str {
        "List MongoDB Atlas database users"
    }

    fn input_schema(&self) -> Value {
        project_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ProjectArgs { project_id } = parse_args(args)?;
        let users = api(ctx)?.list_database_users(&project_id).await?;
        if users.results.is_empty() {
            return Ok(ToolResult::text(format!(
                "No database users found in project {project_id}."
            )));
        }

        let rows = users
            .results
            .iter()
            .map(|user| {
                format!(
                    "{} | {} | {}",
                    user.username,
                    describe_roles(user),
                    describe_scopes(user)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::untrusted(
            format!("Found {} database users in project {project_id}", users.results.len()),
            Some(format!(
                "Username | Roles | Scopes\n----------------|----------------|----------------\n{rows}"
            )),
        ))
    }
}

/// `atlas-list-alerts`
#[derive(Debug, Clone, Copy)]
pub struct ListAlerts;

#[async_trait]
impl Tool for ListAlerts {
    fn name(&self) -> &'static str {
        "atlas-list-alerts"
    }

    fn description(&self) -> &'static str {
        "List MongoDB Atlas alerts"
    }

    fn input_schema(&self) -> Value {
        project_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ProjectArgs { project_id } = parse_args(args)?;
        let alerts = api(ctx)?.list_alerts(&project_id).await?;
        if alerts.results.is_empty() {
            return Ok(ToolResult::text(
                "No alerts found in your MongoDB Atlas project.",
            ));
        }

        let iso = |date: Option<DateTime<Utc>>| {
            date.map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        };
        let rendered: Vec<Value> = alerts
            .results
            .iter()
            .map(|alert| {
                json!({
                    "id": alert.id,
                    "status": alert.status,
                    "created": iso(alert.created),
                    "updated": iso(alert.updated),
                    "eventTypeName": alert.event_type_name,
                    "acknowledgementComment": alert.acknowledgement_comment.as_deref().unwrap_or("N/A"),
                })
            })
            .collect();

        Ok(ToolResult::untrusted(
            format!("Found {} alerts in project {project_id}", alerts.results.len()),
            Some(Value::Array(rendered).to_string()),
        ))
    }
}

/// One report of the performance advisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum AdvisorReport {
    SuggestedIndexes,
    DropIndexSuggestions,
    SlowQueryLogs,
    SchemaSuggestions,
}

impl AdvisorReport {
    const ALL: [Self; 4] = [
        Self::SuggestedIndexes,
        Self::DropIndexSuggestions,
        Self::SlowQueryLogs,
        Self::SchemaSuggestions,
    ];

    const fn title(self) -> &'static str {
        match self {
            Self::SuggestedIndexes => "Suggested Indexes",
            Self::DropIndexSuggestions => "Drop Index Suggestions",
            Self::SlowQueryLogs => "Slow Query Logs",
            Self::SchemaSuggestions => "Schema Suggestions",
        }
    }

    const fn empty_message(self) -> &'static str {
        match self {
            Self::SuggestedIndexes => "No suggested indexes found.",
            Self::DropIndexSuggestions => "No drop index suggestions found.",
            Self::SlowQueryLogs => "No slow query logs found.",
            Self::SchemaSuggestions => "No schema suggestions found.",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvisorArgs {
    project_id: String,
    cluster_name: String,
    #[serde(default = "all_reports")]
    operations: Vec<AdvisorReport>,
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    namespaces: Vec<String>,
}

fn all_reports() -> Vec<AdvisorReport> {
    AdvisorReport::ALL.to_vec()
}

impl AdvisorArgs {
    /// Fetches one report; `None` when the advisor has nothing to say.
    async fn fetch(&self, api: &ApiClient, report: AdvisorReport) -> Result<Option<Value>, ApiError> {
        let (project, cluster) = (self.project_id.as_str(), self.cluster_name.as_str());
        let items = match report {
            AdvisorReport::SuggestedIndexes => {
                let found = api.suggested_indexes(project, cluster).await?;
                (!found.suggested_indexes.is_empty()).then(|| json!(found.suggested_indexes))
            }
            AdvisorReport::DropIndexSuggestions => {
                let found = api.drop_index_suggestions(project, cluster).await?;
                (!found.is_empty()).then(|| {
                    json!({
                        "hiddenIndexes": found.hidden_indexes,
                        "redundantIndexes": found.redundant_indexes,
                        "unusedIndexes": found.unused_indexes,
                    })
                })
            }
            AdvisorReport::SlowQueryLogs => {
                let description = api.get_cluster(project, cluster).await?;
                let process_id = description.process_id().ok_or_else(|| {
                    ApiError::Unexpected(format!(
                        "Cluster {cluster} has no standard connection string to find its processes"
                    ))
                })?;
                let found = api
                    .slow_queries(project, process_id, self.since, &self.namespaces)
                    .await?;
                (!found.slow_queries.is_empty()).then(|| json!(found.slow_queries))
            }
            AdvisorReport::SchemaSuggestions => {
                let found = api.schema_advice(project, cluster).await?;
                (!found.recommendations.is_empty()).then(|| json!(found.recommendations))
            }
        };
        Ok(items)
    }
}

/// `atlas-get-performance-advisor`
#[derive(Debug, Clone, Copy)]
pub struct GetPerformanceAdvisor;

#[async_trait]
impl Tool for GetPerformanceAdvisor {
    fn name(&self) -> &'static str {
        "atlas-get-performance-advisor"
    }

    fn description(&self) -> &'static str {
        "Get MongoDB Atlas performance advisor recommendations, which includes the operations: suggested indexes, drop index suggestions, schema suggestions, and a sample of the most recent (max 50) slow query logs"
    }

    fn input_schema(&self) -> Value {
        cluster_schema(
            json!({
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "enum": ["suggestedIndexes", "dropIndexSuggestions", "slowQueryLogs", "schemaSuggestions"]
                    },
                    "default": ["suggestedIndexes", "dropIndexSuggestions", "slowQueryLogs", "schemaSuggestions"],
                    "description": "Operations to get performance advisor recommendations"
                },
                "since": {
                    "type": "string",
                    "format": "date-time",
                    "description": "Date to get slow query logs since. Only relevant for the slowQueryLogs operation."
                },
                "namespaces": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Namespaces to get slow query logs. Only relevant for the slowQueryLogs operation."
                }
            }),
            &[],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: AdvisorArgs = parse_args(args)?;
        let api = api(ctx)?;

        let mut sections = Vec::with_capacity(args.operations.len());
        for &report in &args.operations {
            let section = match args.fetch(api, report).await? {
                Some(items) => format!("## {}\n{items}", report.title()),
                None => report.empty_message().to_string(),
            };
            sections.push(section);
        }

        Ok(ToolResult::untrusted(
            "Performance advisor data",
            Some(sections.join("\n\n")),
        ))
    }

    fn handle_error(&self, error: ToolError, _args: &Value) -> ToolResult {
        ToolResult::error(format!(
            "Error retrieving performance advisor data: {error}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use crate::config::Config;
    use crate::tools::atlas::testing::{atlas_context, mock_atlas, PROJECT};

    #[tokio::test]
    async fn lists_projects_as_a_table() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path("/api/atlas/v2/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": PROJECT, "name": "Shop", "created": "2024-01-02T03:04:05Z" }
                ],
                "totalCount": 1
            })))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = ListProjects.execute(&ctx, json!({})).await.unwrap();

        assert_eq!(result.content[0].as_text(), "Found 1 projects");
        let table = result.content[1].as_text();
        assert!(table.contains("Project Name | Project ID | Created At"));
        assert!(table.contains(&format!("Shop | {PROJECT} | 2024-01-02 03:04:05 UTC")));
    }

    #[tokio::test]
    async fn no_projects_is_not_an_error() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path("/api/atlas/v2/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = ListProjects.execute(&ctx, json!({})).await.unwrap();

        assert!(!result.is_error);
        assert_eq!(
            result.text_content(),
            "No projects found in your MongoDB Atlas account."
        );
    }

    #[tokio::test]
    async fn inspects_a_free_cluster() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/clusters/Cluster0")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Cluster0",
                "stateName": "IDLE",
                "mongoDBVersion": "8.0.4",
                "connectionStrings": { "standardSrv": "mongodb+srv://cluster0.abc.mongodb.net" },
                "replicationSpecs": [{
                    "regionConfigs": [{ "providerName": "TENANT", "electableSpecs": { "instanceSize": "M0" } }]
                }]
            })))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = InspectCluster
            .execute(&ctx, json!({ "projectId": PROJECT, "clusterName": "Cluster0" }))
            .await
            .unwrap();

        assert!(result.content[1].as_text().contains(
            "Cluster0 | FREE | M0 | IDLE | 8.0.4 | mongodb+srv://cluster0.abc.mongodb.net"
        ));
    }

    #[tokio::test]
    async fn missing_cluster_surfaces_the_api_status() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/clusters/ghost")))
            .respond_with(ResponseTemplate::new(404).set_body_string("CLUSTER_NOT_FOUND"))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let error = InspectCluster
            .execute(&ctx, json!({ "projectId": PROJECT, "clusterName": "ghost" }))
            .await
            .unwrap_err();

        assert!(matches!(&error, ToolError::Atlas(api) if api.status() == Some(404)));
    }

    #[tokio::test]
    async fn access_list_and_users_render_rows() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/accessList")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "ipAddress": "203.0.113.7", "cidrBlock": "203.0.113.7/32", "comment": "home" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/databaseUsers")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "username": "app",
                    "databaseName": "admin",
                    "roles": [
                        { "roleName": "readWrite", "databaseName": "shop" },
                        { "roleName": "read", "databaseName": "shop", "collectionName": "orders" }
                    ],
                    "scopes": [{ "type": "CLUSTER", "name": "Cluster0" }]
                }]
            })))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());
        let args = json!({ "projectId": PROJECT });

        let access = InspectAccessList.execute(&ctx, args.clone()).await.unwrap();
        let users = ListDbUsers.execute(&ctx, args).await.unwrap();

        assert!(access.content[1]
            .as_text()
            .contains("203.0.113.7 | 203.0.113.7/32 | home"));
        assert!(users.content[1]
            .as_text()
            .contains("app | readWrite@shop, read@shop:orders | CLUSTER:Cluster0"));
    }

    #[tokio::test]
    async fn alerts_are_returned_as_json() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/alerts")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "a1",
                    "status": "OPEN",
                    "created": "2024-05-01T10:00:00Z",
                    "eventTypeName": "OUTSIDE_METRIC_THRESHOLD"
                }]
            })))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = ListAlerts
            .execute(&ctx, json!({ "projectId": PROJECT }))
            .await
            .unwrap();

        assert_eq!(
            result.content[0].as_text(),
            format!("Found 1 alerts in project {PROJECT}")
        );
        let data = result.content[1].as_text();
        assert!(data.contains("\"created\":\"2024-05-01T10:00:00.000Z\""));
        assert!(data.contains("\"acknowledgementComment\":\"N/A\""));
        assert!(data.contains("\"updated\":null"));
    }

    fn advisor_report(report: &str, body: Value) -> Mock {
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/atlas/v2/groups/{PROJECT}/clusters/Cluster0/performanceAdvisor/{report}"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    }

    #[tokio::test]
    async fn performance_advisor_reports_each_section() {
        let server = mock_atlas().await;
        advisor_report(
            "suggestedIndexes",
            json!({ "content": { "suggestedIndexes": [{ "namespace": "shop.orders", "index": [{ "status": 1 }] }] } }),
        )
        .mount(&server)
        .await;
        advisor_report("dropIndexSuggestions", json!({ "content": {} }))
            .mount(&server)
            .await;
        advisor_report("schemaAdvice", json!({ "content": { "recommendations": [] } }))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/atlas/v2/groups/{PROJECT}/clusters/Cluster0")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Cluster0",
                "connectionStrings": { "standard": "mongodb://c0-00.abc.mongodb.net:27017,c0-01.abc.mongodb.net:27017/?ssl=true" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/atlas/v2/groups/{PROJECT}/processes/c0-00.abc.mongodb.net:27017/performanceAdvisor/slowQueryLogs"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "slowQueries": [{ "namespace": "shop.orders", "line": "slow" }]
            })))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = GetPerformanceAdvisor
            .execute(&ctx, json!({ "projectId": PROJECT, "clusterName": "Cluster0" }))
            .await
            .unwrap();

        let data = result.text_content();
        assert!(data.contains("Performance advisor data"));
        assert!(data.contains("## Suggested Indexes\n[{"));
        assert!(data.contains("No drop index suggestions found."));
        assert!(data.contains("## Slow Query Logs"));
        assert!(data.contains("\"line\":\"slow\""));
        assert!(data.contains("No schema suggestions found."));
    }

    #[tokio::test]
    async fn performance_advisor_fetches_only_the_requested_reports() {
        let server = mock_atlas().await;
        advisor_report("schemaAdvice", json!({ "content": {
            "recommendations": [{ "recommendation": "REDUCE_LOOKUP_OPS" }]
        } }))
        .expect(1)
        .mount(&server)
        .await;
        advisor_report("suggestedIndexes", json!({ "content": {} }))
            .expect(0)
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());

        let result = GetPerformanceAdvisor
            .execute(
                &ctx,
                json!({ "projectId": PROJECT, "clusterName": "Cluster0", "operations": ["schemaSuggestions"] }),
            )
            .await
            .unwrap();

        let data = result.text_content();
        assert!(data.contains("## Schema Suggestions"));
        assert!(data.contains("REDUCE_LOOKUP_OPS"));
        assert!(!data.contains("Suggested Indexes"));
    }

    #[tokio::test]
    async fn performance_advisor_failure_names_the_advisor() {
        let server = mock_atlas().await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/atlas/v2/groups/{PROJECT}/clusters/Cluster0/performanceAdvisor/suggestedIndexes"
            )))
            .respond_with(ResponseTemplate::new(403).set_body_string("INSUFFICIENT_TIER"))
            .mount(&server)
            .await;
        let (_, ctx) = atlas_context(&server, Config::default());
        let args = json!({ "projectId": PROJECT, "clusterName": "Cluster0", "operations": ["suggestedIndexes"] });

        let error = GetPerformanceAdvisor
            .execute(&ctx, args.clone())
            .await
            .unwrap_err();
        let result = GetPerformanceAdvisor.handle_error(error, &args);

        assert!(result.is_error);
        assert!(result
            .text_content()
            .starts_with("Error retrieving performance advisor data:"));
        assert!(result.text_content().contains("INSUFFICIENT_TIER"));
    }
}
