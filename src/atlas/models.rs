//! Atlas Admin API v2 payloads.
//!
//! Only the fields the tools read or write are modelled; everything else in
//! the API responses is ignored on deserialisation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A page of results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// Total number of items across all pages.
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// An Atlas project (API name: group).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project ID.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Owning organisation.
    #[serde(default)]
    pub org_id: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// Connection strings published for a cluster.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStrings {
    /// `mongodb://` connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    /// `mongodb+srv://` connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_srv: Option<String>,
}

impl ConnectionStrings {
    /// Returns the preferred public connection string.
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.standard_srv
            .as_deref()
            .or(self.standard.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Hardware of one region of a replication spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    /// Instance size, e.g. `M10`.
    #[serde(default)]
    pub instance_size: Option<String>,
}

/// Region configuration of a replication spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionConfig {
    /// Cloud provider, `TENANT` for shared tiers.
    #[serde(default)]
    pub provider_name: Option<String>,
    /// Electable node hardware.
    #[serde(default)]
    pub electable_specs: Option<HardwareSpec>,
    /// Read-only node hardware.
    #[serde(default)]
    pub read_only_specs: Option<HardwareSpec>,
    /// Analytics node hardware.
    #[serde(default)]
    pub analytics_specs: Option<HardwareSpec>,
}

/// Replication spec of a cluster.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSpec {
    /// Regions of this spec.
    #[serde(default)]
    pub region_configs: Vec<RegionConfig>,
}

/// A cluster as described by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescription {
    /// Cluster name.
    #[serde(default)]
    pub name: Option<String>,
    /// Lifecycle state, e.g. `IDLE` or `CREATING`.
    #[serde(default)]
    pub state_name: Option<String>,
    /// MongoDB server version.
    #[serde(default, rename = "mongoDBVersion")]
    pub mongodb_version: Option<String>,
    /// Published connection strings.
    #[serde(default)]
    pub connection_strings: Option<ConnectionStrings>,
    /// Topology.
    #[serde(default)]
    pub replication_specs: Vec<ReplicationSpec>,
}

impl ClusterDescription {
    /// Returns the instance size of the first region, if known.
    #[must_use]
    pub fn instance_size(&self) -> Option<&str> {
        self.replication_specs
            .iter()
            .flat_map(|spec| &spec.region_configs)
            .find_map(|region| {
                [
                    &region.electable_specs,
                    &region.read_only_specs,
                    &region.analytics_specs,
                ]
                .into_iter()
                .flatten()
                .find_map(|specs| specs.instance_size.as_deref())
            })
    }

    /// Returns `FREE` for M0 clusters and `DEDICATED` otherwise.
    #[must_use]
    pub fn instance_type(&self) -> &'static str {
        if self.instance_size() == Some("M0") {
            "FREE"
        } else {
            "DEDICATED"
        }
    }

    /// Returns the preferred public connection string.
    #[must_use]
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_strings
            .as_ref()
            .and_then(ConnectionStrings::preferred)
    }

    /// Returns the `host:port` of the first host of the standard connection
    /// string, which Atlas uses to address a cluster's primary process.
    #[must_use]
    pub fn process_id(&self) -> Option<&str> {
        let standard = self.connection_strings.as_ref()?.standard.as_deref()?;
        let hosts = standard.strip_prefix("mongodb://")?;
        let hosts = hosts.rsplit_once('@').map_or(hosts, |(_, hosts)| hosts);
        let hosts = hosts.split(['/', '?']).next()?;
        hosts.split(',').next().filter(|host| !host.is_empty())
    }
}

/// An IP access list entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    /// Single IPv4 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// CIDR range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A role granted to a database user.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserRole {
    /// Role name, e.g. `readWrite`.
    pub role_name: String,
    /// Database the role applies to.
    pub database_name: String,
    /// Collection the role is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

/// Resource a database user is restricted to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserScope {
    /// `CLUSTER` or `DATA_LAKE`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Cluster or data lake name.
    pub name: String,
}

/// A database user.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUser {
    /// User name.
    pub username: String,
    /// Authentication database, `admin` for password users.
    pub database_name: String,
    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<DatabaseUserRole>,
    /// Clusters the user may access. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<UserScope>,
    /// Password; only sent on creation, never returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// When Atlas deletes the user automatically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_date: Option<DateTime<Utc>>,
}

/// An alert raised in a project.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Alert ID.
    pub id: String,
    /// `OPEN`, `TRACKING` or `CLOSED`.
    #[serde(default)]
    pub status: Option<String>,
    /// When the alert was raised.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Last update.
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// Triggering event type.
    #[serde(default)]
    pub event_type_name: Option<String>,
    /// Comment left when acknowledging.
    #[serde(default)]
    pub acknowledgement_comment: Option<String>,
}

/// Response of the IP info endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpInfo {
    /// Public IPv4 address of the caller.
    pub current_ipv4_address: String,
}

/// Envelope of the performance advisor endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorResponse<T> {
    /// Payload.
    pub content: T,
}

/// Indexes the performance advisor suggests creating.
///
/// Entries are passed through to clients as they are, so they stay untyped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedIndexes {
    #[serde(default)]
    pub suggested_indexes: Vec<serde_json::Value>,
}

/// Indexes the performance advisor suggests dropping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropIndexSuggestions {
    #[serde(default)]
    pub hidden_indexes: Vec<serde_json::Value>,
    #[serde(default)]
    pub redundant_indexes: Vec<serde_json::Value>,
    #[serde(default)]
    pub unused_indexes: Vec<serde_json::Value>,
}

impl DropIndexSuggestions {
    /// Returns `true` when there is nothing to drop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hidden_indexes.is_empty()
            && self.redundant_indexes.is_empty()
            && self.unused_indexes.is_empty()
    }
}

/// Schema design recommendations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAdvice {
    #[serde(default)]
    pub recommendations: Vec<serde_json::Value>,
}

/// Slow query log lines of one process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowQueries {
    #[serde(default)]
    pub slow_queries: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn cluster_instance_type_from_region_specs() {
        let cluster: ClusterDescription = serde_json::from_value(json!({
            "name": "free",
            "stateName": "IDLE",
            "mongoDBVersion": "8.0.4",
            "connectionStrings": {
                "standard": "mongodb://free-shard-00-00.abc.mongodb.net:27017",
                "standardSrv": "mongodb+srv://free.abc.mongodb.net"
            },
            "replicationSpecs": [{
                "regionConfigs": [{
                    "providerName": "TENANT",
                    "electableSpecs": { "instanceSize": "M0" }
                }]
            }]
        }))
        .unwrap();

        assert_eq!(cluster.instance_type(), "FREE");
        assert_eq!(
            cluster.connection_string(),
            Some("mongodb+srv://free.abc.mongodb.net")
        );
    }

    #[test]
    fn unknown_instance_size_is_dedicated() {
        let cluster: ClusterDescription = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert_eq!(cluster.instance_size(), None);
        assert_eq!(cluster.instance_type(), "DEDICATED");
        assert_eq!(cluster.connection_string(), None);
    }

    #[test]
    fn process_id_is_the_first_standard_host() {
        let cluster: ClusterDescription = serde_json::from_value(json!({
            "connectionStrings": {
                "standard": "mongodb://user:pw@a.abc.mongodb.net:27017,b.abc.mongodb.net:27017/?ssl=true"
            }
        }))
        .unwrap();
        assert_eq!(cluster.process_id(), Some("a.abc.mongodb.net:27017"));

        let srv_only: ClusterDescription = serde_json::from_value(json!({
            "connectionStrings": { "standardSrv": "mongodb+srv://free.abc.mongodb.net" }
        }))
        .unwrap();
        assert_eq!(srv_only.process_id(), None);
    }

    #[test]
    fn database_user_serialises_for_creation() {
        let user = DatabaseUser {
            username: "app".into(),
            database_name: "admin".into(),
            roles: vec![DatabaseUserRole {
                role_name: "readWrite".into(),
                database_name: "shop".into(),
                collection_name: None,
            }],
            scopes: Vec::new(),
            password: Some("secret".into()),
            delete_after_date: None,
        };

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["databaseName"], "admin");
        assert_eq!(value["roles"][0]["roleName"], "readWrite");
        assert!(value.get("scopes").is_none());
        assert!(value.get("deleteAfterDate").is_none());
    }
}
