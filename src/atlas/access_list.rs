//! Pre-flight access list helper.

use tracing::{debug, warn};

use super::models::AccessListEntry;
use super::ApiClient;

/// Comment attached to entries added automatically.
pub const AUTO_ACCESS_LIST_COMMENT: &str = "Added by MCP pre-run access list helper";

/// Builds an access list entry for the caller's public IP.
///
/// # Errors
///
/// Returns an error if Atlas cannot report the caller's IP.
pub async fn current_ip_entry(
    client: &ApiClient,
    comment: &str,
) -> Result<AccessListEntry, super::ApiError> {
    let ip = client.current_ip().await?;
    Ok(AccessListEntry {
        ip_address: Some(ip),
        cidr_block: None,
        comment: Some(comment.to_string()),
    })
}

/// Makes sure the caller's public IP may reach the clusters of `project_id`.
///
/// Best effort: an entry that already exists is fine, and any other failure
/// is logged and otherwise ignored so the calling tool can proceed.
pub async fn ensure_current_ip_in_access_list(client: &ApiClient, project_id: &str) {
    let entry = match current_ip_entry(client, AUTO_ACCESS_LIST_COMMENT).await {
        Ok(entry) => entry,
        Err(error) => {
            warn!(error = %error, "Could not determine current IP for the access list");
            return;
        }
    };

    match client.create_access_list(project_id, &[entry]).await {
        Ok(_) => debug!(project_id, "Current IP added to the access list"),
        Err(error) if error.status() == Some(409) => {
            debug!(project_id, "Current IP already in the access list");
        }
        Err(error) => warn!(error = %error, project_id, "Failed to add current IP to the access list"),
    }
}
