//! Collection scan detection for `index_check` mode.

use bson::{doc, Bson, Document};
use tracing::warn;

use crate::error::ToolError;
use crate::mongo::ServiceProvider;

const INDEX_STAGES: [&str; 2] = ["IXSCAN", "COUNT_SCAN"];

/// Returns `true` if the winning plan of an explain reply uses an index.
///
/// Walks `inputStage` links from the root of the winning plan. Plans that
/// cannot be read count as collection scans.
#[must_use]
pub fn uses_index(explain: &Document) -> bool {
    let Ok(mut stage) = explain
        .get_document("queryPlanner")
        .and_then(|planner| planner.get_document("winningPlan"))
    else {
        return false;
    };

    loop {
        if stage
            .get_str("stage")
            .is_ok_and(|name| INDEX_STAGES.contains(&name))
        {
            return true;
        }
        match stage.get_document("inputStage") {
            Ok(input) => stage = input,
            Err(_) => return false,
        }
    }
}

/// Explains `command` and fails if the plan scans the whole collection.
///
/// A failing explain is logged and does not block the operation.
///
/// # Errors
///
/// Returns [`ToolError::ForbiddenCollscan`] if no index is used.
pub async fn ensure_index_used(
    provider: &dyn ServiceProvider,
    database: &str,
    collection: &str,
    operation: &str,
    command: Document,
) -> Result<(), ToolError> {
    let explain = doc! {
        "explain": Bson::Document(command),
        "verbosity": "queryPlanner",
    };

    match provider.run_command_with_check(database, explain).await {
        Ok(reply) if uses_index(&reply) => Ok(()),
        Ok(_) => Err(ToolError::ForbiddenCollscan {
            operation: operation.to_string(),
            namespace: format!("{database}.{collection}"),
        }),
        Err(error) => {
            warn!(
                operation,
                database,
                collection,
                error = %error,
                "Index check failed to run explain"
            );
            Ok(())
        }
    }
}
