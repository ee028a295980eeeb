//! `config://debug`: connection status for troubleshooting.

use serde::Serialize;

use super::ResourceReducer;
use crate::session::{SessionEvent, SessionEventKind};

/// Connection status as seen through session events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    /// `connected`, `disconnected` or `errored`.
    pub connection_status: &'static str,
    /// Why the last connection attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// Reducer behind `config://debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugResource;

impl ResourceReducer for DebugResource {
    type Value = DebugInfo;

    fn name(&self) -> &'static str {
        "debug"
    }

    fn uri(&self) -> &'static str {
        "config://debug"
    }

    fn description(&self) -> &'static str {
        "Debugging information for connectivity issues."
    }

    fn initial(&self) -> DebugInfo {
        DebugInfo {
            connection_status: "disconnected",
            error_reason: None,
        }
    }

    fn events(&self) -> &'static [SessionEventKind] {
        &[
            SessionEventKind::Connected,
            SessionEventKind::Disconnect,
            SessionEventKind::Close,
            SessionEventKind::ConnectionError,
        ]
    }

    fn reduce(&self, _previous: &DebugInfo, event: &SessionEvent) -> DebugInfo {
        match event {
            SessionEvent::Connected => DebugInfo {
                connection_status: "connected",
                error_reason: None,
            },
            SessionEvent::Disconnect | SessionEvent::Close => self.initial(),
            SessionEvent::ConnectionError(reason) => DebugInfo {
                connection_status: "errored",
                error_reason: Some(reason.clone()),
            },
        }
    }

    fn to_output(&self, value: &DebugInfo) -> String {
        serde_json::to_string(value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_sequence_yields_a_known_status() {
        let events = [
            SessionEvent::Connected,
            SessionEvent::ConnectionError("timeout".into()),
            SessionEvent::Disconnect,
            SessionEvent::Close,
            SessionEvent::Connected,
            SessionEvent::Close,
        ];
        let mut value = DebugResource.initial();
        for event in &events {
            value = DebugResource.reduce(&value, event);
            assert!(["connected", "disconnected", "errored"].contains(&value.connection_status));
        }
        assert_eq!(value, DebugResource.initial());
    }

    #[test]
    fn output_omits_missing_reason() {
        assert_eq!(
            DebugResource.to_output(&DebugResource.initial()),
            r#"{"connectionStatus":"disconnected"}"#
        );
        let errored = DebugResource.reduce(
            &DebugResource.initial(),
            &SessionEvent::ConnectionError("refused".into()),
        );
        assert_eq!(
            DebugResource.to_output(&errored),
            r#"{"connectionStatus":"errored","errorReason":"refused"}"#
        );
    }
}
