//! Integration tests for MCP protocol handling.
//!
//! These tests verify the MCP server's JSON-RPC 2.0 protocol implementation,
//! including request/response handling, error responses, and replies to
//! server-originated requests.

use mongodb_mcp_server::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, RequestId, SUPPORTED_PROTOCOL_VERSIONS,
};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": { "elicitation": {} },
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_call_with_string_id() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-7",
        "method": "tools/call",
        "params": { "name": "list-databases", "arguments": {} }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "tools/call");
        assert_eq!(req.id, RequestId::String("call-7".to_string()));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_cancellation() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/cancelled",
        "params": { "requestId": 4, "reason": "user aborted" }
    }"#;

    let message = parse_message(json).unwrap();
    assert_eq!(message.method(), "notifications/cancelled");
    assert_eq!(message.params().unwrap()["requestId"], 4);
    assert!(message.id().is_none());
}

#[test]
fn test_parse_elicitation_reply() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 3,
        "result": { "action": "accept", "content": { "confirmation": "Yes" } }
    }"#;

    if let IncomingMessage::Response(reply) = parse_message(json).unwrap() {
        assert_eq!(reply.id, RequestId::Number(3));
        assert_eq!(reply.result.unwrap()["action"], "accept");
        assert!(reply.error.is_none());
    } else {
        panic!("Expected Response");
    }
}

#[test]
fn test_parse_invalid_json() {
    let json = "not valid json";

    let result = parse_message(json);
    assert!(result.is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let result = parse_message(json);
    assert!(result.is_err());
}

#[test]
fn test_error_codes() {
    let parse = serde_json::to_value(JsonRpcError::parse_error()).unwrap();
    assert_eq!(parse["error"]["code"], -32700);
    assert!(parse["id"].is_null());

    let missing =
        serde_json::to_value(JsonRpcError::method_not_found(RequestId::Number(9), "foo/bar"))
            .unwrap();
    assert_eq!(missing["error"]["code"], -32601);
    assert_eq!(missing["id"], 9);
}

#[test]
fn test_supported_versions_start_with_latest() {
    assert_eq!(SUPPORTED_PROTOCOL_VERSIONS[0], "2025-06-18");
    assert!(SUPPORTED_PROTOCOL_VERSIONS.contains(&"2024-11-05"));
}
