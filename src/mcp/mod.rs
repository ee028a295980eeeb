//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the MongoDB and Atlas tools and the `config://`
//! resources to AI assistants. The server communicates over stdio transport
//! using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│   Tools /   │    │
//! │   │   (stdio)   │    │  (lifecycle)│    │  Resources  │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          ▲                  │                  │            │
//! │          │                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │   Outbound queue (responses, notifications,     │      │
//! │   │   elicitation requests)                         │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2025-06-18 and accepts
//! clients speaking 2025-03-26 or 2024-11-05.

pub mod elicitation;
pub mod outbound;
pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{LineReader, LineWriter};
