//! mongodb-mcp-server: MCP server exposing MongoDB and MongoDB Atlas to AI assistants
//!
//! This library implements the tools, resources and connection handling that
//! let an AI assistant query and administer MongoDB deployments over the
//! Model Context Protocol.
//!
//! # Architecture
//!
//! - **Connection**: One [`connection::ConnectionManager`] per session owns
//!   the MongoDB connection state and announces every transition
//! - **Tools**: Trait objects run through a single pipeline (validation,
//!   enablement, confirmation, cancellation, error mapping)
//! - **Resources**: Views derived from session events by pure reducers
//!
//! Backends sit behind traits so the pipeline can be exercised without a
//! live deployment: MongoDB through [`mongo::ServiceProvider`], Atlas through
//! [`atlas::ApiClient`], local deployments through
//! [`atlas_local::AtlasLocalClient`].
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`events`]: Typed publish/subscribe
//! - [`timeout`]: Resettable one-shot timer
//! - [`mongo`]: MongoDB driver adapter and bounded cursor draining
//! - [`connection`]: Connection state machine
//! - [`atlas`]: Atlas Admin API client
//! - [`atlas_local`]: Local Atlas deployments through Docker
//! - [`session`]: Per-client session
//! - [`resources`]: `config://` resources
//! - [`tools`]: Tool catalogue and call pipeline
//! - [`mcp`]: MCP protocol implementation

pub mod atlas;
pub mod atlas_local;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod mcp;
pub mod mongo;
pub mod resources;
pub mod session;
pub mod timeout;
pub mod tools;

#[cfg(test)]
mod testing;
