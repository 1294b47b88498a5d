//! MCP server for resource discovery and record tools.
//!
//! Exposes `resources/list`, `resources/read`, `tools/list` and `tools/call`
//! over JSON-RPC 2.0 stdio transport. Records live behind a pluggable
//! [`store::DataService`]; queries run through the [`query`] engine, and
//! tools can be added to the [`tools::ToolRegistry`] while the server runs.

pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod logging;
pub mod protocol;
pub mod query;
pub mod schema;
pub mod seed;
pub mod server;
pub mod store;
pub mod tools;
