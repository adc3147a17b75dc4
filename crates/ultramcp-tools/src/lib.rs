//! UltraMCP Tool Surface
//!
//! The fixed catalog of AI-assisted tools and the dispatch layer that
//! turns a tool invocation into an engine call. The MCP transport is a
//! collaborator: it lists [`catalog::all_tools`] and routes invocations
//! through [`handler::ToolHandler::call_tool`].

pub mod catalog;
pub mod handler;

pub use catalog::{all_tools, find_tool, ToolDefinition};
pub use handler::{ToolHandler, ToolOutput};
