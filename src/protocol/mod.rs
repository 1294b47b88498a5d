pub mod request;
pub mod response;

pub use request::{
    ClientInfo, InitializeParams, JsonRpcRequest, ReadResourceParams, RpcId, ToolCallParams,
};
pub use response::{
    JsonRpcError, JsonRpcResponse, McpError, McpErrorCode, McpErrorResponse, ResourceContents,
    ResourceDescriptor, ToolResult, ToolResultContent,
};
