//! Tool-invocation server boundary.
//!
//! The wire protocol itself lives behind [`ToolServerClient`]; this
//! module only tracks named server sessions and routes tool calls. The
//! [`ToolServerManager`] is what command handlers and the conversation
//! loop talk to.

pub mod packages;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ToolServerError {
    UnknownServer(String),
    NotConnected(String),
    UnknownTool(String),
    /// The server reported a protocol-level failure.
    Protocol(String),
    Cancelled,
}

impl fmt::Display for ToolServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolServerError::UnknownServer(name) => write!(f, "no tool server named '{name}'"),
            ToolServerError::NotConnected(name) => {
                write!(f, "tool server '{name}' is not connected")
            }
            ToolServerError::UnknownTool(name) => write!(f, "no connected server offers '{name}'"),
            ToolServerError::Protocol(message) => f.write_str(message),
            ToolServerError::Cancelled => f.write_str("tool call cancelled"),
        }
    }
}

impl std::error::Error for ToolServerError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub server: String,
}

/// One tool-server session. Implementations own transport and protocol.
#[async_trait::async_trait]
pub trait ToolServerClient: Send + Sync {
    async fn connect(&mut self) -> Result<(), ToolServerError>;
    async fn disconnect(&mut self) -> Result<(), ToolServerError>;
    fn is_connected(&self) -> bool;
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, ToolServerError>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolServerError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub name: String,
    pub connected: bool,
}

/// Tracks registered tool servers by name.
#[derive(Default)]
pub struct ToolServerManager {
    servers: BTreeMap<String, Box<dyn ToolServerClient>>,
    enabled: bool,
}

impl ToolServerManager {
    pub fn new() -> Self {
        Self {
            servers: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn register_server(&mut self, name: &str, client: Box<dyn ToolServerClient>) {
        debug!("registered tool server '{name}'");
        self.servers.insert(name.to_string(), client);
    }

    /// Whether tools are exposed to the model at all. Mirrors the
    /// `tools:enabled` setting.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn connect(&mut self, name: &str) -> Result<(), ToolServerError> {
        let client = self
            .servers
            .get_mut(name)
            .ok_or_else(|| ToolServerError::UnknownServer(name.to_string()))?;
        client.connect().await
    }

    pub async fn disconnect(&mut self, name: &str) -> Result<(), ToolServerError> {
        let client = self
            .servers
            .get_mut(name)
            .ok_or_else(|| ToolServerError::UnknownServer(name.to_string()))?;
        client.disconnect().await
    }

    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.servers
            .iter()
            .map(|(name, client)| ServerStatus {
                name: name.clone(),
                connected: client.is_connected(),
            })
            .collect()
    }

    pub fn status(&self, name: &str) -> Result<ServerStatus, ToolServerError> {
        let client = self
            .servers
            .get(name)
            .ok_or_else(|| ToolServerError::UnknownServer(name.to_string()))?;
        Ok(ServerStatus {
            name: name.to_string(),
            connected: client.is_connected(),
        })
    }

    /// Aggregate tools across connected servers.
    pub async fn all_tools(&self) -> Result<Vec<ToolInfo>, ToolServerError> {
        let mut tools = Vec::new();
        for client in self.servers.values() {
            if !client.is_connected() {
                continue;
            }
            tools.extend(client.list_tools().await?);
        }
        Ok(tools)
    }

    /// Route a call to whichever connected server offers the tool.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolServerError> {
        for client in self.servers.values() {
            if !client.is_connected() {
                continue;
            }
            let offers = client
                .list_tools()
                .await?
                .iter()
                .any(|info| info.name == tool);
            if offers {
                return client.call_tool(tool, arguments, cancel).await;
            }
        }
        Err(ToolServerError::UnknownTool(tool.to_string()))
    }
}
