use crate::cdp::CdpClient;
use crate::targets::DevtoolsEndpoint;
use outreach_core::{ContextHandle, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One CDP connection per tab, opened lazily and dropped when the tab goes away.
pub struct CdpPool {
    endpoint: DevtoolsEndpoint,
    command_timeout: Duration,
    clients: Mutex<HashMap<String, Arc<CdpClient>>>,
}

impl CdpPool {
    pub fn new(endpoint: DevtoolsEndpoint, command_timeout: Duration) -> Self {
        Self {
            endpoint,
            command_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self) -> &DevtoolsEndpoint {
        &self.endpoint
    }

    /// Connection to the tab behind `handle`, with `Page` and `Runtime` enabled.
    pub async fn client(&self, handle: &ContextHandle) -> Result<Arc<CdpClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(handle.as_str()) {
            if !client.is_closed() {
                return Ok(client.clone());
            }
            debug!(context = %handle, "Dropping closed CDP connection");
            clients.remove(handle.as_str());
        }

        let target = self
            .endpoint
            .find_target(handle.as_str())
            .await?
            .ok_or_else(|| Error::Browser(format!("Tab {} no longer exists", handle)))?;
        let ws_url = target.web_socket_debugger_url.ok_or_else(|| {
            Error::Browser(format!(
                "Tab {} is attached to another debugger client",
                handle
            ))
        })?;

        let client = CdpClient::connect(&ws_url)
            .await?
            .with_command_timeout(self.command_timeout);
        client.enable_domain("Page").await?;
        client.enable_domain("Runtime").await?;
        info!(context = %handle, "CDP connection established");

        let client = Arc::new(client);
        clients.insert(handle.as_str().to_string(), client.clone());
        Ok(client)
    }

    pub async fn forget(&self, handle: &ContextHandle) {
        if self.clients.lock().await.remove(handle.as_str()).is_some() {
            debug!(context = %handle, "Released CDP connection");
        }
    }
}
