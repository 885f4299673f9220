//! HTTP discovery endpoints of a browser started with `--remote-debugging-port`.

use outreach_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// One entry of `/json/list`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

#[derive(Clone)]
pub struct DevtoolsEndpoint {
    base: String,
    client: reqwest::Client,
}

impl DevtoolsEndpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: format!("http://{}:{}", host, port),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        let url = format!("{}/json/list", self.base);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Browser(format!("DevTools not reachable at {}: {}", self.base, e)))?;
        resp.json::<Vec<TargetInfo>>()
            .await
            .map_err(|e| Error::Browser(format!("Unreadable target list: {}", e)))
    }

    pub async fn find_target(&self, id: &str) -> Result<Option<TargetInfo>> {
        Ok(self.list_targets().await?.into_iter().find(|t| t.id == id))
    }

    /// Open a new tab on `url`.
    pub async fn new_target(&self, url: &str) -> Result<TargetInfo> {
        // Recent Chrome rejects GET here.
        let endpoint = format!("{}/json/new?{}", self.base, url);
        let resp = self
            .client
            .put(&endpoint)
            .send()
            .await
            .map_err(|e| Error::Browser(format!("Failed to open tab: {}", e)))?;
        resp.json::<TargetInfo>()
            .await
            .map_err(|e| Error::Browser(format!("Unreadable new-tab response: {}", e)))
    }

    /// Browser-level debugger WebSocket, used for target lifecycle events.
    pub async fn browser_ws_url(&self) -> Result<String> {
        let url = format!("{}/json/version", self.base);
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Browser(format!("DevTools not reachable at {}: {}", self.base, e)))?
            .json()
            .await
            .map_err(|e| Error::Browser(format!("Unreadable version response: {}", e)))?;
        body.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Browser("No browser WebSocket URL advertised".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_list_deserializes() {
        let raw = r#"[
            {"description":"","id":"AB12","title":"Feed | LinkedIn","type":"page",
             "url":"https://www.linkedin.com/feed/",
             "webSocketDebuggerUrl":"ws://127.0.0.1:9222/devtools/page/AB12"},
            {"id":"SW1","type":"service_worker","url":"https://www.linkedin.com/sw.js"}
        ]"#;
        let targets: Vec<TargetInfo> = serde_json::from_str(raw).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].is_page());
        assert_eq!(
            targets[0].web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/AB12")
        );
        assert!(!targets[1].is_page());
        assert!(targets[1].web_socket_debugger_url.is_none());
    }
}
