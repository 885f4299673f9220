use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;
use crate::types::EngagementSettings;

/// Fixed timings of the engagement worker. Not overridable per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    /// Bounded wait for the page agent to report completion.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Cool-down before re-evaluating the same candidate once the daily quota is hit.
    #[serde(default = "default_quota_cooldown_secs")]
    pub quota_cooldown_secs: u64,
    /// Settle delay between restoring a persisted session and processing.
    #[serde(default = "default_resume_settle_secs")]
    pub resume_settle_secs: u64,
    /// Interval of the periodic persisted-state re-sync.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
}

fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_quota_cooldown_secs() -> u64 {
    3600
}

fn default_resume_settle_secs() -> u64 {
    5
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_keepalive_interval_secs() -> u64 {
    25
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: default_agent_timeout_secs(),
            quota_cooldown_secs: default_quota_cooldown_secs(),
            resume_settle_secs: default_resume_settle_secs(),
            resync_interval_secs: default_resync_interval_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
        }
    }
}

impl TimingConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn quota_cooldown(&self) -> Duration {
        Duration::from_secs(self.quota_cooldown_secs)
    }

    pub fn resume_settle(&self) -> Duration {
        Duration::from_secs(self.resume_settle_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(1))
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default = "default_debug_host")]
    pub debug_host: String,
    /// Remote debugging port of an already running Chrome.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    /// Domain the dedicated context must stay on (e.g. "linkedin.com").
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Name of the `Runtime.addBinding` function the page agent calls on completion.
    #[serde(default = "default_completion_binding")]
    pub completion_binding: String,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
}

fn default_debug_host() -> String {
    "127.0.0.1".to_string()
}

fn default_debug_port() -> u16 {
    9222
}

fn default_domain() -> String {
    "linkedin.com".to_string()
}

fn default_completion_binding() -> String {
    "__outreachDone".to_string()
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_host: default_debug_host(),
            debug_port: default_debug_port(),
            domain: default_domain(),
            completion_binding: default_completion_binding(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Bearer token required on every route except health. Empty disables auth.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    18890
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Default engagement settings; start requests may override them.
    #[serde(default)]
    pub engagement: EngagementSettings,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.engagement.min_delay_secs > self.engagement.max_delay_secs {
            return Err(Error::Config(format!(
                "engagement.minDelaySecs ({}) exceeds engagement.maxDelaySecs ({})",
                self.engagement.min_delay_secs, self.engagement.max_delay_secs
            )));
        }
        if self.timing.agent_timeout_secs == 0 {
            return Err(Error::Config("timing.agentTimeoutSecs must be positive".to_string()));
        }
        if self.ledger.api_base.trim().is_empty() {
            return Err(Error::Config("ledger.apiBase is required".to_string()));
        }
        Ok(())
    }

    pub fn gateway_token(&self) -> Option<String> {
        self.gateway
            .api_token
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let raw = r#"{
  "engagement": { "dailyLimit": 40 },
  "browser": { "debugPort": 9333 }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.engagement.daily_limit, 40);
        assert_eq!(cfg.engagement.min_delay_secs, 60);
        assert_eq!(cfg.browser.debug_port, 9333);
        assert_eq!(cfg.browser.domain, "linkedin.com");
        assert_eq!(cfg.timing.quota_cooldown(), Duration::from_secs(3600));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut cfg = Config::default();
        cfg.engagement.min_delay_secs = 500;
        cfg.engagement.max_delay_secs = 100;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        assert!(Config::load_or_default(&paths).is_ok());

        let mut cfg = Config::default();
        cfg.gateway.api_token = Some("  tok ".to_string());
        cfg.save(&paths.config_file()).unwrap();

        let loaded = Config::load_or_default(&paths).unwrap();
        assert_eq!(loaded.gateway_token().as_deref(), Some("tok"));
    }
}
