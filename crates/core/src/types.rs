use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single target profile fetched from the candidate source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub profile_address: Option<String>,
    #[serde(default)]
    pub already_engaged: bool,
}

impl Candidate {
    pub fn new(id: &str, profile_address: &str) -> Self {
        Self {
            id: id.to_string(),
            profile_address: Some(profile_address.to_string()),
            already_engaged: false,
        }
    }

    /// The profile address, if present and non-blank.
    pub fn address(&self) -> Option<&str> {
        self.profile_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Candidates without an address or already engaged are never processed.
    pub fn is_eligible(&self) -> bool {
        !self.already_engaged && self.address().is_some()
    }
}

/// Keep only eligible candidates, preserving order.
pub fn eligible_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.into_iter().filter(Candidate::is_eligible).collect()
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    pub workspace_id: String,
}

impl Credentials {
    pub fn new(token: &str, workspace_id: &str) -> Self {
        Self {
            token: token.to_string(),
            workspace_id: workspace_id.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.token.trim().is_empty() && !self.workspace_id.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***")
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

/// Pacing and quota settings, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSettings {
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Non-positive disables the daily quota.
    #[serde(default)]
    pub daily_limit: i64,
}

fn default_min_delay_secs() -> u64 {
    60
}

fn default_max_delay_secs() -> u64 {
    180
}

impl Default for EngagementSettings {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            daily_limit: 0,
        }
    }
}

impl EngagementSettings {
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn quota_enabled(&self) -> bool {
        self.daily_limit > 0
    }

    /// Merge caller-supplied overrides on top of these settings.
    pub fn merged(&self, overrides: Option<&SettingsOverride>) -> Self {
        let mut merged = self.clone();
        if let Some(o) = overrides {
            if let Some(v) = o.min_delay_secs {
                merged.min_delay_secs = v;
            }
            if let Some(v) = o.max_delay_secs {
                merged.max_delay_secs = v;
            }
            if let Some(v) = o.daily_limit {
                merged.daily_limit = v;
            }
        }
        merged
    }
}

/// Per-session overrides supplied with a start request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<i64>,
}

/// Opaque reference to the dedicated browser context (a tab / CDP target id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHandle(pub String);

impl ContextHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion report from the page agent. `handle` and `activity_id` tie it
/// to the tab and visit it was produced for; reports that name another tab or
/// an earlier visit are stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCompletion {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<ContextHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

impl AgentCompletion {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            handle: None,
            activity_id: None,
        }
    }

    pub fn on(mut self, handle: ContextHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn for_activity(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }
}

/// Kinds of events recorded against the remote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Visit,
    Like,
    Comment,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Visit => "visit",
            ActivityKind::Like => "like",
            ActivityKind::Comment => "comment",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of how the most recent session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecord {
    pub list_id: Option<String>,
    pub final_index: usize,
    pub reason: String,
}

/// Read-only view of the live session returned by status queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_engaging: bool,
    pub list_id: Option<String>,
    pub current_activity_id: Option<String>,
    pub current_index: usize,
    pub total: usize,
    pub phase: String,
    /// Reason of the most recent transition, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stop: Option<StopRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_eligibility() {
        assert!(Candidate::new("1", "https://example.com/in/a").is_eligible());

        let blank = Candidate {
            id: "2".into(),
            profile_address: Some("   ".into()),
            already_engaged: false,
        };
        assert!(!blank.is_eligible());

        let engaged = Candidate {
            already_engaged: true,
            ..Candidate::new("3", "https://example.com/in/c")
        };
        assert!(!engaged.is_eligible());

        let filtered = eligible_candidates(vec![
            Candidate::new("1", "https://example.com/in/a"),
            blank,
            engaged,
            Candidate::new("4", "https://example.com/in/d"),
        ]);
        let ids: Vec<_> = filtered.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn test_settings_merge() {
        let base = EngagementSettings::default();
        let merged = base.merged(Some(&SettingsOverride {
            daily_limit: Some(25),
            ..Default::default()
        }));
        assert_eq!(merged.min_delay_secs, 60);
        assert_eq!(merged.max_delay_secs, 180);
        assert_eq!(merged.daily_limit, 25);
        assert!(merged.quota_enabled());
        assert_eq!(base.merged(None), base);
    }

    #[test]
    fn test_credentials_debug_hides_token() {
        let creds = Credentials::new("secret-token", "ws-1");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret-token"));
        assert!(creds.is_complete());
        assert!(!Credentials::new("", "ws-1").is_complete());
    }

    #[test]
    fn test_candidate_deserializes_camel_case() {
        let c: Candidate = serde_json::from_str(
            r#"{"id":"7","profileAddress":"https://example.com/in/x","alreadyEngaged":true}"#,
        )
        .unwrap();
        assert_eq!(c.address(), Some("https://example.com/in/x"));
        assert!(c.already_engaged);
    }
}
