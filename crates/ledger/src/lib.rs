//! HTTP client for the remote ledger: candidate lists and activity records.

use async_trait::async_trait;
use outreach_core::config::LedgerConfig;
use outreach_core::{ActivityKind, Candidate, Credentials, Error, Result};
use outreach_scheduler::{ActivityRecorder, CandidateSource};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

const WORKSPACE_HEADER: &str = "X-Workspace-Id";

/// Longest body excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 300;

pub struct LedgerClient {
    client: Client,
    api_base: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRequest<'a> {
    candidate_id: &'a str,
    kind: ActivityKind,
    workspace_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_activity_id: Option<&'a str>,
}

impl LedgerClient {
    pub fn new(config: &LedgerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn candidates_url(&self, list_id: &str) -> String {
        format!("{}/lists/{}/candidates", self.api_base, encode_segment(list_id))
    }

    fn activities_url(&self) -> String {
        format!("{}/activities", self.api_base)
    }

    async fn read_body(response: reqwest::Response, what: &str) -> Result<Value> {
        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, what, "Ledger request failed");
            return Err(Error::Ledger(format!(
                "{} returned {}: {}",
                what,
                status,
                excerpt(&raw_body)
            )));
        }
        serde_json::from_str(&raw_body).map_err(|e| {
            Error::Ledger(format!(
                "{}: unreadable response ({}): {}",
                what,
                e,
                excerpt(&raw_body)
            ))
        })
    }

    pub async fn fetch_list(&self, list_id: &str, credentials: &Credentials) -> Result<Vec<Candidate>> {
        let url = self.candidates_url(list_id);
        debug!(url = %url, "Fetching candidate list");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&credentials.token)
            .header(WORKSPACE_HEADER, &credentials.workspace_id)
            .send()
            .await
            .map_err(|e| Error::Ledger(format!("Candidate request failed: {}", e)))?;
        let body = Self::read_body(response, "candidate list").await?;
        let candidates = parse_candidates(body)?;
        info!(list_id, count = candidates.len(), "Fetched candidate list");
        Ok(candidates)
    }

    /// Record an activity. Likes and comments carry the visit's activity id
    /// as their parent so the ledger can correlate them.
    pub async fn record_activity(
        &self,
        kind: ActivityKind,
        candidate_id: &str,
        parent_activity_id: Option<&str>,
        credentials: &Credentials,
    ) -> Result<String> {
        let request = ActivityRequest {
            candidate_id,
            kind,
            workspace_id: &credentials.workspace_id,
            parent_activity_id,
        };
        let response = self
            .client
            .post(self.activities_url())
            .bearer_auth(&credentials.token)
            .header(WORKSPACE_HEADER, &credentials.workspace_id)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Ledger(format!("Activity request failed: {}", e)))?;
        let body = Self::read_body(response, "activity record").await?;
        let id = parse_activity_id(&body)?;
        info!(kind = %kind, candidate_id, activity_id = %id, "Recorded activity");
        Ok(id)
    }
}

#[async_trait]
impl CandidateSource for LedgerClient {
    async fn fetch_candidates(&self, list_id: &str, credentials: &Credentials) -> Result<Vec<Candidate>> {
        self.fetch_list(list_id, credentials).await
    }
}

#[async_trait]
impl ActivityRecorder for LedgerClient {
    async fn record_visit(&self, candidate_id: &str, credentials: &Credentials) -> Result<String> {
        self.record_activity(ActivityKind::Visit, candidate_id, None, credentials)
            .await
    }
}

/// Accepts a bare array or an object wrapping it under `candidates`, `items` or `data`.
fn parse_candidates(body: Value) -> Result<Vec<Candidate>> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => ["candidates", "items", "data"]
            .iter()
            .find_map(|key| map.remove(*key))
            .ok_or_else(|| Error::Ledger("candidate list missing from response".into()))?,
        other => {
            return Err(Error::Ledger(format!(
                "unexpected candidate list shape: {}",
                other
            )))
        }
    };
    Ok(serde_json::from_value(list)?)
}

fn parse_activity_id(body: &Value) -> Result<String> {
    ["id", "activityId"]
        .iter()
        .find_map(|key| match body.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| Error::Ledger("activity id missing from response".into()))
}

fn encode_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn excerpt(body: &str) -> &str {
    let mut end = body.len().min(ERROR_BODY_LIMIT);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: &str) -> LedgerClient {
        LedgerClient::new(&LedgerConfig {
            api_base: base.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_urls() {
        let c = client("https://ledger.example.com/api/");
        assert_eq!(
            c.candidates_url("list 7/a"),
            "https://ledger.example.com/api/lists/list%207%2Fa/candidates"
        );
        assert_eq!(c.activities_url(), "https://ledger.example.com/api/activities");
    }

    #[test]
    fn test_parse_candidate_shapes() {
        let bare = json!([
            {"id": "c1", "profileAddress": "https://www.linkedin.com/in/a/"},
            {"id": "c2", "alreadyEngaged": true}
        ]);
        let parsed = parse_candidates(bare).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[1].already_engaged);
        assert!(parsed[1].profile_address.is_none());

        let wrapped = json!({"candidates": [{"id": "c3", "profileAddress": "x"}]});
        assert_eq!(parse_candidates(wrapped).unwrap()[0].id, "c3");

        let data = json!({"data": []});
        assert!(parse_candidates(data).unwrap().is_empty());

        assert!(parse_candidates(json!({"total": 0})).is_err());
        assert!(parse_candidates(json!("nope")).is_err());
    }

    #[test]
    fn test_parse_activity_id() {
        assert_eq!(parse_activity_id(&json!({"id": "act-1"})).unwrap(), "act-1");
        assert_eq!(parse_activity_id(&json!({"activityId": 42})).unwrap(), "42");
        assert!(parse_activity_id(&json!({"id": ""})).is_err());
        assert!(parse_activity_id(&json!({})).is_err());
    }

    #[test]
    fn test_activity_request_wire_format() {
        let req = ActivityRequest {
            candidate_id: "c1",
            kind: ActivityKind::Like,
            workspace_id: "ws",
            parent_activity_id: Some("act-1"),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"candidateId": "c1", "kind": "like", "workspaceId": "ws", "parentActivityId": "act-1"})
        );
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let body = "é".repeat(400);
        let cut = excerpt(&body);
        assert!(cut.len() <= ERROR_BODY_LIMIT);
        assert!(body.starts_with(cut));
    }
}
