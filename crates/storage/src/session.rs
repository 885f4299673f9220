//! Persisted form of the engagement session.
//!
//! Key layout of the `engagement` namespace:
//!
//! | key | value |
//! |---|---|
//! | `status` | `"started"` or absent |
//! | `listId` | candidate list id |
//! | `currentIndex` | cursor into the eligible candidates |
//! | `credentials.token` / `credentials.workspaceId` | ledger credentials |
//! | `settings` | serialized [`EngagementSettings`] |
//! | `currentActivityId` | activity id of the in-flight candidate |
//! | `activeContextHandle` | last dedicated tab, a hint only |
//! | `promptOverride` | optional caller text for the page agent |

use crate::store::{Entries, StateStore};
use outreach_core::{ContextHandle, Credentials, EngagementSettings, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const ENGAGEMENT_NAMESPACE: &str = "engagement";
pub const STATUS_STARTED: &str = "started";

const KEY_STATUS: &str = "status";
const KEY_LIST_ID: &str = "listId";
const KEY_CURRENT_INDEX: &str = "currentIndex";
const KEY_TOKEN: &str = "credentials.token";
const KEY_WORKSPACE_ID: &str = "credentials.workspaceId";
const KEY_SETTINGS: &str = "settings";
const KEY_ACTIVITY_ID: &str = "currentActivityId";
const KEY_CONTEXT_HANDLE: &str = "activeContextHandle";
const KEY_PROMPT: &str = "promptOverride";

/// Flat, possibly incomplete view of what was last persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSession {
    pub started: bool,
    pub list_id: Option<String>,
    pub current_index: Option<usize>,
    pub token: Option<String>,
    pub workspace_id: Option<String>,
    pub settings: Option<EngagementSettings>,
    pub current_activity_id: Option<String>,
    pub active_context_handle: Option<ContextHandle>,
    pub prompt_override: Option<String>,
}

/// A persisted session that is complete enough to resume.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorableSession {
    pub list_id: String,
    pub current_index: usize,
    pub credentials: Credentials,
    /// `None` when nothing usable was persisted; the caller supplies defaults.
    pub settings: Option<EngagementSettings>,
    pub current_activity_id: Option<String>,
    pub active_context_handle: Option<ContextHandle>,
    pub prompt_override: Option<String>,
}

/// Verdict on persisted state found at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreCheck {
    /// Nothing was running.
    Idle,
    /// Present but unusable; must be cleared.
    Corrupt(String),
    Ready(RestorableSession),
}

impl PersistedSession {
    pub fn to_entries(&self) -> Entries {
        let mut map = Entries::new();
        if self.started {
            map.insert(KEY_STATUS.into(), Value::String(STATUS_STARTED.into()));
        }
        insert_opt(&mut map, KEY_LIST_ID, self.list_id.clone().map(Value::String));
        insert_opt(
            &mut map,
            KEY_CURRENT_INDEX,
            self.current_index.map(|i| Value::from(i as u64)),
        );
        insert_opt(&mut map, KEY_TOKEN, self.token.clone().map(Value::String));
        insert_opt(
            &mut map,
            KEY_WORKSPACE_ID,
            self.workspace_id.clone().map(Value::String),
        );
        insert_opt(
            &mut map,
            KEY_SETTINGS,
            self.settings
                .as_ref()
                .and_then(|s| serde_json::to_string(s).ok())
                .map(Value::String),
        );
        insert_opt(
            &mut map,
            KEY_ACTIVITY_ID,
            self.current_activity_id.clone().map(Value::String),
        );
        insert_opt(
            &mut map,
            KEY_CONTEXT_HANDLE,
            self.active_context_handle
                .as_ref()
                .map(|h| Value::String(h.0.clone())),
        );
        insert_opt(&mut map, KEY_PROMPT, self.prompt_override.clone().map(Value::String));
        map
    }

    /// Lenient decode: keys with unexpected types are treated as absent.
    pub fn from_entries(map: &Entries) -> Self {
        let text = |key: &str| -> Option<String> {
            map.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty())
        };

        let settings = match map.get(KEY_SETTINGS) {
            Some(Value::String(raw)) => serde_json::from_str(raw)
                .map_err(|e| warn!(error = %e, "Ignoring unreadable persisted settings"))
                .ok(),
            Some(v @ Value::Object(_)) => serde_json::from_value(v.clone()).ok(),
            _ => None,
        };

        Self {
            started: text(KEY_STATUS).as_deref() == Some(STATUS_STARTED),
            list_id: text(KEY_LIST_ID),
            current_index: map
                .get(KEY_CURRENT_INDEX)
                .and_then(|v| v.as_u64())
                .map(|i| i as usize),
            token: text(KEY_TOKEN),
            workspace_id: text(KEY_WORKSPACE_ID),
            settings,
            current_activity_id: text(KEY_ACTIVITY_ID),
            active_context_handle: text(KEY_CONTEXT_HANDLE).map(ContextHandle),
            prompt_override: text(KEY_PROMPT),
        }
    }

    /// Decide whether this state can be resumed.
    pub fn check(&self) -> RestoreCheck {
        if !self.started {
            if *self == PersistedSession::default() {
                return RestoreCheck::Idle;
            }
            return RestoreCheck::Corrupt("leftover state without status".to_string());
        }
        let list_id = match &self.list_id {
            Some(id) => id.clone(),
            None => return RestoreCheck::Corrupt("missing list id".to_string()),
        };
        let credentials = match (&self.token, &self.workspace_id) {
            (Some(token), Some(ws)) => Credentials::new(token, ws),
            _ => return RestoreCheck::Corrupt("missing credentials".to_string()),
        };
        if !credentials.is_complete() {
            return RestoreCheck::Corrupt("incomplete credentials".to_string());
        }
        let current_index = match self.current_index {
            Some(i) => i,
            None => return RestoreCheck::Corrupt("missing cursor".to_string()),
        };

        RestoreCheck::Ready(RestorableSession {
            list_id,
            current_index,
            credentials,
            settings: self.settings.clone(),
            current_activity_id: self.current_activity_id.clone(),
            active_context_handle: self.active_context_handle.clone(),
            prompt_override: self.prompt_override.clone(),
        })
    }
}

fn insert_opt(map: &mut Entries, key: &str, value: Option<Value>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v);
    }
}

/// Reads and writes the `engagement` namespace.
#[derive(Clone)]
pub struct SessionStateStore {
    store: Arc<dyn StateStore>,
}

impl SessionStateStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<PersistedSession> {
        let entries = self.store.load(ENGAGEMENT_NAMESPACE).await?;
        Ok(entries
            .map(|e| PersistedSession::from_entries(&e))
            .unwrap_or_default())
    }

    pub async fn save(&self, session: &PersistedSession) -> Result<()> {
        self.store
            .save(ENGAGEMENT_NAMESPACE, session.to_entries())
            .await?;
        debug!(
            list_id = ?session.list_id,
            index = ?session.current_index,
            "Persisted engagement session"
        );
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear(ENGAGEMENT_NAMESPACE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use serde_json::json;

    fn started(index: usize) -> PersistedSession {
        PersistedSession {
            started: true,
            list_id: Some("list-9".into()),
            current_index: Some(index),
            token: Some("tok".into()),
            workspace_id: Some("ws".into()),
            settings: Some(EngagementSettings {
                daily_limit: 30,
                ..Default::default()
            }),
            current_activity_id: Some("act-1".into()),
            active_context_handle: Some(ContextHandle::new("tab-3")),
            prompt_override: None,
        }
    }

    #[test]
    fn test_entries_use_flat_keys() {
        let map = started(4).to_entries();
        assert_eq!(map.get("status"), Some(&json!("started")));
        assert_eq!(map.get("currentIndex"), Some(&json!(4)));
        assert_eq!(map.get("credentials.token"), Some(&json!("tok")));
        assert_eq!(map.get("credentials.workspaceId"), Some(&json!("ws")));
        assert!(map.get("settings").map(|v| v.is_string()).unwrap_or(false));
        assert!(map.get("promptOverride").is_none());
        assert_eq!(PersistedSession::from_entries(&map), started(4));
    }

    #[test]
    fn test_check_verdicts() {
        assert_eq!(PersistedSession::default().check(), RestoreCheck::Idle);

        let mut leftover = started(1);
        leftover.started = false;
        assert!(matches!(leftover.check(), RestoreCheck::Corrupt(_)));

        let mut no_creds = started(1);
        no_creds.token = None;
        assert!(matches!(no_creds.check(), RestoreCheck::Corrupt(_)));

        let mut blank_ws = started(1);
        blank_ws.workspace_id = Some("  ".into());
        assert!(matches!(blank_ws.check(), RestoreCheck::Corrupt(_)));

        match started(2).check() {
            RestoreCheck::Ready(r) => {
                assert_eq!(r.current_index, 2);
                assert_eq!(r.settings.map(|s| s.daily_limit), Some(30));
            }
            other => panic!("expected ready, got {:?}", other),
        }

        let mut no_settings = started(1);
        no_settings.settings = None;
        match no_settings.check() {
            RestoreCheck::Ready(r) => assert!(r.settings.is_none()),
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[test]
    fn test_from_entries_ignores_wrong_types() {
        let map = json!({
            "status": "started",
            "listId": 17,
            "currentIndex": "three",
            "settings": {"minDelaySecs": 5, "maxDelaySecs": 9}
        });
        let p = PersistedSession::from_entries(map.as_object().unwrap());
        assert!(p.started);
        assert!(p.list_id.is_none());
        assert!(p.current_index.is_none());
        assert_eq!(p.settings.map(|s| s.max_delay_secs), Some(9));
    }

    #[tokio::test]
    async fn test_state_store_round_trip_and_clear() {
        let backing = Arc::new(MemoryStateStore::new());
        let store = SessionStateStore::new(backing.clone());
        store.save(&started(7)).await.unwrap();
        assert_eq!(store.load().await.unwrap().current_index, Some(7));

        store.clear().await.unwrap();
        assert!(backing.snapshot(ENGAGEMENT_NAMESPACE).await.is_none());
        assert_eq!(store.load().await.unwrap(), PersistedSession::default());
    }
}
