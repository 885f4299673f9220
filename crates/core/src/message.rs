use crate::types::{AgentCompletion, ContextHandle, Credentials, SettingsOverride, StatusSnapshot};
use serde::{Deserialize, Serialize};

/// Inbound directives accepted by the engagement worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    #[serde(rename_all = "camelCase")]
    Start {
        list_id: String,
        token: String,
        workspace_id: String,
        #[serde(default)]
        settings: Option<SettingsOverride>,
        #[serde(default)]
        prompt: Option<String>,
    },
    Stop {
        #[serde(default)]
        reason: Option<String>,
    },
    GetStatus,
    /// Completion signal from the page agent for the active candidate.
    AgentCompleted(AgentCompletion),
    /// The browser context identified by `handle` went away.
    ContextClosed { handle: ContextHandle },
}

impl Directive {
    pub fn start(list_id: &str, credentials: &Credentials) -> Self {
        Directive::Start {
            list_id: list_id.to_string(),
            token: credentials.token.clone(),
            workspace_id: credentials.workspace_id.clone(),
            settings: None,
            prompt: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Directive::Start { .. } => "start",
            Directive::Stop { .. } => "stop",
            Directive::GetStatus => "get_status",
            Directive::AgentCompleted { .. } => "agent_completed",
            Directive::ContextClosed { .. } => "context_closed",
        }
    }
}

/// Outcome of a successful start request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { total: usize },
    /// No eligible candidates; the session was cleared without running.
    NothingToDo,
}

/// Reply to a [`Directive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectiveReply {
    Started(StartOutcome),
    Stopped,
    Status(StatusSnapshot),
    Accepted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_directive_wire_format() {
        let d: Directive = serde_json::from_str(
            r#"{"type":"start","listId":"L1","token":"t","workspaceId":"w","settings":{"dailyLimit":5}}"#,
        )
        .unwrap();
        match d {
            Directive::Start {
                list_id,
                settings,
                prompt,
                ..
            } => {
                assert_eq!(list_id, "L1");
                assert_eq!(settings.and_then(|s| s.daily_limit), Some(5));
                assert!(prompt.is_none());
            }
            other => panic!("unexpected directive {:?}", other),
        }
    }

    #[test]
    fn test_stop_without_reason() {
        let d: Directive = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(d.kind(), "stop");
    }

    #[test]
    fn test_agent_completed_carries_identity() {
        let d: Directive = serde_json::from_str(
            r#"{"type":"agent_completed","reason":"engaged","handle":"tab-2","activityId":"act-9"}"#,
        )
        .unwrap();
        assert_eq!(d.kind(), "agent_completed");
        match d {
            Directive::AgentCompleted(completion) => {
                assert_eq!(
                    completion,
                    AgentCompletion::new("engaged")
                        .on(ContextHandle::new("tab-2"))
                        .for_activity("act-9")
                );
            }
            other => panic!("unexpected directive {:?}", other),
        }

        let bare: Directive =
            serde_json::from_str(r#"{"type":"agent_completed","reason":"done"}"#).unwrap();
        assert!(matches!(
            bare,
            Directive::AgentCompleted(AgentCompletion { handle: None, activity_id: None, .. })
        ));
    }
}
