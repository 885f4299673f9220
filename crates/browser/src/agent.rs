//! Talking to the in-page agent.
//!
//! Directives go in as a `CustomEvent` dispatched on `window`. Reports come
//! back through a `Runtime.addBinding` function the page calls with a JSON
//! payload.

use crate::pool::CdpPool;
use async_trait::async_trait;
use outreach_core::{ActivityKind, AgentCompletion, ContextHandle, Error, Result};
use outreach_scheduler::{AgentDirective, PageAgent};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

pub const DIRECTIVE_EVENT: &str = "outreach:directive";

/// What the page agent reports through the binding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageReport {
    /// Work on the current candidate is over. `activity_id` echoes the
    /// directive's, when the page has one.
    #[serde(rename_all = "camelCase")]
    Completed {
        #[serde(default = "default_reason")]
        reason: String,
        #[serde(default)]
        activity_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Liked {
        #[serde(default)]
        candidate_id: Option<String>,
        #[serde(default)]
        activity_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Commented {
        #[serde(default)]
        candidate_id: Option<String>,
        #[serde(default)]
        activity_id: Option<String>,
    },
}

fn default_reason() -> String {
    "completed".to_string()
}

impl PageReport {
    /// Payloads that are not a JSON report are taken as a bare completion reason.
    pub fn parse(payload: &str) -> PageReport {
        serde_json::from_str(payload).unwrap_or_else(|_| {
            let reason = payload.trim();
            PageReport::Completed {
                reason: if reason.is_empty() {
                    default_reason()
                } else {
                    reason.to_string()
                },
                activity_id: None,
            }
        })
    }

    /// The completion a `Completed` report stands for, tied to the tab it came from.
    pub fn completion(&self, handle: &ContextHandle) -> Option<AgentCompletion> {
        match self {
            PageReport::Completed {
                reason,
                activity_id,
            } => {
                let completion = AgentCompletion::new(reason).on(handle.clone());
                Some(match activity_id {
                    Some(id) => completion.for_activity(id.clone()),
                    None => completion,
                })
            }
            _ => None,
        }
    }

    /// The engagement kind for like/comment reports.
    pub fn engagement(&self) -> Option<(ActivityKind, Option<&str>, Option<&str>)> {
        match self {
            PageReport::Completed { .. } => None,
            PageReport::Liked {
                candidate_id,
                activity_id,
            } => Some((
                ActivityKind::Like,
                candidate_id.as_deref(),
                activity_id.as_deref(),
            )),
            PageReport::Commented {
                candidate_id,
                activity_id,
            } => Some((
                ActivityKind::Comment,
                candidate_id.as_deref(),
                activity_id.as_deref(),
            )),
        }
    }
}

/// Signals the browser side raises towards the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserSignal {
    Page {
        handle: ContextHandle,
        report: PageReport,
    },
    ContextClosed {
        handle: ContextHandle,
    },
}

pub struct CdpPageAgent {
    pool: Arc<CdpPool>,
    binding: String,
    signals: mpsc::Sender<BrowserSignal>,
    /// Tab id -> address of the connection the binding was installed on.
    bound: Mutex<HashMap<String, usize>>,
}

impl CdpPageAgent {
    pub fn new(pool: Arc<CdpPool>, binding: &str, signals: mpsc::Sender<BrowserSignal>) -> Self {
        Self {
            pool,
            binding: binding.to_string(),
            signals,
            bound: Mutex::new(HashMap::new()),
        }
    }

    async fn ensure_binding(&self, context: &ContextHandle) -> Result<()> {
        let client = self.pool.client(context).await?;
        let connection = Arc::as_ptr(&client) as usize;
        let mut bound = self.bound.lock().await;
        if bound.get(context.as_str()) == Some(&connection) {
            return Ok(());
        }

        let mut calls = client.subscribe_event("Runtime.bindingCalled").await;
        client.add_binding(&self.binding).await?;
        bound.insert(context.as_str().to_string(), connection);

        let binding = self.binding.clone();
        let handle = context.clone();
        let signals = self.signals.clone();
        tokio::spawn(async move {
            while let Some(params) = calls.recv().await {
                if params.get("name").and_then(Value::as_str) != Some(binding.as_str()) {
                    continue;
                }
                let payload = params
                    .get("payload")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let report = PageReport::parse(payload);
                debug!(context = %handle, ?report, "Page agent report");
                let signal = BrowserSignal::Page {
                    handle: handle.clone(),
                    report,
                };
                if signals.send(signal).await.is_err() {
                    break;
                }
            }
            debug!(context = %handle, "Binding listener ended");
        });
        info!(context = %context, binding = %self.binding, "Installed completion binding");
        Ok(())
    }
}

#[async_trait]
impl PageAgent for CdpPageAgent {
    async fn deliver(&self, context: &ContextHandle, directive: &AgentDirective) -> Result<()> {
        self.ensure_binding(context).await?;
        let client = self.pool.client(context).await?;

        let detail = serde_json::to_string(directive)?;
        let expression = format!(
            "window.dispatchEvent(new CustomEvent({}, {{ detail: {} }}))",
            Value::String(DIRECTIVE_EVENT.to_string()),
            detail
        );
        match client.evaluate_js(&expression).await {
            Ok(Value::Bool(true)) => Ok(()),
            Ok(other) => Err(Error::Agent(format!(
                "directive event was cancelled by the page ({})",
                other
            ))),
            Err(e) => {
                warn!(context = %context, error = %e, "Directive dispatch failed");
                Err(Error::Agent(e.to_string()))
            }
        }
    }

    async fn ping(&self, context: &ContextHandle) -> Result<()> {
        let client = self.pool.client(context).await?;
        client.evaluate_js("document.readyState").await?;
        Ok(())
    }
}
