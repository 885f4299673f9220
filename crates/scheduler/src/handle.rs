use crate::event::{Event, ResumeOutcome};
use outreach_core::{
    AgentCompletion, ContextHandle, Credentials, Directive, DirectiveReply, Error, Result,
    SettingsOverride, StartOutcome, StatusSnapshot,
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Cloneable front door of a running [`EngagementWorker`](crate::EngagementWorker).
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Event>,
}

impl WorkerHandle {
    pub(crate) fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    async fn send(&self, event: Event) -> Result<()> {
        let name = event.name();
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::WorkerGone(format!("cannot deliver {}", name)))
    }

    async fn request<T>(&self, event: Event, rx: oneshot::Receiver<T>) -> Result<T> {
        let name = event.name();
        self.send(event).await?;
        rx.await
            .map_err(|_| Error::WorkerGone(format!("no reply to {}", name)))
    }

    pub async fn start(
        &self,
        list_id: &str,
        credentials: Credentials,
        overrides: Option<SettingsOverride>,
        prompt: Option<String>,
    ) -> Result<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        let event = Event::Start {
            list_id: list_id.to_string(),
            credentials,
            overrides,
            prompt,
            reply,
        };
        self.request(event, rx).await?
    }

    /// Stop and clear. Returns once the persisted state is gone.
    pub async fn stop(&self, reason: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let event = Event::Stop {
            reason: reason.to_string(),
            reply: Some(reply),
        };
        self.request(event, rx).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::Status { reply }, rx).await
    }

    pub async fn resume(&self) -> Result<ResumeOutcome> {
        let (reply, rx) = oneshot::channel();
        self.request(Event::Resume { reply: Some(reply) }, rx).await
    }

    pub async fn agent_completed(&self, completion: AgentCompletion) -> Result<()> {
        self.send(Event::AgentCompleted { completion }).await
    }

    pub async fn context_closed(&self, handle: ContextHandle) -> Result<()> {
        self.send(Event::ContextClosed { handle }).await
    }

    /// Route a wire-level directive to the matching call.
    pub async fn dispatch(&self, directive: Directive) -> Result<DirectiveReply> {
        debug!(kind = directive.kind(), "Dispatching directive");
        match directive {
            Directive::Start {
                list_id,
                token,
                workspace_id,
                settings,
                prompt,
            } => {
                let credentials = Credentials::new(&token, &workspace_id);
                let outcome = self.start(&list_id, credentials, settings, prompt).await?;
                Ok(DirectiveReply::Started(outcome))
            }
            Directive::Stop { reason } => {
                self.stop(reason.as_deref().unwrap_or("stop requested")).await?;
                Ok(DirectiveReply::Stopped)
            }
            Directive::GetStatus => Ok(DirectiveReply::Status(self.status().await?)),
            Directive::AgentCompleted(completion) => {
                self.agent_completed(completion).await?;
                Ok(DirectiveReply::Accepted)
            }
            Directive::ContextClosed { handle } => {
                self.context_closed(handle).await?;
                Ok(DirectiveReply::Accepted)
            }
        }
    }
}
