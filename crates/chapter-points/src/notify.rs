use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::members::MemberId;

/// Outbound notification payload (in-app toast, e-mail adapter, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub member_id: MemberId,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(template: impl Into<String>, member_id: MemberId) -> Self {
        Self {
            template: template.into(),
            member_id,
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Fire a notification; failures are logged and never reach the caller.
pub async fn notify_best_effort<N: Notifier + ?Sized>(notifier: &N, notification: Notification) {
    let template = notification.template.clone();
    let member_id = notification.member_id.clone();
    if let Err(err) = notifier.notify(notification).await {
        warn!(%member_id, template = %template, error = %err, "notification failed");
    }
}

/// Notifier that only writes a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            member_id = %notification.member_id,
            template = %notification.template,
            details = ?notification.details,
            "notification"
        );
        Ok(())
    }
}
