//! Outbound delivery of alert messages.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::fetch::{HttpClient, post_json};

/// Delivers a rendered message somewhere a person will see it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Writes messages to the log; used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        for line in message.lines() {
            warn!("{line}");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts `{"text": message}` to a chat webhook.
pub struct WebhookNotifier<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> WebhookNotifier<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> Notifier for WebhookNotifier<C> {
    #[tracing::instrument(skip(self, message), fields(bytes = message.len()))]
    async fn send(&self, message: &str) -> Result<()> {
        post_json(&self.client, &self.url, &WebhookPayload { text: message }).await?;
        info!("Webhook notification sent");
        Ok(())
    }
}

/// Sends one message per item; returns how many were delivered.
///
/// A failed delivery is logged and does not stop the remaining ones.
pub async fn send_all<N: Notifier + ?Sized>(notifier: &N, messages: &[String]) -> usize {
    let mut sent = 0;
    for message in messages {
        match notifier.send(message).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(error = %e, "Notification failed"),
        }
    }
    sent
}
