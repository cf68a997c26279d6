//! Research-team notifications for new consent responses.
//!
//! Notifications are best-effort: the response is already stored when one is
//! sent, so delivery failures are logged and never reach the participant.

use crate::config::SmtpConfig;
use crate::consent::ConsentResponse;
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Sends a message about a stored consent response.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_consent(&self, response: &ConsentResponse) -> CoreResult<()>;
}

/// Subject line for a response notification.
pub fn compose_subject(response: &ConsentResponse) -> String {
    format!(
        "Consent response: {} ({})",
        response.decision.label(),
        response.participant_id
    )
}

/// Plain-text body for a response notification.
pub fn compose_body(response: &ConsentResponse) -> String {
    format!(
        "A consent response has been recorded.\n\n\
         Participant: {}\n\
         Decision: {}\n\
         Submitted at: {}\n\
         IP address: {}\n\
         User agent: {}\n",
        response.participant_id,
        response.decision.label(),
        response.timestamp(),
        response.ip.as_deref().unwrap_or("unknown"),
        response.user_agent.as_deref().unwrap_or("unknown"),
    )
}

/// Mails the research team over an SMTP relay with STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    /// Builds the transport from resolved SMTP settings.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidConfig` if the relay host or either mail
    /// address cannot be parsed.
    pub fn new(config: &SmtpConfig) -> CoreResult<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| CoreError::InvalidConfig(format!("MAIL_FROM: {e}")))?;
        let to = config
            .to
            .parse::<Mailbox>()
            .map_err(|e| CoreError::InvalidConfig(format!("RESEARCH_TEAM_EMAIL: {e}")))?;

        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| CoreError::InvalidConfig(format!("SMTP_HOST: {e}")))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self { transport, from, to })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify_consent(&self, response: &ConsentResponse) -> CoreResult<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(compose_subject(response))
            .header(ContentType::TEXT_PLAIN)
            .body(compose_body(response))
            .map_err(|e| CoreError::Notification(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| CoreError::Notification(e.to_string()))?;

        tracing::info!(
            "notified research team of response for participant {}",
            response.participant_id
        );
        Ok(())
    }
}

/// Used when SMTP is not configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_consent(&self, response: &ConsentResponse) -> CoreResult<()> {
        tracing::info!(
            "notifications disabled; not mailing response for participant {}",
            response.participant_id
        );
        Ok(())
    }
}

/// Picks the SMTP notifier when configured, otherwise the no-op one.
///
/// An SMTP configuration that cannot be turned into a transport is logged and
/// downgraded to no-op so the consent endpoint still starts.
pub fn notifier_from_config(smtp: Option<&SmtpConfig>) -> Arc<dyn Notifier> {
    match smtp.map(SmtpNotifier::new) {
        Some(Ok(notifier)) => Arc::new(notifier),
        Some(Err(e)) => {
            tracing::warn!("consent notifications disabled: {}", e);
            Arc::new(NoopNotifier)
        }
        None => Arc::new(NoopNotifier),
    }
}

/// Sends the notification on a background task.
///
/// The caller does not wait for delivery; failures are logged here.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    response: ConsentResponse,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_consent(&response).await {
            tracing::error!(
                "notification for participant {} failed: {}",
                response.participant_id,
                e
            );
        }
    })
}
