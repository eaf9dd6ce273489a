//! SMTP delivery of alerts.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{error, info};

use checkwatch_core::config::SmtpConfig;
use checkwatch_core::{Alert, Notifier};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid {field} address {value:?}: {reason}")]
    Address {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
}

/// Sends each alert as a plain-text mail to a single recipient.
///
/// Uses an unauthenticated, unencrypted SMTP relay, typically a local MTA.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipient: Mailbox,
}

impl SmtpNotifier {
    /// Validate the addresses and set up the relay transport. No
    /// connection is made until the first alert is sent.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let sender = parse_mailbox("sender", &config.sender)?;
        let recipient = parse_mailbox("recipient", &config.recipient)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .build();
        Ok(Self {
            transport,
            sender,
            recipient,
        })
    }

    /// Build the mail for an alert.
    pub fn message(&self, alert: &Alert) -> Result<Message, NotifyError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(alert.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body())?;
        Ok(message)
    }
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, NotifyError> {
    value.parse::<Mailbox>().map_err(|e| NotifyError::Address {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl Notifier for SmtpNotifier {
    async fn send(&self, alert: &Alert) {
        let message = match self.message(alert) {
            Ok(m) => m,
            Err(e) => {
                error!(event = %alert.event, check_id = %alert.check_id, error = %e, "email not sent");
                return;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!(event = %alert.event, check_id = %alert.check_id, to = %self.recipient, "email sent");
            }
            Err(e) => {
                error!(event = %alert.event, check_id = %alert.check_id, error = %e, "email not sent");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkwatch_core::{CheckObservation, HealthState, ProblemKey};

    fn test_config() -> SmtpConfig {
        SmtpConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            sender: "alert-manager@localhost".to_string(),
            recipient: "oncall@example.com".to_string(),
        }
    }

    fn disk_alert() -> Alert {
        let obs = CheckObservation {
            datacenter: "dc1".to_string(),
            node: "n1".to_string(),
            check_id: "svc-disk".to_string(),
            service: None,
            status: HealthState::Critical,
            output: "disk full".to_string(),
        };
        let key = ProblemKey::for_observation(HealthState::Critical, &obs);
        Alert::problem(&key, &obs)
    }

    #[test]
    fn rejects_invalid_addresses() {
        let mut config = test_config();
        config.recipient = "not an address".to_string();
        let err = SmtpNotifier::new(&config).err().unwrap();
        assert!(matches!(err, NotifyError::Address { field: "recipient", .. }));
    }

    #[test]
    fn message_carries_subject_and_body() {
        let notifier = SmtpNotifier::new(&test_config()).unwrap();
        let message = notifier.message(&disk_alert()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Problem: critical: svc-disk"));
        assert!(raw.contains("To: oncall@example.com"));
        assert!(raw.contains("CheckID: svc-disk"));
        assert!(raw.contains("disk full"));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        // Nothing listens on port 1; send must log and return.
        let notifier = SmtpNotifier::new(&test_config()).unwrap();
        notifier.send(&disk_alert()).await;
    }
}
