use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use super::{DigestMessage, MailRelay, NotifyError};
use crate::config::EmailConfig;

/// Authenticated STARTTLS submission to the configured relay.
pub struct SmtpRelay {
    transport: SmtpTransport,
    from: Mailbox,
    server: String,
}

impl std::fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("server", &self.server)
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpRelay {
    const TIMEOUT: Duration = Duration::from_secs(30);

    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        if config.from_password.is_empty() {
            return Err(NotifyError::Credentials(
                "set email.from_password or MONITOR_SMTP_PASSWORD".to_string(),
            ));
        }
        let from = parse_mailbox(&config.from_email)?;
        let transport = SmtpTransport::starttls_relay(&config.smtp_server)
            .map_err(|err| NotifyError::Transport(err.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.from_email.clone(),
                config.from_password.clone(),
            ))
            .timeout(Some(Self::TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from,
            server: format!("{}:{}", config.smtp_server, config.smtp_port),
        })
    }
}

impl MailRelay for SmtpRelay {
    fn send(&self, message: &DigestMessage, recipients: &[String]) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for recipient in recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        let email = builder
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))
            .map_err(|err| NotifyError::Message(err.to_string()))?;

        self.transport
            .send(&email)
            .map(|_| ())
            .map_err(|err| NotifyError::Transport(err.to_string()))
    }
}

/// Validates a single address the way the relay will see it.
pub fn parse_mailbox(raw: &str) -> Result<Mailbox, NotifyError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|err| NotifyError::Address {
            address: raw.to_string(),
            reason: err.to_string(),
        })
}
