mod digest;
mod smtp;

use std::fmt::Debug;
use tracing::{info, warn};

use super::retry::{RetryPolicy, Retryable};

pub use digest::{Digest, DigestMessage};
pub use smtp::{parse_mailbox, SmtpRelay};

/// Outbound mail hook. The SMTP relay is the production implementation.
pub trait MailRelay: Debug {
    fn send(&self, message: &DigestMessage, recipients: &[String]) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid e-mail address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("SMTP credentials missing: {0}")]
    Credentials(String),
    #[error("could not build digest message: {0}")]
    Message(String),
    #[error("mail relay failed: {0}")]
    Transport(String),
}

impl Retryable for NotifyError {
    fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transport(_))
    }
}

/// What happened to the digest for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent { recipients: usize, attempts: usize },
    NothingToSend,
    NoRecipients,
}

#[derive(Debug)]
pub struct DigestNotifier {
    relay: Box<dyn MailRelay>,
    recipients: Vec<String>,
    send_when_empty: bool,
    retry: RetryPolicy,
}

impl DigestNotifier {
    pub fn new(relay: Box<dyn MailRelay>, recipients: Vec<String>) -> Self {
        Self {
            relay,
            recipients,
            send_when_empty: false,
            retry: RetryPolicy::new(2, 5_000),
        }
    }

    /// Send an "all clear" digest when a run finds nothing new.
    pub fn send_when_empty(mut self, enabled: bool) -> Self {
        self.send_when_empty = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn notify(&self, digest: &Digest<'_>) -> Result<Delivery, NotifyError> {
        if digest.is_empty() && !self.send_when_empty {
            info!("no new violations to report");
            return Ok(Delivery::NothingToSend);
        }

        if self.recipients.is_empty() {
            warn!("digest ready but no recipients are configured");
            return Ok(Delivery::NoRecipients);
        }

        let message = digest.render();
        let mut attempts = 0;
        self.retry.run("send digest", |attempt| {
            attempts = attempt;
            self.relay.send(&message, &self.recipients)
        })?;

        info!(
            recipients = self.recipients.len(),
            records = message.record_count,
            attempts,
            "digest sent"
        );
        Ok(Delivery::Sent {
            recipients: self.recipients.len(),
            attempts,
        })
    }
}
