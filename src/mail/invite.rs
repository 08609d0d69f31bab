use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, error};

use crate::storage::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Invalid envelope: {0}")]
    Envelope(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Fixed two-part MIME boundary of the rendered invite.
const BOUNDARY: &str = "0000";

/// MIME line width for the base64 attachment body.
const WRAP_WIDTH: usize = 76;

/// How long one delivery attempt may take end to end.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Renders calendar-invite e-mails and delivers them over an implicit-TLS
/// session to the configured relay.
///
/// Delivery is best-effort: a failure at any stage is fatal to that attempt
/// only, never retried or queued.
pub struct InviteMailer {
    config: MailConfig,
}

impl InviteMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Render the multipart message: a `text/calendar` part carrying the
    /// literal content with REQUEST method semantics, and an
    /// `application/ics` attachment carrying the same content base64-encoded.
    pub fn render(&self, name: &str, email: &str, content: &str, subject: &str) -> String {
        let attachment = wrap(&BASE64.encode(content.as_bytes()));
        format!(
            "Subject: {subject}\r\n\
             To: {name} <{email}>\r\n\
             From: Calshare <{from}>\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\
             \r\n\
             --{boundary}\r\n\
             Content-Type: text/calendar; charset=\"UTF-8\"; method=REQUEST\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             {content}\r\n\
             \r\n\
             --{boundary}\r\n\
             Content-Type: application/ics; name=\"invite.ics\"\r\n\
             Content-Disposition: attachment; filename=\"invite.ics\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {attachment}\r\n\
             --{boundary}--\r\n",
            from = self.config.from,
            boundary = BOUNDARY,
        )
    }

    /// Deliver one invite: implicit-TLS session on the submission port,
    /// plain credentials validated against the relay's identity, envelope,
    /// message, clean termination.
    pub fn send(
        &self,
        name: &str,
        email: &str,
        content: &str,
        subject: &str,
    ) -> Result<(), MailError> {
        let message = self.render(name, email, content, subject);
        let envelope = Envelope::new(
            Some(self.config.from.parse()?),
            vec![email.parse()?],
        )?;

        let transport = SmtpTransport::relay(&self.config.address)?
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .timeout(Some(SEND_TIMEOUT))
            .build();

        transport.send_raw(&envelope, message.as_bytes())?;
        debug!(recipient = email, "invite delivered");
        Ok(())
    }

    /// Hand the send to a blocking worker so resource mutation never waits
    /// on the relay. Failures are logged and dropped.
    pub fn dispatch(self: Arc<Self>, name: String, email: String, content: String, subject: String) {
        tokio::task::spawn_blocking(move || {
            if let Err(err) = self.send(&name, &email, &content, &subject) {
                error!(recipient = %email, %err, "invite delivery failed");
            }
        });
    }
}

fn wrap(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(WRAP_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}
