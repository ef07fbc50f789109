use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use thiserror::Error;
use tracing::info;

use crate::email::EmailConfig;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    /// Non-SMTP transports and test doubles.
    #[error("dispatch failed: {0}")]
    Failed(String),
}

/// Outbound email boundary. One call per OTP request, no retries; tests
/// substitute a recording implementation.
pub trait EmailDispatcher: Send + Sync {
    fn send(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), DispatchError>;
}

/// SMTP-backed dispatcher.
pub struct SmtpDispatcher {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl SmtpDispatcher {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            credentials: Credentials::new(config.smtp_user.clone(), config.smtp_pass.clone()),
        }
    }
}

impl EmailDispatcher for SmtpDispatcher {
    fn send(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), DispatchError> {
        let mut builder = Message::builder().from(from.parse::<Mailbox>()?);
        for recipient in to {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }
        let email = builder
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        // Port 587 relays expect STARTTLS
        let mailer = SmtpTransport::starttls_relay(&self.host)?
            .port(self.port)
            .credentials(self.credentials.clone())
            .build();

        mailer.send(&email)?;
        info!(recipients = to.len(), "verification email dispatched");

        Ok(())
    }
}

/// Renders the OTP message body from the configured template.
pub fn render_otp_body(template: &str, code: &str) -> String {
    template.replace("{otp}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_template_interpolates_code() {
        let body = render_otp_body("<p>Your OTP is <strong>{otp}</strong></p>", "204917");
        assert_eq!(body, "<p>Your OTP is <strong>204917</strong></p>");
    }

    #[test]
    fn body_template_without_placeholder_is_untouched() {
        assert_eq!(render_otp_body("<p>hello</p>", "123456"), "<p>hello</p>");
    }
}
