//! Email delivery for login codes and other system messages.
//!
//! [`MailService`] never fails: delivery problems are logged and reported
//! as `false`, so a request that triggers mail completes regardless of SMTP
//! availability.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::EmailConfig;

pub const LOGIN_CODE_SUBJECT: &str = "Your Login Code";

/// A message ready to hand to a [`Mailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

/// Something that can deliver mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = mail.to.parse()?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.as_str());

        let email = match &mail.html_body {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            )?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(mail.text_body.clone())?,
        };

        let transport = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let transport = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            transport.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            transport
        };

        transport.build().send(email).await?;
        Ok(())
    }
}

/// Sends system mail, swallowing delivery errors
#[derive(Clone)]
pub struct MailService {
    mailer: Option<Arc<dyn Mailer>>,
}

impl MailService {
    /// SMTP-backed service, or a disabled one when SMTP is not configured
    pub fn from_config(config: &EmailConfig) -> Self {
        if config.is_configured() {
            Self::with_mailer(Arc::new(SmtpMailer::new(config.clone())))
        } else {
            Self::disabled()
        }
    }

    pub fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }

    pub fn disabled() -> Self {
        Self { mailer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Send a message; returns whether it was handed off successfully
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> bool {
        let Some(mailer) = &self.mailer else {
            tracing::warn!(to = %to, subject = %subject, "Email not configured, skipping");
            return false;
        };

        let mail = OutgoingMail {
            to: to.to_string(),
            subject: subject.to_string(),
            text_body: text_body.to_string(),
            html_body: html_body.map(str::to_string),
        };

        match mailer.send(&mail).await {
            Ok(()) => {
                tracing::info!(to = %to, subject = %subject, "Email sent successfully");
                true
            }
            Err(e) => {
                tracing::error!(to = %to, subject = %subject, error = %e, "Failed to send email");
                false
            }
        }
    }

    pub async fn send_login_code(&self, to: &str, code: &str, expiry_minutes: i64) -> bool {
        let text = render_login_code_text(code, expiry_minutes);
        let html = render_login_code_html(code, expiry_minutes);
        self.send_email(to, LOGIN_CODE_SUBJECT, &text, Some(&html))
            .await
    }
}

fn render_login_code_text(code: &str, expiry_minutes: i64) -> String {
    format!(
        r#"Your Login Code

Use the following code to sign in:

{code}

This code expires in {expiry_minutes} minutes and can be used once.

If you didn't request this code, you can safely ignore this email."#,
        code = code,
        expiry_minutes = expiry_minutes,
    )
}

fn render_login_code_html(code: &str, expiry_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Your Login Code</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 560px;
            margin: 0 auto;
            padding: 40px 20px;
        }}
        .card {{
            background-color: #ffffff;
            border-radius: 8px;
            padding: 32px 24px;
            text-align: center;
        }}
        .code {{
            font-size: 32px;
            font-weight: 700;
            letter-spacing: 8px;
            color: #111827;
            background-color: #f3f4f6;
            border-radius: 6px;
            padding: 16px;
            margin: 24px 0;
        }}
        .note {{
            color: #6b7280;
            font-size: 14px;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <h1>Your Login Code</h1>
            <p>Use the following code to sign in:</p>
            <div class="code">{code}</div>
            <p>This code expires in <strong>{expiry_minutes} minutes</strong> and can be used once.</p>
            <p class="note">If you didn't request this code, you can safely ignore this email.</p>
        </div>
    </div>
</body>
</html>"#,
        code = html_escape(code),
        expiry_minutes = expiry_minutes,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Test double that records every message instead of sending it
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        if self.fail {
            anyhow::bail!("SMTP connection refused");
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
