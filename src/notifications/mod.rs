//! Outgoing mail.

pub mod email;

pub use email::{Mailer, MailService, OutgoingMail, SmtpMailer};
