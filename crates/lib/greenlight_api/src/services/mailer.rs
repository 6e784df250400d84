//! Outbound notifications.
//!
//! [`Mailer`] is the delivery seam; handlers only build a [`Notification`]
//! and hand it to the background runner. [`LogMailer`] delivers by writing
//! the rendered message to the log, which is what local development and the
//! tests run on. An SMTP transport would implement the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenlight_core::models::auth::UserId;
use greenlight_core::validation::is_email;
use thiserror::Error;
use tracing::{debug, info};

/// Error type for notification delivery failures.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// A message sent to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Sent after registration, carries the first activation token.
    Welcome {
        user_id: UserId,
        activation_token: String,
    },
    /// Sent when a fresh activation token is requested.
    ActivationToken { token: String },
    /// Sent when a password reset is requested.
    PasswordReset {
        token: String,
        expiry: DateTime<Utc>,
    },
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "Welcome to Greenlight!",
            Notification::ActivationToken { .. } => "Activate your Greenlight account",
            Notification::PasswordReset { .. } => "Reset your Greenlight password",
        }
    }

    /// Plain-text body.
    pub fn body(&self) -> String {
        match self {
            Notification::Welcome {
                user_id,
                activation_token,
            } => format!(
                "Hi,\n\n\
                 Thanks for signing up for a Greenlight account. For future reference, \
                 your user ID number is {user_id}.\n\n\
                 Please send a request to the `PUT /v1/users/activated` endpoint with the \
                 following JSON body to activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n\n\
                 Thanks,\n\nThe Greenlight Team\n"
            ),
            Notification::ActivationToken { token } => format!(
                "Hi,\n\n\
                 Please send a `PUT /v1/users/activated` request with the following JSON \
                 body to activate your account:\n\n\
                 {{\"token\": \"{token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n\n\
                 Thanks,\n\nThe Greenlight Team\n"
            ),
            Notification::PasswordReset { token, expiry } => format!(
                "Hi,\n\n\
                 Please send a `PUT /v1/users/password` request with the following JSON \
                 body to set a new password:\n\n\
                 {{\"password\": \"your new password\", \"token\": \"{token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire at \
                 {expiry}.\n\n\
                 Thanks,\n\nThe Greenlight Team\n",
                expiry = expiry.to_rfc3339()
            ),
        }
    }
}

/// Delivers notifications.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), MailError>;
}

/// Mailer that logs messages instead of sending them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), MailError> {
        if !is_email(recipient) {
            return Err(MailError::InvalidRecipient(recipient.to_string()));
        }
        info!(
            from = %self.sender,
            to = %recipient,
            subject = notification.subject(),
            "sending notification"
        );
        debug!(body = %notification.body(), "notification body");
        Ok(())
    }
}
