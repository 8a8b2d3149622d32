//! Outbound mail collaborator

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::AuthError;

/// Delivers password-reset links
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), AuthError>;
}

/// Mailer that only logs; the link itself is logged at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), AuthError> {
        info!("Password reset requested for {}", email);
        debug!("Password reset link: {}", link);
        Ok(())
    }
}

/// Build the reset link handed to the mailer.
pub fn reset_link(base_url: &str, envelope: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", base_url, separator, envelope)
}
