use async_trait::async_trait;

pub mod memory;
pub mod smtp;

pub use memory::CaptureMailer;
pub use smtp::SmtpMailer;

/// Outbound email, fully constructed before any store write happens so a
/// malformed address is caught while the account record is still untouched.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn verification(base_url: &str, to: &str, token: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Verify your email".into(),
            body: format!(
                "Please click on the following link to verify your account: \
                 {base_url}/api/v1/users/verify/{token}"
            ),
        }
    }

    pub fn password_reset(base_url: &str, to: &str, token: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your password".into(),
            body: format!(
                "A password reset was requested for your account. Use the \
                 following link within the next few minutes: \
                 {base_url}/api/v1/users/reset/{token}"
            ),
        }
    }
}

/// Delivery collaborator. The workflow only builds messages; transports own
/// retries and connection handling.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}
