use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::MailConfig;

use super::{EmailMessage, Mailer};

/// SMTP delivery via lettre. Plain connection with optional credentials,
/// matching local relays and capture services like Mailtrap.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Self {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Self {
            transport: builder.build(),
            sender: config.sender.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.sender.parse()?)
            .to(message.to.parse()?)
            .subject(message.subject)
            .body(message.body)?;
        self.transport.send(email).await?;
        debug!(to = %message.to, "email sent");
        Ok(())
    }
}
