use std::sync::Mutex;

use async_trait::async_trait;

use super::{EmailMessage, Mailer};

/// Mailer that records messages instead of delivering them. Tests pull the
/// verification and reset links back out of the captured bodies.
#[derive(Default)]
pub struct CaptureMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl CaptureMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("mailer lock poisoned").len()
    }

    /// Token embedded in the last captured message, taken from the final
    /// path segment of the link.
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().expect("mailer lock poisoned");
        let body = &sent.last()?.body;
        body.rsplit('/').next().map(|s| s.trim().to_string())
    }
}

#[async_trait]
impl Mailer for CaptureMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().expect("mailer lock poisoned").push(message);
        Ok(())
    }
}
