// Outbound email delivery for verification codes.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// A rendered message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// No API key is configured; surfaced at send time, not startup
    #[error("email delivery is not configured")]
    NotConfigured,
    #[error("email provider rejected the message: {0}")]
    Rejected(String),
    #[error("email request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Delivery seam so tests and alternate providers can stand in.
#[async_trait::async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError>;
}

/// Sends through a transactional-email HTTP API (Resend-compatible shape).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            from: from.into(),
        }
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[async_trait::async_trait]
impl EmailTransport for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let api_key = self.api_key.as_deref().ok_or(TransportError::NotConfigured)?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [email.to.as_str()],
                subject: &email.subject,
                html: &email.html,
                text: &email.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = body.chars().take(200).collect::<String>();
            return Err(TransportError::Rejected(format!("{}: {}", status, detail)));
        }

        debug!("verification email accepted by provider");
        Ok(())
    }
}
