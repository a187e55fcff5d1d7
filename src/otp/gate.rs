// One-time-code sign-in.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::mailer::{EmailTransport, OutboundEmail, TransportError};

/// How long an issued code stays verifiable.
pub const DEFAULT_OTP_TTL_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("no verification code was requested for this address")]
    NotRequested,
    #[error("the verification code has expired")]
    Expired,
    #[error("the verification code does not match")]
    Mismatch,
    #[error("'{0}' is not a valid email address")]
    InvalidAddress(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct PendingCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Issues and verifies emailed one-time codes.
///
/// Codes are keyed by the trimmed, lowercased address, so the submission
/// casing never has to match the request. An issued code is stored before
/// delivery is attempted: if the provider is down the user sees the
/// transport error, but a code that did go out stays verifiable. A wrong
/// submission keeps the pending code (retries within the TTL still work);
/// only successful verification or expiry removes it.
pub struct OtpGate {
    transport: Arc<dyn EmailTransport>,
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingCode>>,
}

impl OtpGate {
    pub fn new(transport: Arc<dyn EmailTransport>) -> Self {
        Self {
            transport,
            ttl: Duration::seconds(DEFAULT_OTP_TTL_SECS),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Generate a fresh code for `email` and send it out. A pending code for
    /// the same address is overwritten.
    pub async fn issue(&self, email: &str) -> Result<(), OtpError> {
        let key = normalize(email)?;
        let code = generate_code();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                key.clone(),
                PendingCode {
                    code: code.clone(),
                    expires_at: Utc::now() + self.ttl,
                },
            );
        }
        info!("verification code issued for {}", redact(&key));

        let message = render(&key, &code, self.ttl);
        self.transport.send(&message).await?;
        Ok(())
    }

    /// Check a submitted code against the pending one for `email`.
    pub async fn verify(&self, email: &str, submission: &str) -> Result<(), OtpError> {
        let key = normalize(email)?;
        let submitted = submission.trim();

        let mut pending = self.pending.lock().await;
        let entry = pending.get(&key).ok_or(OtpError::NotRequested)?;

        if Utc::now() > entry.expires_at {
            pending.remove(&key);
            debug!("verification code for {} had expired", redact(&key));
            return Err(OtpError::Expired);
        }
        if entry.code != submitted {
            return Err(OtpError::Mismatch);
        }

        pending.remove(&key);
        info!("verification succeeded for {}", redact(&key));
        Ok(())
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

fn normalize(email: &str) -> Result<String, OtpError> {
    let normalized = email.trim().to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };
    if !valid {
        return Err(OtpError::InvalidAddress(email.trim().to_string()));
    }
    Ok(normalized)
}

/// Log form of an address: first character plus domain.
fn redact(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let head = local.chars().next().unwrap_or('?');
            format!("{}***@{}", head, domain)
        }
        None => "***".to_string(),
    }
}

fn render(to: &str, code: &str, ttl: Duration) -> OutboundEmail {
    let minutes = ttl.num_minutes().max(1);
    OutboundEmail {
        to: to.to_string(),
        subject: format!("{} is your deskcast sign-in code", code),
        html: format!(
            "<div style=\"font-family:sans-serif;max-width:420px\">\
             <h2>Sign in to deskcast</h2>\
             <p>Enter this code to finish signing in:</p>\
             <p style=\"font-size:28px;letter-spacing:6px\"><strong>{code}</strong></p>\
             <p>The code expires in {minutes} minutes. If you did not request it, \
             you can ignore this email.</p>\
             </div>"
        ),
        text: format!(
            "Your deskcast sign-in code is {code}. It expires in {minutes} minutes.\n\
             If you did not request it, you can ignore this email.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records every outbound message; optionally fails after recording.
    struct MemoryTransport {
        sent: StdMutex<Vec<OutboundEmail>>,
        fail: bool,
    }

    impl MemoryTransport {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
                fail,
            })
        }

        fn last_code(&self) -> String {
            let sent = self.sent.lock().unwrap();
            let subject = &sent.last().expect("no email sent").subject;
            subject
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl EmailTransport for MemoryTransport {
        async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(email.clone());
            if self.fail {
                return Err(TransportError::Rejected("boom".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn issue_then_verify_consumes_the_code() {
        let transport = MemoryTransport::new(false);
        let gate = OtpGate::new(transport.clone());

        gate.issue("user@example.com").await.unwrap();
        let code = transport.last_code();
        assert_eq!(code.len(), 6);

        gate.verify("user@example.com", &code).await.unwrap();
        // Consumed: a second attempt finds nothing pending
        let err = gate.verify("user@example.com", &code).await.unwrap_err();
        assert!(matches!(err, OtpError::NotRequested));
    }

    #[tokio::test]
    async fn verify_without_request_is_rejected() {
        let gate = OtpGate::new(MemoryTransport::new(false));
        let err = gate.verify("user@example.com", "000000").await.unwrap_err();
        assert!(matches!(err, OtpError::NotRequested));
    }

    #[tokio::test]
    async fn mismatch_keeps_the_code_verifiable() {
        let transport = MemoryTransport::new(false);
        let gate = OtpGate::new(transport.clone());

        gate.issue("user@example.com").await.unwrap();
        let code = transport.last_code();
        let wrong = if code == "111111" { "222222" } else { "111111" };

        let err = gate.verify("user@example.com", wrong).await.unwrap_err();
        assert!(matches!(err, OtpError::Mismatch));
        gate.verify("user@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_removed() {
        let transport = MemoryTransport::new(false);
        let gate = OtpGate::new(transport.clone()).with_ttl(Duration::milliseconds(40));

        gate.issue("user@example.com").await.unwrap();
        let code = transport.last_code();
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let err = gate.verify("user@example.com", &code).await.unwrap_err();
        assert!(matches!(err, OtpError::Expired));
        let err = gate.verify("user@example.com", &code).await.unwrap_err();
        assert!(matches!(err, OtpError::NotRequested));
    }

    #[tokio::test]
    async fn reissue_overwrites_the_previous_code() {
        let transport = MemoryTransport::new(false);
        let gate = OtpGate::new(transport.clone());

        gate.issue("user@example.com").await.unwrap();
        let first = transport.last_code();
        gate.issue("user@example.com").await.unwrap();
        let second = transport.last_code();

        if first != second {
            let err = gate.verify("user@example.com", &first).await.unwrap_err();
            assert!(matches!(err, OtpError::Mismatch));
        }
        gate.verify("user@example.com", &second).await.unwrap();
    }

    #[tokio::test]
    async fn address_matching_ignores_case_and_whitespace() {
        let transport = MemoryTransport::new(false);
        let gate = OtpGate::new(transport.clone());

        gate.issue("  User@Example.COM ").await.unwrap();
        let code = transport.last_code();
        gate.verify("user@example.com", &format!("  {} ", code))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_delivery_still_stores_the_code() {
        let transport = MemoryTransport::new(true);
        let gate = OtpGate::new(transport.clone());

        let err = gate.issue("user@example.com").await.unwrap_err();
        assert!(matches!(err, OtpError::Transport(_)));

        // The code was recorded before the send was attempted
        let code = transport.last_code();
        gate.verify("user@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_addresses_are_rejected() {
        let gate = OtpGate::new(MemoryTransport::new(false));
        for bad in ["", "nope", "@example.com", "user@nodot"] {
            let err = gate.issue(bad).await.unwrap_err();
            assert!(matches!(err, OtpError::InvalidAddress(_)), "{:?}", bad);
        }
    }
}
