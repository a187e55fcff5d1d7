//! Email one-time-code sign-in
//!
//! Issues short-lived numeric codes, delivers them through a pluggable email
//! transport, and verifies submissions against the pending code.

mod gate;
mod mailer;

pub use gate::{OtpError, OtpGate, DEFAULT_OTP_TTL_SECS};
pub use mailer::{EmailTransport, HttpMailer, OutboundEmail, TransportError};
