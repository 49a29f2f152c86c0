//! OTP delivery by email.
//!
//! The auth service only sees the [`Mailer`] trait. Production uses the SMTP
//! transport; development without SMTP configured falls back to a mailer that
//! logs the code, and tests capture codes in an in-memory outbox.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Mutex;
use tracing::info;

/// Which flow an OTP belongs to; used in the mail subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Register,
    ForgotPassword,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Register => "REGISTER",
            OtpPurpose::ForgotPassword => "FORGOT_PASSWORD",
        }
    }
}

/// Delivers OTP codes to users. Dispatch failures for register/forgot OTPs
/// surface to the caller; the user has no other way to obtain the code.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        valid_minutes: u64,
    ) -> Result<(), MailError>;
}

/// Error sending an email.
#[derive(Debug)]
pub enum MailError {
    /// Invalid address or transport configuration
    InvalidConfig(String),
    /// The transport failed to deliver the message
    SendFailed(String),
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::InvalidConfig(msg) => write!(f, "Invalid mail configuration: {}", msg),
            MailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
        }
    }
}

impl std::error::Error for MailError {}

fn otp_subject(purpose: OtpPurpose) -> String {
    format!("[Taskdeck] OTP - {}", purpose.as_str())
}

fn otp_body(code: &str, valid_minutes: u64) -> String {
    format!(
        "Your OTP code is: {}\n\n\
         This code will expire in {} minutes.\n\
         If you did not request this, please ignore.\n",
        code, valid_minutes
    )
}

/// SMTP mailer backed by lettre's async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer. Uses STARTTLS when credentials are given,
    /// otherwise a plain connection (local relay / development).
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: String,
    ) -> Result<Self, MailError> {
        let mut builder = if username.is_some() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::InvalidConfig(format!("SMTP relay: {}", e)))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        valid_minutes: u64,
    ) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailError::InvalidConfig(format!("from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| MailError::InvalidConfig(format!("to address: {}", e)))?)
            .subject(otp_subject(purpose))
            .header(ContentType::TEXT_PLAIN)
            .body(otp_body(code, valid_minutes))
            .map_err(|e| MailError::SendFailed(format!("build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

/// Development fallback when no SMTP transport is configured: logs the code
/// instead of delivering it. Never use outside local development.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        _valid_minutes: u64,
    ) -> Result<(), MailError> {
        info!(to = %to, purpose = purpose.as_str(), code = %code, "SMTP not configured, logging OTP");
        Ok(())
    }
}

/// A sent OTP captured by [`MemoryMailer`].
#[derive(Debug, Clone)]
pub struct SentOtp {
    pub to: String,
    pub code: String,
    pub purpose: OtpPurpose,
}

/// In-memory mailer for tests: records every OTP instead of sending it.
pub struct MemoryMailer {
    outbox: Mutex<Vec<SentOtp>>,
    fail_sends: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self {
            outbox: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(false),
        }
    }

    /// All OTPs sent so far, oldest first.
    pub fn outbox(&self) -> Vec<SentOtp> {
        self.outbox.lock().expect("outbox poisoned").clone()
    }

    /// The most recently sent OTP, if any.
    pub fn last(&self) -> Option<SentOtp> {
        self.outbox.lock().expect("outbox poisoned").last().cloned()
    }

    /// Make subsequent sends fail, to exercise dispatch-failure paths.
    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().expect("outbox poisoned") = fail;
    }
}

impl Default for MemoryMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        _valid_minutes: u64,
    ) -> Result<(), MailError> {
        if *self.fail_sends.lock().expect("outbox poisoned") {
            return Err(MailError::SendFailed("simulated failure".to_string()));
        }
        self.outbox.lock().expect("outbox poisoned").push(SentOtp {
            to: to.to_string(),
            code: code.to_string(),
            purpose,
        });
        Ok(())
    }
}
