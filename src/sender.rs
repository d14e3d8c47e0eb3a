//! SMTP mail sender

use crate::config::{AccountConfig, Security};
use crate::error::{Error, Result};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox as Address, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A message to send, as posted by API clients.
///
/// Recipient fields take either a single (optionally comma separated)
/// string or an array of strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutgoingMessage {
    /// Sender; defaults to the SMTP login.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub cc: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    /// Plain text body
    #[serde(default)]
    pub text: Option<String>,
    /// HTML body
    #[serde(default)]
    pub html: Option<String>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let addresses = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(list)) => list.split(',').map(str::to_string).collect(),
        Some(OneOrMany::Many(list)) => list,
    };
    Ok(addresses
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect())
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.parse()
        .map_err(|e| Error::Validation(format!("Invalid address {raw:?}: {e}")))
}

/// Build the MIME message for `msg`, sent from `default_from` unless the
/// message names its own sender.
///
/// # Errors
///
/// Returns [`Error::Validation`] if there is no recipient, an address
/// does not parse, or the message cannot be assembled.
pub fn build_message(msg: &OutgoingMessage, default_from: &str) -> Result<Message> {
    if msg.to.is_empty() && msg.cc.is_empty() && msg.bcc.is_empty() {
        return Err(Error::Validation("Message has no recipients".into()));
    }

    let from = msg.from.as_deref().filter(|f| !f.trim().is_empty()).unwrap_or(default_from);
    let mut builder = Message::builder()
        .from(parse_address(from)?)
        .subject(msg.subject.clone());

    for to in &msg.to {
        builder = builder.to(parse_address(to)?);
    }
    for cc in &msg.cc {
        builder = builder.cc(parse_address(cc)?);
    }
    for bcc in &msg.bcc {
        builder = builder.bcc(parse_address(bcc)?);
    }

    let message = match (&msg.text, &msg.html) {
        (Some(text), Some(html)) => {
            builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
        }
        (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
        (Some(text), None) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
        (None, None) => builder.header(ContentType::TEXT_PLAIN).body(String::new()),
    };

    message.map_err(|e| Error::Validation(format!("Cannot build message: {e}")))
}

/// Submit `email` through `transport`, once.
///
/// # Errors
///
/// Returns [`Error::Send`] carrying the transport's diagnostic if the
/// submission fails for any reason.
pub async fn deliver<T>(transport: &T, email: Message) -> Result<()>
where
    T: AsyncTransport + Sync,
    T::Error: Display,
{
    transport
        .send(email)
        .await
        .map_err(|e| Error::Send(e.to_string()))?;
    Ok(())
}

/// Sends mail through one SMTP account, one transport per call.
pub struct MailSender {
    config: AccountConfig,
    timeout: Duration,
}

impl MailSender {
    #[must_use]
    pub const fn new(config: AccountConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Validate, build and send `msg`. No retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed message,
    /// [`Error::Connection`] if the transport cannot be configured,
    /// [`Error::Send`] if delivery fails, or [`Error::Timeout`].
    pub async fn send_message(&self, msg: &OutgoingMessage) -> Result<()> {
        let email = build_message(msg, &self.config.auth.user)?;
        let transport = self.transport()?;

        debug!(
            "Sending message to {} recipient(s) via {}",
            msg.to.len() + msg.cc.len() + msg.bcc.len(),
            self.config.address()
        );

        tokio::time::timeout(self.timeout, deliver(&transport, email))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(self.timeout.as_secs())))?;

        info!("Message sent via {}", self.config.host);
        Ok(())
    }

    fn tls_parameters(&self) -> Result<TlsParameters> {
        if self.config.accept_invalid_certs {
            warn!(
                "Certificate verification disabled for SMTP host {}",
                self.config.host
            );
        }
        TlsParameters::builder(self.config.host.clone())
            .dangerous_accept_invalid_certs(self.config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Connection(format!("TLS setup failed: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let tls = match self.config.security() {
            Security::Tls => Tls::Wrapper(self.tls_parameters()?),
            Security::Starttls => Tls::Required(self.tls_parameters()?),
            Security::Plain => Tls::None,
        };

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.config.host.clone())
                .port(self.config.port)
                .tls(tls)
                .credentials(Credentials::new(
                    self.config.auth.user.clone(),
                    self.config.auth.pass.clone(),
                ))
                .timeout(Some(self.timeout))
                .build(),
        )
    }
}
