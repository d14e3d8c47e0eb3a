//! Shared IMAP connection and TLS helpers
//!
//! Provides the low-level `connect()`, `select()` and `logout()`
//! functions used by every `MailReader` operation.

use crate::config::{AccountConfig, Security};
use crate::error::{Error, Result};
use async_imap::Session;
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// Any byte stream an IMAP session can run over: plain TCP or TLS.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug> ImapStream for T {}

/// An IMAP session over a plain or TLS-wrapped stream.
pub type ImapSession = Session<Compat<Box<dyn ImapStream>>>;

/// Build the rustls client configuration for one connection attempt.
///
/// Certificates are verified against the Mozilla root set unless the
/// account opted into `accept_invalid_certs`.
pub fn tls_client_config(accept_invalid_certs: bool) -> Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Connection(format!("TLS setup failed: {e}")))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(config)
}

async fn tls_wrap(config: &AccountConfig, tcp_stream: TcpStream) -> Result<Box<dyn ImapStream>> {
    if config.accept_invalid_certs {
        warn!(
            "Certificate verification disabled for IMAP host {}",
            config.host
        );
    }
    let connector = TlsConnector::from(Arc::new(tls_client_config(
        config.accept_invalid_certs,
    )?));
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Connection(format!("Invalid server name: {e}")))?;

    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| Error::Connection(format!("TLS handshake failed: {e}")))?;
    Ok(Box::new(tls_stream))
}

/// Open a fresh IMAP session.
///
/// Connects to `config.host:config.port` via TCP, secures the stream
/// as configured (implicit TLS, STARTTLS upgrade, or nothing) and
/// logs in.
pub async fn connect(config: &AccountConfig) -> Result<ImapSession> {
    let addr = config.address();
    let security = config.security();
    debug!("Connecting to IMAP server at {} ({:?})", addr, security);

    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Connection(format!("Cannot reach {addr}: {e}")))?;

    let stream: Box<dyn ImapStream> = match security {
        Security::Plain => Box::new(tcp_stream),
        Security::Tls => tls_wrap(config, tcp_stream).await?,
        Security::Starttls => {
            let mut client = async_imap::Client::new(tcp_stream.compat());
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Connection(format!("STARTTLS failed: {e}")))?;
            let inner = client.into_inner().into_inner();
            tls_wrap(config, inner).await?
        }
    };

    let client = async_imap::Client::new(stream.compat());
    let session = client
        .login(&config.auth.user, &config.auth.pass)
        .await
        .map_err(|(e, _)| Error::Connection(format!("Login failed: {e}")))?;

    info!("Connected to IMAP server {}", addr);
    Ok(session)
}

/// SELECT a mailbox on an existing session, returning its message count.
///
/// A tagged `NO` is how servers refuse unknown mailboxes, so it maps
/// to [`Error::MailboxNotFound`].
pub async fn select(session: &mut ImapSession, mailbox: &str) -> Result<u32> {
    match session.select(mailbox).await {
        Ok(selected) => Ok(selected.exists),
        Err(async_imap::error::Error::No(reason)) => {
            debug!("SELECT {} refused: {}", mailbox, reason);
            Err(Error::MailboxNotFound(mailbox.to_string()))
        }
        Err(e) => Err(Error::Imap(format!("Failed to select {mailbox}: {e}"))),
    }
}

/// LOGOUT and drop the session. Failures are logged, never returned.
pub async fn logout(mut session: ImapSession) {
    if let Err(e) = session.logout().await {
        debug!("LOGOUT failed: {}", e);
    }
}

/// Certificate verifier that accepts all certificates.
///
/// Only installed for accounts that set `accept_invalid_certs`.
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
