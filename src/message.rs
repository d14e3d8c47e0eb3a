//! Message summaries and bodies

use crate::error::{Error, Result};
use async_imap::imap_proto::types::{Address, Envelope};
use chrono::{DateTime, FixedOffset};
use email_extract::parse_email;
use serde::Serialize;

/// One line of a mailbox listing, built from the IMAP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Server-assigned UID, as a string.
    pub id: String,
    /// Envelope date; `None` when the server's date does not parse.
    pub date: Option<DateTime<FixedOffset>>,
    /// First sender address (`mailbox@host`).
    pub from: String,
    pub subject: String,
}

impl MessageSummary {
    pub(crate) fn from_envelope(uid: u32, envelope: Option<&Envelope<'_>>) -> Self {
        let date = envelope
            .and_then(|env| env.date.as_deref())
            .and_then(parse_envelope_date);
        let from = envelope
            .and_then(|env| env.from.as_ref())
            .and_then(|addrs| addrs.first())
            .map(address_string)
            .unwrap_or_default();
        let subject = envelope
            .and_then(|env| env.subject.as_deref())
            .map(decode_header_words)
            .unwrap_or_default();

        Self {
            id: uid.to_string(),
            date,
            from,
            subject,
        }
    }
}

/// Decode RFC 2047 encoded words (`=?UTF-8?B?...?=`). Undecodable
/// input is returned as-is.
fn decode_header_words(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let header = format!("X: {text}");
    mailparse::parse_header(header.as_bytes())
        .map_or_else(|_| text.into_owned(), |(header, _)| header.get_value())
}

fn address_string(addr: &Address<'_>) -> String {
    join_address(addr.mailbox.as_deref(), addr.host.as_deref())
}

/// `mailbox@host`, or whichever half is present.
fn join_address(mailbox: Option<&[u8]>, host: Option<&[u8]>) -> String {
    let mailbox = mailbox.map(String::from_utf8_lossy).unwrap_or_default();
    let host = host.map(String::from_utf8_lossy).unwrap_or_default();
    match (mailbox.is_empty(), host.is_empty()) {
        (false, false) => format!("{mailbox}@{host}"),
        (false, true) => mailbox.into_owned(),
        (true, _) => host.into_owned(),
    }
}

/// Parse an RFC 2822 envelope date, ignoring a trailing `(comment)`.
fn parse_envelope_date(raw: &[u8]) -> Option<DateTime<FixedOffset>> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let text = match text.rfind('(') {
        Some(pos) if text.ends_with(')') => text[..pos].trim_end(),
        _ => text,
    };
    DateTime::parse_from_rfc2822(text).ok()
}

/// Parse a raw RFC 2822 message and return its best plain-text body.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the message cannot be parsed.
pub fn body_text(uid: u32, raw: &[u8]) -> Result<String> {
    let email = parse_email(uid, raw).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(email.body.best_text().to_string())
}
