//! Error types for mailbag

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("Message {uid} not found in {mailbox}")]
    MessageNotFound { mailbox: String, uid: u32 },

    #[error("Send error: {0}")]
    Send(String),

    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Contact storage error: {0}")]
    Storage(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable, machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::MailboxNotFound(_) => "mailbox_not_found",
            Self::MessageNotFound { .. } => "message_not_found",
            Self::Send(_) => "send",
            Self::ContactNotFound(_) => "contact_not_found",
            Self::Validation(_) => "validation",
            Self::Imap(_) => "imap",
            Self::Parse(_) => "parse",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
