//! MailBag mail backend
//!
//! A small REST backend for a web mail client. It reads one IMAP
//! account (mailbox tree, message summaries, message bodies, deletion),
//! sends mail through one SMTP account, and keeps a contact list in a
//! JSON file.
//!
//! Every IMAP operation opens its own session and logs out before
//! returning; nothing is cached between requests. TLS certificate
//! checks are on unless an account opts out with
//! `accept_invalid_certs`.
//!
//! The HTTP surface lives in [`router`]; the workers it drives
//! ([`MailReader`], [`MailSender`], [`ContactStore`]) are usable on
//! their own.

mod config;
mod connection;
mod contacts;
mod error;
mod gateway;
mod mailbox;
mod message;
mod reader;
mod sender;

pub use config::{AccountConfig, Auth, Security, ServerConfig};
pub use contacts::{Contact, ContactStore, NewContact};
pub use error::{Error, Result};
pub use gateway::{ApiError, AppState, router};
pub use mailbox::{Mailbox, MailboxTree};
pub use message::{MessageSummary, body_text};
pub use reader::MailReader;
pub use sender::{MailSender, OutgoingMessage, build_message, deliver};
