//! IMAP mail reader

use crate::config::AccountConfig;
use crate::connection::{self, ImapSession};
use crate::error::{Error, Result};
use crate::mailbox::{Mailbox, MailboxTree};
use crate::message::{self, MessageSummary};
use futures::{StreamExt, TryStreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads one IMAP account.
///
/// Every method opens its own session and logs out before returning,
/// whether the operation succeeded or not. Nothing is cached between
/// calls, so a `MailReader` is cheap to build per request.
pub struct MailReader {
    config: AccountConfig,
    timeout: Duration,
}

impl MailReader {
    #[must_use]
    pub const fn new(config: AccountConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// List every mailbox, flattened in pre-order.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or LIST command fails.
    pub async fn list_mailboxes(&self) -> Result<Vec<Mailbox>> {
        self.bounded(async {
            let mut session = connection::connect(&self.config).await?;
            let result = list_mailboxes_in(&mut session).await;
            connection::logout(session).await;
            result
        })
        .await
    }

    /// Summaries of every message in `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxNotFound`] if the mailbox does not exist,
    /// or another error if the connection or FETCH fails.
    pub async fn list_messages(&self, mailbox: &str) -> Result<Vec<MessageSummary>> {
        self.bounded(async {
            let mut session = connection::connect(&self.config).await?;
            let result = list_messages_in(&mut session, mailbox).await;
            connection::logout(session).await;
            result
        })
        .await
    }

    /// Plain-text body of the message with UID `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if no message has that UID,
    /// [`Error::Parse`] if the body cannot be parsed, or another error if
    /// the connection, SELECT or FETCH fails.
    pub async fn get_message_body(&self, mailbox: &str, uid: u32) -> Result<String> {
        self.bounded(async {
            let mut session = connection::connect(&self.config).await?;
            let result = get_message_body_in(&mut session, mailbox, uid).await;
            connection::logout(session).await;
            result
        })
        .await
    }

    /// Delete the message with UID `uid` from `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if no message has that UID
    /// (including one that was already deleted), or another error if the
    /// connection, STORE or EXPUNGE fails.
    pub async fn delete_message(&self, mailbox: &str, uid: u32) -> Result<()> {
        self.bounded(async {
            let mut session = connection::connect(&self.config).await?;
            let result = delete_message_in(&mut session, mailbox, uid).await;
            connection::logout(session).await;
            result
        })
        .await
    }

    // -- private helpers --

    /// Run one connect/operate/logout exchange under the configured
    /// timeout. A timed-out session is dropped, which closes the socket.
    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, work)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(self.timeout.as_secs())))
    }
}

async fn list_mailboxes_in(session: &mut ImapSession) -> Result<Vec<Mailbox>> {
    let mut tree = MailboxTree::new();
    let mut names = session
        .list(Some(""), Some("*"))
        .await
        .map_err(|e| Error::Imap(format!("List mailboxes failed: {e}")))?;

    while let Some(item) = names.next().await {
        match item {
            Ok(name) => tree.insert(name.name(), name.delimiter()),
            Err(e) => warn!("Skipping unreadable LIST entry: {}", e),
        }
    }
    drop(names);

    info!("Listed {} mailboxes", tree.len());
    Ok(tree.flatten())
}

async fn list_messages_in(session: &mut ImapSession, mailbox: &str) -> Result<Vec<MessageSummary>> {
    let exists = connection::select(session, mailbox).await?;
    if exists == 0 {
        debug!("{} is empty", mailbox);
        return Ok(vec![]);
    }

    let fetches: Vec<_> = session
        .fetch("1:*", "(UID ENVELOPE)")
        .await
        .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

    let summaries: Vec<MessageSummary> = fetches
        .iter()
        .filter_map(|fetch| match fetch.uid {
            Some(uid) => Some(MessageSummary::from_envelope(uid, fetch.envelope())),
            None => {
                warn!("Message {} in {} came back without a UID", fetch.message, mailbox);
                None
            }
        })
        .collect();

    info!("Listed {} messages in {}", summaries.len(), mailbox);
    Ok(summaries)
}

async fn get_message_body_in(session: &mut ImapSession, mailbox: &str, uid: u32) -> Result<String> {
    connection::select(session, mailbox).await?;

    let fetches: Vec<_> = session
        .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
        .await
        .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

    // Servers may push unsolicited FETCH data for other messages;
    // only the requested UID counts.
    let body = fetches
        .iter()
        .filter(|fetch| fetch.uid == Some(uid))
        .find_map(|fetch| fetch.body())
        .ok_or_else(|| Error::MessageNotFound {
            mailbox: mailbox.to_string(),
            uid,
        })?;

    message::body_text(uid, body)
}

async fn delete_message_in(session: &mut ImapSession, mailbox: &str, uid: u32) -> Result<()> {
    connection::select(session, mailbox).await?;
    let uid_set = uid.to_string();

    let present: Vec<_> = session
        .uid_fetch(&uid_set, "UID")
        .await
        .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
        .try_collect()
        .await
        .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;
    if !present.iter().any(|fetch| fetch.uid == Some(uid)) {
        return Err(Error::MessageNotFound {
            mailbox: mailbox.to_string(),
            uid,
        });
    }

    session
        .uid_store(&uid_set, "+FLAGS.SILENT (\\Deleted)")
        .await
        .map_err(|e| Error::Imap(format!("Store failed: {e}")))?
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| Error::Imap(format!("Store error: {e}")))?;

    let uidplus = session
        .capabilities()
        .await
        .map_err(|e| Error::Imap(format!("Capability failed: {e}")))?
        .has_str("UIDPLUS");

    // Without UIDPLUS the only way out is a full EXPUNGE, which also
    // removes anything else already flagged \Deleted in this mailbox.
    if uidplus {
        session
            .uid_expunge(&uid_set)
            .await
            .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| Error::Imap(format!("Expunge error: {e}")))?;
    } else {
        session
            .expunge()
            .await
            .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| Error::Imap(format!("Expunge error: {e}")))?;
    }

    info!("Deleted UID {} from {}", uid, mailbox);
    Ok(())
}
