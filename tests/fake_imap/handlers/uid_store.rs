//! UID STORE command handler.
//!
//! Only the `\Deleted` flag is tracked. Supports:
//!
//! - `+FLAGS (...)` -- add flags
//! - `-FLAGS (...)` -- remove flags
//! - `FLAGS (...)` -- replace flags
//!
//! Without `.SILENT` the server answers `* N FETCH (UID u FLAGS (...))`
//! per modified message, then the tagged OK.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use crate::fake_imap::sequence;
use imap_codec::imap_types::flag::{Flag, StoreResponse, StoreType};
use imap_codec::imap_types::sequence::SequenceSet;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Parsed STORE command arguments.
pub struct StoreArgs<'a> {
    pub sequence_set: &'a SequenceSet,
    pub kind: &'a StoreType,
    pub response: &'a StoreResponse,
    pub flags: &'a [Flag<'a>],
}

/// Handle the UID STORE command. Modifies flags on matching emails.
pub async fn handle_uid_store<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &StoreArgs<'_>,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let wants_deleted = args.flags.iter().any(|f| matches!(f, Flag::Deleted));

    // Mutate flags under lock (no await inside).
    let results = {
        let mut mb = mailbox.lock().unwrap();
        mb.get_folder_mut(folder_name).map(|folder| {
            let max_uid = folder.emails.iter().map(|e| e.uid).max().unwrap_or(0);
            let mut results: Vec<(usize, u32, bool)> = Vec::new();

            for (idx, email) in folder.emails.iter_mut().enumerate() {
                if !sequence::contains(args.sequence_set, email.uid, max_uid) {
                    continue;
                }
                match args.kind {
                    StoreType::Add => email.deleted |= wants_deleted,
                    StoreType::Remove => email.deleted &= !wants_deleted,
                    StoreType::Replace => email.deleted = wants_deleted,
                }
                results.push((idx + 1, email.uid, email.deleted));
            }
            results
        })
    };
    let Some(results) = results else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    // Send FETCH responses outside the lock.
    if !matches!(args.response, StoreResponse::Silent) {
        for (seq, uid, deleted) in &results {
            let flags = if *deleted { "\\Deleted" } else { "" };
            let line = format!("* {seq} FETCH (UID {uid} FLAGS ({flags}))\r\n");
            if write_line(stream, &line).await.is_err() {
                return;
            }
        }
    }

    let resp = format!("{tag} OK STORE completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use crate::fake_imap::sequence::single;
    use tokio::io::BufReader;

    fn make_raw_email() -> Vec<u8> {
        b"From: a@b.com\r\nSubject: Test\r\n\r\nBody".to_vec()
    }

    async fn run_store(
        tag: &str,
        seq: &SequenceSet,
        kind: &StoreType,
        response: &StoreResponse,
        mailbox: &Mutex<Mailbox>,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let flags = [Flag::Deleted];
        let args = StoreArgs {
            sequence_set: seq,
            kind,
            response,
            flags: &flags,
        };
        handle_uid_store(tag, &args, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn inbox_with(uids: &[u32]) -> Mutex<Mailbox> {
        let raw = make_raw_email();
        let builder = uids
            .iter()
            .fold(MailboxBuilder::new().folder("INBOX"), |b, uid| b.email(*uid, &raw));
        Mutex::new(builder.build())
    }

    fn deleted(mb: &Mutex<Mailbox>) -> Vec<bool> {
        mb.lock().unwrap().get_folder("INBOX").unwrap().emails.iter().map(|e| e.deleted).collect()
    }

    #[tokio::test]
    async fn add_deleted_flag() {
        let mb = inbox_with(&[1, 2]);

        let output = run_store(
            "A1",
            &single(2),
            &StoreType::Add,
            &StoreResponse::Answer,
            &mb,
            Some("INBOX"),
        )
        .await;

        assert!(output.contains("* 2 FETCH (UID 2 FLAGS (\\Deleted))"));
        assert!(output.contains("A1 OK STORE completed"));
        assert_eq!(deleted(&mb), [false, true]);
    }

    #[tokio::test]
    async fn silent_store_sends_only_ok() {
        let mb = inbox_with(&[7]);

        let output = run_store(
            "A1",
            &single(7),
            &StoreType::Add,
            &StoreResponse::Silent,
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(output, "A1 OK STORE completed\r\n");
        assert_eq!(deleted(&mb), [true]);
    }

    #[tokio::test]
    async fn remove_deleted_flag() {
        let mb = inbox_with(&[1]);
        mb.lock().unwrap().get_folder_mut("INBOX").unwrap().emails[0].deleted = true;

        let _output = run_store(
            "A1",
            &single(1),
            &StoreType::Remove,
            &StoreResponse::Answer,
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(deleted(&mb), [false]);
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mb = inbox_with(&[]);

        let output = run_store(
            "A1",
            &single(1),
            &StoreType::Add,
            &StoreResponse::Answer,
            &mb,
            None,
        )
        .await;

        assert!(output.contains("A1 BAD No folder selected"));
    }
}
