//! Fake SMTP server for integration testing
//!
//! Plain-text only (no STARTTLS), so the client must be configured
//! with `"security": "plain"`. One session looks like:
//!
//! ```text
//!   Server:  220 fake.smtp ESMTP ready
//!   Client:  EHLO client
//!   Server:  250-fake.smtp
//!   Server:  250 AUTH PLAIN LOGIN
//!   Client:  AUTH PLAIN <base64>
//!   Server:  235 Authentication succeeded
//!   Client:  MAIL FROM:<me@example.com>
//!   Client:  RCPT TO:<bob@example.com>
//!   Client:  DATA
//!   Server:  354 End data with <CR><LF>.<CR><LF>
//!   Client:  <message lines> then "."
//!   Client:  QUIT
//! ```
//!
//! Every accepted message is recorded for the test to inspect.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// One message accepted by the fake server.
#[derive(Debug, Clone, Default)]
pub struct ReceivedMail {
    pub from: String,
    pub to: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct Behaviour {
    reject_recipients: bool,
}

pub struct FakeSmtpServer {
    port: u16,
    received: Arc<Mutex<Vec<ReceivedMail>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeSmtpServer {
    /// Start a server that accepts every message.
    pub async fn start() -> Self {
        Self::start_with(Behaviour::default()).await
    }

    /// Start a server that answers every `RCPT TO` with 550.
    pub async fn start_rejecting() -> Self {
        Self::start_with(Behaviour {
            reject_recipients: true,
        })
        .await
    }

    async fn start_with(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let received = received.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _addr)) = listener.accept().await else {
                        break;
                    };
                    let received = received.clone();
                    tokio::spawn(async move {
                        let _ = handle_session(stream, behaviour, &received).await;
                    });
                }
            })
        };

        Self {
            port,
            received,
            _handle: handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Messages accepted so far, in arrival order.
    pub fn received(&self) -> Vec<ReceivedMail> {
        self.received.lock().unwrap().clone()
    }
}

/// The address inside `MAIL FROM:<a@b>` / `RCPT TO:<a@b>`.
fn angle_address(arg: &str) -> String {
    let start = arg.find('<').map_or(0, |i| i + 1);
    let end = arg.rfind('>').unwrap_or(arg.len());
    arg.get(start..end).unwrap_or_default().to_string()
}

async fn handle_session(
    stream: TcpStream,
    behaviour: Behaviour,
    received: &Mutex<Vec<ReceivedMail>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut current = ReceivedMail::default();

    reply(&mut reader, "220 fake.smtp ESMTP ready\r\n").await?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));

        match verb.to_ascii_uppercase().as_str() {
            "EHLO" | "HELO" => {
                reply(&mut reader, "250-fake.smtp\r\n250 AUTH PLAIN LOGIN\r\n").await?;
            }
            "AUTH" => {
                reply(&mut reader, "235 2.7.0 Authentication succeeded\r\n").await?;
            }
            "MAIL" => {
                current = ReceivedMail {
                    from: angle_address(arg),
                    ..ReceivedMail::default()
                };
                reply(&mut reader, "250 2.1.0 OK\r\n").await?;
            }
            "RCPT" if behaviour.reject_recipients => {
                reply(&mut reader, "550 5.1.1 Mailbox unavailable\r\n").await?;
            }
            "RCPT" => {
                current.to.push(angle_address(arg));
                reply(&mut reader, "250 2.1.5 OK\r\n").await?;
            }
            "DATA" => {
                reply(&mut reader, "354 End data with <CR><LF>.<CR><LF>\r\n").await?;
                current.data = read_data(&mut reader).await?;
                received.lock().unwrap().push(std::mem::take(&mut current));
                reply(&mut reader, "250 2.0.0 Queued\r\n").await?;
            }
            "QUIT" => {
                reply(&mut reader, "221 2.0.0 Bye\r\n").await?;
                return Ok(());
            }
            _ => {
                reply(&mut reader, "250 OK\r\n").await?;
            }
        }
    }
}

/// Read message lines up to the lone `.` terminator, undoing dot
/// stuffing.
async fn read_data(reader: &mut BufReader<TcpStream>) -> std::io::Result<String> {
    let mut data = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(data);
        }
        if line.trim_end_matches(['\r', '\n']) == "." {
            return Ok(data);
        }
        data.push_str(line.strip_prefix('.').unwrap_or(&line));
    }
}

async fn reply(reader: &mut BufReader<TcpStream>, text: &str) -> std::io::Result<()> {
    reader.get_mut().write_all(text.as_bytes()).await?;
    reader.get_mut().flush().await
}
