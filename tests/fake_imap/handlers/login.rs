//! LOGIN command handler.
//!
//! Credentials arrive as two (usually quoted) strings over the already
//! encrypted connection. A wrong pair gets a tagged `NO` and the
//! connection stays open, as on real servers.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Pull user and password out of a raw `TAG LOGIN user pass` line.
pub fn login_arguments(line: &str) -> Option<(String, String)> {
    let mut words = line.split_whitespace().skip(2);
    let unquote = |w: &str| w.trim_matches('"').replace("\\\"", "\"").replace("\\\\", "\\");
    let user = unquote(words.next()?);
    let pass = unquote(words.next()?);
    Some((user, pass))
}

/// Handle the LOGIN command. Returns `false` if the stream broke.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    given: Option<(String, String)>,
    expected: Option<&(String, String)>,
    stream: &mut BufReader<S>,
) -> bool {
    let accepted = expected.is_none_or(|expected| given.as_ref() == Some(expected));
    let resp = if accepted {
        format!("{tag} OK LOGIN completed\r\n")
    } else {
        format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
    };
    write_line(stream, &resp).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    /// Run the handler over an in-memory duplex stream and return what
    /// was written to the client.
    async fn run(tag: &str, line: &str, expected: Option<&(String, String)>) -> String {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        assert!(handle_login(tag, login_arguments(line), expected, &mut stream).await);
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn parses_quoted_arguments() {
        assert_eq!(
            login_arguments("A1 LOGIN \"me@example.com\" \"secret\""),
            Some(("me@example.com".to_string(), "secret".to_string()))
        );
        assert_eq!(login_arguments("A1 LOGIN"), None);
    }

    #[tokio::test]
    async fn anything_goes_without_expected_credentials() {
        let output = run("A0001", "A0001 LOGIN \"u\" \"p\"", None).await;
        assert_eq!(output, "A0001 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn wrong_password_is_refused() {
        let expected = ("u".to_string(), "right".to_string());
        let output = run("TAG42", "TAG42 LOGIN \"u\" \"wrong\"", Some(&expected)).await;
        assert!(output.starts_with("TAG42 NO"));
    }

    #[tokio::test]
    async fn matching_credentials_are_accepted() {
        let expected = ("u".to_string(), "right".to_string());
        let output = run("A2", "A2 LOGIN u right", Some(&expected)).await;
        assert!(output.starts_with("A2 OK"));
    }
}
