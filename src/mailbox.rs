//! Mailbox hierarchy
//!
//! IMAP `LIST` reports mailboxes as flat, delimiter-separated paths.
//! [`MailboxTree`] rebuilds the hierarchy under a synthetic root and
//! [`MailboxTree::flatten`] turns it back into the ordered list the API
//! returns: pre-order, parents before their children, siblings in the
//! order the server reported them.
//!
//! Servers send names in modified UTF-7 (RFC 3501 section 5.1.3).
//! `name` is decoded for display; `path` stays exactly as listed so it
//! can be handed back to SELECT.

use serde::Serialize;
use utf7_imap::decode_utf7_imap;

/// A mailbox as returned by the API.
///
/// # Examples
///
/// ```
/// use mailbag::MailboxTree;
///
/// let mut tree = MailboxTree::new();
/// tree.insert("Inbox", Some("/"));
/// tree.insert("Inbox/Work", Some("/"));
/// tree.insert("Sent", Some("/"));
///
/// let paths: Vec<_> = tree.flatten().into_iter().map(|m| m.path).collect();
/// assert_eq!(paths, ["Inbox", "Inbox/Work", "Sent"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    /// Last path segment, decoded for display.
    pub name: String,
    /// Fully qualified path as the server listed it, usable in SELECT.
    pub path: String,
}

#[derive(Debug)]
struct Node {
    name: String,
    path: String,
    children: Vec<usize>,
}

/// Child-list arena holding a mailbox hierarchy. Index 0 is the
/// synthetic root.
#[derive(Debug)]
pub struct MailboxTree {
    nodes: Vec<Node>,
}

impl Default for MailboxTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxTree {
    /// An empty tree: just the synthetic root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                path: String::new(),
                children: Vec::new(),
            }],
        }
    }

    /// Insert a mailbox path reported by the server.
    ///
    /// Intermediate levels that were not listed on their own are
    /// created on the way down. Inserting a path twice is a no-op.
    pub fn insert(&mut self, path: &str, delimiter: Option<&str>) {
        let segments: Vec<&str> = match delimiter {
            Some(delim) if !delim.is_empty() => path.split(delim).collect(),
            _ => vec![path],
        };

        let mut parent = 0;
        let mut full_path = String::new();
        for (depth, segment) in segments.iter().enumerate() {
            if depth > 0 {
                full_path.push_str(delimiter.unwrap_or_default());
            }
            full_path.push_str(segment);

            parent = match self.child_by_path(parent, &full_path) {
                Some(existing) => existing,
                None => self.push_child(parent, segment, &full_path),
            };
        }
    }

    fn child_by_path(&self, parent: usize, path: &str) -> Option<usize> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].path == path)
    }

    fn push_child(&mut self, parent: usize, name: &str, path: &str) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: decode_utf7_imap(name.to_string()),
            path: path.to_string(),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Number of mailboxes in the tree, root excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-order depth-first walk, root excluded.
    #[must_use]
    pub fn flatten(&self) -> Vec<Mailbox> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<usize> = self.nodes[0].children.iter().rev().copied().collect();

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            out.push(Mailbox {
                name: node.name.clone(),
                path: node.path.clone(),
            });
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}
