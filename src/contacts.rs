//! Contact list storage
//!
//! Contacts live in a single JSON array file. Reads go straight to the
//! file; writes replace it atomically (temp file + rename) while
//! holding a lock shared by every clone of the store.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A stored contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Any other fields the client sent, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields for a contact that does not exist yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewContact {
    fn into_contact(self) -> Result<Contact> {
        let name = required(self.name, "name")?;
        let email = required(self.email, "email")?;
        let mut extra = self.extra;
        // The id is ours to assign.
        extra.remove("id");
        extra.remove("_id");

        Ok(Contact {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            extra,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("Contact {field} is required")))
}

/// Handle on the contact file. Clones share the same write lock.
#[derive(Debug, Clone)]
pub struct ContactStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ContactStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All contacts, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file exists but cannot be read
    /// or parsed.
    pub async fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.read_all().await
    }

    /// Validate `fields`, assign a fresh id and store the contact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `name` or `email` is missing or
    /// blank, or [`Error::Storage`] if the file cannot be updated.
    pub async fn add_contact(&self, fields: NewContact) -> Result<Contact> {
        let contact = fields.into_contact()?;

        let _guard = self.lock.lock().await;
        let mut contacts = self.read_all().await?;
        contacts.push(contact.clone());
        self.write_all(&contacts).await?;

        info!("Added contact {}", contact.id);
        Ok(contact)
    }

    /// Remove the contact with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContactNotFound`] if no contact has that id, or
    /// [`Error::Storage`] if the file cannot be updated.
    pub async fn delete_contact(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut contacts = self.read_all().await?;

        let before = contacts.len();
        contacts.retain(|c| c.id != id);
        if contacts.len() == before {
            return Err(Error::ContactNotFound(id.to_string()));
        }

        self.write_all(&contacts).await?;
        info!("Deleted contact {}", id);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Contact>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist yet", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&raw)
            .map_err(|e| Error::Storage(format!("Corrupt {}: {e}", self.path.display())))
    }

    async fn write_all(&self, contacts: &[Contact]) -> Result<()> {
        let json = serde_json::to_vec_pretty(contacts)
            .map_err(|e| Error::Storage(format!("Cannot encode contacts: {e}")))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
