//! Drums: file-backed inter-agent inboxes.
//!
//! Each recipient has a directory `<root>/drums/<address>/`; every message is
//! one JSON file written to a temp name and renamed into place, so readers
//! never observe partial messages. Delivery is at-least-once.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::short_token;
use crate::workspace::write_atomic;

#[derive(Debug, thiserror::Error)]
pub enum DrumsError {
    #[error("invalid drums address {0:?}")]
    InvalidAddress(String),

    #[error("no message {id} in inbox {address}")]
    NotFound { address: String, id: String },

    #[error("corrupt message {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DrumsError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub to: String,
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    pub fn new(to: &str, from: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", short_token(8)),
            to: normalize_address(to),
            from: normalize_address(from),
            subject: subject.into(),
            body: body.into(),
            created_at: Utc::now(),
            read: false,
        }
    }

    fn file_name(&self) -> String {
        format!("{:013}-{}.json", self.created_at.timestamp_millis(), self.id)
    }
}

/// `warchief/` and `warchief` are the same recipient.
pub fn normalize_address(address: &str) -> String {
    address.trim().trim_end_matches('/').to_string()
}

/// Directory name for an address: path separators become `__`.
pub fn address_dir_name(address: &str) -> Result<String> {
    let normalized = normalize_address(address);
    let valid = !normalized.is_empty()
        && normalized
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if !valid || normalized.contains(char::is_whitespace) {
        return Err(DrumsError::InvalidAddress(address.to_string()));
    }
    Ok(normalized.replace('/', "__"))
}

/// The drums root of an encampment.
#[derive(Debug, Clone)]
pub struct Drums {
    dir: PathBuf,
}

impl Drums {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn inbox_dir(&self, address: &str) -> Result<PathBuf> {
        Ok(self.dir.join(address_dir_name(address)?))
    }

    /// Deliver a message; returns its id.
    pub fn send(&self, message: &Message) -> Result<String> {
        let inbox = self.inbox_dir(&message.to)?;
        let json = serde_json::to_vec_pretty(message).map_err(std::io::Error::other)?;
        write_atomic(&inbox.join(message.file_name()), &json)?;
        tracing::debug!(to = %message.to, from = %message.from, subject = %message.subject, "drum sent");
        Ok(message.id.clone())
    }

    /// Messages for `address` in FIFO order.
    pub fn inbox(&self, address: &str, unread_only: bool) -> Result<Vec<Message>> {
        let mut out = self
            .entries(address)?
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| !unread_only || !m.read)
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn unread_count(&self, address: &str) -> Result<usize> {
        Ok(self.inbox(address, true)?.len())
    }

    /// Fetch a message and mark it read.
    pub fn read(&self, address: &str, id: &str) -> Result<Message> {
        let mut message = self.find(address, id)?.1;
        self.mark_read(address, id)?;
        message.read = true;
        Ok(message)
    }

    /// Idempotent: marking an already-read message is a no-op.
    pub fn mark_read(&self, address: &str, id: &str) -> Result<()> {
        let (path, mut message) = self.find(address, id)?;
        if message.read {
            return Ok(());
        }
        message.read = true;
        let json = serde_json::to_vec_pretty(&message).map_err(std::io::Error::other)?;
        write_atomic(&path, &json)?;
        Ok(())
    }

    fn find(&self, address: &str, id: &str) -> Result<(PathBuf, Message)> {
        self.entries(address)?
            .into_iter()
            .find(|(_, m)| m.id == id)
            .ok_or_else(|| DrumsError::NotFound {
                address: normalize_address(address),
                id: id.to_string(),
            })
    }

    fn entries(&self, address: &str) -> Result<Vec<(PathBuf, Message)>> {
        let inbox = self.inbox_dir(address)?;
        let read_dir = match std::fs::read_dir(&inbox) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            let is_message = path.extension().is_some_and(|e| e == "json")
                && !path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if !is_message {
                continue;
            }
            out.push((path.clone(), read_message(&path)?));
        }
        Ok(out)
    }
}

fn read_message(path: &Path) -> Result<Message> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| DrumsError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
