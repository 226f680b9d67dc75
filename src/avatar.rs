//! Avatar storage seam.
//!
//! The engine persists only the opaque reference string the storage backend
//! returns; whether that points at local disk or a CDN object is the
//! backend's business.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

pub trait AvatarStorage: Send + Sync {
    /// Store the uploaded bytes and return an opaque reference to persist on
    /// the profile.
    fn store(&self, account_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Writes avatars under a root directory; the returned reference is the
/// path relative to that root.
#[derive(Clone, Debug)]
pub struct LocalAvatarStorage {
    root: PathBuf,
}

impl LocalAvatarStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl AvatarStorage for LocalAvatarStorage {
    fn store(&self, account_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<String> {
        // Ignore any client-supplied directory components.
        let file_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("avatar");
        let relative = format!("avatars/{account_id}/{file_name}");
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).context("failed to create avatar directory")?;
        }
        fs::write(&target, bytes).context("failed to write avatar file")?;
        Ok(relative)
    }
}
