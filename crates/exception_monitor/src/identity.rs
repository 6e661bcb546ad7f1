use std::{
    collections::HashMap,
    fs as std_fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{defaults::IDENTITY_KEY, IdentityError};

/// Durable key/value storage for the session identity.
pub trait IdentityStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, IdentityError>;
    fn store(&self, key: &str, value: &str) -> Result<(), IdentityError>;
}

/// Stores each key as a small file inside a directory.
#[derive(Clone, Debug)]
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, IdentityError> {
        if key.trim().is_empty() {
            return Err(IdentityError::EmptyKey);
        }
        Ok(self.dir.join(key))
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self, key: &str) -> Result<Option<String>, IdentityError> {
        let path = self.path_for(key)?;
        match std_fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string()).filter(|v| !v.is_empty())),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(IdentityError::Io { path, source }),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<(), IdentityError> {
        let path = self.path_for(key)?;
        std_fs::create_dir_all(&self.dir).map_err(|source| IdentityError::Io {
            path: self.dir.clone(),
            source,
        })?;
        std_fs::write(&path, value).map_err(|source| IdentityError::Io { path, source })
    }
}

/// Process-local store; identities do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    values: Mutex<HashMap<String, String>>,
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self, key: &str) -> Result<Option<String>, IdentityError> {
        if key.trim().is_empty() {
            return Err(IdentityError::EmptyKey);
        }
        Ok(self
            .values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned()))
    }

    fn store(&self, key: &str, value: &str) -> Result<(), IdentityError> {
        if key.trim().is_empty() {
            return Err(IdentityError::EmptyKey);
        }
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Returns the persisted end-user id, generating and storing a random one on first use.
pub fn load_or_create_identity(store: &dyn IdentityStore) -> Result<String, IdentityError> {
    if let Some(existing) = store.load(IDENTITY_KEY)? {
        return Ok(existing);
    }
    let id = Uuid::new_v4().to_string();
    store.store(IDENTITY_KEY, &id)?;
    debug!(enduser_id = %id, "generated new session identity");
    Ok(id)
}

/// Body of the one-shot identification request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub enduser_id: String,
    pub os_version: Option<String>,
    pub device: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
}
