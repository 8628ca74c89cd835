use async_trait::async_trait;
use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt::Display;
use std::hash::Hash;
use std::path::{Path, PathBuf};

/// Sentinel meaning "no value stored" for string session fields.
pub const NO_STRING_VALUE: &str = "bnc_no_value";

/// Source of the identifiers every request payload carries.
///
/// Implementations answer synchronously. Requests read them once, at
/// construction time.
pub trait SessionProvider {
    /// Identity assigned to this install by the server.
    fn identity_id(&self) -> &str;
    /// Device fingerprint assigned by the server.
    fn device_fingerprint_id(&self) -> &str;
    /// Current session.
    fn session_id(&self) -> &str;
    /// Click that opened the current session, or [`Self::no_value`].
    fn link_click_id(&self) -> &str;

    /// Sentinel compared against to decide whether a field is set.
    fn no_value(&self) -> &str {
        NO_STRING_VALUE
    }

    /// Whether a link click is associated with the current session.
    fn has_link_click_id(&self) -> bool {
        self.link_click_id() != self.no_value()
    }
}

impl<T: SessionProvider + ?Sized> SessionProvider for &T {
    fn identity_id(&self) -> &str {
        (**self).identity_id()
    }
    fn device_fingerprint_id(&self) -> &str {
        (**self).device_fingerprint_id()
    }
    fn session_id(&self) -> &str {
        (**self).session_id()
    }
    fn link_click_id(&self) -> &str {
        (**self).link_click_id()
    }
    fn no_value(&self) -> &str {
        (**self).no_value()
    }
}

/// Snapshot of the session identifiers, as persisted in a [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionData {
    /// Identity id
    pub identity_id: String,
    /// Device fingerprint id
    pub device_fingerprint_id: String,
    /// Session id
    pub session_id: String,
    /// Link click id
    pub link_click_id: String,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            identity_id: NO_STRING_VALUE.into(),
            device_fingerprint_id: NO_STRING_VALUE.into(),
            session_id: NO_STRING_VALUE.into(),
            link_click_id: NO_STRING_VALUE.into(),
        }
    }
}

impl SessionData {
    /// Session with no link click.
    pub fn new(
        identity_id: impl Into<String>,
        device_fingerprint_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            identity_id: identity_id.into(),
            device_fingerprint_id: device_fingerprint_id.into(),
            session_id: session_id.into(),
            link_click_id: NO_STRING_VALUE.into(),
        }
    }

    /// Attach a link click, or clear it with `None`.
    pub fn with_link_click_id(mut self, link_click_id: Option<impl Into<String>>) -> Self {
        self.link_click_id = match link_click_id {
            Some(id) => id.into(),
            None => NO_STRING_VALUE.into(),
        };
        self
    }
}

impl SessionProvider for SessionData {
    fn identity_id(&self) -> &str {
        &self.identity_id
    }
    fn device_fingerprint_id(&self) -> &str {
        &self.device_fingerprint_id
    }
    fn session_id(&self) -> &str {
        &self.session_id
    }
    fn link_click_id(&self) -> &str {
        &self.link_click_id
    }
}

/// Errors emitted by session stores.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum SessionStoreError {
    /// Filesystem or I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(attrib::session_store::io))]
    Io(#[from] std::io::Error),
    /// Serialization error (e.g., JSON)
    #[error("serialization error: {0}")]
    #[diagnostic(code(attrib::session_store::serde))]
    Serde(#[from] serde_json::Error),
    /// Any other error from a backend implementation
    #[error(transparent)]
    #[diagnostic(code(attrib::session_store::other))]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

/// Pluggable storage for session records.
#[async_trait]
pub trait SessionStore<K, T>: Send + Sync
where
    K: Eq + Hash,
    T: Clone,
{
    /// Get the current session if present.
    async fn get(&self, key: &K) -> Option<T>;
    /// Persist the given session.
    async fn set(&self, key: K, session: T) -> Result<(), SessionStoreError>;
    /// Delete the given session.
    async fn del(&self, key: &K) -> Result<(), SessionStoreError>;
}

/// File-backed session store using a JSON object keyed by `K`'s display form.
///
/// NOT secure, only suitable for development.
///
/// Example
/// ```ignore
/// use attrib_common::session::{FileSessionStore, SessionStore, SessionData};
/// let store = FileSessionStore::open("/tmp/attrib-session.json")?;
/// let session: Option<SessionData> = store.get(&"key_live_123".to_string()).await;
/// ```
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    /// Path to the JSON file.
    pub path: PathBuf,
}

impl FileSessionStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            std::fs::write(path, b"{}")?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read_all(&self) -> Result<Value, SessionStoreError> {
        let file = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&file)?)
    }
}

#[async_trait]
impl<
    K: Eq + Hash + Display + Send + Sync + 'static,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
> SessionStore<K, T> for FileSessionStore
{
    async fn get(&self, key: &K) -> Option<T> {
        let store = self.read_all().ok()?;
        let session = store.get(key.to_string())?;
        serde_json::from_value(session.clone()).ok()
    }

    async fn set(&self, key: K, session: T) -> Result<(), SessionStoreError> {
        let mut store = self.read_all()?;
        if let Some(store) = store.as_object_mut() {
            store.insert(key.to_string(), serde_json::to_value(session)?);
            std::fs::write(&self.path, serde_json::to_string_pretty(&store)?)?;
            Ok(())
        } else {
            Err(SessionStoreError::Other("invalid store".into()))
        }
    }

    async fn del(&self, key: &K) -> Result<(), SessionStoreError> {
        let mut store = self.read_all()?;
        if let Some(store) = store.as_object_mut() {
            store.remove(&key.to_string());
            std::fs::write(&self.path, serde_json::to_string_pretty(&store)?)?;
            Ok(())
        } else {
            Err(SessionStoreError::Other("invalid store".into()))
        }
    }
}
