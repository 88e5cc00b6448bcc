//! Document store abstractions and local backends.
//!
//! Settings live in two collections (`users` and `orgs`) of a key-value
//! document database. This module exposes the [`DocumentStore`] seam the
//! engine reads and writes through, along with two backends:
//!
//! - [`InMemoryDocumentStore`] for tests and ephemeral sessions
//! - [`JsonDocumentStore`], a JSON file rooted in the config directory
//!   (`~/.config/grantsync/documents.json` on most platforms)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use dirs_next::{config_dir, home_dir};
use grantsync_types::Collection;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable controlling the document file location.
pub const DOCUMENTS_PATH_ENV: &str = "GRANTSYNC_DOCUMENTS_PATH";

/// Default filename for the persisted documents.
pub const DOCUMENTS_FILE_NAME: &str = "documents.json";

/// Field map of a single document.
pub type Fields = Map<String, Value>;

/// Errors surfaced by document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Update targeted a document that does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound { collection: Collection, id: String },
    /// I/O failure while reading or writing the backing file.
    #[error("document store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Document content could not be encoded or decoded.
    #[error("document store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend refused or could not serve the request.
    #[error("document store unavailable: {message}")]
    Unavailable { message: String },
}

/// Get/update-by-id access to stored documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document. `Ok(None)` means the document does not exist.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Fields>, StoreError>;

    /// Merge `fields` into an existing document, leaving other fields intact.
    ///
    /// Fails with [`StoreError::NotFound`] when the document is absent.
    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Create or replace a whole document.
    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError>;
}

/// Fetch a document and decode it into `T`.
pub async fn get_typed<T>(store: &dyn DocumentStore, collection: Collection, id: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    match store.get(collection, id).await? {
        Some(fields) => Ok(Some(serde_json::from_value(Value::Object(fields))?)),
        None => Ok(None),
    }
}

/// Encode a partial update into a field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Unavailable {
            message: format!("expected an object of fields, got {other}"),
        }),
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DocumentFile {
    #[serde(default)]
    users: IndexMap<String, Fields>,
    #[serde(default)]
    orgs: IndexMap<String, Fields>,
}

impl DocumentFile {
    fn collection(&self, collection: Collection) -> &IndexMap<String, Fields> {
        match collection {
            Collection::Users => &self.users,
            Collection::Orgs => &self.orgs,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut IndexMap<String, Fields> {
        match collection {
            Collection::Users => &mut self.users,
            Collection::Orgs => &mut self.orgs,
        }
    }

    fn get(&self, collection: Collection, id: &str) -> Option<Fields> {
        self.collection(collection).get(id).cloned()
    }

    fn merge(&mut self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError> {
        let Some(document) = self.collection_mut(collection).get_mut(id) else {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        };
        for (key, value) in fields {
            document.insert(key, value);
        }
        Ok(())
    }

    fn replace(&mut self, collection: Collection, id: &str, fields: Fields) {
        self.collection_mut(collection).insert(id.to_string(), fields);
    }
}

/// In-memory document store primarily used for unit testing.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<DocumentFile>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous snapshot of a document, for assertions and diagnostics.
    pub fn document(&self, collection: Collection, id: &str) -> Option<Fields> {
        self.documents.lock().expect("document lock poisoned").get(collection, id)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Fields>, StoreError> {
        Ok(self.document(collection, id))
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("document lock poisoned");
        documents.merge(collection, id, fields)
    }

    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("document lock poisoned");
        documents.replace(collection, id, fields);
        Ok(())
    }
}

/// JSON-backed document store persisted on disk.
///
/// The whole file is loaded at construction and rewritten after every
/// mutation.
#[derive(Debug)]
pub struct JsonDocumentStore {
    path: PathBuf,
    documents: Mutex<DocumentFile>,
}

impl JsonDocumentStore {
    /// Open the store at `path`, or at the default path when omitted.
    pub fn new<P: Into<Option<PathBuf>>>(path: P) -> Result<Self, StoreError> {
        let resolved_path = match path.into() {
            Some(path) => expand_tilde_path(path),
            None => default_documents_path(),
        };

        let file = load_document_file(&resolved_path)?;
        Ok(Self {
            path: resolved_path,
            documents: Mutex::new(file),
        })
    }

    pub fn with_defaults() -> Result<Self, StoreError> {
        Self::new(None::<PathBuf>)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save_locked(&self, file: &DocumentFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "persisted documents");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Fields>, StoreError> {
        let documents = self.documents.lock().expect("document lock poisoned");
        Ok(documents.get(collection, id))
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("document lock poisoned");
        let mut next = documents.clone();
        next.merge(collection, id, fields)?;
        self.save_locked(&next)?;
        *documents = next;
        Ok(())
    }

    async fn insert(&self, collection: Collection, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("document lock poisoned");
        let mut next = documents.clone();
        next.replace(collection, id, fields);
        self.save_locked(&next)?;
        *documents = next;
        Ok(())
    }
}

fn expand_tilde_path(path: PathBuf) -> PathBuf {
    let input = path.to_string_lossy();
    let trimmed = input.trim();

    if trimmed == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }

    PathBuf::from(trimmed)
}

/// Resolve the document file location from the environment or config dir.
pub fn default_documents_path() -> PathBuf {
    if let Ok(path) = env::var(DOCUMENTS_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde_path(PathBuf::from(path));
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grantsync")
        .join(DOCUMENTS_FILE_NAME)
}

fn load_document_file(path: &Path) -> Result<DocumentFile, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<DocumentFile>(&content) {
            Ok(file) => Ok(file),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to parse document file; starting empty"
                );
                Ok(DocumentFile::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(DocumentFile::default()),
        Err(error) => Err(StoreError::Io(error)),
    }
}
