//! Shared type definitions for grantsync.
//!
//! The types here are used by the API client, the document store adapters,
//! and the engine that drives organization resolution and settings
//! persistence. They carry no behavior beyond construction and conversion.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod documents;
pub mod settings;

pub use documents::{Collection, OrgCredentialUpdate, OrgDocument, UserDocument, UserPreferenceUpdate};
pub use settings::SettingsDraft;

/// Identity of the authenticated user, as supplied by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed reference from a user document to its organization document.
///
/// `users/{id}.org` holds the identifier of a document in the `orgs`
/// collection. Keeping the reference typed makes the two-step read
/// (user document, then organization document) explicit at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgRef(String);

impl OrgRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Document identifier inside the `orgs` collection.
    pub fn document_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "orgs/{}", self.0)
    }
}

/// An organization the grant key has access to.
///
/// Produced only by the credential resolver. Identity is the `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

impl Organization {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Organizations in response order. Replaced wholesale on each resolution.
pub type OrganizationSet = Vec<Organization>;
