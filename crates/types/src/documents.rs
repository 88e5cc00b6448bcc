//! Stored document shapes.
//!
//! Field names follow the persisted layout:
//!
//! ```text
//! orgs/{orgId}:   { grantKey, orgID, ... }
//! users/{userId}: { org, enableNotifications, enableAutoSync, enableDarkMode, ... }
//! ```
//!
//! Every field is optional on read: a missing, `null` or wrongly typed value
//! decodes as `None` and the rest of the document still loads. Fields not
//! modelled here are ignored on read and left untouched by partial updates.

use std::fmt;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::OrgRef;

/// Logical collections in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Orgs,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Orgs => "orgs",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field<T> {
        Valid(T),
        Invalid(IgnoredAny),
    }

    Ok(match Option::<Field<T>>::deserialize(deserializer)? {
        Some(Field::Valid(value)) => Some(value),
        Some(Field::Invalid(_)) | None => None,
    })
}

/// Decoded `users/{userId}` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDocument {
    /// Reference to the organization document holding the grant key.
    #[serde(default, deserialize_with = "lenient")]
    pub org: Option<OrgRef>,
    #[serde(default, deserialize_with = "lenient", rename = "enableNotifications")]
    pub enable_notifications: Option<bool>,
    #[serde(default, deserialize_with = "lenient", rename = "enableAutoSync")]
    pub enable_auto_sync: Option<bool>,
    #[serde(default, deserialize_with = "lenient", rename = "enableDarkMode")]
    pub enable_dark_mode: Option<bool>,
}

/// Decoded `orgs/{orgId}` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDocument {
    #[serde(default, deserialize_with = "lenient", rename = "grantKey")]
    pub grant_key: Option<String>,
    /// Identifier of the organization selected for the grant key.
    #[serde(default, deserialize_with = "lenient", rename = "orgID")]
    pub org_id: Option<String>,
}

/// Partial update written to `orgs/{orgId}` on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgCredentialUpdate {
    #[serde(rename = "grantKey")]
    pub grant_key: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
}

/// Partial update written to `users/{userId}` on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserPreferenceUpdate {
    #[serde(rename = "enableNotifications")]
    pub enable_notifications: bool,
    #[serde(rename = "enableAutoSync")]
    pub enable_auto_sync: bool,
    #[serde(rename = "enableDarkMode")]
    pub enable_dark_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_document_tolerates_missing_and_extra_fields() {
        let document: UserDocument = serde_json::from_value(json!({
            "org": "org_doc_1",
            "displayName": "Pat",
            "enableDarkMode": true
        }))
        .unwrap();

        assert_eq!(document.org, Some(OrgRef::new("org_doc_1")));
        assert_eq!(document.enable_dark_mode, Some(true));
        assert_eq!(document.enable_notifications, None);
    }

    #[test]
    fn org_document_treats_null_as_absent() {
        let document: OrgDocument = serde_json::from_value(json!({ "grantKey": null, "name": "Acme" })).unwrap();
        assert_eq!(document, OrgDocument::default());
    }

    #[test]
    fn wrongly_typed_fields_degrade_individually() {
        let user: UserDocument = serde_json::from_value(json!({
            "org": "org_doc_1",
            "enableDarkMode": "true",
            "enableAutoSync": true
        }))
        .unwrap();
        assert_eq!(user.org, Some(OrgRef::new("org_doc_1")));
        assert_eq!(user.enable_dark_mode, None);
        assert_eq!(user.enable_auto_sync, Some(true));

        let org: OrgDocument = serde_json::from_value(json!({ "grantKey": 12345, "orgID": "org_1" })).unwrap();
        assert_eq!(org.grant_key, None);
        assert_eq!(org.org_id.as_deref(), Some("org_1"));
    }

    #[test]
    fn updates_use_persisted_field_names() {
        let org = serde_json::to_value(OrgCredentialUpdate {
            grant_key: "abc123".into(),
            org_id: "org_1".into(),
        })
        .unwrap();
        assert_eq!(org, json!({ "grantKey": "abc123", "orgID": "org_1" }));

        let user = serde_json::to_value(UserPreferenceUpdate {
            enable_notifications: true,
            enable_auto_sync: false,
            enable_dark_mode: true,
        })
        .unwrap();
        assert_eq!(
            user,
            json!({ "enableNotifications": true, "enableAutoSync": false, "enableDarkMode": true })
        );
    }
}
