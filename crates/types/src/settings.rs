//! In-memory settings draft.

use serde::{Deserialize, Serialize};

use crate::{OrgCredentialUpdate, OrgDocument, UserDocument, UserPreferenceUpdate};

/// What the user currently sees on the settings screen, independent of what
/// is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDraft {
    /// Grant key as typed. Opaque secret.
    pub credential: String,
    pub selected_organization_id: String,
    pub notifications_enabled: bool,
    pub auto_sync_enabled: bool,
    pub dark_mode_enabled: bool,
}

impl SettingsDraft {
    /// Merge the two stored documents into a draft.
    ///
    /// Credential and organization selection come from the organization
    /// document; preference toggles come from the user document. Any absent
    /// document or field yields the default value.
    pub fn from_documents(user: Option<&UserDocument>, org: Option<&OrgDocument>) -> Self {
        let user = user.cloned().unwrap_or_default();
        let org = org.cloned().unwrap_or_default();
        Self {
            credential: org.grant_key.unwrap_or_default(),
            selected_organization_id: org.org_id.unwrap_or_default(),
            notifications_enabled: user.enable_notifications.unwrap_or_default(),
            auto_sync_enabled: user.enable_auto_sync.unwrap_or_default(),
            dark_mode_enabled: user.enable_dark_mode.unwrap_or_default(),
        }
    }

    /// Fields destined for the organization document.
    pub fn org_update(&self) -> OrgCredentialUpdate {
        OrgCredentialUpdate {
            grant_key: self.credential.clone(),
            org_id: self.selected_organization_id.clone(),
        }
    }

    /// Fields destined for the user document.
    pub fn user_update(&self) -> UserPreferenceUpdate {
        UserPreferenceUpdate {
            enable_notifications: self.notifications_enabled,
            enable_auto_sync: self.auto_sync_enabled,
            enable_dark_mode: self.dark_mode_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrgRef;

    #[test]
    fn draft_merges_credential_from_org_and_toggles_from_user() {
        let user = UserDocument {
            org: Some(OrgRef::new("org_doc_1")),
            enable_notifications: Some(true),
            enable_auto_sync: None,
            enable_dark_mode: Some(true),
        };
        let org = OrgDocument {
            grant_key: Some("abc123".into()),
            org_id: Some("org_1".into()),
        };

        let draft = SettingsDraft::from_documents(Some(&user), Some(&org));
        assert_eq!(draft.credential, "abc123");
        assert_eq!(draft.selected_organization_id, "org_1");
        assert!(draft.notifications_enabled);
        assert!(!draft.auto_sync_enabled);
        assert!(draft.dark_mode_enabled);
    }

    #[test]
    fn missing_org_document_leaves_credential_empty() {
        let user = UserDocument {
            enable_auto_sync: Some(true),
            ..UserDocument::default()
        };
        let draft = SettingsDraft::from_documents(Some(&user), None);
        assert!(draft.credential.is_empty());
        assert!(draft.selected_organization_id.is_empty());
        assert!(draft.auto_sync_enabled);
    }
}
