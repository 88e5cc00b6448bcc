//! Settings draft ownership and two-document persistence.
//!
//! The synchronizer keeps what the user is editing ([`SettingsDraft`])
//! separate from what is stored. Stored settings are split across two
//! documents: the user document carries the preference toggles and a
//! reference to an organization document, which in turn carries the grant
//! key and the selected organization.
//!
//! Saving writes the organization document first and the user document
//! second. The writes are not transactional; if the second one fails the
//! draft stays dirty and a retry repeats both (the first write is
//! idempotent).

use std::fmt;
use std::sync::Arc;

use grantsync_types::{Collection, OrgDocument, OrgRef, SettingsDraft, UserDocument, UserId};
use grantsync_util::{DocumentStore, StoreError, get_typed, mask_secret, to_fields};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::resolver::{CredentialResolver, PendingResolution, ResolutionState};

/// Persistence state of the settings screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Loading,
    /// Draft matches what was last loaded or saved.
    Clean,
    /// Draft has unsaved edits.
    Dirty,
    Saving,
    /// Last save failed; edits are retained and a retry is possible.
    SaveFailed,
    /// Stored settings could not be read; the draft holds defaults.
    LoadFailed,
}

/// Which of the two writes a save failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStage {
    OrganizationCredentials,
    UserPreferences,
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrganizationCredentials => f.write_str("organization credentials"),
            Self::UserPreferences => f.write_str("user preferences"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("No unsaved changes")]
    NothingToSave,

    #[error("User document users/{user_id} not found")]
    UserDocumentMissing { user_id: UserId },

    #[error("User document users/{user_id} has no organization reference")]
    MissingOrganizationReference { user_id: UserId },

    #[error("Failed to read user document: {0}")]
    ReadUser(#[source] StoreError),

    #[error("Failed to save {stage}: {source}")]
    Write {
        stage: SaveStage,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {collection}/{id}: {source}")]
    Read {
        collection: Collection,
        id: String,
        #[source]
        source: StoreError,
    },
}

/// Owns the settings draft and moves it between the stored documents.
pub struct SettingsSynchronizer {
    store: Arc<dyn DocumentStore>,
    resolver: Arc<CredentialResolver>,
    identity: Option<UserId>,
    draft: SettingsDraft,
    dirty: bool,
    state: watch::Sender<SyncState>,
    last_error: Option<String>,
}

impl SettingsSynchronizer {
    /// Create a synchronizer for `identity`. Starts in [`SyncState::Loading`]
    /// until [`SettingsSynchronizer::load`] completes.
    pub fn new(store: Arc<dyn DocumentStore>, resolver: Arc<CredentialResolver>, identity: Option<UserId>) -> Self {
        let (state, _) = watch::channel(SyncState::Loading);
        Self {
            store,
            resolver,
            identity,
            draft: SettingsDraft::default(),
            dirty: false,
            state,
            last_error: None,
        }
    }

    /// Read the stored settings into the draft, discarding unsaved edits.
    ///
    /// Absent documents are not errors; the affected fields take their
    /// defaults. Returns the organization lookup for the loaded grant key.
    pub async fn load(&mut self) -> Result<PendingResolution, LoadError> {
        self.set_state(SyncState::Loading);
        self.dirty = false;

        let Some(user_id) = self.identity.clone() else {
            debug!("no authenticated user; settings start blank");
            self.draft = SettingsDraft::default();
            self.last_error = None;
            self.set_state(SyncState::Clean);
            return Ok(self.resolver.begin(""));
        };

        match self.read_documents(&user_id).await {
            Ok((user, org)) => {
                self.draft = SettingsDraft::from_documents(user.as_ref(), org.as_ref());
                self.last_error = None;
                self.set_state(SyncState::Clean);
                info!(
                    user = %user_id,
                    has_user_document = user.is_some(),
                    has_org_document = org.is_some(),
                    "settings loaded"
                );
                Ok(self.resolver.begin(&self.draft.credential))
            }
            Err(error) => {
                warn!(user = %user_id, %error, "failed to load settings");
                self.draft = SettingsDraft::default();
                self.last_error = Some(error.to_string());
                self.set_state(SyncState::LoadFailed);
                Err(error)
            }
        }
    }

    async fn read_documents(&self, user_id: &UserId) -> Result<(Option<UserDocument>, Option<OrgDocument>), LoadError> {
        let user: Option<UserDocument> = get_typed(self.store.as_ref(), Collection::Users, user_id.as_str())
            .await
            .map_err(|source| LoadError::Read {
                collection: Collection::Users,
                id: user_id.to_string(),
                source,
            })?;

        let Some(org_ref) = user.as_ref().and_then(|user| user.org.clone()) else {
            return Ok((user, None));
        };
        let org = self.read_org(&org_ref).await?;
        Ok((user, org))
    }

    async fn read_org(&self, org_ref: &OrgRef) -> Result<Option<OrgDocument>, LoadError> {
        get_typed(self.store.as_ref(), Collection::Orgs, org_ref.document_id())
            .await
            .map_err(|source| LoadError::Read {
                collection: Collection::Orgs,
                id: org_ref.document_id().to_string(),
                source,
            })
    }

    /// Replace the grant key and start resolving organizations for it.
    pub fn set_credential(&mut self, credential: impl Into<String>) -> PendingResolution {
        self.draft.credential = credential.into();
        debug!(credential = %mask_secret(&self.draft.credential), "grant key edited");
        self.mark_dirty();
        self.resolver.begin(&self.draft.credential)
    }

    pub fn select_organization(&mut self, organization_id: impl Into<String>) {
        self.draft.selected_organization_id = organization_id.into();
        self.mark_dirty();
    }

    pub fn set_notifications(&mut self, enabled: bool) {
        self.draft.notifications_enabled = enabled;
        self.mark_dirty();
    }

    pub fn set_auto_sync(&mut self, enabled: bool) {
        self.draft.auto_sync_enabled = enabled;
        self.mark_dirty();
    }

    pub fn set_dark_mode(&mut self, enabled: bool) {
        self.draft.dark_mode_enabled = enabled;
        self.mark_dirty();
    }

    /// Persist the draft: organization document first, user document second.
    pub async fn save(&mut self) -> Result<(), SaveError> {
        let Some(user_id) = self.identity.clone() else {
            return Err(self.fail_save(SaveError::NotAuthenticated));
        };
        if !self.can_save() {
            return Err(SaveError::NothingToSave);
        }

        self.set_state(SyncState::Saving);
        match self.write_documents(&user_id).await {
            Ok(()) => {
                self.dirty = false;
                self.last_error = None;
                self.set_state(SyncState::Clean);
                info!(user = %user_id, "settings saved");
                Ok(())
            }
            Err(error) => Err(self.fail_save(error)),
        }
    }

    async fn write_documents(&self, user_id: &UserId) -> Result<(), SaveError> {
        let user: UserDocument = get_typed(self.store.as_ref(), Collection::Users, user_id.as_str())
            .await
            .map_err(SaveError::ReadUser)?
            .ok_or_else(|| SaveError::UserDocumentMissing {
                user_id: user_id.clone(),
            })?;
        let org_ref = user.org.ok_or_else(|| SaveError::MissingOrganizationReference {
            user_id: user_id.clone(),
        })?;

        let org_fields = to_fields(&self.draft.org_update()).map_err(|source| SaveError::Write {
            stage: SaveStage::OrganizationCredentials,
            source,
        })?;
        self.store
            .update(Collection::Orgs, org_ref.document_id(), org_fields)
            .await
            .map_err(|source| SaveError::Write {
                stage: SaveStage::OrganizationCredentials,
                source,
            })?;
        debug!(org = %org_ref, "organization credentials written");

        let user_fields = to_fields(&self.draft.user_update()).map_err(|source| SaveError::Write {
            stage: SaveStage::UserPreferences,
            source,
        })?;
        self.store
            .update(Collection::Users, user_id.as_str(), user_fields)
            .await
            .map_err(|source| SaveError::Write {
                stage: SaveStage::UserPreferences,
                source,
            })?;
        debug!(user = %user_id, "user preferences written");

        Ok(())
    }

    fn fail_save(&mut self, error: SaveError) -> SaveError {
        warn!(%error, "settings save failed");
        self.last_error = Some(error.to_string());
        if self.dirty {
            self.set_state(SyncState::SaveFailed);
        }
        error
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.set_state(SyncState::Dirty);
    }

    fn set_state(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "settings state changed");
        }
    }

    /// Whether the save control should be enabled.
    pub fn can_save(&self) -> bool {
        self.dirty && self.state() != SyncState::Saving
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn draft(&self) -> &SettingsDraft {
        &self.draft
    }

    pub fn identity(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    /// User-facing text of the most recent load or save failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Organization lookup state for the current grant key.
    pub fn resolution(&self) -> ResolutionState {
        self.resolver.state()
    }

    pub fn resolver(&self) -> &Arc<CredentialResolver> {
        &self.resolver
    }
}
