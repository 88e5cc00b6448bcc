//! # Grantsync Engine
//!
//! Resolves the organizations a grant key can access and keeps the settings
//! draft in step with the two stored documents it is persisted to.
//!
//! ## Architecture
//!
//! - **`resolver`**: [`CredentialResolver`] issues the organization query,
//!   flattens the response, and suppresses results for superseded grant keys.
//! - **`synchronizer`**: [`SettingsSynchronizer`] owns the draft, tracks the
//!   dirty flag, triggers resolution on grant key edits, and performs the
//!   organization-then-user save.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use grantsync_engine::{CredentialResolver, SettingsSynchronizer};
//!
//! let resolver = CredentialResolver::new(transport, config.timeout);
//! let mut settings = SettingsSynchronizer::new(store, resolver, Some(user_id));
//! settings.load().await?.run().await;
//! let lookup = settings.set_credential("abc123");
//! let organizations = lookup.run().await;
//! settings.select_organization("org_1");
//! settings.save().await?;
//! ```

pub mod resolver;
pub mod synchronizer;

pub use resolver::{CredentialResolver, PendingResolution, ResolutionState, organizations_from_response};
pub use synchronizer::{LoadError, SaveError, SaveStage, SettingsSynchronizer, SyncState};
