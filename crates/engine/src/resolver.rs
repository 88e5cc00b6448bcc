//! Grant key → organization resolution.
//!
//! Resolution is triggered on every credential edit, so several queries can
//! be in flight at once. Each initiation takes a new generation number under
//! the state channel's lock, and a completion is applied only while its
//! generation is still the latest. Results for superseded credentials are
//! dropped without surfacing an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use grantsync_api::{QueryDocument, QueryError, QueryTransport, build_organization_query};
use grantsync_types::{Organization, OrganizationSet};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

const NODES_POINTER: &str = "/currentGrant/user/memberships/nodes";

/// Lifecycle of the organization lookup for the current credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolutionState {
    /// No credential entered; nothing to resolve.
    #[default]
    Idle,
    Loading,
    Ready(OrganizationSet),
    Failed(QueryError),
}

impl ResolutionState {
    /// Organizations available for selection. Empty unless `Ready`.
    pub fn organizations(&self) -> &[Organization] {
        match self {
            Self::Ready(organizations) => organizations,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// A resolution that has been initiated but not yet run.
///
/// Initiation already claimed a generation and moved the resolver to
/// `Loading` (or `Idle` for an empty credential); [`PendingResolution::run`]
/// performs the request and applies the outcome if it is still current.
///
/// Dropping it before `run` finishes, or never running it, abandons the
/// lookup: if it is still the latest one the resolver falls back to `Idle`.
#[must_use = "the lookup only runs when the pending resolution is awaited"]
pub struct PendingResolution {
    resolver: Arc<CredentialResolver>,
    generation: u64,
    query: Option<QueryDocument>,
    settled: bool,
}

impl PendingResolution {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the lookup and return the resolver's state afterwards.
    pub async fn run(mut self) -> ResolutionState {
        let query = self.query.take();
        let state = self.resolver.complete(self.generation, query).await;
        self.settled = true;
        state
    }
}

impl Drop for PendingResolution {
    fn drop(&mut self) {
        if !self.settled {
            self.resolver.abandon(self.generation);
        }
    }
}

/// Resolves the organizations a grant key has access to.
pub struct CredentialResolver {
    transport: Arc<dyn QueryTransport>,
    timeout: Duration,
    generation: AtomicU64,
    state: watch::Sender<ResolutionState>,
}

impl CredentialResolver {
    pub fn new(transport: Arc<dyn QueryTransport>, timeout: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ResolutionState::Idle);
        Arc::new(Self {
            transport,
            timeout,
            generation: AtomicU64::new(0),
            state,
        })
    }

    /// Resolve `credential` and return the resulting state.
    ///
    /// If a newer resolution was initiated while this one was in flight, the
    /// returned state is the newer one's current state.
    pub async fn resolve(self: &Arc<Self>, credential: &str) -> ResolutionState {
        self.begin(credential).run().await
    }

    /// Initiate a resolution without running it.
    ///
    /// The generation is claimed here, so the order of `begin` calls, not the
    /// order in which the returned futures are polled, decides which result
    /// wins.
    pub fn begin(self: &Arc<Self>, credential: &str) -> PendingResolution {
        let query = build_organization_query(credential);
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = if query.is_some() {
                ResolutionState::Loading
            } else {
                ResolutionState::Idle
            };
        });
        debug!(generation, has_query = query.is_some(), "organization lookup initiated");

        PendingResolution {
            resolver: Arc::clone(self),
            generation,
            query,
            settled: false,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ResolutionState {
        self.state.borrow().clone()
    }

    /// Organizations from the latest successful resolution, or empty.
    pub fn organizations(&self) -> OrganizationSet {
        self.state.borrow().organizations().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.state.subscribe()
    }

    fn abandon(&self, generation: u64) {
        let reset = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation || !state.is_loading() {
                return false;
            }
            *state = ResolutionState::Idle;
            true
        });
        if reset {
            debug!(generation, "organization lookup abandoned before completion");
        }
    }

    async fn complete(&self, generation: u64, query: Option<QueryDocument>) -> ResolutionState {
        let Some(query) = query else {
            return self.state();
        };

        let outcome = match tokio::time::timeout(self.timeout, self.transport.execute(&query)).await {
            Ok(Ok(response)) => Ok(organizations_from_response(&response)),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(QueryError::timeout(self.timeout)),
        };

        let applied = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = match &outcome {
                Ok(organizations) => ResolutionState::Ready(organizations.clone()),
                Err(error) => ResolutionState::Failed(error.clone()),
            };
            true
        });

        match (&outcome, applied) {
            (_, false) => debug!(generation, "discarding superseded organization lookup"),
            (Ok(organizations), true) => debug!(generation, count = organizations.len(), "organizations resolved"),
            (Err(error), true) => warn!(generation, %error, "organization lookup failed"),
        }

        self.state()
    }
}

/// Flatten `currentGrant.user.memberships.nodes[].organization` into
/// organizations, in response order.
///
/// A node without an organization, or an organization without `id` or
/// `name`, yields empty strings for the missing parts instead of failing the
/// whole batch. A missing path or a non-array `nodes` yields an empty set.
pub fn organizations_from_response(response: &Value) -> OrganizationSet {
    let Some(nodes) = response.pointer(NODES_POINTER).and_then(Value::as_array) else {
        return OrganizationSet::new();
    };
    nodes.iter().map(organization_from_node).collect()
}

fn organization_from_node(node: &Value) -> Organization {
    let organization = node.get("organization");
    let field = |name: &str| organization.and_then(|value| value.get(name)).map(scalar_text).unwrap_or_default();
    Organization {
        id: field("id"),
        name: field("name"),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}
