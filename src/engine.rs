//! Composition root: session, subscription and mutations for one caller.

use crate::context::EngineContext;
use crate::error::{Result, ValidationError};
use crate::mutation::MutationGateway;
use crate::session::IdentitySession;
use crate::subscriptions::{Subscription, SubscriptionCoordinator, ViewState};
use crate::types::{AssetRef, EntryId, Identity, NoteId};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{info, warn};

/// Keeps exactly one subscription installed for the current identity.
#[derive(Clone)]
struct Scope {
    coordinator: Arc<SubscriptionCoordinator>,
    active: Arc<AsyncMutex<Option<Subscription>>>,
    identity: Arc<RwLock<Option<Identity>>>,
}

impl Scope {
    /// Cancel the current subscription, then install one for `next`.
    ///
    /// A running subscription for `next` is kept unless `force` is set. One
    /// that has stopped (its listener failed) is always replaced.
    async fn switch(&self, next: Option<Identity>, force: bool) -> Result<()> {
        let mut active = self.active.lock().await;

        let unchanged = match (active.as_ref(), next.as_ref()) {
            (Some(current), Some(next)) => {
                !force && current.identity() == next && current.is_running()
            }
            (None, None) => self.identity.read().is_none(),
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        if let Some(previous) = active.take() {
            previous.cancel();
        }
        *self.identity.write() = next.clone();

        match next {
            Some(identity) => {
                info!(identity = %identity, "installing subscription");
                *active = Some(self.coordinator.subscribe(&identity).await?);
            }
            None => {
                info!("signed out, view cleared");
                self.coordinator.clear();
            }
        }
        Ok(())
    }
}

/// One caller's engine: identity, live view and writes.
pub struct SyncEngine {
    session: IdentitySession,
    gateway: MutationGateway,
    scope: Scope,
}

impl SyncEngine {
    pub fn new(context: EngineContext) -> Self {
        Self {
            session: IdentitySession::new(context.clone()),
            gateway: MutationGateway::new(context.clone()),
            scope: Scope {
                coordinator: Arc::new(SubscriptionCoordinator::new(context)),
                active: Arc::new(AsyncMutex::new(None)),
                identity: Arc::new(RwLock::new(None)),
            },
        }
    }

    /// Sign in, subscribe for the resulting identity, and follow later
    /// identity changes (including sign-out). Must be called from within a
    /// Tokio runtime.
    pub async fn start(&self, token: Option<&str>) -> Result<Identity> {
        let identity = self.session.bootstrap(token).await?;
        self.scope.switch(Some(identity.clone()), false).await?;

        // Measured against the bootstrapped identity: a change that landed
        // while subscribing above is still delivered.
        let scope = self.scope.clone();
        self.session.on_change_from(Some(identity.clone()), move |next| {
            let scope = scope.clone();
            async move {
                if let Err(e) = scope.switch(next, false).await {
                    warn!(error = %e, "resubscribe after identity change failed");
                }
            }
        });

        Ok(identity)
    }

    /// Re-scope the view to `identity`. `None` tears the subscription down.
    /// Switching to the current identity does nothing while its
    /// subscription is running; a stopped one is re-established.
    pub async fn switch_identity(&self, identity: Option<Identity>) -> Result<()> {
        self.scope.switch(identity, false).await
    }

    /// Tear down and reopen the subscription for the current identity.
    /// Does nothing when signed out.
    pub async fn resubscribe(&self) -> Result<()> {
        match self.current_identity() {
            Some(identity) => self.scope.switch(Some(identity), true).await,
            None => Ok(()),
        }
    }

    /// Sign out and clear the view.
    pub async fn sign_out(&self) -> Result<()> {
        self.session.sign_out().await?;
        self.scope.switch(None, false).await
    }

    /// Feed of published views for the presentation layer.
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.scope.coordinator.view()
    }

    pub fn current_view(&self) -> ViewState {
        self.scope.coordinator.current_view()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.scope.identity.read().clone()
    }

    fn require_identity(&self) -> Result<Identity> {
        self.current_identity()
            .ok_or_else(|| ValidationError::NotSignedIn.into())
    }

    pub async fn create_entry(
        &self,
        title: &str,
        body: Option<&str>,
        asset: Option<&[u8]>,
    ) -> Result<EntryId> {
        let identity = self.require_identity()?;
        self.gateway.create_entry(&identity, title, body, asset).await
    }

    pub async fn update_entry(&self, id: &EntryId, title: &str, body: Option<&str>) -> Result<()> {
        let identity = self.require_identity()?;
        self.gateway.update_entry(&identity, id, title, body).await
    }

    pub async fn delete_entry(&self, id: &EntryId, asset: &AssetRef) -> Result<()> {
        let identity = self.require_identity()?;
        self.gateway.delete_entry(&identity, id, asset).await
    }

    pub async fn add_note(&self, entry: &EntryId, text: &str) -> Result<Option<NoteId>> {
        let identity = self.require_identity()?;
        self.gateway.add_note(&identity, entry, text).await
    }
}
