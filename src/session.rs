//! Identity bootstrap and identity-change notifications.

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::retry::RetryPolicy;
use crate::types::Identity;
use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Signs the caller in and reports identity transitions.
pub struct IdentitySession {
    context: EngineContext,
    retry: RetryPolicy,
    /// Task driving the single registered change callback.
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl IdentitySession {
    pub fn new(context: EngineContext) -> Self {
        let retry = context.retry_policy();
        Self {
            context,
            retry,
            watcher: Mutex::new(None),
        }
    }

    /// Establish an identity.
    ///
    /// With a token, signs in with that token only; without one, signs in
    /// anonymously. Both are retried under the session's policy. Exhausting
    /// the retries yields [`EngineError::Auth`] carrying the provider's last
    /// error.
    pub async fn bootstrap(&self, token: Option<&str>) -> Result<Identity> {
        let auth = &self.context.auth;
        let result = match token {
            Some(token) => {
                self.retry
                    .execute_as("sign_in_with_token", || auth.sign_in_with_token(token))
                    .await
            }
            None => {
                self.retry
                    .execute_as("sign_in_anonymous", || auth.sign_in_anonymous())
                    .await
            }
        };

        match result {
            Ok(identity) => {
                info!(identity = %identity, with_token = token.is_some(), "signed in");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "identity bootstrap failed");
                Err(EngineError::Auth(e))
            }
        }
    }

    /// Identity currently reported by the provider.
    pub fn current(&self) -> Option<Identity> {
        self.context.auth.identity_changes().borrow().clone()
    }

    /// Sign out. Registered callbacks observe the transition to `None`.
    pub async fn sign_out(&self) -> Result<()> {
        let auth = &self.context.auth;
        self.retry
            .execute_as("sign_out", || auth.sign_out())
            .await
            .map_err(EngineError::Auth)
    }

    /// Register `callback` for identity transitions, replacing any earlier
    /// registration.
    ///
    /// The callback runs once per transition, including the transition to
    /// `None` on sign-out, and transitions are delivered in order. The
    /// identity current at registration time is not replayed. Must be called
    /// from within a Tokio runtime.
    pub fn on_change<F, Fut>(&self, callback: F)
    where
        F: FnMut(Option<Identity>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let baseline = self.current();
        self.on_change_from(baseline, callback);
    }

    /// Like [`on_change`](Self::on_change), but transitions are measured
    /// against `baseline` instead of the identity current at registration.
    ///
    /// If the provider already reports something other than `baseline`, the
    /// callback fires right away with it.
    pub fn on_change_from<F, Fut>(&self, baseline: Option<Identity>, mut callback: F)
    where
        F: FnMut(Option<Identity>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut changes = self.context.auth.identity_changes();
        let mut last = baseline;

        let task = tokio::spawn(async move {
            loop {
                let next = changes.borrow_and_update().clone();
                if next != last {
                    debug!(from = ?last, to = ?next, "identity changed");
                    last = next.clone();
                    callback(next).await;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.watcher.lock().replace(task) {
            previous.abort();
        }
    }

    /// Drop the registered callback, if any.
    pub fn clear_on_change(&self) {
        if let Some(previous) = self.watcher.lock().take() {
            previous.abort();
        }
    }
}

impl Drop for IdentitySession {
    fn drop(&mut self) {
        self.clear_on_change();
    }
}
