//! In-process auth provider.

use super::faults::{FaultPlan, RemoteOp};
use crate::error::{RemoteError, RemoteResult};
use crate::remote::AuthProvider;
use crate::types::Identity;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Auth provider backed by a token allow-list.
pub struct MemoryAuthProvider {
    tokens: RwLock<HashMap<String, Identity>>,
    current: watch::Sender<Option<Identity>>,
    next_anonymous: AtomicU64,
    faults: FaultPlan,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            tokens: RwLock::new(HashMap::new()),
            current,
            next_anonymous: AtomicU64::new(1),
            faults: FaultPlan::new(),
        }
    }

    /// Accept `token` as a credential for `identity`.
    pub fn allow_token(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().insert(token.into(), identity);
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Change the signed-in identity out of band (session expiry, another
    /// tab signing in).
    pub fn force_identity(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }

    pub fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_in_with_token(&self, token: &str) -> RemoteResult<Identity> {
        self.faults.enter(RemoteOp::SignInWithToken, "token").await?;
        let identity = self
            .tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| RemoteError::PermissionDenied("unknown token".into()))?;
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_anonymous(&self) -> RemoteResult<Identity> {
        self.faults.enter(RemoteOp::SignInAnonymous, "anonymous").await?;
        let n = self.next_anonymous.fetch_add(1, Ordering::SeqCst);
        let identity = Identity(format!("anon-{}", n));
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.faults.enter(RemoteOp::SignOut, "session").await?;
        self.current.send_replace(None);
        Ok(())
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}
