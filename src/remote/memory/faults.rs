//! Fault injection, latency and call recording shared by the memory stores.

use crate::error::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A remote call kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Listen,
    GetCollection,
    Create,
    Update,
    Delete,
    Upload,
    PublicRef,
    DeleteAsset,
    SignInWithToken,
    SignInAnonymous,
    SignOut,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteOp::Listen => "listen",
            RemoteOp::GetCollection => "get_collection",
            RemoteOp::Create => "create",
            RemoteOp::Update => "update",
            RemoteOp::Delete => "delete",
            RemoteOp::Upload => "upload",
            RemoteOp::PublicRef => "public_ref",
            RemoteOp::DeleteAsset => "delete_asset",
            RemoteOp::SignInWithToken => "sign_in_with_token",
            RemoteOp::SignInAnonymous => "sign_in_anonymous",
            RemoteOp::SignOut => "sign_out",
        };
        f.write_str(name)
    }
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub op: RemoteOp,
    pub target: String,
}

/// Scripted failures and latencies, plus an ordered log of every call.
#[derive(Default)]
pub struct FaultPlan {
    failures: Mutex<HashMap<RemoteOp, u32>>,
    latency: Mutex<HashMap<RemoteOp, Duration>>,
    calls: Mutex<Vec<Call>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of `op` fail with `Unavailable`.
    /// `u32::MAX` makes them fail indefinitely.
    pub fn fail_next(&self, op: RemoteOp, count: u32) {
        self.failures.lock().insert(op, count);
    }

    /// Stop injecting failures for `op`.
    pub fn heal(&self, op: RemoteOp) {
        self.failures.lock().remove(&op);
    }

    /// Delay every call of `op` by `delay` before it takes effect.
    pub fn set_latency(&self, op: RemoteOp, delay: Duration) {
        self.latency.lock().insert(op, delay);
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: RemoteOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Record a call, wait out any latency, then apply a scripted failure.
    pub(crate) async fn enter(&self, op: RemoteOp, target: impl Into<String>) -> RemoteResult<()> {
        self.calls.lock().push(Call {
            op,
            target: target.into(),
        });

        let delay = self.latency.lock().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&op) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(RemoteError::Unavailable(format!("injected {} failure", op)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let plan = FaultPlan::new();
        plan.fail_next(RemoteOp::Create, 2);

        assert!(plan.enter(RemoteOp::Create, "a").await.is_err());
        assert!(plan.enter(RemoteOp::Create, "b").await.is_err());
        assert!(plan.enter(RemoteOp::Create, "c").await.is_ok());
        assert!(plan.enter(RemoteOp::Delete, "d").await.is_ok());

        assert_eq!(plan.count(RemoteOp::Create), 3);
        assert_eq!(plan.calls().last().unwrap().target, "d");
    }

    #[tokio::test]
    async fn test_indefinite_failure_until_healed() {
        let plan = FaultPlan::new();
        plan.fail_next(RemoteOp::Upload, u32::MAX);
        for _ in 0..10 {
            assert!(plan.enter(RemoteOp::Upload, "x").await.is_err());
        }
        plan.heal(RemoteOp::Upload);
        assert!(plan.enter(RemoteOp::Upload, "x").await.is_ok());
    }
}
