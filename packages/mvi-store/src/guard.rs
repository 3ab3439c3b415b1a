//! Reentrant, chain-aware guard for state transactions.
//!
//! The guard is exclusive across independent chains and reentrant within one:
//!
//! ```text
//! chain A: transaction ─┬─ nested transaction (same ChainId) ─► runs inline
//!                       │
//! chain B: transaction ─┴─ waits until chain A releases
//! ```
//!
//! Reentrancy is detected through an explicit [`ChainId`] marker rather than
//! thread identity: a chain may hop across worker threads between awaits.

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::Mutex as AsyncMutex;
use tracing::trace;

use crate::config::StateStrategy;
use crate::core::ChainId;
use crate::error::StoreError;

/// Mutual exclusion for read-modify-write transactions on the state.
#[derive(Debug)]
pub struct StateGuard {
    strategy: StateStrategy,
    lock: AsyncMutex<()>,
    owner: Mutex<Option<ChainId>>,
}

/// Clears the recorded owner when the transaction ends, even on cancellation.
struct OwnerReset<'a> {
    owner: &'a Mutex<Option<ChainId>>,
}

impl Drop for OwnerReset<'_> {
    fn drop(&mut self) {
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = None;
    }
}

impl StateGuard {
    /// Create a guard for the given strategy.
    pub fn new(strategy: StateStrategy) -> Self {
        Self {
            strategy,
            lock: AsyncMutex::new(()),
            owner: Mutex::new(None),
        }
    }

    /// The strategy this guard enforces.
    pub fn strategy(&self) -> StateStrategy {
        self.strategy
    }

    /// The chain currently holding the guard, if any.
    pub fn owner(&self) -> Option<ChainId> {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether any chain currently holds the guard.
    pub fn is_held(&self) -> bool {
        self.owner().is_some()
    }

    /// Run `f` inside a transaction.
    ///
    /// `marker` is the chain the caller is already part of, if any. `f`
    /// receives the chain id it runs under, which must be threaded into any
    /// nested transaction so it is recognised as reentrant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecursiveTransaction`] when a nested transaction
    /// is attempted on a non-reentrant guard.
    pub async fn transaction<R, F, Fut>(
        &self,
        marker: Option<ChainId>,
        f: F,
    ) -> Result<R, StoreError>
    where
        F: FnOnce(Option<ChainId>) -> Fut,
        Fut: Future<Output = R>,
    {
        let reentrant = match self.strategy {
            StateStrategy::Immediate => return Ok(f(marker).await),
            StateStrategy::Guarded { reentrant } => reentrant,
        };

        if let Some(chain) = marker {
            if self.owner() == Some(chain) {
                if !reentrant {
                    return Err(StoreError::RecursiveTransaction);
                }
                trace!(%chain, "reentrant state transaction");
                return Ok(f(Some(chain)).await);
            }
        }

        let _permit = self.lock.lock().await;
        let chain = ChainId::new();
        {
            let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
            *owner = Some(chain);
        }
        let _reset = OwnerReset { owner: &self.owner };

        Ok(f(Some(chain)).await)
    }
}

impl Default for StateGuard {
    fn default() -> Self {
        Self::new(StateStrategy::default())
    }
}
