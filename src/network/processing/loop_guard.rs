//! Loop prevention for packets reinjected into the forwarding stack.
//!
//! A packet written back "to the stack" re-enters the forwarding path and
//! will reach the interception callback again. Before submission it gets a
//! [`LoopToken`] attached; the callback claims the token and lets the packet
//! pass untouched, once.
//!
//! The token travels inside the packet rather than being looked up by
//! buffer address, so relocating a buffer cannot defeat the check. The guard
//! only counts outstanding tokens, and a token dropped together with its
//! packet (a downstream drop that never re-enters the callback) removes its
//! own entry, so nothing is left behind.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Outstanding = Mutex<HashSet<u64>>;

fn lock(set: &Outstanding) -> MutexGuard<'_, HashSet<u64>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issues and claims loop-prevention tokens.
#[derive(Default)]
pub struct LoopGuard {
    outstanding: Arc<Outstanding>,
    next_id: AtomicU64,
}

impl LoopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token for a packet about to be reinjected into the stack.
    pub fn mark(&self) -> LoopToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.outstanding).insert(id);
        LoopToken {
            id,
            owner: Some(Arc::downgrade(&self.outstanding)),
        }
    }

    /// Consumes a token seen at the interception callback, removing its entry.
    ///
    /// A token issued by another guard is handed back untouched.
    pub fn claim(&self, mut token: LoopToken) -> Result<(), LoopToken> {
        let ours = token
            .owner
            .as_ref()
            .is_some_and(|owner| owner.as_ptr() == Arc::as_ptr(&self.outstanding));
        if !ours {
            return Err(token);
        }

        token.owner = None;
        lock(&self.outstanding).remove(&token.id);
        Ok(())
    }

    /// Number of reinjected packets that have not come back yet.
    pub fn outstanding(&self) -> usize {
        lock(&self.outstanding).len()
    }
}

/// Mark carried by a packet reinjected into the forwarding stack.
pub struct LoopToken {
    id: u64,
    owner: Option<Weak<Outstanding>>,
}

impl LoopToken {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for LoopToken {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|w| w.upgrade()) {
            lock(&owner).remove(&self.id);
        }
    }
}

impl fmt::Debug for LoopToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopToken")
            .field("id", &self.id)
            .field("live", &self.owner.is_some())
            .finish()
    }
}
