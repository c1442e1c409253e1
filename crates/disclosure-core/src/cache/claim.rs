//! Inflight claims - exclusive right to fetch a set of identities
//!
//! The inflight table maps each claimed identity to the id of the claim that
//! owns it. An [`InflightClaim`] can only release entries carrying its own id,
//! so a claim that outlives `clear_all` never frees a newer pass's identities.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

use crate::identity::Identity;

pub(crate) type InflightTable = Arc<Mutex<HashMap<Identity, u64>>>;

/// Ownership token for a set of claimed identities.
///
/// Released explicitly with [`InflightClaim::release`] or implicitly on drop,
/// which covers early returns and cancelled futures.
#[must_use = "dropping a claim releases it immediately"]
pub struct InflightClaim {
    id: u64,
    identities: HashSet<Identity>,
    table: InflightTable,
}

impl InflightClaim {
    pub(crate) fn new(id: u64, identities: HashSet<Identity>, table: InflightTable) -> Self {
        Self {
            id,
            identities,
            table,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Identities this claim newly acquired.
    pub fn identities(&self) -> &HashSet<Identity> {
        &self.identities
    }

    /// Whether nothing was acquired (every requested identity was already inflight).
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.identities.contains(identity)
    }

    /// Give back every identity for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&Identity) -> bool) {
        let dropped: Vec<Identity> = self
            .identities
            .iter()
            .filter(|id| !keep(*id))
            .cloned()
            .collect();
        if dropped.is_empty() {
            return;
        }

        let mut table = self.table.lock();
        for identity in &dropped {
            self.identities.remove(identity);
            if table.get(identity) == Some(&self.id) {
                table.remove(identity);
            }
        }
    }

    /// Release the claim.
    pub fn release(self) {
        // Drop does the work
    }

    fn release_inner(&mut self) {
        if self.identities.is_empty() {
            return;
        }
        let mut table = self.table.lock();
        let mut released = 0usize;
        for identity in self.identities.drain() {
            if table.get(&identity) == Some(&self.id) {
                table.remove(&identity);
                released += 1;
            }
        }
        trace!(claim = self.id, released, "Released inflight claim");
    }
}

impl Drop for InflightClaim {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for InflightClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflightClaim")
            .field("id", &self.id)
            .field("identities", &self.identities)
            .finish()
    }
}
