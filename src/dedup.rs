// ============================================================================
// Redelivery Claim Guard
// ============================================================================
//
// Several scheduler instances tick against the same Redis on overlapping
// schedules. The claim marker is the arbiter: a no-expiry key named by the
// payload's identity token, written at enqueue, consumed with GETDEL at
// drain. GETDEL is atomic, so exactly one instance observes the marker and
// performs the redelivery; everyone else loses the race and skips.
//
// Losing the race is an expected outcome, not an error.
//
// ============================================================================

use redrive_store::RedisStore;
use tracing::debug;

/// Marker value; only presence matters, the content is never read.
const CLAIM_MARKER: &str = "true";

/// Arbitrates exclusive redelivery of a retry attempt between concurrent
/// scheduler instances.
#[derive(Clone)]
pub struct DedupGuard {
    store: RedisStore,
}

impl DedupGuard {
    pub fn new(store: RedisStore) -> Self {
        Self { store }
    }

    /// Register a claim marker for `token`.
    ///
    /// Written without expiry: the marker must outlive the bucket TTL, or a
    /// delayed drain would find the entry unclaimable and drop it.
    pub async fn register(&self, token: &str) -> redrive_store::Result<()> {
        let mut store = self.store.clone();
        store.set(token, CLAIM_MARKER).await?;

        debug!(token = %token, "Claim marker registered");
        Ok(())
    }

    /// Atomically consume the claim marker for `token`.
    ///
    /// Returns true iff the marker existed - the caller is then the sole
    /// claimant and must perform the redelivery. False means another
    /// instance already claimed it, or the token was never registered.
    pub async fn claim(&self, token: &str) -> redrive_store::Result<bool> {
        let mut store = self.store.clone();
        let marker: Option<String> = store.get_del(token).await?;
        let claimed = marker.is_some();

        debug!(token = %token, claimed = claimed, "Claim attempted");
        Ok(claimed)
    }
}
