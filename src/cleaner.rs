use std::sync::Arc;

use tracing::{debug, trace};

use crate::table::FailureTable;

/// Periodic sweeper (spec §4.5, component C7). Wakes every `cleanup_period` and
/// drops stale members from both indices, taking the coarse lock only to
/// snapshot and to remove now-empty entries - per-entry cleanup itself runs
/// under the Entry/OfferSet's own lock, outside the coarse one, matching the
/// lock-ordering rule the rest of this crate follows.
pub(crate) async fn run_cleaner(table: Arc<FailureTable>) {
    let mut interval = tokio::time::interval(table.config.cleanup_period);
    // The first tick fires immediately; skip it so cleanup doesn't race construction.
    interval.tick().await;
    loop {
        interval.tick().await;
        sweep_entries(&table);
        sweep_offers(&table);
    }
}

fn sweep_entries(table: &FailureTable) {
    let now = table.clock.now();
    let max_lifetime = table.config.max_lifetime;

    let snapshot = {
        let inner = table.inner.lock();
        inner.entries.values().cloned().collect::<Vec<_>>()
    };

    let mut emptied = Vec::new();
    for entry in &snapshot {
        entry.cleanup(now, max_lifetime);
        if entry.is_empty(now, max_lifetime) {
            emptied.push(*entry.key());
        }
    }

    if emptied.is_empty() {
        return;
    }
    let mut inner = table.inner.lock();
    let mut removed = 0;
    for key in emptied {
        if inner.entries.remove(&key).is_some() {
            removed += 1;
        }
    }
    debug!(removed, "cleaner removed empty entries");
}

fn sweep_offers(table: &FailureTable) {
    let now = table.clock.now();
    let offer_expiry = table.config.offer_expiry;

    let snapshot = {
        let inner = table.inner.lock();
        inner.offers.values().cloned().collect::<Vec<_>>()
    };

    let mut emptied = Vec::new();
    for set in &snapshot {
        set.cleanup(now, offer_expiry);
        if set.is_empty() {
            emptied.push(*set.key());
        }
    }

    if emptied.is_empty() {
        return;
    }
    let mut removed_keys = Vec::new();
    {
        let mut inner = table.inner.lock();
        for key in &emptied {
            if inner.offers.get(key).is_some_and(|s| s.is_empty()) && inner.offers.remove(key).is_some() {
                removed_keys.push(*key);
            }
        }
    }
    // Client layer is notified outside the coarse lock, same as `on_found`.
    for key in &removed_keys {
        table.client_queue.dequeue_offered_key(key);
    }
    trace!(removed = removed_keys.len(), "cleaner removed empty offer sets");
}
