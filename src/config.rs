use std::num::NonZeroUsize;
use std::time::Duration;

/// Feature flags read at each operation, per spec §6's configuration table.
///
/// Both off means the subsystem is inert: `on_failed`/`on_final_failure` don't
/// record anything, `on_found` still erases entries (privacy is not optional)
/// but skips emitting offers, and `on_offer`/`get_offers` are no-ops.
#[derive(Debug, Clone, Copy)]
pub struct FailureTableConfig {
    /// Gates `on_found`'s outgoing offers, `on_offer` acceptance, and `get_offers`.
    pub enable_ulpr_propagation: bool,
    /// Gates `on_failed`/`on_final_failure` recording and `timed_out_nodes_list`.
    pub enable_per_node_failure_tables: bool,

    pub max_entries: NonZeroUsize,
    pub max_offers: NonZeroUsize,

    /// Total lifetime of an Entry; past this it is treated as empty regardless of contents.
    pub max_lifetime: Duration,
    /// Freshness window of an inbound offer.
    pub offer_expiry: Duration,
    /// Period between cleaner sweeps.
    pub cleanup_period: Duration,
}

impl Default for FailureTableConfig {
    fn default() -> Self {
        Self {
            enable_ulpr_propagation: true,
            enable_per_node_failure_tables: true,
            max_entries: NonZeroUsize::new(2000).unwrap(),
            max_offers: NonZeroUsize::new(1000).unwrap(),
            max_lifetime: Duration::from_secs(60 * 60),
            offer_expiry: Duration::from_secs(10 * 60),
            cleanup_period: Duration::from_secs(30 * 60),
        }
    }
}
