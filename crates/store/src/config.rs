/// Number of deltas each domain keeps for incremental catch-up.
pub const DEFAULT_DELTA_RETENTION: usize = 1000;

#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct StoreConfig {
    /// Deltas older than the newest `delta_retention` entries are dropped;
    /// consumers behind that window receive a full image instead.
    pub delta_retention: usize,
}

impl StoreConfig {
    #[must_use]
    pub const fn new(delta_retention: usize) -> Self {
        Self { delta_retention }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DELTA_RETENTION)
    }
}
