use fanwatch_store::StoreError;

/// Errors surfaced by the frequency scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Every tier's candidate query failed during one recompute.
    #[error("All stores unreachable: {0}")]
    StoresUnreachable(String),
    #[error("Invalid interval: {0}s (must be positive)")]
    InvalidInterval(i64),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
