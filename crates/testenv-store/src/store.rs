use async_trait::async_trait;
use testenv_domain::EnvironmentRecord;

use crate::error::StoreError;

/// Persistence boundary for [`EnvironmentRecord`]. One record per test
/// environment id; operations are keyed by that id alone.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Writes `record` so that a subsequent `load` for the same id returns
    /// it in full, even across a process crash between the write and the
    /// return of this call.
    async fn save(&self, record: &EnvironmentRecord) -> Result<(), StoreError>;

    /// Returns `Ok(None)` if no record has ever been saved for `id`, rather
    /// than an error — callers distinguish "unknown id" from I/O failure.
    async fn load(&self, id: &str) -> Result<Option<EnvironmentRecord>, StoreError>;

    /// Removes the record for `id`. Succeeds whether or not `id` exists.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Lists the ids of every currently persisted record, in no particular
    /// order.
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}
