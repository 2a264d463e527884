//! Repository seam between the orchestrator, the request layer and storage.

use skylift_core::DeploymentRecord;

use crate::error::StateResult;

/// Keyed access to deployment records.
///
/// `put` replaces the whole record. Only the orchestration task that owns
/// a deployment calls `put` for it after creation.
pub trait DeploymentRepository: Send + Sync {
    fn get(&self, id: &str) -> StateResult<Option<DeploymentRecord>>;

    fn put(&self, record: &DeploymentRecord) -> StateResult<()>;

    fn list(&self) -> StateResult<Vec<DeploymentRecord>>;

    /// Records requested by `owner`, compared case-insensitively.
    fn list_by_owner(&self, owner: &str) -> StateResult<Vec<DeploymentRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.owner.eq_ignore_ascii_case(owner))
            .collect())
    }
}
