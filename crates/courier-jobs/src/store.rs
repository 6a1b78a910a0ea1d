use crate::error::Result;
use crate::record::JobRecord;
use async_trait::async_trait;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// Shared map from job id to the job's current record.
///
/// Implementations are internally synchronized. Writes that would move a
/// record out of a terminal state are dropped.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn put(&self, record: JobRecord) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<JobRecord>>;
}
