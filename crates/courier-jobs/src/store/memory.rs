use super::StatusStore;
use crate::error::{JobError, Result};
use crate::record::JobRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory status store (not persistent, for testing/dev)
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatusStore {
    records: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn put(&self, record: JobRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| JobError::Store("Lock poisoned".to_string()))?;

        if let Some(current) = records.get(&record.id) {
            if !current.state.can_transition_to(record.state) {
                tracing::warn!(
                    job_id = %record.id,
                    from = %current.state,
                    to = %record.state,
                    "Dropping status write for finished job"
                );
                return Ok(());
            }
        }

        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| JobError::Store("Lock poisoned".to_string()))?;
        Ok(records.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::JobRequest;
    use crate::record::{JobState, Progress};
    use chrono::Utc;

    fn pending(id: &str) -> JobRecord {
        let now = Utc::now();
        JobRecord::pending(&JobRequest {
            id: id.to_string(),
            name: "test_job".to_string(),
            payload: serde_json::Value::Null,
            created_at: now,
            ready_at: now,
        })
    }

    #[tokio::test]
    async fn missing_id_is_none() {
        let store = InMemoryStatusStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn terminal_record_is_never_overwritten() {
        let store = InMemoryStatusStore::new();
        let record = pending("job-1");
        store.put(record.clone()).await.unwrap();

        let done = record.succeeded(Progress::done(), "done", None);
        store.put(done.clone()).await.unwrap();

        store
            .put(record.advanced(Progress::new(3, 5), "late tick"))
            .await
            .unwrap();
        store.put(record.failed("late failure")).await.unwrap();

        let stored = store.get("job-1").await.unwrap().unwrap();
        assert_eq!(stored, done);
        assert_eq!(stored.state, JobState::Success);
    }

    #[tokio::test]
    async fn concurrent_writers_on_distinct_ids_do_not_interfere() {
        let store = InMemoryStatusStore::new();
        let mut tasks = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("job-{}", n);
                let record = pending(&id);
                for step in 0..20 {
                    store
                        .put(record.advanced(Progress::new(step, 20), format!("{}", n)))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len(), 8);
        for n in 0..8 {
            let record = store.get(&format!("job-{}", n)).await.unwrap().unwrap();
            assert_eq!(record.progress, Progress::new(19, 20));
            assert_eq!(record.status, n.to_string());
        }
    }
}
