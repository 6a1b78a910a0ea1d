use super::StatusStore;
use crate::error::{JobError, Result};
use crate::record::JobRecord;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;

/// Redis-backed status store.
///
/// Records are stored as JSON under `{prefix}:meta:{id}` and expire after `ttl`.
#[derive(Debug, Clone)]
pub struct RedisStatusStore {
    client: Client,
    prefix: String,
    ttl: Duration,
    put_script: Script,
}

impl RedisStatusStore {
    pub fn new(url: &str, prefix: &str, ttl: Duration) -> Result<Self> {
        let client = Client::open(url).map_err(|e| JobError::Config(e.to_string()))?;

        // Same rule as `JobState::can_transition_to`: finished records are final
        // and a running job never falls back to PENDING
        let put_script = Script::new(
            r#"
            local current = redis.call('GET', KEYS[1])
            if current then
                local state = cjson.decode(current)['state']
                if state == 'SUCCESS' or state == 'FAILURE' then
                    return 0
                end
                if state == 'PROGRESS' and ARGV[3] == 'PENDING' then
                    return 0
                end
            end
            redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
            return 1
        "#,
        );

        Ok(Self {
            client,
            prefix: prefix.to_string(),
            ttl,
            put_script,
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:meta:{}", self.prefix, id)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn put(&self, record: JobRecord) -> Result<()> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| JobError::Store(e.to_string()))?;

        let payload = serde_json::to_string(&record)?;
        let written: i32 = self
            .put_script
            .key(self.key(&record.id))
            .arg(payload)
            .arg(self.ttl.as_secs().max(1))
            .arg(record.state.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| JobError::Store(e.to_string()))?;

        if written == 0 {
            tracing::warn!(
                job_id = %record.id,
                to = %record.state,
                "Dropping status write that would move the job backwards"
            );
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| JobError::Store(e.to_string()))?;

        let result: Option<String> = conn
            .get(self.key(id))
            .await
            .map_err(|e| JobError::Store(e.to_string()))?;

        match result {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }
}
