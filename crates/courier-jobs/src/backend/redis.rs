use super::{JobBackend, JobRequest, QueueStats};
use crate::error::{JobError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::Connection;
use redis::{AsyncCommands, Client, Script};

/// Redis-backed broker.
///
/// Ready jobs live in a list (`{prefix}:ready`), held jobs in a sorted set
/// (`{prefix}:delayed`) scored by `ready_at` in microseconds, the resolution of
/// [`JobRequest::ready_at`] comparisons elsewhere. Held members are prefixed with
/// a zero-padded sequence number so equal scores keep submission order.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    client: Client,
    ready_key: String,
    delayed_key: String,
    seq_key: String,
    promote_script: Script,
}

impl RedisBackend {
    pub fn new(url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| JobError::Config(e.to_string()))?;

        // Atomically move every due member from the sorted set to the ready list
        let promote_script = Script::new(
            r#"
            local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
            for _, member in ipairs(due) do
                redis.call('ZREM', KEYS[1], member)
                local sep = string.find(member, '|', 1, true)
                redis.call('RPUSH', KEYS[2], string.sub(member, sep + 1))
            end
            return #due
        "#,
        );

        Ok(Self {
            client,
            ready_key: format!("{}:ready", prefix),
            delayed_key: format!("{}:delayed", prefix),
            seq_key: format!("{}:seq", prefix),
            promote_script,
        })
    }

    async fn connection(&self) -> Result<Connection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| JobError::Backend(e.to_string()))
    }
}

/// Sorted-set score of `at`: whole microseconds since the epoch.
///
/// Exact in an `f64` for any date this side of the year 2255, so a job is
/// never due before its `ready_at`.
fn score(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64
}

fn from_score(score: f64) -> Option<DateTime<Utc>> {
    let micros = score as i64;
    DateTime::from_timestamp(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1_000) as u32,
    )
}

#[async_trait]
impl JobBackend for RedisBackend {
    async fn push(&self, job: JobRequest) -> Result<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&job)?;

        if job.is_ready(Utc::now()) {
            conn.rpush::<_, _, ()>(&self.ready_key, payload)
                .await
                .map_err(|e| JobError::Backend(e.to_string()))?;
        } else {
            let seq: u64 = conn
                .incr(&self.seq_key, 1)
                .await
                .map_err(|e| JobError::Backend(e.to_string()))?;
            let member = format!("{:020}|{}", seq, payload);
            let due = score(job.ready_at);

            conn.zadd::<_, _, _, ()>(&self.delayed_key, member, due)
                .await
                .map_err(|e| JobError::Backend(e.to_string()))?;
        }

        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobRequest>> {
        let mut conn = self.connection().await?;

        let result: Option<String> = conn
            .lpop(&self.ready_key, None)
            .await
            .map_err(|e| JobError::Backend(e.to_string()))?;

        match result {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.connection().await?;

        let promoted: usize = self
            .promote_script
            .key(&self.delayed_key)
            .key(&self.ready_key)
            .arg(now.timestamp_micros())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| JobError::Backend(e.to_string()))?;

        Ok(promoted)
    }

    async fn next_ready_at(&self) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.connection().await?;

        let head: Vec<(String, f64)> = conn
            .zrange_withscores(&self.delayed_key, 0, 0)
            .await
            .map_err(|e| JobError::Backend(e.to_string()))?;

        Ok(head.first().and_then(|(_, score)| from_score(*score)))
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut conn = self.connection().await?;

        let ready: u64 = conn
            .llen(&self.ready_key)
            .await
            .map_err(|e| JobError::Backend(e.to_string()))?;
        let delayed: u64 = conn
            .zcard(&self.delayed_key)
            .await
            .map_err(|e| JobError::Backend(e.to_string()))?;

        Ok(QueueStats { ready, delayed })
    }
}
