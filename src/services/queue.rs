use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::AsyncCommands;

use crate::models::job::QueuedJob;

/// Number of priority classes (enterprise 0 .. free 3).
pub const PRIORITY_CLASSES: u8 = 4;

const PENDING_KEY_PREFIX: &str = "customgen:jobs:p";
const PROCESSING_KEY: &str = "customgen:processing";
const DELAYED_KEY: &str = "customgen:delayed";
const DEAD_KEY: &str = "customgen:dead";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Retry policy applied by the queue on nack. Configuration, not hardwired:
/// both binaries read it from `AppConfig`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: base, 2x base, 4x base, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Durable, priority-ordered, at-least-once work queue.
///
/// `nack` re-schedules the job after the given delay with its attempt counter
/// incremented; once attempts are exhausted the job is dead-lettered and will
/// not be redelivered.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Next job in priority order (lower class first, FIFO within a class), or
    /// None if the queue is empty.
    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledge successful handling; removes the in-flight marker.
    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Negative-acknowledge: schedule redelivery after `retry_after`, or
    /// dead-letter if attempts are exhausted.
    async fn nack(&self, job: &QueuedJob, retry_after: Duration) -> Result<(), QueueError>;

    /// Pending jobs across all priority classes (feeds the depth gauge).
    async fn queue_depth(&self) -> Result<u64, QueueError>;
}

/// Redis-backed queue: one pending list per priority class, a processing list
/// for at-least-once delivery, a delayed ZSET for backoff, a dead-letter list.
pub struct RedisJobQueue {
    client: redis::Client,
    policy: RetryPolicy,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str, policy: RetryPolicy) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, policy })
    }

    fn pending_key(priority: u8) -> String {
        format!("{PENDING_KEY_PREFIX}{}", priority.min(PRIORITY_CLASSES - 1))
    }

    /// Move delayed jobs whose due time has passed back onto their pending
    /// lists.
    async fn promote_due(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<(), QueueError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(DELAYED_KEY, "-inf", now_ms)
            .await?;

        for payload in due {
            // Only the claimant that removes the member re-enqueues it, so a
            // promoted job is never duplicated across workers.
            let removed: i64 = conn.zrem(DELAYED_KEY, &payload).await?;
            if removed > 0 {
                let job: QueuedJob = serde_json::from_str(&payload)?;
                conn.lpush::<_, _, ()>(Self::pending_key(job.priority), &payload)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(Self::pending_key(job.priority), &payload)
            .await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.promote_due(&mut conn).await?;

        for priority in 0..PRIORITY_CLASSES {
            let result: Option<String> = conn
                .rpoplpush(Self::pending_key(priority), PROCESSING_KEY)
                .await?;
            if let Some(payload) = result {
                let job: QueuedJob = serde_json::from_str(&payload)?;
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    async fn nack(&self, job: &QueuedJob, retry_after: Duration) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;

        let next_attempt = job.attempt + 1;
        if next_attempt >= self.policy.max_attempts {
            tracing::warn!(
                job_id = %job.job_id,
                attempts = next_attempt,
                "retry attempts exhausted, dead-lettering"
            );
            conn.lpush::<_, _, ()>(DEAD_KEY, &payload).await?;
            return Ok(());
        }

        let retried = QueuedJob {
            attempt: next_attempt,
            ..job.clone()
        };
        let retried_payload = serde_json::to_string(&retried)?;
        let due_ms = chrono::Utc::now().timestamp_millis() + retry_after.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(DELAYED_KEY, &retried_payload, due_ms)
            .await?;
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut depth = 0u64;
        for priority in 0..PRIORITY_CLASSES {
            let len: u64 = conn.llen(Self::pending_key(priority)).await?;
            depth += len;
        }
        Ok(depth)
    }
}

/// In-memory queue with the same semantics, for tests and local development.
pub struct InMemoryJobQueue {
    state: Mutex<MemQueueState>,
    policy: RetryPolicy,
}

#[derive(Default)]
struct MemQueueState {
    pending: Vec<VecDeque<QueuedJob>>,
    delayed: Vec<(Instant, QueuedJob)>,
    processing: Vec<QueuedJob>,
    dead: Vec<QueuedJob>,
}

impl InMemoryJobQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(MemQueueState {
                pending: (0..PRIORITY_CLASSES).map(|_| VecDeque::new()).collect(),
                ..Default::default()
            }),
            policy,
        }
    }

    pub fn dead_letter_count(&self) -> usize {
        self.state.lock().unwrap().dead.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().processing.len()
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let class = usize::from(job.priority.min(PRIORITY_CLASSES - 1));
        state.pending[class].push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut state = self.state.lock().unwrap();

        let now = Instant::now();
        let due: Vec<QueuedJob> = {
            let (ready, waiting): (Vec<_>, Vec<_>) =
                state.delayed.drain(..).partition(|(at, _)| *at <= now);
            state.delayed = waiting;
            ready.into_iter().map(|(_, job)| job).collect()
        };
        for job in due {
            let class = usize::from(job.priority.min(PRIORITY_CLASSES - 1));
            state.pending[class].push_back(job);
        }

        for class in 0..usize::from(PRIORITY_CLASSES) {
            if let Some(job) = state.pending[class].pop_front() {
                state.processing.push(job.clone());
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.processing.retain(|j| j != job);
        Ok(())
    }

    async fn nack(&self, job: &QueuedJob, retry_after: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.processing.retain(|j| j != job);

        let next_attempt = job.attempt + 1;
        if next_attempt >= self.policy.max_attempts {
            state.dead.push(job.clone());
            return Ok(());
        }

        let retried = QueuedJob {
            attempt: next_attempt,
            ..job.clone()
        };
        state.delayed.push((Instant::now() + retry_after, retried));
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let state = self.state.lock().unwrap();
        Ok(state.pending.iter().map(|q| q.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job(priority: u8) -> QueuedJob {
        QueuedJob {
            job_id: Uuid::new_v4(),
            priority,
            attempt: 0,
        }
    }

    fn queue() -> InMemoryJobQueue {
        InMemoryJobQueue::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn lower_priority_class_dequeues_first() {
        let q = queue();
        let free = job(3);
        let enterprise = job(0);
        q.enqueue(&free).await.unwrap();
        q.enqueue(&enterprise).await.unwrap();

        assert_eq!(q.dequeue().await.unwrap().unwrap(), enterprise);
        assert_eq!(q.dequeue().await.unwrap().unwrap(), free);
    }

    #[tokio::test]
    async fn fifo_within_a_priority_class() {
        let q = queue();
        let first = job(1);
        let second = job(1);
        q.enqueue(&first).await.unwrap();
        q.enqueue(&second).await.unwrap();

        assert_eq!(q.dequeue().await.unwrap().unwrap(), first);
        assert_eq!(q.dequeue().await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn nack_redelivers_with_incremented_attempt() {
        let q = queue();
        let j = job(2);
        q.enqueue(&j).await.unwrap();

        let delivered = q.dequeue().await.unwrap().unwrap();
        q.nack(&delivered, Duration::ZERO).await.unwrap();

        let redelivered = q.dequeue().await.unwrap().unwrap();
        assert_eq!(redelivered.job_id, j.job_id);
        assert_eq!(redelivered.attempt, 1);
        assert_eq!(q.in_flight_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_dead_letter() {
        let q = queue();
        let j = job(0);
        q.enqueue(&j).await.unwrap();

        for _ in 0..2 {
            let delivered = q.dequeue().await.unwrap().unwrap();
            q.nack(&delivered, Duration::ZERO).await.unwrap();
        }
        // Third delivery fails: attempts exhausted.
        let delivered = q.dequeue().await.unwrap().unwrap();
        assert_eq!(delivered.attempt, 2);
        q.nack(&delivered, Duration::ZERO).await.unwrap();

        assert_eq!(q.dead_letter_count(), 1);
        assert!(q.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_clears_in_flight() {
        let q = queue();
        let j = job(1);
        q.enqueue(&j).await.unwrap();
        let delivered = q.dequeue().await.unwrap().unwrap();
        q.ack(&delivered).await.unwrap();
        assert_eq!(q.in_flight_count(), 0);
        assert_eq!(q.queue_depth().await.unwrap(), 0);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(8));
    }
}
