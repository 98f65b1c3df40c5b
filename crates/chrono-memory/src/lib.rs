//! In-memory reference backend.
//!
//! Grounded on `InMemoryExecutionQueueRepository`/`InMemoryIdempotencyRepository`
//! (`tokio::sync::RwLock<HashMap<_, _>>`), generalized in one respect the
//! teacher's version doesn't need: `claim` holds a single `write()` guard
//! across the entire select-and-mutate critical section, because the
//! teacher's separate find/claim/save calls are not safe against concurrent
//! claimers and this backend must guarantee at most one claimant per task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_core::{
    Backend, BackendError, ClaimInput, Clock, DeleteKey, IdempotencyKey, Kind, KindStatistics,
    ScheduleInput, Task, TaskId, TaskStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    tasks: HashMap<TaskId, Task>,
    idempotency_index: HashMap<(Kind, IdempotencyKey), TaskId>,
}

pub struct InMemoryBackend {
    clock: Arc<dyn Clock>,
    store: RwLock<Store>,
}

impl InMemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, store: RwLock::new(Store::default()) }
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn schedule(&self, input: ScheduleInput) -> Result<Task, BackendError> {
        let mut store = self.store.write().await;

        if let Some(key) = &input.idempotency_key {
            let index_key = (input.kind.clone(), key.clone());
            if let Some(existing_id) = store.idempotency_index.get(&index_key) {
                if let Some(existing) = store.tasks.get(existing_id) {
                    if !existing.status.is_terminal() {
                        return Ok(existing.clone());
                    }
                }
            }
        }

        let task = Task {
            id: TaskId(Uuid::new_v4().to_string()),
            kind: input.kind.clone(),
            data: input.data,
            status: TaskStatus::Pending,
            priority: input.priority.unwrap_or(0),
            idempotency_key: input.idempotency_key.clone(),
            scheduled_at: input.when,
            original_schedule_date: input.when,
            claimed_at: None,
            last_executed_at: None,
            completed_at: None,
            retry_count: 0,
        };

        if let Some(key) = &input.idempotency_key {
            store.idempotency_index.insert((input.kind.clone(), key.clone()), task.id.clone());
        }
        store.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn claim(&self, input: ClaimInput) -> Result<Option<Task>, BackendError> {
        let mut store = self.store.write().await;
        let now = self.clock.now();
        let stale_before = now - chrono::Duration::milliseconds(input.claim_stale_timeout_ms as i64);

        let eligible_id = store
            .tasks
            .values()
            .filter(|task| task.kind == input.kind)
            .filter(|task| match task.status {
                TaskStatus::Pending => task.scheduled_at <= now,
                TaskStatus::Claimed => task.claimed_at.map(|claimed_at| claimed_at <= stale_before).unwrap_or(false),
                _ => false,
            })
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.scheduled_at.cmp(&b.scheduled_at))
                    .then(a.original_schedule_date.cmp(&b.original_schedule_date))
            })
            .map(|task| task.id.clone());

        let Some(id) = eligible_id else {
            return Ok(None);
        };

        let task = store.tasks.get_mut(&id).expect("id came from this map");
        task.status = TaskStatus::Claimed;
        task.claimed_at = Some(now);
        Ok(Some(task.clone()))
    }

    async fn complete(&self, id: &TaskId) -> Result<Task, BackendError> {
        let mut store = self.store.write().await;
        let now = self.clock.now();
        let task = store.tasks.get_mut(id).ok_or_else(|| BackendError::NotFound(id.clone()))?;

        if task.status == TaskStatus::Completed {
            return Ok(task.clone());
        }
        if task.status != TaskStatus::Claimed {
            return Err(BackendError::InvalidTransition {
                id: id.clone(),
                reason: format!("cannot complete a task in status {:?}", task.status),
            });
        }

        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.last_executed_at = Some(now);
        Ok(task.clone())
    }

    async fn unclaim(&self, id: &TaskId, next_scheduled_at: DateTime<Utc>) -> Result<Task, BackendError> {
        let mut store = self.store.write().await;
        let now = self.clock.now();
        let task = store.tasks.get_mut(id).ok_or_else(|| BackendError::NotFound(id.clone()))?;

        if task.status != TaskStatus::Claimed {
            return Err(BackendError::InvalidTransition {
                id: id.clone(),
                reason: format!("cannot unclaim a task in status {:?}", task.status),
            });
        }

        task.status = TaskStatus::Pending;
        task.scheduled_at = next_scheduled_at;
        task.retry_count += 1;
        task.claimed_at = None;
        task.last_executed_at = Some(now);
        Ok(task.clone())
    }

    async fn fail(&self, id: &TaskId) -> Result<Task, BackendError> {
        let mut store = self.store.write().await;
        let now = self.clock.now();
        let task = store.tasks.get_mut(id).ok_or_else(|| BackendError::NotFound(id.clone()))?;

        if task.status.is_terminal() {
            return Err(BackendError::InvalidTransition {
                id: id.clone(),
                reason: format!("cannot fail a task already in terminal status {:?}", task.status),
            });
        }

        task.status = TaskStatus::Failed;
        task.last_executed_at = Some(now);
        Ok(task.clone())
    }

    async fn delete(&self, key: DeleteKey, force: bool) -> Result<Option<Task>, BackendError> {
        let mut store = self.store.write().await;

        let id = match &key {
            DeleteKey::Id(id) => Some(id.clone()),
            DeleteKey::Idempotency { kind, idempotency_key } => {
                store.idempotency_index.get(&(kind.clone(), idempotency_key.clone())).cloned()
            }
        };

        let Some(id) = id else {
            return if force { Ok(None) } else { Err(BackendError::NotFound(TaskId("<unknown>".to_string()))) };
        };

        match store.tasks.get(&id) {
            None => {
                if force {
                    Ok(None)
                } else {
                    Err(BackendError::NotFound(id))
                }
            }
            Some(task) if task.status == TaskStatus::Pending || force => {
                let task = store.tasks.remove(&id).expect("checked above");
                if let Some(key) = &task.idempotency_key {
                    store.idempotency_index.remove(&(task.kind.clone(), key.clone()));
                }
                Ok(Some(task))
            }
            Some(_) => Err(BackendError::DeleteRefused(id)),
        }
    }

    async fn collect_statistics(&self, kinds: &[Kind]) -> Result<HashMap<Kind, KindStatistics>, BackendError> {
        let store = self.store.read().await;
        let mut result = HashMap::new();

        for kind in kinds {
            let mut stats = KindStatistics::default();
            for task in store.tasks.values().filter(|task| &task.kind == kind) {
                match task.status {
                    TaskStatus::Pending => stats.pending_count += 1,
                    TaskStatus::Claimed => stats.claimed_count += 1,
                    TaskStatus::Failed => stats.failed_count += 1,
                    TaskStatus::Completed => {}
                }
            }
            result.insert(kind.clone(), stats);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_core::VirtualClock;
    use std::sync::Arc;

    fn backend_with_clock() -> (InMemoryBackend, Arc<VirtualClock>) {
        let clock = VirtualClock::new(Utc::now());
        (InMemoryBackend::new(clock.clone() as Arc<dyn Clock>), clock)
    }

    #[tokio::test]
    async fn schedule_then_claim_round_trips_all_fields() {
        let (backend, clock) = backend_with_clock();
        let input = ScheduleInput::new("email", serde_json::json!({"to": "x"}), clock.now())
            .with_priority(3)
            .with_idempotency_key("k1");

        let scheduled = backend.schedule(input).await.expect("schedule succeeds");
        let claimed = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 })
            .await
            .expect("claim succeeds")
            .expect("a task is eligible");

        assert_eq!(claimed.id, scheduled.id);
        assert_eq!(claimed.data, scheduled.data);
        assert_eq!(claimed.kind, scheduled.kind);
        assert_eq!(claimed.priority, scheduled.priority);
        assert_eq!(claimed.original_schedule_date, scheduled.original_schedule_date);
        assert_eq!(claimed.idempotency_key, scheduled.idempotency_key);
        assert_eq!(claimed.status, TaskStatus::Claimed);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_the_first_task_unchanged() {
        let (backend, clock) = backend_with_clock();
        let first = backend
            .schedule(
                ScheduleInput::new("x", serde_json::json!({"a": 1}), clock.now()).with_idempotency_key("k1"),
            )
            .await
            .expect("first schedule succeeds");

        let second = backend
            .schedule(
                ScheduleInput::new("x", serde_json::json!({"a": 2}), clock.now()).with_idempotency_key("k1"),
            )
            .await
            .expect("second schedule succeeds");

        assert_eq!(first.id, second.id);
        assert_eq!(second.data, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn task_at_exactly_scheduled_at_now_is_claimable() {
        let (backend, clock) = backend_with_clock();
        let now = clock.now();
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), now)).await.unwrap();

        let claimed = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 })
            .await
            .expect("claim succeeds");
        assert!(claimed.is_some());
    }

    #[tokio::test]
    async fn stale_claimed_task_is_reclaimable_without_incrementing_retry_count() {
        let (backend, clock) = backend_with_clock();
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now())).await.unwrap();

        let first_claim = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 1000 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first_claim.retry_count, 0);

        clock.advance(std::time::Duration::from_millis(1001));

        let reclaimed = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 1000 })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reclaimed.id, first_claim.id);
        assert_eq!(reclaimed.retry_count, 0);
    }

    #[tokio::test]
    async fn priority_ordering_claims_lowest_value_first() {
        let (backend, clock) = backend_with_clock();
        for priority in [5, 1, 3] {
            backend
                .schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now()).with_priority(priority))
                .await
                .unwrap();
        }

        let mut claimed_priorities = Vec::new();
        for _ in 0..3 {
            let task = backend
                .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 })
                .await
                .unwrap()
                .unwrap();
            backend.complete(&task.id).await.unwrap();
            claimed_priorities.push(task.priority);
        }

        assert_eq!(claimed_priorities, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn unclaim_increments_retry_count_and_reschedules() {
        let (backend, clock) = backend_with_clock();
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now())).await.unwrap();
        let claimed = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 })
            .await
            .unwrap()
            .unwrap();

        let next_at = clock.now() + chrono::Duration::milliseconds(100);
        let unclaimed = backend.unclaim(&claimed.id, next_at).await.unwrap();

        assert_eq!(unclaimed.retry_count, 1);
        assert_eq!(unclaimed.status, TaskStatus::Pending);
        assert_eq!(unclaimed.scheduled_at, next_at);
        assert!(unclaimed.claimed_at.is_none());
    }

    #[tokio::test]
    async fn delete_of_claimed_task_without_force_is_refused() {
        let (backend, clock) = backend_with_clock();
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now())).await.unwrap();
        let claimed = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 })
            .await
            .unwrap()
            .unwrap();

        let result = backend.delete(DeleteKey::Id(claimed.id.clone()), false).await;
        assert!(matches!(result, Err(BackendError::DeleteRefused(_))));

        let forced = backend.delete(DeleteKey::Id(claimed.id), true).await.unwrap();
        assert!(forced.is_some());
    }

    #[tokio::test]
    async fn concurrent_claims_never_return_the_same_task_twice() {
        let (backend, clock) = backend_with_clock();
        let backend = Arc::new(backend);
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now())).await.unwrap();

        let claim_input = || ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 };
        let (a, b) = tokio::join!(backend.claim(claim_input()), backend.claim(claim_input()));

        let claimed_count = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(claimed_count, 1);
    }

    #[tokio::test]
    async fn collect_statistics_counts_by_status() {
        let (backend, clock) = backend_with_clock();
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now())).await.unwrap();
        backend.schedule(ScheduleInput::new("email", serde_json::json!({}), clock.now())).await.unwrap();
        let claimed = backend
            .claim(ClaimInput { kind: Kind::from("email"), claim_stale_timeout_ms: 60_000 })
            .await
            .unwrap()
            .unwrap();
        backend.fail(&claimed.id).await.unwrap();

        let stats = backend.collect_statistics(&[Kind::from("email")]).await.unwrap();
        let email_stats = stats.get(&Kind::from("email")).unwrap();

        assert_eq!(email_stats.pending_count, 1);
        assert_eq!(email_stats.failed_count, 1);
        assert_eq!(email_stats.claimed_count, 0);
    }
}
