//! The execution engine
//!
//! Runs exactly one computation per declared task. The claim transition is
//! an atomic compare-and-set on the task record under the table lock; the
//! computation itself runs with no lock held; the commit re-checks the
//! claim, writes all result rows through the store and flips the task to
//! `Done` in one step. A worker whose claim was released while it computed
//! finds its claim gone at commit time and its output is discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use vcm_match::MatchOutcome;
use vcm_paramset::ParamSetId;
use vcm_volume::{Mask, SegmentationId, VolumeId};

use crate::error::{DeclareError, EngineError, TaskError};
use crate::state::{validate_transition, TaskState};
use crate::store::{MatchId, ResultStore};
use crate::task::{GroupId, MatchTaskKey, SegmentationTaskKey, TaskId, TaskKind, TaskRecord};

/// What a task runner hands back on success
#[derive(Debug)]
pub enum TaskOutput {
    /// Masks for the task's volume, ready to commit
    Segmentation(Vec<Mask>),
    /// Full matching outcome for the task's member set
    Match(MatchOutcome),
}

impl TaskOutput {
    /// The task kind this output belongs to
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            TaskOutput::Segmentation(_) => TaskKind::Segmentation,
            TaskOutput::Match(_) => TaskKind::Match,
        }
    }
}

/// Runs the task-type-specific computation
///
/// Implementations fetch their own inputs (volume data, member
/// segmentations) and must not write results anywhere; the engine commits
/// the returned output.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Produce the output for one claimed task
    async fn run(&self, task: &TaskRecord) -> Result<TaskOutput, TaskError>;
}

/// Reference to a committed result row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResultRef {
    /// A committed segmentation row
    Segmentation(SegmentationId),
    /// A committed volume-match row
    Match(MatchId),
}

/// Outcome of an `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// This call ran the computation and committed the result
    Completed(TaskResultRef),
    /// The task was already done; the stored result is returned
    AlreadyDone(TaskResultRef),
    /// Another worker holds the claim; nothing was run
    AlreadyClaimed,
}

impl ExecuteOutcome {
    /// The committed result, if this outcome carries one
    #[must_use]
    pub const fn result(&self) -> Option<TaskResultRef> {
        match self {
            ExecuteOutcome::Completed(r) | ExecuteOutcome::AlreadyDone(r) => Some(*r),
            ExecuteOutcome::AlreadyClaimed => None,
        }
    }
}

enum Claim {
    Claimed(TaskRecord),
    AlreadyClaimed,
    AlreadyDone,
}

/// Task registry plus at-most-once executor
pub struct ExecutionEngine {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
    results: Arc<ResultStore>,
    runner: Arc<dyn TaskRunner>,
}

impl ExecutionEngine {
    /// Create an engine over a shared result store and a runner
    #[must_use]
    pub fn new(results: Arc<ResultStore>, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            results,
            runner,
        }
    }

    /// The shared result store (read access)
    #[must_use]
    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// Declare a segmentation task; idempotent on the `(volume, paramset)` key
    pub fn declare_segmentation_task(&self, volume: VolumeId, paramset: ParamSetId) -> TaskId {
        let id = TaskId::Segmentation(SegmentationTaskKey::new(volume, paramset));
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            tracing::debug!("task {} re-declared, no-op", id);
        } else {
            tasks.insert(id.clone(), TaskRecord::new(id.clone(), None));
            tracing::info!("declared task {}", id);
        }
        id
    }

    /// Declare a match task over `members` under one ParamSet
    ///
    /// # Errors
    /// - [`DeclareError::InvalidTask`] with fewer than two distinct members
    /// - [`DeclareError::UnmetDependency`] if a member volume has no
    ///   committed segmentation under `paramset`
    /// - [`DeclareError::Conflict`] if the identical key was declared under
    ///   a different group label
    pub fn declare_match_task(
        &self,
        group: GroupId,
        paramset: ParamSetId,
        members: impl IntoIterator<Item = VolumeId>,
    ) -> Result<TaskId, DeclareError> {
        let key = MatchTaskKey::new(members, paramset);
        if key.members().len() < 2 {
            return Err(DeclareError::InvalidTask(format!(
                "match task requires at least 2 distinct member volumes, got {}",
                key.members().len()
            )));
        }
        for volume in key.members() {
            let seg_key = SegmentationTaskKey::new(*volume, paramset);
            if !self.results.has_segmentation(&seg_key) {
                return Err(DeclareError::UnmetDependency { volume: *volume });
            }
        }

        let id = TaskId::Match(key);
        let mut tasks = self.tasks.write();
        if let Some(existing) = tasks.get(&id) {
            if existing.group.as_ref() == Some(&group) {
                tracing::debug!("task {} re-declared, no-op", id);
                return Ok(id);
            }
            return Err(DeclareError::Conflict {
                task: id.clone(),
                existing: existing
                    .group
                    .clone()
                    .unwrap_or_else(|| GroupId::new("<none>")),
            });
        }
        tasks.insert(id.clone(), TaskRecord::new(id.clone(), Some(group)));
        drop(tasks);
        tracing::info!("declared task {}", id);
        Ok(id)
    }

    /// Execute a declared task at most once
    ///
    /// Claims the task, runs the computation unlocked, then commits all
    /// result rows and marks the task `Done` atomically. On failure the
    /// task returns to `Pending` and the classified error surfaces.
    ///
    /// # Errors
    /// [`EngineError::UnknownTask`] for undeclared ids, or
    /// [`EngineError::Task`] when the computation or commit fails.
    pub async fn execute(&self, id: &TaskId) -> Result<ExecuteOutcome, EngineError> {
        let claim = {
            let mut tasks = self.tasks.write();
            let record = tasks
                .get_mut(id)
                .ok_or_else(|| EngineError::UnknownTask(id.clone()))?;
            match record.state {
                TaskState::Running => Claim::AlreadyClaimed,
                TaskState::Done => Claim::AlreadyDone,
                TaskState::Pending => {
                    validate_transition(TaskState::Pending, TaskState::Running)?;
                    record.state = TaskState::Running;
                    record.attempts += 1;
                    Claim::Claimed(record.clone())
                }
            }
        };

        let record = match claim {
            Claim::AlreadyClaimed => {
                tracing::debug!("task {} already claimed, skipping", id);
                return Ok(ExecuteOutcome::AlreadyClaimed);
            }
            Claim::AlreadyDone => {
                let stored = self
                    .result_ref(id)
                    .ok_or_else(|| EngineError::ResultMissing(id.clone()))?;
                tracing::debug!("task {} already done, returning stored result", id);
                return Ok(ExecuteOutcome::AlreadyDone(stored));
            }
            Claim::Claimed(record) => record,
        };
        tracing::debug!("claimed task {} (attempt {})", record.id, record.attempts);

        let started = Instant::now();
        match self.runner.run(&record).await {
            Ok(output) => {
                let elapsed = started.elapsed().as_secs_f64();
                match self.commit(id, record.attempts, output, elapsed) {
                    Ok(result) => {
                        tracing::info!("task {} done", id);
                        Ok(ExecuteOutcome::Completed(result))
                    }
                    Err(err) => {
                        tracing::warn!("task {} commit rejected: {}", id, err);
                        Err(EngineError::Task(err))
                    }
                }
            }
            Err(err) => {
                self.requeue(id, record.attempts);
                tracing::warn!(
                    "task {} failed: {} (retryable: {})",
                    id,
                    err,
                    err.is_retryable()
                );
                Err(EngineError::Task(err))
            }
        }
    }

    /// Revert a `Running` task to `Pending` (operator abort or crash recovery)
    ///
    /// # Errors
    /// [`EngineError::UnknownTask`] for undeclared ids, or a transition
    /// error if the task is not `Running`.
    pub fn release(&self, id: &TaskId) -> Result<(), EngineError> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownTask(id.clone()))?;
        validate_transition(record.state, TaskState::Pending)?;
        record.state = TaskState::Pending;
        drop(tasks);
        tracing::info!("released task {} back to pending", id);
        Ok(())
    }

    /// Current lifecycle state of a task
    #[must_use]
    pub fn state(&self, id: &TaskId) -> Option<TaskState> {
        self.tasks.read().get(id).map(|r| r.state)
    }

    /// Snapshot of a task record
    #[must_use]
    pub fn record(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.read().get(id).cloned()
    }

    /// Number of declared tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// Write all result rows and flip the task to `Done` in one step
    ///
    /// Re-checks the claim under the table lock. `claim_attempt` is the
    /// attempt counter this worker's claim was stamped with; a record whose
    /// counter has moved on belongs to a later claimant, so the check proves
    /// the claim is still this worker's, not merely that some claim is live.
    /// A released or superseded claim means the output is discarded.
    fn commit(
        &self,
        id: &TaskId,
        claim_attempt: u32,
        output: TaskOutput,
        duration_secs: f64,
    ) -> Result<TaskResultRef, TaskError> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::transient("task record missing at commit"))?;
        if record.state != TaskState::Running || record.attempts != claim_attempt {
            return Err(TaskError::transient(
                "claim was released before commit, output discarded",
            ));
        }

        let staged = match (id, output) {
            (TaskId::Segmentation(key), TaskOutput::Segmentation(masks)) => self
                .results
                .commit_segmentation(*key, masks)
                .map(TaskResultRef::Segmentation),
            (TaskId::Match(key), TaskOutput::Match(outcome)) => self
                .results
                .commit_match(key.clone(), outcome, duration_secs)
                .map(TaskResultRef::Match),
            (_, output) => {
                record.state = TaskState::Pending;
                return Err(TaskError::data(format!(
                    "runner produced {:?} output for task {}",
                    output.kind(),
                    id
                )));
            }
        };

        match staged {
            Ok(result) => {
                record.state = TaskState::Done;
                Ok(result)
            }
            Err(err) => {
                record.state = TaskState::Pending;
                Err(err.into())
            }
        }
    }

    fn requeue(&self, id: &TaskId, claim_attempt: u32) {
        let mut tasks = self.tasks.write();
        if let Some(record) = tasks.get_mut(id) {
            // Only the claim's own failure may revert it; a worker whose
            // claim was released must not yank a later claimant's.
            if record.state == TaskState::Running && record.attempts == claim_attempt {
                record.state = TaskState::Pending;
            }
        }
    }

    fn result_ref(&self, id: &TaskId) -> Option<TaskResultRef> {
        match id {
            TaskId::Segmentation(key) => self
                .results
                .segmentation(key)
                .map(|s| TaskResultRef::Segmentation(s.id())),
            TaskId::Match(key) => self
                .results
                .volume_match(key)
                .map(|m| TaskResultRef::Match(m.id())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use vcm_paramset::{canonical_hash, ParamContent};
    use vcm_volume::LocalMaskId;

    fn paramset() -> ParamSetId {
        ParamSetId::new(canonical_hash(&ParamContent::new()).unwrap())
    }

    fn good_masks() -> Vec<Mask> {
        vec![
            Mask::new(LocalMaskId(1), vec![[0, 0, 0]], 1.0),
            Mask::new(LocalMaskId(2), vec![[1, 1, 1]], 0.9),
        ]
    }

    /// Counts runs; fails the first `fail_first` attempts as transient.
    struct ScriptedRunner {
        runs: AtomicUsize,
        fail_first: usize,
        delay: Duration,
        masks: fn() -> Vec<Mask>,
    }

    impl ScriptedRunner {
        fn succeeding() -> Self {
            Self {
                runs: AtomicUsize::new(0),
                fail_first: 0,
                delay: Duration::ZERO,
                masks: good_masks,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::succeeding()
            }
        }

        fn failing_first(n: usize) -> Self {
            Self {
                fail_first: n,
                ..Self::succeeding()
            }
        }

        fn poisoned() -> Self {
            Self {
                masks: || {
                    vec![
                        Mask::new(LocalMaskId(1), vec![[0, 0, 0]], 1.0),
                        Mask::new(LocalMaskId(1), vec![[1, 1, 1]], 1.0),
                    ]
                },
                ..Self::succeeding()
            }
        }
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, _task: &TaskRecord) -> Result<TaskOutput, TaskError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(TaskError::transient("scripted failure"));
            }
            Ok(TaskOutput::Segmentation((self.masks)()))
        }
    }

    fn engine_with(runner: ScriptedRunner) -> (Arc<ExecutionEngine>, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(ResultStore::new()),
            Arc::clone(&runner) as Arc<dyn TaskRunner>,
        ));
        (engine, runner)
    }

    #[test]
    fn declare_segmentation_task_is_idempotent() {
        let (engine, _) = engine_with(ScriptedRunner::succeeding());
        let volume = VolumeId::new();
        let p = paramset();
        let a = engine.declare_segmentation_task(volume, p);
        let b = engine.declare_segmentation_task(volume, p);
        assert_eq!(a, b);
        assert_eq!(engine.task_count(), 1);
        assert_eq!(engine.state(&a), Some(TaskState::Pending));
    }

    #[test]
    fn declare_match_task_requires_two_distinct_members() {
        let (engine, _) = engine_with(ScriptedRunner::succeeding());
        let volume = VolumeId::new();
        let err = engine
            .declare_match_task(GroupId::new("g"), paramset(), [volume, volume])
            .unwrap_err();
        assert!(matches!(err, DeclareError::InvalidTask(_)));
    }

    #[test]
    fn declare_match_task_requires_completed_segmentations() {
        let (engine, _) = engine_with(ScriptedRunner::succeeding());
        let p = paramset();
        let (a, b) = (VolumeId::new(), VolumeId::new());
        engine
            .results()
            .commit_segmentation(SegmentationTaskKey::new(a, p), good_masks())
            .unwrap();

        let err = engine
            .declare_match_task(GroupId::new("g"), p, [a, b])
            .unwrap_err();
        assert!(matches!(err, DeclareError::UnmetDependency { volume } if volume == b));
    }

    #[test]
    fn declare_match_task_conflicts_on_group_rebinding() {
        let (engine, _) = engine_with(ScriptedRunner::succeeding());
        let p = paramset();
        let (a, b) = (VolumeId::new(), VolumeId::new());
        for v in [a, b] {
            engine
                .results()
                .commit_segmentation(SegmentationTaskKey::new(v, p), good_masks())
                .unwrap();
        }

        let first = engine
            .declare_match_task(GroupId::new("week1-4"), p, [a, b])
            .unwrap();
        let again = engine
            .declare_match_task(GroupId::new("week1-4"), p, [b, a])
            .unwrap();
        assert_eq!(first, again);

        let err = engine
            .declare_match_task(GroupId::new("other"), p, [a, b])
            .unwrap_err();
        assert!(matches!(err, DeclareError::Conflict { .. }));
    }

    #[tokio::test]
    async fn execute_commits_once_and_replays_stored_result() {
        let (engine, runner) = engine_with(ScriptedRunner::succeeding());
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let first = engine.execute(&id).await.unwrap();
        let ExecuteOutcome::Completed(TaskResultRef::Segmentation(seg_id)) = first else {
            panic!("expected Completed, got {first:?}");
        };
        assert_eq!(engine.state(&id), Some(TaskState::Done));
        assert_eq!(engine.results().segmentation_count(), 1);

        let second = engine.execute(&id).await.unwrap();
        assert_eq!(
            second,
            ExecuteOutcome::AlreadyDone(TaskResultRef::Segmentation(seg_id))
        );
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_unknown_task_errors() {
        let (engine, _) = engine_with(ScriptedRunner::succeeding());
        let id = TaskId::Segmentation(SegmentationTaskKey::new(VolumeId::new(), paramset()));
        let err = engine.execute(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn failed_run_requeues_and_retry_succeeds() {
        let (engine, _) = engine_with(ScriptedRunner::failing_first(1));
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let err = engine.execute(&id).await.unwrap_err();
        let EngineError::Task(task_err) = err else {
            panic!("expected task error");
        };
        assert!(task_err.is_retryable());
        assert_eq!(engine.state(&id), Some(TaskState::Pending));
        assert_eq!(engine.results().segmentation_count(), 0);

        let outcome = engine.execute(&id).await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
        assert_eq!(engine.record(&id).unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn poisoned_output_commits_nothing() {
        let (engine, _) = engine_with(ScriptedRunner::poisoned());
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let err = engine.execute(&id).await.unwrap_err();
        let EngineError::Task(task_err) = err else {
            panic!("expected task error");
        };
        assert!(matches!(task_err, TaskError::Data { .. }));
        assert_eq!(engine.state(&id), Some(TaskState::Pending));
        assert_eq!(engine.results().segmentation_count(), 0);
    }

    /// Runner that reports Match output regardless of the task kind.
    struct WrongKindRunner;

    #[async_trait]
    impl TaskRunner for WrongKindRunner {
        async fn run(&self, _task: &TaskRecord) -> Result<TaskOutput, TaskError> {
            Ok(TaskOutput::Match(MatchOutcome::default()))
        }
    }

    #[tokio::test]
    async fn mismatched_output_kind_is_data_error() {
        let engine = ExecutionEngine::new(Arc::new(ResultStore::new()), Arc::new(WrongKindRunner));
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let err = engine.execute(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Task(TaskError::Data { .. })));
        assert_eq!(engine.state(&id), Some(TaskState::Pending));
    }

    #[tokio::test]
    async fn concurrent_executes_run_single_computation() {
        let (engine, runner) = engine_with(ScriptedRunner::with_delay(Duration::from_millis(25)));
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            handles.push(tokio::spawn(async move { engine.execute(&id).await }));
        }

        let mut completed = 0;
        let mut skipped = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ExecuteOutcome::Completed(_) => completed += 1,
                ExecuteOutcome::AlreadyClaimed | ExecuteOutcome::AlreadyDone(_) => skipped += 1,
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(skipped, 7);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(engine.results().segmentation_count(), 1);
    }

    /// Runner gated on a notify so tests can hold a task in `Running`.
    struct GatedRunner {
        started: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TaskRunner for GatedRunner {
        async fn run(&self, _task: &TaskRecord) -> Result<TaskOutput, TaskError> {
            self.started.notify_one();
            self.gate.notified().await;
            Ok(TaskOutput::Segmentation(good_masks()))
        }
    }

    #[tokio::test]
    async fn released_claim_discards_worker_output() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(ResultStore::new()),
            Arc::new(GatedRunner {
                started: Arc::clone(&started),
                gate: Arc::clone(&gate),
            }),
        ));
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let worker = {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            tokio::spawn(async move { engine.execute(&id).await })
        };
        started.notified().await;
        assert_eq!(engine.state(&id), Some(TaskState::Running));

        // Operator abort while the worker is mid-computation.
        engine.release(&id).unwrap();
        assert_eq!(engine.state(&id), Some(TaskState::Pending));

        gate.notify_one();
        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Task(TaskError::Transient { .. })));
        assert_eq!(engine.results().segmentation_count(), 0);
        assert_eq!(engine.state(&id), Some(TaskState::Pending));

        // The task is still executable afterwards.
        gate.notify_one();
        let outcome = engine.execute(&id).await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
    }

    /// Runner gating each attempt behind its own notify; outputs carry a
    /// per-attempt confidence stamp so tests can tell whose commit landed.
    struct AttemptStampedRunner {
        started: Arc<Notify>,
        gates: Vec<Arc<Notify>>,
        fail_first: bool,
    }

    #[async_trait]
    impl TaskRunner for AttemptStampedRunner {
        async fn run(&self, task: &TaskRecord) -> Result<TaskOutput, TaskError> {
            let attempt = task.attempts as usize;
            self.started.notify_one();
            self.gates[attempt - 1].notified().await;
            if attempt == 1 && self.fail_first {
                return Err(TaskError::transient("scripted failure"));
            }
            let confidence = if attempt == 1 { 0.25 } else { 0.75 };
            Ok(TaskOutput::Segmentation(vec![Mask::new(
                LocalMaskId(1),
                vec![[0, 0, 0]],
                confidence,
            )]))
        }
    }

    fn reclaim_rig(fail_first: bool) -> (Arc<ExecutionEngine>, Arc<Notify>, Vec<Arc<Notify>>) {
        let started = Arc::new(Notify::new());
        let gates = vec![Arc::new(Notify::new()), Arc::new(Notify::new())];
        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(ResultStore::new()),
            Arc::new(AttemptStampedRunner {
                started: Arc::clone(&started),
                gates: gates.clone(),
                fail_first,
            }),
        ));
        (engine, started, gates)
    }

    fn spawn_worker(
        engine: &Arc<ExecutionEngine>,
        id: &TaskId,
    ) -> tokio::task::JoinHandle<Result<ExecuteOutcome, EngineError>> {
        let engine = Arc::clone(engine);
        let id = id.clone();
        tokio::spawn(async move { engine.execute(&id).await })
    }

    #[tokio::test]
    async fn reclaimed_task_rejects_stale_commit() {
        let (engine, started, gates) = reclaim_rig(false);
        let volume = VolumeId::new();
        let p = paramset();
        let id = engine.declare_segmentation_task(volume, p);

        let first = spawn_worker(&engine, &id);
        started.notified().await;

        // Abort the first claim mid-computation and hand the task to a
        // second worker before the first one finishes.
        engine.release(&id).unwrap();
        let second = spawn_worker(&engine, &id);
        started.notified().await;
        assert_eq!(engine.record(&id).unwrap().attempts, 2);

        // The first worker finishes now. Its claim was attempt 1 but the
        // live claim is attempt 2: the stale output must be discarded even
        // though the task reads `Running`.
        gates[0].notify_one();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Task(TaskError::Transient { .. })));
        assert_eq!(engine.state(&id), Some(TaskState::Running));
        assert_eq!(engine.results().segmentation_count(), 0);

        gates[1].notify_one();
        let outcome = second.await.unwrap().unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
        assert_eq!(engine.state(&id), Some(TaskState::Done));

        let seg = engine
            .results()
            .segmentation(&SegmentationTaskKey::new(volume, p))
            .unwrap();
        assert_eq!(seg.masks()[0].confidence(), 0.75);
    }

    #[tokio::test]
    async fn stale_failure_does_not_requeue_live_claim() {
        let (engine, started, gates) = reclaim_rig(true);
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());

        let first = spawn_worker(&engine, &id);
        started.notified().await;
        engine.release(&id).unwrap();
        let second = spawn_worker(&engine, &id);
        started.notified().await;

        // The stale worker fails; that must not flip the second worker's
        // claim back to pending.
        gates[0].notify_one();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Task(TaskError::Transient { .. })));
        assert_eq!(engine.state(&id), Some(TaskState::Running));

        gates[1].notify_one();
        let outcome = second.await.unwrap().unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Completed(_)));
        assert_eq!(engine.state(&id), Some(TaskState::Done));
    }

    #[test]
    fn release_rejects_non_running_tasks() {
        let (engine, _) = engine_with(ScriptedRunner::succeeding());
        let id = engine.declare_segmentation_task(VolumeId::new(), paramset());
        let err = engine.release(&id).unwrap_err();
        assert!(matches!(err, EngineError::Transition(_)));
    }
}
