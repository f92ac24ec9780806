//! Execution Monitor / Scheduler (spec.md §4.J, §5).
//!
//! Grounded on the teacher's `ProcessorChain` (`crates/pipeline/src/
//! processors/chain.rs`): a channel-connected worker loop that pops
//! work, hands it to a processing step, and reports completion back.
//! Generalized here into a priority queue with a bounded concurrency
//! cap, a task state machine, and a capped history ring. The registry
//! lock is a single `parking_lot::Mutex` covering the queue, running
//! set, history and index together — the spec calls for a per-task
//! mutex plus a separate pointer-shuffle registry mutex; one consolidated
//! lock stands in for both here, held only for in-memory bookkeeping and
//! never across a subprocess wait (see DESIGN.md).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use shellwright_core::{Platform, Policy, Priority, TaskId};

use crate::executor::{ExecErrorKind, ExecutionResult, PreparedScript, ScriptExecutor};
use crate::policy::{Decision, SafetyValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Queued,
    Preparing,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled | TaskState::TimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskErrorKind {
    PolicyDenied,
    SpawnFailed,
    NonZeroExit,
    TimedOut,
    Cancelled,
    Internal,
}

impl From<ExecErrorKind> for TaskErrorKind {
    fn from(kind: ExecErrorKind) -> Self {
        match kind {
            ExecErrorKind::NonZeroExit => TaskErrorKind::NonZeroExit,
            ExecErrorKind::TimedOut => TaskErrorKind::TimedOut,
            ExecErrorKind::Cancelled => TaskErrorKind::Cancelled,
            ExecErrorKind::SpawnFailed => TaskErrorKind::SpawnFailed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub platform: Platform,
    pub script: String,
    pub policy: Policy,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout_seconds: u64,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub wall_time_ms: u64,
    pub peak_memory_bytes: Option<u64>,
    pub cpu_percent_peak: Option<f32>,
    pub io_bytes_read: Option<u64>,
    pub io_bytes_written: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error_kind: Option<TaskErrorKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTask {
    pub id: TaskId,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub request: Option<ExecutionRequest>,
    pub priority: Priority,
    pub state: TaskState,
    pub result: Option<TaskResult>,
    pub metrics: Option<TaskMetrics>,
    #[serde(skip)]
    aged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal,
    NotFound,
}

/// Fired at most once per transition (`StateChanged`) and exactly once
/// per terminal transition (`Completed`), spec.md §5 "Ordering
/// guarantees".
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    StateChanged { task_id: TaskId, state: TaskState },
    Completed { task_id: TaskId },
}

pub type EventSender = mpsc::UnboundedSender<SchedulerEvent>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub totals_by_state: HashMap<TaskState, u64>,
    pub success_rate_24h: f32,
    pub avg_wall_time_ms_by_platform: HashMap<Platform, f64>,
    pub queue_depth: usize,
}

struct PlatformAccumulator {
    sum_ms: u64,
    count: u64,
}

struct SchedulerState {
    queue: Vec<TaskId>,
    running: std::collections::HashSet<TaskId>,
    history: VecDeque<TaskId>,
    tasks: HashMap<TaskId, ExecutionTask>,
    cancel_signals: HashMap<TaskId, watch::Sender<bool>>,
    callbacks: HashMap<TaskId, EventSender>,
    totals_by_state: HashMap<TaskState, u64>,
    completions_24h: VecDeque<(DateTime<Utc>, bool)>,
    platform_wall_time: HashMap<Platform, PlatformAccumulator>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            queue: Vec::new(),
            running: std::collections::HashSet::new(),
            history: VecDeque::new(),
            tasks: HashMap::new(),
            cancel_signals: HashMap::new(),
            callbacks: HashMap::new(),
            totals_by_state: HashMap::new(),
            completions_24h: VecDeque::new(),
            platform_wall_time: HashMap::new(),
        }
    }

    fn set_state(&mut self, id: TaskId, state: TaskState) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if let Some(count) = self.totals_by_state.get_mut(&task.state) {
                *count = count.saturating_sub(1);
            }
            task.state = state;
            *self.totals_by_state.entry(state).or_insert(0) += 1;
        }
        if let Some(sender) = self.callbacks.get(&id) {
            let _ = sender.send(SchedulerEvent::StateChanged { task_id: id, state });
        }
    }

    fn fire_complete(&mut self, id: TaskId) {
        if let Some(sender) = self.callbacks.get(&id) {
            let _ = sender.send(SchedulerEvent::Completed { task_id: id });
        }
    }
}

/// Owns the queue, running set, history and statistics, spec.md §4.J.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    executor: ScriptExecutor,
    validator: SafetyValidator,
    max_concurrent: usize,
    history_max: usize,
    max_timeout_seconds: u64,
    resource_sample_interval_ms: u64,
    grace_period_ms: u64,
    aging_threshold: ChronoDuration,
    max_captured_bytes: usize,
}

impl Scheduler {
    pub fn new(
        max_concurrent: usize,
        history_max: usize,
        max_timeout_seconds: u64,
        resource_sample_interval_ms: u64,
        grace_period_ms: u64,
        aging_threshold_seconds: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState::new()),
            executor: ScriptExecutor::new(),
            validator: SafetyValidator::new(),
            max_concurrent,
            history_max,
            max_timeout_seconds,
            resource_sample_interval_ms,
            grace_period_ms,
            aging_threshold: ChronoDuration::seconds(aging_threshold_seconds as i64),
            max_captured_bytes: 256 * 1024,
        })
    }

    /// Validate, safety-check, then enqueue or fail-fast, spec.md §4.J
    /// `submit`.
    pub fn submit(
        self: &Arc<Self>,
        request: ExecutionRequest,
        priority: Priority,
        callbacks: Option<EventSender>,
    ) -> Result<TaskId, shellwright_core::Error> {
        if request.script.trim().is_empty() {
            return Err(shellwright_core::Error::validation("script must not be empty"));
        }
        if request.timeout_seconds == 0 || request.timeout_seconds > self.max_timeout_seconds {
            return Err(shellwright_core::Error::validation(format!(
                "timeoutSeconds must be in [1, {}]",
                self.max_timeout_seconds
            )));
        }

        let id = TaskId::new();
        let now = Utc::now();
        let report = self.validator.evaluate(&request.script, request.platform, request.policy);

        let mut state = self.state.lock();
        if let Some(sender) = &callbacks {
            state.callbacks.insert(id, sender.clone());
        }

        if report.decision == Decision::Deny {
            let task = ExecutionTask {
                id,
                submitted_at: now,
                started_at: None,
                completed_at: Some(now),
                request: Some(request),
                priority,
                state: TaskState::Failed,
                result: Some(TaskResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    error_kind: Some(TaskErrorKind::PolicyDenied),
                }),
                metrics: None,
                aged: false,
            };
            state.tasks.insert(id, task);
            *state.totals_by_state.entry(TaskState::Failed).or_insert(0) += 1;
            Self::push_history(&mut state, id, self.history_max);
            state.fire_complete(id);
            warn!(task_id = %id, issues = report.issues.len(), "task denied by safety policy at submit");
            return Ok(id);
        }

        let task = ExecutionTask {
            id,
            submitted_at: now,
            started_at: None,
            completed_at: None,
            request: Some(request),
            priority,
            state: TaskState::Queued,
            result: None,
            metrics: None,
            aged: false,
        };
        state.tasks.insert(id, task);
        *state.totals_by_state.entry(TaskState::Queued).or_insert(0) += 1;
        state.queue.push(id);
        drop(state);

        self.tick();
        Ok(id)
    }

    fn push_history(state: &mut SchedulerState, id: TaskId, history_max: usize) {
        state.history.push_back(id);
        while state.history.len() > history_max {
            if let Some(evicted) = state.history.pop_front() {
                state.tasks.remove(&evicted);
            }
        }
        state.callbacks.remove(&id);
        state.cancel_signals.remove(&id);
    }

    /// Runs the scheduler tick loop, promoting queued tasks while
    /// capacity allows, spec.md §4.J "Scheduler tick". Invoked on
    /// submit and on every terminal transition.
    pub fn tick(self: &Arc<Self>) {
        loop {
            let promoted = {
                let mut state = self.state.lock();
                self.apply_aging(&mut state);

                if state.running.len() >= self.max_concurrent {
                    None
                } else {
                    Self::pick_next(&mut state).map(|id| {
                        state.running.insert(id);
                        id
                    })
                }
            };

            match promoted {
                Some(id) => {
                    let scheduler = self.clone();
                    tokio::spawn(async move { scheduler.run_task(id).await });
                }
                None => break,
            }
        }
    }

    fn apply_aging(&self, state: &mut SchedulerState) {
        let now = Utc::now();
        for id in state.queue.clone() {
            if let Some(task) = state.tasks.get_mut(&id) {
                if !task.aged && task.priority != Priority::High && now - task.submitted_at >= self.aging_threshold {
                    task.priority = task.priority.bump();
                    task.aged = true;
                }
            }
        }
    }

    /// Highest priority, earliest `submittedAt` wins; removes it from
    /// the queue vector.
    fn pick_next(state: &mut SchedulerState) -> Option<TaskId> {
        let best_index = state
            .queue
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| state.tasks.get(id).map(|task| (idx, task.priority, task.submitted_at)))
            .max_by(|(_, prio_a, at_a), (_, prio_b, at_b)| {
                prio_a.cmp(prio_b).then_with(|| at_b.cmp(at_a))
            })
            .map(|(idx, _, _)| idx)?;

        Some(state.queue.remove(best_index))
    }

    async fn run_task(self: Arc<Self>, id: TaskId) {
        let request = {
            let mut state = self.state.lock();
            state.set_state(id, TaskState::Preparing);
            let (tx, rx) = watch::channel(false);
            state.cancel_signals.insert(id, tx);
            let request = state.tasks.get(&id).and_then(|t| t.request.clone());
            (request, rx)
        };
        let (request, cancel_rx) = request;

        let Some(request) = request else {
            self.finish_task(id, TaskState::Failed, None, Some(TaskErrorKind::Internal), None).await;
            return;
        };

        let staged = self.executor.stage_script(request.platform, &request.script);
        let Ok(staged) = staged else {
            self.finish_task(id, TaskState::Failed, None, Some(TaskErrorKind::SpawnFailed), None).await;
            return;
        };

        {
            let mut state = self.state.lock();
            if let Some(task) = state.tasks.get_mut(&id) {
                task.started_at = Some(Utc::now());
            }
            state.set_state(id, TaskState::Running);
        }

        let prepared = PreparedScript {
            platform: request.platform,
            script_path: staged.path().to_path_buf(),
            interpreter_args: Vec::new(),
            working_dir: request.working_dir.clone(),
            env: request.env.clone(),
            timeout_seconds: request.timeout_seconds,
            resource_sample_interval_ms: self.resource_sample_interval_ms,
            grace_period_ms: self.grace_period_ms,
            max_captured_bytes: self.max_captured_bytes,
        };

        let result = self.executor.run(&prepared, cancel_rx).await;
        drop(staged);

        let (terminal, error_kind) = Self::classify(&result);
        let metrics = TaskMetrics {
            wall_time_ms: (result.finished_at - result.started_at).num_milliseconds().max(0) as u64,
            peak_memory_bytes: result.resources.peak_memory_bytes,
            cpu_percent_peak: result.resources.peak_cpu_percent,
            io_bytes_read: result.resources.io_read_bytes,
            io_bytes_written: result.resources.io_write_bytes,
        };
        let task_result = TaskResult {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            error_kind,
        };

        self.finish_task(id, terminal, Some(task_result), error_kind, Some(metrics)).await;
    }

    fn classify(result: &ExecutionResult) -> (TaskState, Option<TaskErrorKind>) {
        match result.error_kind {
            None => (TaskState::Completed, None),
            Some(ExecErrorKind::NonZeroExit) => (TaskState::Failed, Some(TaskErrorKind::NonZeroExit)),
            Some(ExecErrorKind::TimedOut) => (TaskState::TimedOut, Some(TaskErrorKind::TimedOut)),
            Some(ExecErrorKind::Cancelled) => (TaskState::Cancelled, Some(TaskErrorKind::Cancelled)),
            Some(ExecErrorKind::SpawnFailed) => (TaskState::Failed, Some(TaskErrorKind::SpawnFailed)),
        }
    }

    async fn finish_task(
        self: &Arc<Self>,
        id: TaskId,
        terminal: TaskState,
        result: Option<TaskResult>,
        error_kind: Option<TaskErrorKind>,
        metrics: Option<TaskMetrics>,
    ) {
        let mut state = self.state.lock();
        state.running.remove(&id);

        if let Some(task) = state.tasks.get_mut(&id) {
            task.completed_at = Some(Utc::now());
            task.result = result;
            task.metrics = metrics;
        }
        state.set_state(id, terminal);

        let platform = state.tasks.get(&id).and_then(|t| t.request.as_ref()).map(|r| r.platform);
        if let (Some(platform), Some(task)) = (platform, state.tasks.get(&id)) {
            if let Some(metrics) = &task.metrics {
                let acc = state
                    .platform_wall_time
                    .entry(platform)
                    .or_insert(PlatformAccumulator { sum_ms: 0, count: 0 });
                acc.sum_ms += metrics.wall_time_ms;
                acc.count += 1;
            }
        }

        let success = terminal == TaskState::Completed;
        let now = Utc::now();
        state.completions_24h.push_back((now, success));
        while state
            .completions_24h
            .front()
            .map(|(at, _)| now - *at > ChronoDuration::hours(24))
            .unwrap_or(false)
        {
            state.completions_24h.pop_front();
        }

        Self::push_history(&mut state, id, self.history_max);
        state.fire_complete(id);
        drop(state);

        info!(task_id = %id, state = ?terminal, error_kind = ?error_kind, "task reached terminal state");
        self.tick();
    }

    /// `cancelled` / `alreadyTerminal` / `notFound`, spec.md §4.J
    /// `cancel`. Idempotent: a second call after convergence returns
    /// `alreadyTerminal`.
    pub fn cancel(self: &Arc<Self>, id: TaskId) -> CancelOutcome {
        let mut state = self.state.lock();

        let Some(task) = state.tasks.get(&id) else {
            return CancelOutcome::NotFound;
        };

        if task.state.is_terminal() {
            return CancelOutcome::AlreadyTerminal;
        }

        if let Some(pos) = state.queue.iter().position(|queued| *queued == id) {
            state.queue.remove(pos);
            if let Some(task) = state.tasks.get_mut(&id) {
                task.completed_at = Some(Utc::now());
                task.result = Some(TaskResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    error_kind: Some(TaskErrorKind::Cancelled),
                });
            }
            state.set_state(id, TaskState::Cancelled);
            Self::push_history(&mut state, id, self.history_max);
            state.fire_complete(id);
            return CancelOutcome::Cancelled;
        }

        if let Some(sender) = state.cancel_signals.get(&id) {
            let _ = sender.send(true);
            return CancelOutcome::Cancelled;
        }

        CancelOutcome::NotFound
    }

    pub fn get(&self, id: TaskId) -> Option<ExecutionTask> {
        self.state.lock().tasks.get(&id).cloned()
    }

    pub fn list(&self, state_filter: Option<TaskState>) -> Vec<ExecutionTask> {
        self.state
            .lock()
            .tasks
            .values()
            .filter(|task| state_filter.map(|s| task.state == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn history(&self, limit: usize) -> Vec<ExecutionTask> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect()
    }

    pub fn running(&self) -> Vec<ExecutionTask> {
        let state = self.state.lock();
        state.running.iter().filter_map(|id| state.tasks.get(id).cloned()).collect()
    }

    pub fn statistics(&self) -> Statistics {
        let state = self.state.lock();

        let total = state.completions_24h.len();
        let successes = state.completions_24h.iter().filter(|(_, success)| *success).count();
        let success_rate_24h = if total == 0 { 1.0 } else { successes as f32 / total as f32 };

        let avg_wall_time_ms_by_platform = state
            .platform_wall_time
            .iter()
            .map(|(platform, acc)| {
                let avg = if acc.count == 0 { 0.0 } else { acc.sum_ms as f64 / acc.count as f64 };
                (*platform, avg)
            })
            .collect();

        Statistics {
            totals_by_state: state.totals_by_state.clone(),
            success_rate_24h,
            avg_wall_time_ms_by_platform,
            queue_depth: state.queue.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(script: &str, timeout: u64) -> ExecutionRequest {
        ExecutionRequest {
            platform: Platform::Bash,
            script: script.to_string(),
            policy: Policy::Standard,
            working_dir: None,
            env: HashMap::new(),
            timeout_seconds: timeout,
            parameters: None,
        }
    }

    #[tokio::test]
    async fn denied_script_is_failed_immediately_without_running() {
        let scheduler = Scheduler::new(2, 50, 60, 100, 200, 30);
        let id = scheduler.submit(request("rm -rf /", 5), Priority::Normal, None).unwrap();

        let task = scheduler.get(id).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.result.unwrap().error_kind, Some(TaskErrorKind::PolicyDenied));
    }

    #[tokio::test]
    async fn clean_script_completes() {
        let scheduler = Scheduler::new(2, 50, 60, 50, 200, 30);
        let id = scheduler.submit(request("echo hi", 5), Priority::Normal, None).unwrap();

        for _ in 0..50 {
            if scheduler.get(id).unwrap().state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let task = scheduler.get(id).unwrap();
        assert_eq!(task.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn running_count_never_exceeds_max_concurrent() {
        let scheduler = Scheduler::new(1, 50, 60, 50, 200, 30);
        let a = scheduler.submit(request("sleep 1", 5), Priority::Normal, None).unwrap();
        let _b = scheduler.submit(request("sleep 1", 5), Priority::Normal, None).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.running().len() <= 1);
        assert_eq!(scheduler.get(a).unwrap().state, TaskState::Running);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let scheduler = Scheduler::new(1, 50, 60, 50, 200, 30);
        let id = scheduler.submit(request("sleep 5", 10), Priority::Normal, None).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let first = scheduler.cancel(id);
        assert_eq!(first, CancelOutcome::Cancelled);

        for _ in 0..50 {
            if scheduler.get(id).unwrap().state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let second = scheduler.cancel(id);
        assert_eq!(second, CancelOutcome::AlreadyTerminal);
    }

    #[tokio::test]
    async fn cancel_unknown_id_returns_not_found() {
        let scheduler = Scheduler::new(1, 50, 60, 50, 200, 30);
        assert_eq!(scheduler.cancel(TaskId::new()), CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn queue_picks_highest_priority_then_earliest_submission() {
        let scheduler = Scheduler::new(1, 50, 60, 50, 200, 30);
        // Saturate the single worker slot so nothing drains the queue yet.
        let _running = scheduler.submit(request("sleep 5", 10), Priority::Normal, None).unwrap();

        let low = scheduler.submit(request("echo low", 5), Priority::Low, None).unwrap();
        let high_first = scheduler.submit(request("echo high-first", 5), Priority::High, None).unwrap();
        let high_second = scheduler.submit(request("echo high-second", 5), Priority::High, None).unwrap();

        let state = scheduler.state.lock();
        // Highest priority wins; within High, earlier submission (high_first)
        // sits ahead of high_second in pick order, and low trails both.
        assert_eq!(state.queue, vec![low, high_first, high_second]);
        drop(state);

        let picked = {
            let mut state = scheduler.state.lock();
            Scheduler::pick_next(&mut state)
        };
        assert_eq!(picked, Some(high_first));
    }

    #[tokio::test]
    async fn aged_low_priority_task_is_bumped_once() {
        let scheduler = Scheduler::new(1, 50, 60, 50, 200, 0);
        let _running = scheduler.submit(request("sleep 5", 10), Priority::Normal, None).unwrap();
        let id = scheduler.submit(request("echo stale", 5), Priority::Low, None).unwrap();

        {
            let mut state = scheduler.state.lock();
            scheduler.apply_aging(&mut state);
        }
        assert_eq!(scheduler.get(id).unwrap().priority, Priority::Normal);

        // A second pass must not bump it again past what one aging step grants.
        {
            let mut state = scheduler.state.lock();
            scheduler.apply_aging(&mut state);
        }
        assert_eq!(scheduler.get(id).unwrap().priority, Priority::Normal);
    }
}
