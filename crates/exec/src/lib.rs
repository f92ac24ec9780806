//! Safety Validator, Script Executor and Execution Monitor
//! (spec.md §4.H, §4.I, §4.J, §5).
//!
//! Grounded on the teacher's `tools` crate for the guarded-check shape
//! behind the safety validator, and its `pipeline` crate's
//! `ProcessorChain` for the concurrent worker-loop shape behind the
//! scheduler (see each module's doc comment for specifics).

pub mod executor;
pub mod policy;
pub mod scheduler;

pub use executor::{ExecErrorKind, ExecutionResult, PreparedScript, ResourceSample, ScriptExecutor};
pub use policy::{Decision, IssueSeverity, PolicyIssue, PolicyReport, SafetyValidator};
pub use scheduler::{
    CancelOutcome, EventSender, ExecutionRequest, ExecutionTask, Scheduler, SchedulerEvent,
    Statistics, TaskErrorKind, TaskMetrics, TaskResult, TaskState,
};
