//! Saga Orchestration
//!
//! Runs an ordered list of steps against a shared state. Each reversible step
//! hands back a [`Compensation`]; when a later step fails the recorded
//! compensations run one at a time, newest first, before the failure is
//! reported. Steps never run concurrently and neither do compensations.

use crate::compensation::{Compensation, CompensationLog};
use crate::error::{PlatformError, ProvisioningError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Saga step status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Compensated,
    CompensationFailed,
}

/// Saga overall status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    Pending,
    Running,
    Completed,
    RolledBack,
    RollbackFailed,
}

/// Saga step record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the step list
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Undo recorded when the step completed
    pub compensation: Option<Compensation>,
    pub error: Option<String>,
}

/// Saga execution record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SagaExecution {
    pub id: String,
    pub saga_type: String,
    pub status: SagaStatus,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SagaExecution {
    pub fn new<'a>(saga_type: impl Into<String>, step_names: impl IntoIterator<Item = &'a str>) -> Self {
        let steps = step_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| StepRecord {
                index: i + 1,
                name: name.to_string(),
                status: StepStatus::Pending,
                started_at: None,
                completed_at: None,
                compensation: None,
                error: None,
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            saga_type: saga_type.into(),
            status: SagaStatus::Pending,
            steps,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record of step `index` (1-based)
    pub fn step(&self, index: usize) -> Option<&StepRecord> {
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Indices of the steps whose compensation ran, in the order they ran
    pub fn compensated_steps(&self) -> Vec<usize> {
        let mut compensated: Vec<&StepRecord> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Compensated)
            .collect();
        compensated.sort_by(|a, b| b.index.cmp(&a.index));
        compensated.iter().map(|s| s.index).collect()
    }

    fn record_mut(&mut self, index: usize) -> Option<&mut StepRecord> {
        match index.checked_sub(1) {
            Some(i) => self.steps.get_mut(i),
            None => None,
        }
    }

    fn finish(&mut self, status: SagaStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// One step of a saga over state `S`
#[async_trait]
pub trait SagaStep<S: Send>: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the step creates something that can be undone. Irreversible
    /// steps must never return a compensation.
    fn reversible(&self) -> bool {
        true
    }

    /// Run the step, returning the undo of whatever it created
    async fn execute(&self, state: &mut S) -> Result<Option<Compensation>, PlatformError>;
}

/// Executes compensations during rollback
#[async_trait]
pub trait Compensator: Send + Sync {
    async fn compensate(&self, compensation: &Compensation) -> Result<(), PlatformError>;
}

/// A failed saga run
///
/// Displays as `error`; walk the chain from `error` itself.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct SagaFailure {
    pub error: ProvisioningError,
    /// Trace of the attempt, including the rollback
    pub execution: SagaExecution,
}

/// Ordered saga definition
pub struct Saga<S> {
    saga_type: String,
    steps: Vec<Box<dyn SagaStep<S>>>,
}

impl<S: Send> Saga<S> {
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: impl SagaStep<S> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Execute saga with automatic compensation on failure
    pub async fn run<C>(&self, state: &mut S, compensator: &C) -> Result<SagaExecution, SagaFailure>
    where
        C: Compensator + ?Sized,
    {
        let mut execution = SagaExecution::new(&self.saga_type, self.step_names());
        let mut log = CompensationLog::new();
        execution.status = SagaStatus::Running;

        for (i, step) in self.steps.iter().enumerate() {
            let index = i + 1;
            if let Some(record) = execution.record_mut(index) {
                record.status = StepStatus::Running;
                record.started_at = Some(Utc::now());
            }
            tracing::debug!(saga = %self.saga_type, step = step.name(), index, "running step");

            match step.execute(state).await {
                Ok(compensation) => {
                    debug_assert!(
                        compensation.is_none() || step.reversible(),
                        "irreversible step {} returned a compensation",
                        step.name()
                    );
                    let compensation = compensation.filter(|_| step.reversible());
                    if let Some(record) = execution.record_mut(index) {
                        record.status = StepStatus::Completed;
                        record.completed_at = Some(Utc::now());
                        record.compensation = compensation.clone();
                    }
                    if let Some(compensation) = compensation {
                        log.push(index, compensation);
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        saga = %self.saga_type,
                        step = step.name(),
                        index,
                        error = %error,
                        compensations = log.len(),
                        "step failed, rolling back"
                    );
                    if let Some(record) = execution.record_mut(index) {
                        record.status = StepStatus::Failed;
                        record.completed_at = Some(Utc::now());
                        record.error = Some(error.to_string());
                    }
                    let error = unwind(&mut log, &mut execution, compensator, error).await;
                    return Err(SagaFailure { error, execution });
                }
            }
        }

        execution.finish(SagaStatus::Completed);
        Ok(execution)
    }
}

/// Run the log newest first. The first failing compensation stops the
/// unwind; the older ones are reported as pending.
async fn unwind<C>(
    log: &mut CompensationLog,
    execution: &mut SagaExecution,
    compensator: &C,
    cause: PlatformError,
) -> ProvisioningError
where
    C: Compensator + ?Sized,
{
    let mut entries = log.unwind();
    while let Some(entry) = entries.next() {
        match compensator.compensate(&entry.compensation).await {
            Ok(()) => {
                if let Some(record) = execution.record_mut(entry.step) {
                    record.status = StepStatus::Compensated;
                }
            }
            Err(rollback) => {
                let pending: Vec<Compensation> = entries.map(|e| e.compensation).collect();
                tracing::error!(
                    compensation = entry.compensation.action(),
                    step = entry.step,
                    error = %rollback,
                    pending = pending.len(),
                    "compensation failed, rollback aborted"
                );
                if let Some(record) = execution.record_mut(entry.step) {
                    record.status = StepStatus::CompensationFailed;
                    record.error = Some(rollback.to_string());
                }
                execution.finish(SagaStatus::RollbackFailed);
                return ProvisioningError::RollbackFailed {
                    cause,
                    rollback,
                    pending,
                };
            }
        }
    }

    execution.finish(SagaStatus::RolledBack);
    ProvisioningError::Platform(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Operation;
    use parking_lot::Mutex;

    /// Creates a role named after itself
    struct Create {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl SagaStep<Vec<String>> for Create {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, state: &mut Vec<String>) -> Result<Option<Compensation>, PlatformError> {
            if self.fail {
                return Err(PlatformError::new(Operation::CreateRole, "AlreadyExists", self.name));
            }
            state.push(self.name.to_string());
            Ok(Some(Compensation::DeleteRole {
                role_name: self.name.to_string(),
            }))
        }
    }

    struct Link {
        fail: bool,
    }

    #[async_trait]
    impl SagaStep<Vec<String>> for Link {
        fn name(&self) -> &str {
            "link"
        }

        fn reversible(&self) -> bool {
            false
        }

        async fn execute(&self, _state: &mut Vec<String>) -> Result<Option<Compensation>, PlatformError> {
            if self.fail {
                return Err(PlatformError::new(Operation::AttachRolePolicy, "NoSuchEntity", "link"));
            }
            Ok(None)
        }
    }

    /// Misbehaving irreversible step
    struct LeakyLink;

    #[async_trait]
    impl SagaStep<Vec<String>> for LeakyLink {
        fn name(&self) -> &str {
            "leaky"
        }

        fn reversible(&self) -> bool {
            false
        }

        async fn execute(&self, _state: &mut Vec<String>) -> Result<Option<Compensation>, PlatformError> {
            Ok(Some(Compensation::DeleteRole { role_name: "leaky".into() }))
        }
    }

    #[derive(Default)]
    struct Recorder {
        ran: Mutex<Vec<Compensation>>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn names(&self) -> Vec<String> {
            self.ran
                .lock()
                .iter()
                .map(|c| match c {
                    Compensation::DeleteRole { role_name } => role_name.clone(),
                    other => other.action().to_string(),
                })
                .collect()
        }
    }

    #[async_trait]
    impl Compensator for Recorder {
        async fn compensate(&self, compensation: &Compensation) -> Result<(), PlatformError> {
            self.ran.lock().push(compensation.clone());
            match (compensation, self.fail_on) {
                (Compensation::DeleteRole { role_name }, Some(fail)) if role_name == fail => {
                    Err(PlatformError::new(Operation::DeleteRole, "AccessDenied", role_name))
                }
                _ => Ok(()),
            }
        }
    }

    /// a, b, link, c, d with step `fail_at` (1-based) failing
    fn saga(fail_at: Option<usize>) -> Saga<Vec<String>> {
        let fails = |i: usize| fail_at == Some(i);
        Saga::new("test")
            .step(Create { name: "a", fail: fails(1) })
            .step(Create { name: "b", fail: fails(2) })
            .step(Link { fail: fails(3) })
            .step(Create { name: "c", fail: fails(4) })
            .step(Create { name: "d", fail: fails(5) })
    }

    #[tokio::test]
    async fn test_success_runs_no_compensation() {
        let recorder = Recorder::default();
        let mut state = Vec::new();

        let execution = tokio_test::assert_ok!(saga(None).run(&mut state, &recorder).await);

        assert_eq!(execution.status, SagaStatus::Completed);
        assert!(execution.completed_at.is_some());
        assert!(execution.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(state, vec!["a", "b", "c", "d"]);
        assert!(recorder.ran.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_at_every_step_unwinds_prefix() {
        let expected: [&[&str]; 5] = [&[], &["a"], &["b", "a"], &["b", "a"], &["c", "b", "a"]];

        for (i, want) in expected.iter().enumerate() {
            let fail_at = i + 1;
            let recorder = Recorder::default();
            let mut state = Vec::new();

            let failure = tokio_test::assert_err!(saga(Some(fail_at)).run(&mut state, &recorder).await);

            assert_eq!(recorder.names(), *want, "failure at step {fail_at}");
            assert!(failure.error.rolled_back());
            assert_eq!(failure.execution.status, SagaStatus::RolledBack);
            assert_eq!(
                failure.execution.step(fail_at).map(|s| s.status),
                Some(StepStatus::Failed)
            );
        }
    }

    #[tokio::test]
    async fn test_original_error_is_reraised() {
        let recorder = Recorder::default();
        let failure = saga(Some(4)).run(&mut Vec::new(), &recorder).await.unwrap_err();

        match failure.error {
            ProvisioningError::Platform(e) => {
                assert_eq!(e.operation, Operation::CreateRole);
                assert_eq!(e.message, "c");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_displays_error_without_repeating_it() {
        let failure = saga(Some(4)).run(&mut Vec::new(), &Recorder::default()).await.unwrap_err();

        assert_eq!(failure.to_string(), failure.error.to_string());
        assert!(std::error::Error::source(&failure).is_none());
    }

    #[tokio::test]
    async fn test_failed_compensation_stops_unwind() {
        let recorder = Recorder {
            fail_on: Some("c"),
            ..Default::default()
        };

        let failure = saga(Some(5)).run(&mut Vec::new(), &recorder).await.unwrap_err();

        assert_eq!(recorder.names(), vec!["c"]);
        assert_eq!(failure.execution.status, SagaStatus::RollbackFailed);
        assert_eq!(
            failure.execution.step(4).map(|s| s.status),
            Some(StepStatus::CompensationFailed)
        );
        assert_eq!(failure.execution.step(2).map(|s| s.status), Some(StepStatus::Completed));

        match failure.error {
            ProvisioningError::RollbackFailed { cause, rollback, pending } => {
                assert_eq!(cause.message, "d");
                assert_eq!(rollback.operation, Operation::DeleteRole);
                assert_eq!(
                    pending,
                    vec![
                        Compensation::DeleteRole { role_name: "b".into() },
                        Compensation::DeleteRole { role_name: "a".into() },
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execution_trace() {
        let recorder = Recorder::default();
        let failure = saga(Some(5)).run(&mut Vec::new(), &recorder).await.unwrap_err();
        let execution = failure.execution;

        assert_eq!(execution.saga_type, "test");
        assert_eq!(execution.compensated_steps(), vec![4, 2, 1]);
        assert!(execution.step(3).unwrap().compensation.is_none());
        assert_eq!(execution.step(3).unwrap().status, StepStatus::Completed);
        assert!(execution.step(0).is_none());
        assert!(Uuid::parse_str(&execution.id).is_ok());
    }

    #[tokio::test]
    #[cfg_attr(debug_assertions, should_panic(expected = "irreversible step leaky"))]
    async fn test_irreversible_step_never_records_compensation() {
        let recorder = Recorder::default();
        let saga = Saga::new("leaky")
            .step(LeakyLink)
            .step(Create { name: "x", fail: true });

        let failure = saga.run(&mut Vec::new(), &recorder).await.unwrap_err();
        assert!(recorder.ran.lock().is_empty());
        assert!(failure.execution.step(1).unwrap().compensation.is_none());
    }

    #[test]
    fn test_saga_execution_new() {
        let exec = SagaExecution::new("tenant_provisioning", ["one", "two"]);

        assert_eq!(exec.status, SagaStatus::Pending);
        assert_eq!(exec.steps.len(), 2);
        assert_eq!(exec.step(2).map(|s| s.name.as_str()), Some("two"));
        assert!(exec.steps.iter().all(|s| s.status == StepStatus::Pending));
    }
}
