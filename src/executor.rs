use crate::{
    client::{apply, ProcessingClient},
    config::{Config, FailurePolicy},
    error::{ExecutionError, ProcessingError},
    file::WorkingFile,
    report::{PipelineResult, StepOutcome, StepResult},
    schema::{PipelineDefinition, Step},
};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Validating,
    Executing { step: usize },
    Completed,
    Failed(ExecutionError),
}

#[derive(Error, Debug, Clone)]
#[error("{reason}")]
pub struct RunFailure {
    pub reason: ExecutionError,
    pub summary: Vec<StepResult>,
}

pub struct Executor<C: ProcessingClient> {
    client: C,
    policy: FailurePolicy,
    max_parallel_files: usize,
}

struct Run {
    state: RunState,
    summary: Vec<StepResult>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: RunState::Pending,
            summary: Vec::new(),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(mut self, reason: ExecutionError) -> RunFailure {
        warn!("pipeline failed: {reason}");
        self.transition(RunState::Failed(reason.clone()));
        RunFailure {
            reason,
            summary: self.summary,
        }
    }
}

impl<C: ProcessingClient> Executor<C> {
    pub fn new(cfg: &Config, client: C) -> Self {
        Self {
            client,
            policy: cfg.policy.clone(),
            max_parallel_files: cfg.executor.max_parallel_files.max(1),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(
        &self,
        definition: &PipelineDefinition,
        initial_files: Vec<WorkingFile>,
    ) -> Result<PipelineResult, RunFailure> {
        let started = Instant::now();
        let mut run = Run::new();

        run.transition(RunState::Validating);
        if initial_files.is_empty() {
            return Err(run.fail(ExecutionError::NoInputFiles));
        }

        let mut current = initial_files;

        for (index, step) in definition.steps().iter().enumerate() {
            run.transition(RunState::Executing { step: index });
            let operation = step.operation();
            let continue_on_error = self.policy.continue_on_error(operation);

            info!(
                "step {} operation={} files={} continue_on_error={}",
                index + 1,
                operation,
                current.len(),
                continue_on_error
            );

            let (outcomes, fatal) = self.run_step(step, &current, continue_on_error);
            let survivors: Vec<WorkingFile> =
                outcomes.iter().filter_map(|o| o.file.clone()).collect();

            run.summary.push(StepResult {
                step_index: index,
                operation,
                outcomes,
            });

            if let Some(err) = fatal {
                return Err(run.fail(err.into()));
            }

            if survivors.is_empty() {
                return Err(run.fail(ExecutionError::PipelineExhausted {
                    step: index + 1,
                    operation,
                }));
            }

            info!(
                "step {} done: {}/{} files succeeded",
                index + 1,
                survivors.len(),
                current.len()
            );
            current = survivors;
        }

        run.transition(RunState::Completed);
        info!(
            "pipeline completed steps={} final_files={} elapsed_ms={}",
            definition.steps().len(),
            current.len(),
            started.elapsed().as_millis()
        );

        Ok(PipelineResult {
            summary: run.summary,
            final_files: current,
        })
    }

    /// Outcomes in input order, plus the error that should abort the run, if any.
    fn run_step(
        &self,
        step: &Step,
        files: &[WorkingFile],
        continue_on_error: bool,
    ) -> (Vec<StepOutcome>, Option<ProcessingError>) {
        let mut outcomes = Vec::with_capacity(files.len());

        for batch in files.chunks(self.max_parallel_files) {
            let results = self.process_batch(step, batch);

            for (file, result) in batch.iter().zip(results) {
                match result {
                    Ok(out) => outcomes.push(StepOutcome::succeeded(out)),
                    Err(err) => {
                        warn!(
                            "{} failed for {}: {}",
                            step.operation(),
                            file.original_name,
                            err
                        );
                        outcomes.push(StepOutcome::failed(&err));
                        if !continue_on_error {
                            return (outcomes, Some(err));
                        }
                    }
                }
            }
        }

        (outcomes, None)
    }

    fn process_batch(
        &self,
        step: &Step,
        batch: &[WorkingFile],
    ) -> Vec<Result<WorkingFile, ProcessingError>> {
        if batch.len() == 1 {
            return vec![apply(&self.client, step, &batch[0])];
        }

        let client: &dyn ProcessingClient = &self.client;
        std::thread::scope(|s| {
            let handles: Vec<_> = batch
                .iter()
                .map(|file| s.spawn(move || apply(client, step, file)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(ProcessingError::failed("worker thread panicked")))
                })
                .collect()
        })
    }
}
