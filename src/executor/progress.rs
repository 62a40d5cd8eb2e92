//! Step progress notifications.

use crate::planner::PlanStep;

/// Observer of plan execution.
///
/// All methods default to no-ops. Implementations must be cheap; they are
/// called inline from the executor.
pub trait ProgressCallback: Send + Sync {
    fn on_step_start(&self, step: &PlanStep) {
        let _ = step;
    }

    /// `done` of `total` units processed, when known.
    fn on_step_progress(&self, step: &PlanStep, done: usize, total: Option<usize>) {
        let _ = (step, done, total);
    }

    fn on_step_complete(&self, step: &PlanStep, records: usize) {
        let _ = (step, records);
    }

    fn on_step_error(&self, step: &PlanStep, error: &str) {
        let _ = (step, error);
    }
}

/// Ignores all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {}

/// Reports steps through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_step_start(&self, step: &PlanStep) {
        log::info!("step {} [{}] {}", step.step_id, step.operation, step.description);
    }

    fn on_step_progress(&self, step: &PlanStep, done: usize, total: Option<usize>) {
        match total {
            Some(total) => log::debug!("step {}: {}/{}", step.step_id, done, total),
            None => log::debug!("step {}: {}", step.step_id, done),
        }
    }

    fn on_step_complete(&self, step: &PlanStep, records: usize) {
        log::info!("step {} [{}] done: {} record(s)", step.step_id, step.operation, records);
    }

    fn on_step_error(&self, step: &PlanStep, error: &str) {
        log::warn!("step {} [{}] failed: {}", step.step_id, step.operation, error);
    }
}
