// stepflow/src/pipeline/execution.rs

//! `Pipeline::run()`: walks the steps in order and applies each step's policy.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::core::step::{StepDef, StepPolicy};
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use std::collections::HashMap;
use tracing::{event, instrument, span, Instrument, Level};

/// What a phase (before / on / after) of one step ended with.
enum PhaseOutcome {
  Continue,
  Stop,
  /// A best-effort handler failed or timed out; the rest of the step is dropped.
  Abandoned,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes the pipeline against `ctx_data`.
  ///
  /// Returns `Completed` when every step ran or was skipped, `Stopped` when a
  /// handler asked to stop, and `Err` when a required or optional step failed
  /// (best-effort failures never surface here).
  #[instrument(
        name = "Pipeline::run",
        skip_all,
        fields(
            context_type = %std::any::type_name::<TData>(),
            num_steps = self.steps.len(),
        ),
        err(Display)
    )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "pipeline_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        policy = ?step_def.policy
      );

      let outcome = self.run_step(step_def, ctx_data.clone()).instrument(step_span).await?;
      if let Some(PipelineResult::Stopped) = outcome {
        return Ok(PipelineResult::Stopped);
      }
    }

    event!(Level::DEBUG, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }

  /// Runs one step. `Ok(None)` means "move on to the next step".
  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> Result<Option<PipelineResult>, Err> {
    if let Some(skip_cond_fn) = &step_def.skip_if {
      if skip_cond_fn(ctx_data.clone()) {
        event!(Level::INFO, "Step skipped by its skip condition.");
        return Ok(None);
      }
    }

    let has_handlers = [&self.before, &self.on, &self.after]
      .iter()
      .any(|phase| phase.get(&step_def.name).is_some_and(|v| !v.is_empty()));

    if !has_handlers {
      if step_def.policy.allows_missing_handlers() {
        event!(Level::DEBUG, "Step has no handlers, skipping.");
        return Ok(None);
      }
      event!(Level::ERROR, "Required step has no handlers.");
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    for (phase_name, phase) in [("before", &self.before), ("on", &self.on), ("after", &self.after)] {
      match run_phase(phase_name, phase, step_def, ctx_data.clone()).await? {
        PhaseOutcome::Continue => {}
        PhaseOutcome::Stop => return Ok(Some(PipelineResult::Stopped)),
        PhaseOutcome::Abandoned => return Ok(None),
      }
    }

    event!(Level::DEBUG, "Step finished.");
    Ok(None)
  }
}

async fn run_phase<TData, Err>(
  phase_name: &'static str,
  phase: &HashMap<String, Vec<Handler<TData, Err>>>,
  step_def: &StepDef<TData>,
  ctx_data: ContextData<TData>,
) -> Result<PhaseOutcome, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  let Some(handlers) = phase.get(&step_def.name) else {
    return Ok(PhaseOutcome::Continue);
  };

  for (handler_idx, handler_fn) in handlers.iter().enumerate() {
    let handler_span = span!(Level::DEBUG, "handler", phase = phase_name, handler_index = handler_idx);
    let handler_fut = handler_fn(ctx_data.clone()).instrument(handler_span);

    let result = match step_def.policy {
      StepPolicy::BestEffort { timeout: Some(limit) } => match tokio::time::timeout(limit, handler_fut).await {
        Ok(result) => result,
        Err(_) => {
          let timed_out = FlowError::StepTimedOut {
            step_name: step_def.name.clone(),
            timeout_ms: limit.as_millis(),
          };
          event!(Level::WARN, error = %timed_out, phase = phase_name, "Best-effort handler timed out; moving on.");
          return Ok(PhaseOutcome::Abandoned);
        }
      },
      _ => handler_fut.await,
    };

    match result {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => {
        event!(Level::INFO, phase = phase_name, "Pipeline stopped by a handler.");
        return Ok(PhaseOutcome::Stop);
      }
      Err(e) if step_def.policy.is_best_effort() => {
        event!(Level::WARN, error = %e, phase = phase_name, "Best-effort handler failed; moving on.");
        return Ok(PhaseOutcome::Abandoned);
      }
      Err(e) => {
        event!(Level::ERROR, error = %e, phase = phase_name, "Handler failed.");
        return Err(e);
      }
    }
  }

  Ok(PhaseOutcome::Continue)
}
