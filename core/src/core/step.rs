// stepflow/src/core/step.rs

//! Step definitions and their execution policy.

use super::ContextData;
use std::sync::Arc;
use std::time::Duration;

/// Predicate evaluated before a step runs; `true` skips the step.
pub type SkipCondition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

/// How a step's absence of handlers and its failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
  /// Must have at least one handler. Errors abort the pipeline.
  Required,
  /// May have no handlers. Errors abort the pipeline.
  Optional,
  /// May have no handlers. Each handler is bounded by `timeout` (if set);
  /// errors and timeouts are logged and the pipeline continues with the
  /// next step.
  BestEffort { timeout: Option<Duration> },
}

impl StepPolicy {
  pub fn allows_missing_handlers(self) -> bool {
    !matches!(self, StepPolicy::Required)
  }

  pub fn is_best_effort(self) -> bool {
    matches!(self, StepPolicy::BestEffort { .. })
  }
}

/// A named step in a pipeline.
#[derive(Clone)]
pub struct StepDef<T: 'static + Send + Sync> {
  pub name: String,
  pub policy: StepPolicy,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: 'static + Send + Sync> StepDef<T> {
  pub fn new(name: impl Into<String>, policy: StepPolicy) -> Self {
    Self {
      name: name.into(),
      policy,
      skip_if: None,
    }
  }

  pub fn required(name: impl Into<String>) -> Self {
    Self::new(name, StepPolicy::Required)
  }

  pub fn optional(name: impl Into<String>) -> Self {
    Self::new(name, StepPolicy::Optional)
  }

  pub fn best_effort(name: impl Into<String>, timeout: Duration) -> Self {
    Self::new(name, StepPolicy::BestEffort { timeout: Some(timeout) })
  }

  /// Skips the step whenever `condition` returns `true` for the current context.
  pub fn skip_if(mut self, condition: impl Fn(ContextData<T>) -> bool + Send + Sync + 'static) -> Self {
    self.skip_if = Some(Arc::new(condition));
    self
  }
}

impl<T: 'static + Send + Sync> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("policy", &self.policy)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
