// stepflow/src/pipeline/definition.rs

//! The `Pipeline<TData, Err>` struct and its construction.

use crate::conditional::builder::RouteBuilder;
use crate::core::context::Handler;
use crate::core::step::StepDef;
use crate::error::FlowError;
use std::collections::HashMap;

/// An ordered list of steps over a root context `TData`, whose handlers
/// return `Err`.
///
/// `Err` must be constructible from [`FlowError`] so engine-level failures
/// (missing handlers, extractor failures) surface through the same type.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Creates a pipeline from its step definitions, in execution order.
  ///
  /// Panics on duplicate step names; that is a wiring mistake, not a runtime condition.
  pub fn new(steps: Vec<StepDef<TData>>) -> Self {
    let mut seen = std::collections::HashSet::new();
    for step in &steps {
      if !seen.insert(step.name.clone()) {
        panic!("Stepflow setup error: step '{}' is defined twice.", step.name);
      }
    }

    Self {
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  /// Step names in execution order.
  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "Stepflow setup error: step '{}' not found in pipeline definition.",
        step_name
      );
    }
  }

  /// Turns `step_name` into a routing step that runs the first scoped
  /// pipeline whose condition matches.
  pub fn routes_for_step(&mut self, step_name: &str) -> RouteBuilder<'_, TData, Err> {
    self.ensure_step_exists(step_name);
    RouteBuilder::new(self, step_name.to_string())
  }
}
