// stepflow/src/conditional/builder.rs

//! Fluent API for declaring the routes of a step.

use crate::conditional::scope::{AnyRoute, Extractor, Route};
use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use crate::error::FlowError;
use crate::pipeline::Pipeline;
use std::sync::Arc;
use tracing::{event, Level};

/// Collects routes for one step of a `Pipeline<TData, Err>`.
///
/// Obtained from [`Pipeline::routes_for_step`]; nothing is installed until
/// [`RouteBuilder::finalize_routes`] is called.
pub struct RouteBuilder<'pipeline, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: &'pipeline mut Pipeline<TData, Err>,
  step_name: String,
  routes: Vec<Arc<dyn AnyRoute<TData, Err>>>,
  on_no_match: PipelineControl,
}

impl<'pipeline, TData, Err> RouteBuilder<'pipeline, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) fn new(pipeline: &'pipeline mut Pipeline<TData, Err>, step_name: String) -> Self {
    Self {
      pipeline,
      step_name,
      routes: Vec::new(),
      on_no_match: PipelineControl::Continue,
    }
  }

  /// Adds a route to `scoped`. `extractor` builds the scoped context from the
  /// root context when the route is taken.
  pub fn add_route<SData>(
    self,
    scoped: Arc<Pipeline<SData, Err>>,
    extractor: impl Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static,
  ) -> RouteConfigurator<'pipeline, TData, SData, Err>
  where
    SData: 'static + Send + Sync,
  {
    RouteConfigurator {
      builder: self,
      pipeline: scoped,
      extractor: Arc::new(extractor),
    }
  }

  /// Control signal returned when no route matches (default: `Continue`).
  pub fn if_no_route_matches(mut self, behavior: PipelineControl) -> Self {
    self.on_no_match = behavior;
    self
  }

  /// Installs the routing handler as the step's only `on` handler.
  pub fn finalize_routes(self) {
    let routes = Arc::new(self.routes);
    let on_no_match = self.on_no_match;
    let step_name = self.step_name.clone();

    let routing_handler: Handler<TData, Err> = Box::new(move |root_ctx: ContextData<TData>| {
      let routes = routes.clone();
      let step_name = step_name.clone();
      Box::pin(async move {
        for route in routes.iter() {
          if route.matches(root_ctx.clone()) {
            event!(Level::DEBUG, %step_name, "Route matched.");
            return route.execute(root_ctx.clone()).await;
          }
        }
        event!(Level::DEBUG, %step_name, "No route matched; returning {:?}.", on_no_match);
        Ok(on_no_match)
      })
    });

    self.pipeline.on.insert(self.step_name.clone(), vec![routing_handler]);
    event!(Level::DEBUG, step_name = %self.step_name, "Routes installed.");
  }
}

/// Pending route waiting for its condition.
pub struct RouteConfigurator<'pipeline, TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  builder: RouteBuilder<'pipeline, TData, Err>,
  pipeline: Arc<Pipeline<SData, Err>>,
  extractor: Extractor<TData, SData>,
}

impl<'pipeline, TData, SData, Err> RouteConfigurator<'pipeline, TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Sets the condition selecting this route and returns to the builder.
  pub fn on_condition(
    mut self,
    condition: impl Fn(ContextData<TData>) -> bool + Send + Sync + 'static,
  ) -> RouteBuilder<'pipeline, TData, Err> {
    let route = Route::<TData, SData, Err> {
      step_name: self.builder.step_name.clone(),
      pipeline: self.pipeline,
      extractor: self.extractor,
      condition: Arc::new(condition),
    };
    self.builder.routes.push(Arc::new(route));
    self.builder
  }
}
