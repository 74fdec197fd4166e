// stepflow/src/conditional/scope.rs

//! One route of a routing step, and its type-erased form.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub(crate) type Extractor<TData, SData> =
  Arc<dyn Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static>;

pub(crate) type Condition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

/// A scoped pipeline over `SData`, its extractor from the root `TData`, and
/// the condition that selects it.
pub(crate) struct Route<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) step_name: String,
  pub(crate) pipeline: Arc<Pipeline<SData, Err>>,
  pub(crate) extractor: Extractor<TData, SData>,
  pub(crate) condition: Condition<TData>,
}

/// Lets routes with different `SData` live in one list.
#[async_trait]
pub(crate) trait AnyRoute<TData, Err>: Send + Sync
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn matches(&self, root_ctx: ContextData<TData>) -> bool;

  async fn execute(&self, root_ctx: ContextData<TData>) -> Result<PipelineControl, Err>;
}

#[async_trait]
impl<TData, SData, Err> AnyRoute<TData, Err> for Route<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn matches(&self, root_ctx: ContextData<TData>) -> bool {
    (self.condition)(root_ctx)
  }

  #[instrument(
        name = "Route::execute",
        skip_all,
        fields(step_name = %self.step_name, scoped_context_type = %std::any::type_name::<SData>()),
        err(Display)
    )]
  async fn execute(&self, root_ctx: ContextData<TData>) -> Result<PipelineControl, Err> {
    let sub_ctx = (self.extractor)(root_ctx).map_err(|extract_err| {
      event!(Level::ERROR, error = %extract_err, "Route extractor failed.");
      let enriched = match extract_err {
        FlowError::HandlerError { source } | FlowError::ExtractorFailure { source, .. } => FlowError::ExtractorFailure {
          step_name: self.step_name.clone(),
          source,
        },
        other => other,
      };
      Err::from(enriched)
    })?;

    match self.pipeline.run(sub_ctx).await? {
      PipelineResult::Completed => Ok(PipelineControl::Continue),
      PipelineResult::Stopped => {
        event!(Level::INFO, "Scoped pipeline stopped; stopping the routing step too.");
        Ok(PipelineControl::Stop)
      }
    }
  }
}
