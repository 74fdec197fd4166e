// marketplace/src/pipelines/failure_pipeline.rs
use crate::errors::AppError;
use crate::pipelines::contexts::FailureCtxData;
use stepflow::{ContextData, Pipeline, PipelineControl, StepDef};
use tracing::info;

/// Runs for `payment_intent.payment_failed`: pending orders of the intent
/// become `payment_failed`. Nothing else changes.
pub fn build_failure_pipeline() -> Pipeline<FailureCtxData, AppError> {
  let mut p = Pipeline::<FailureCtxData, AppError>::new(vec![StepDef::required("mark_orders_failed")]);

  p.on("mark_orders_failed", |ctx: ContextData<FailureCtxData>| {
    Box::pin(async move {
      let (store, event_id, intent) = ctx.with(|c| (c.app_state.store.clone(), c.event_id.clone(), c.intent.clone()));
      let reason = intent.failure_message().unwrap_or_default().to_string();

      let outcome = store.fail_intent(&intent.id, &reason).await?;
      if !outcome.untouched.is_empty() {
        info!(order_ids = ?outcome.untouched, "Orders already settled or failed; left unchanged.");
      }
      info!(%event_id, intent_id = %intent.id, failed = outcome.failed_orders.len(), %reason, "Payment failure recorded.");

      ctx.write().outcome = Some(outcome);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}
