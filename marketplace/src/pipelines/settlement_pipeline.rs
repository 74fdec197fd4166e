// marketplace/src/pipelines/settlement_pipeline.rs

//! Runs for `payment_intent.succeeded`. `apply_settlement` is the only step
//! whose failure fails the delivery; the rest are bounded side effects that
//! run only when this delivery actually moved orders to paid.

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::money::from_minor_units;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::SettlementCtxData;
use crate::store::SettleIntent;
use chrono::Utc;
use stepflow::{ContextData, Pipeline, PipelineControl, StepDef};
use tracing::{error, info, warn};

fn nothing_settled(ctx: ContextData<SettlementCtxData>) -> bool {
  ctx.read().nothing_settled()
}

pub fn build_settlement_pipeline(config: &AppConfig) -> Pipeline<SettlementCtxData, AppError> {
  let timeout = config.best_effort_timeout;
  let default_currency = config.default_currency.clone();
  let mut p = Pipeline::<SettlementCtxData, AppError>::new(vec![
    StepDef::required("apply_settlement"),
    StepDef::best_effort("send_buyer_receipt", timeout).skip_if(nothing_settled),
    StepDef::best_effort("notify_sellers", timeout).skip_if(nothing_settled),
    StepDef::best_effort("clear_buyer_cart", timeout).skip_if(nothing_settled),
  ]);

  p.on("apply_settlement", move |ctx: ContextData<SettlementCtxData>| {
    let default_currency = default_currency.clone();
    Box::pin(async move {
      let (store, event_id, intent) = ctx.with(|c| (c.app_state.store.clone(), c.event_id.clone(), c.intent.clone()));

      let command = SettleIntent {
        intent_id: intent.id.clone(),
        payment_method: intent.payment_method.clone(),
        paid_at: Utc::now(),
      };
      let outcome = store.settle_intent(&command).await?;

      if let Some(event_amount) = intent.amount {
        if event_amount != outcome.intent_amount_minor {
          let currency = intent.currency.as_deref().unwrap_or(&default_currency);
          warn!(
            %event_id,
            intent_id = %intent.id,
            event_amount = %from_minor_units(event_amount, currency),
            linked_amount = %from_minor_units(outcome.intent_amount_minor, currency),
            currency,
            "Event amount differs from the sum of the linked splits."
          );
        }
      }
      if !outcome.already_failed.is_empty() {
        error!(
          intent_id = %intent.id,
          order_ids = ?outcome.already_failed,
          "Success event for orders already marked payment_failed; left unchanged for review."
        );
      }

      if outcome.is_noop() {
        info!(intent_id = %intent.id, already_paid = outcome.already_paid.len(), "Nothing to settle.");
      } else {
        info!(
          intent_id = %intent.id,
          settled = outcome.settled_orders.len(),
          credits = outcome.credits.len(),
          stock_adjustments = outcome.stock_adjustments.len(),
          "Settlement applied."
        );
      }
      ctx.write().outcome = Some(outcome);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on("send_buyer_receipt", |ctx: ContextData<SettlementCtxData>| {
    Box::pin(common_steps::send_buyer_receipt_step(ctx))
  });

  p.on("notify_sellers", |ctx: ContextData<SettlementCtxData>| {
    Box::pin(common_steps::notify_sellers_step(ctx))
  });

  p.on("clear_buyer_cart", |ctx: ContextData<SettlementCtxData>| {
    Box::pin(async move {
      let (store, buyer) = ctx.with(|c| {
        (
          c.app_state.store.clone(),
          c.outcome
            .as_ref()
            .and_then(|o| o.settled_orders.first())
            .map(|o| (o.buyer_org_id, o.buyer_user_id)),
        )
      });
      let Some((buyer_org_id, buyer_user_id)) = buyer else {
        return Ok(PipelineControl::Continue);
      };

      let removed = store.clear_cart(buyer_org_id, buyer_user_id).await?;
      info!(%buyer_user_id, removed, "Buyer cart cleared.");
      ctx.write().cart_cleared = true;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}
