// marketplace/src/pipelines/webhook_pipeline.rs

//! Verify → parse → claim → route → mark applied.
//!
//! The claim is taken before any handler runs and released if anything
//! after it fails, so the gateway's redelivery gets a clean retry.

use crate::config::AppConfig;
use crate::errors::{AppError, Result as AppResult};
use crate::models::{ClaimOutcome, EventKind, GatewayEvent};
use crate::pipelines::contexts::{FailureCtxData, SettlementCtxData, WebhookCtxData, WebhookOutcome};
use crate::pipelines::{failure_pipeline, settlement_pipeline};
use crate::services::webhook_signature;
use crate::state::AppState;
use anyhow::anyhow;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use stepflow::{ContextData, Pipeline, PipelineControl, Registry, StepDef};
use tracing::{debug, error, info, instrument, warn};

fn event_kind(ctx: &ContextData<WebhookCtxData>) -> Option<EventKind> {
  ctx.read().event.as_ref().map(GatewayEvent::kind)
}

pub fn register_webhook_pipeline(registry: &Registry<AppError>, config: &AppConfig) {
  let settlement = Arc::new(settlement_pipeline::build_settlement_pipeline(config));
  let failure = Arc::new(failure_pipeline::build_failure_pipeline());

  let mut p = Pipeline::<WebhookCtxData, AppError>::new(vec![
    StepDef::required("verify_webhook_signature"),
    StepDef::required("parse_gateway_event"),
    StepDef::required("claim_event"),
    StepDef::required("route_event"),
    StepDef::required("mark_event_applied"),
  ]);

  p.on("verify_webhook_signature", |ctx: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (payload, header, secret, tolerance) = ctx.with(|c| {
        (
          c.raw_payload.clone(),
          c.signature_header.clone(),
          c.app_state.config.webhook_secret.clone(),
          c.app_state.config.webhook_tolerance,
        )
      });

      match webhook_signature::verify(header.as_deref(), &payload, &secret, tolerance, Utc::now().timestamp()) {
        Ok(signed_at) => {
          debug!(signed_at, "Webhook signature verified.");
          Ok(PipelineControl::Continue)
        }
        Err(e) => {
          warn!(error = %e, "Rejecting webhook: signature verification failed.");
          Err(AppError::from(e))
        }
      }
    })
  });

  p.on("parse_gateway_event", |ctx: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let payload = ctx.with(|c| c.raw_payload.clone());
      let event: GatewayEvent = serde_json::from_slice(&payload)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {}", e)))?;

      let intent = match event.kind() {
        EventKind::Unhandled => None,
        _ => Some(
          event
            .intent_object()
            .map_err(|e| AppError::Validation(format!("Invalid payment intent in event {}: {}", event.id, e)))?,
        ),
      };

      info!(event_id = %event.id, event_type = %event.event_type, "Webhook event parsed.");
      ctx.update(|c| {
        c.event = Some(event);
        c.intent = intent;
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on("claim_event", |ctx: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (store, ttl, event) = ctx.with(|c| {
        (
          c.app_state.store.clone(),
          c.app_state.config.webhook_claim_ttl,
          c.event.as_ref().map(|e| (e.id.clone(), e.event_type.clone())),
        )
      });
      let (event_id, event_type) =
        event.ok_or_else(|| AppError::Internal("Event must be parsed before it is claimed".to_string()))?;

      match store.claim_event(&event_id, &event_type, ttl).await? {
        ClaimOutcome::Claimed { token } => {
          debug!(%event_id, %token, "Event claimed.");
          ctx.write().claim_token = Some(token);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        ClaimOutcome::Duplicate => {
          info!(%event_id, "Duplicate delivery; already claimed or applied.");
          ctx.write().outcome = Some(WebhookOutcome::Duplicate);
          Ok(PipelineControl::Stop)
        }
      }
    })
  });

  p.routes_for_step("route_event")
    .add_route(settlement, |root: ContextData<WebhookCtxData>| {
      let c = root.read();
      let intent = c.intent.clone().ok_or_else(|| anyhow!("succeeded event carries no payment intent"))?;
      let event_id = c.event_id().unwrap_or_default().to_string();
      Ok(ContextData::new(SettlementCtxData::new(c.app_state.clone(), event_id, intent)))
    })
    .on_condition(|root| event_kind(&root) == Some(EventKind::PaymentSucceeded))
    .add_route(failure, |root: ContextData<WebhookCtxData>| {
      let c = root.read();
      let intent = c.intent.clone().ok_or_else(|| anyhow!("failed event carries no payment intent"))?;
      Ok(ContextData::new(FailureCtxData {
        app_state: c.app_state.clone(),
        event_id: c.event_id().unwrap_or_default().to_string(),
        intent,
        outcome: None,
      }))
    })
    .on_condition(|root| event_kind(&root) == Some(EventKind::PaymentFailed))
    .if_no_route_matches(PipelineControl::Continue)
    .finalize_routes();

  p.on("mark_event_applied", |ctx: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (store, event_id, kind) = ctx.with(|c| {
        (
          c.app_state.store.clone(),
          c.event_id().map(str::to_string),
          c.event.as_ref().map(GatewayEvent::kind),
        )
      });
      let event_id = event_id.ok_or_else(|| AppError::Internal("No event to mark applied".to_string()))?;

      store.mark_event_applied(&event_id).await?;

      let outcome = if kind == Some(EventKind::Unhandled) {
        info!(%event_id, "No handler for event type; acknowledged.");
        WebhookOutcome::Ignored
      } else {
        info!(%event_id, "Event applied.");
        WebhookOutcome::Applied
      };
      ctx.update(|c| {
        c.claim_token = None;
        c.outcome = Some(outcome);
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  info!("Webhook pipeline registered.");
}

/// Processes one webhook delivery.
///
/// `Ok` means the delivery may be acknowledged. On `Err` any claim taken by
/// this delivery has been released.
#[instrument(name = "webhook::process", skip_all, fields(payload_bytes = payload.len()))]
pub async fn process_webhook(
  app_state: &AppState,
  payload: Bytes,
  signature_header: Option<String>,
) -> AppResult<WebhookOutcome> {
  let ctx = ContextData::new(WebhookCtxData::new(app_state.clone(), payload, signature_header));
  let result = app_state.registry.run(ctx.clone()).await;
  let (claim_token, event_id, outcome) =
    ctx.with(|c| (c.claim_token, c.event_id().map(str::to_string), c.outcome));

  match result {
    Ok(_) => outcome.ok_or_else(|| AppError::Internal("Webhook pipeline finished without an outcome".to_string())),
    Err(err) => {
      if let (Some(token), Some(event_id)) = (claim_token, event_id) {
        match app_state.store.release_event(&event_id, token).await {
          Ok(true) => warn!(%event_id, error = %err, "Event failed; claim released for redelivery."),
          Ok(false) => warn!(%event_id, error = %err, "Event failed; its claim was already taken over by another delivery."),
          Err(release_err) => {
            error!(%event_id, error = %err, release_error = %release_err, "Event failed and its claim could not be released; it will be reclaimable once stale.")
          }
        }
      }
      Err(err)
    }
  }
}
