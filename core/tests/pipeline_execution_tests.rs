// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use std::time::Duration;
use stepflow::{ContextData, FlowError, Pipeline, PipelineControl, PipelineResult, StepDef};

fn steps(names: &[&str]) -> Vec<StepDef<TestContext>> {
  names.iter().map(|n| StepDef::required(*n)).collect()
}

#[tokio::test]
async fn test_pipeline_runs_steps_in_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(steps(&["step1", "step2", "step3"]));

  pipeline.on("step1", create_simple_handler("step1", " S1"));
  pipeline.on("step2", create_simple_handler("step2", " S2"));
  pipeline.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " S1 S2 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
}

#[tokio::test]
async fn test_before_on_after_run_in_phase_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(steps(&["only"]));

  pipeline.after("only", create_simple_handler("after", "c"));
  pipeline.on("only", create_simple_handler("on", "b"));
  pipeline.before("only", create_simple_handler("before", "a"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  assert_eq!(ctx.read().message, "abc");
}

#[tokio::test]
async fn test_pipeline_stops_on_stop_signal() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(steps(&["stepA", "stopStep", "stepC"]));

  pipeline.on("stepA", create_simple_handler("stepA", "A"));
  pipeline.on("stopStep", create_simple_handler("stopStep", "B"));
  pipeline.on("stepC", create_simple_handler("stepC", "C"));

  let ctx = ContextData::new(TestContext {
    should_stop_at: Some("stopStep".to_string()),
    ..Default::default()
  });
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  assert_eq!(ctx.read().steps_executed, vec!["stepA", "stopStep"]);
}

#[tokio::test]
async fn test_required_step_error_propagates() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(steps(&["good_step", "bad_step", "another_step"]));

  pipeline.on("good_step", create_simple_handler("good_step", "Good"));
  pipeline.on("bad_step", create_failing_handler("bad_step", "I am a bad step!"));
  pipeline.on("another_step", create_simple_handler("another_step", "NeverRun"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("I am a bad step!".to_string()));
  assert_eq!(ctx.read().steps_executed, vec!["good_step", "bad_step"]);
}

#[tokio::test]
async fn test_skip_condition_skips_step() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(vec![
    StepDef::required("step1"),
    StepDef::required("step_to_skip").skip_if(|ctx: ContextData<TestContext>| ctx.read().counter > 0),
    StepDef::required("step3"),
  ]);

  pipeline.on("step1", create_simple_handler("step1", " S1"));
  pipeline.on("step_to_skip", create_simple_handler("step_to_skip", " SKIPPED"));
  pipeline.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().message, " S1 S3");
}

#[tokio::test]
async fn test_required_step_without_handler_fails() {
  setup_tracing();
  let pipeline = Pipeline::<TestContext, TestError>::new(steps(&["step_with_no_handler"]));

  let result = pipeline.run(ContextData::new(TestContext::default())).await;

  match result {
    Err(TestError::Flow(s)) => {
      assert!(s.contains("HandlerMissing"));
      assert!(s.contains("step_with_no_handler"));
    }
    other => panic!("Expected HandlerMissing, got {:?}", other),
  }
}

#[tokio::test]
async fn test_optional_step_without_handler_is_skipped() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(vec![StepDef::optional("nothing_here"), StepDef::required("work")]);
  pipeline.on("work", create_simple_handler("work", "w"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["work"]);
}

#[tokio::test]
async fn test_optional_step_error_still_propagates() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(vec![StepDef::optional("flaky")]);
  pipeline.on("flaky", create_failing_handler("flaky", "boom"));

  let result = pipeline.run(ContextData::new(TestContext::default())).await;
  assert_eq!(result.unwrap_err(), TestError::Handler("boom".to_string()));
}

#[tokio::test]
async fn test_best_effort_failure_moves_to_next_step() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(vec![
    StepDef::best_effort("notify", Duration::from_millis(200)),
    StepDef::required("finish"),
  ]);

  pipeline.on("notify", create_failing_handler("notify", "mail server down"));
  pipeline.after("notify", create_simple_handler("notify_after", "never"));
  pipeline.on("finish", create_simple_handler("finish", "done"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.steps_executed, vec!["notify", "finish"]);
  assert_eq!(guard.message, "done");
}

#[tokio::test]
async fn test_best_effort_timeout_moves_to_next_step() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(vec![
    StepDef::best_effort("slow", Duration::from_millis(50)),
    StepDef::required("finish"),
  ]);

  pipeline.on("slow", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      tokio::time::sleep(Duration::from_secs(5)).await;
      ctx.write().steps_executed.push("slow_finished".to_string());
      Ok::<_, FlowError>(PipelineControl::Continue)
    })
  });
  pipeline.on("finish", create_simple_handler("finish", "done"));

  let ctx = ContextData::new(TestContext::default());
  let started = std::time::Instant::now();
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  assert!(started.elapsed() < Duration::from_secs(2));
  assert_eq!(ctx.read().steps_executed, vec!["finish"]);
}

#[tokio::test]
async fn test_flow_error_from_handler_converts_into_pipeline_error() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(steps(&["step"]));
  pipeline.on("step", |_ctx: ContextData<TestContext>| {
    Box::pin(async move {
      Err::<PipelineControl, FlowError>(FlowError::Internal("engine trouble".to_string()))
    })
  });

  match pipeline.run(ContextData::new(TestContext::default())).await {
    Err(TestError::Flow(s)) => assert!(s.contains("engine trouble")),
    other => panic!("Expected a converted FlowError, got {:?}", other),
  }
}

#[test]
#[should_panic(expected = "defined twice")]
fn test_duplicate_step_names_panic() {
  let _ = Pipeline::<TestContext, TestError>::new(steps(&["a", "a"]));
}

#[test]
#[should_panic(expected = "not found")]
fn test_registering_handler_for_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(steps(&["a"]));
  pipeline.on("b", create_simple_handler("b", "b"));
}
