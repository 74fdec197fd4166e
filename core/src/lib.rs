// src/lib.rs

//! Stepflow: asynchronous, type-safe step pipelines.
//!
//! A pipeline is an ordered list of named steps. Each step can carry
//! `before`, `on` and `after` handlers that operate on a shared
//! [`ContextData`]. Steps have a [`StepPolicy`]:
//!  - `Required` steps must have handlers and propagate handler errors.
//!  - `Optional` steps may have no handlers but still propagate errors.
//!  - `BestEffort` steps run each handler under an optional timeout; errors
//!    and timeouts are logged and the pipeline moves on.
//!
//! A step can also route into one of several scoped pipelines (see
//! [`RouteBuilder`]), and pipelines can be registered in a [`Registry`]
//! keyed by their context type.

pub mod conditional;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context::Handler;
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef, StepPolicy};

pub use crate::pipeline::definition::Pipeline;

pub use crate::conditional::builder::{RouteBuilder, RouteConfigurator};

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Registry;

/*
    Typical wiring:
    1. Define a context struct `MyCtx` and an error type `E: From<FlowError>`.
    2. `Pipeline::<MyCtx, E>::new(vec![StepDef::required("a"), StepDef::best_effort("b", timeout)])`.
    3. Register handlers with `.on("a", |ctx| Box::pin(async move { ... }))`.
    4. Optionally route a step: `.routes_for_step("dispatch").add_route(scoped, extractor).on_condition(pred)`.
    5. Register the pipeline in a `Registry<E>` and call `registry.run(ContextData::new(ctx))`.
*/
