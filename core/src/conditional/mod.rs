// stepflow/src/conditional/mod.rs

//! Routing a step into one of several scoped pipelines.
//!
//! A routing step evaluates each route's condition against the root
//! context, in registration order. The first match extracts a sub-context
//! and runs its scoped pipeline; the scoped pipeline's outcome becomes the
//! step's outcome.

pub mod builder;
pub mod scope;

pub use builder::{RouteBuilder, RouteConfigurator};
