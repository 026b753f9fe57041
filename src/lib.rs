pub mod artifact;
pub mod atomic;
pub mod cli;
pub mod comparator;
pub mod config;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod generator;
pub mod jsonpointer;
pub mod logging;
pub mod model;
pub mod resilience;
pub mod rules;
pub mod schema;
pub mod spec;
pub mod tracing_init;

pub use error::Error;
