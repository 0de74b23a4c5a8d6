//! Infrastructure layer: event store, command pipeline, read models,
//! application services, and the discount scheduler.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod scheduler;
pub mod services;
pub mod workers;

#[cfg(test)]
mod integration_tests;
