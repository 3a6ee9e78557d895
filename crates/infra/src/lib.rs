//! Infrastructure layer: event store, dispatcher, read models, jobs, reports.

pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod projections;
pub mod read_model;
pub mod reports;
