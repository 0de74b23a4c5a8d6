//! Background workers (projection feeds, scheduled sweeps).

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
