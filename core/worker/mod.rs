//! # Parallel worker pools
//!
//! Workers pull ready rules out of a shared `TaskQueue`, and record how each of them ended in
//! the shared `TaskResults`. A rule only becomes ready once every one of its dependencies has
//! been fetched or built.
//!
mod coordinator;
mod error;
pub mod local;
mod pool;
mod task_queue;
mod task_results;

pub use coordinator::*;
pub use error::*;
pub use pool::*;
pub use task_queue::*;
pub use task_results::*;

use crate::sync::*;
use async_trait::async_trait;

/// A Context object used across workers. It must be thread-safe and shareable, but the things it
/// contains do not need to be.
///
/// The only requirement is a way to extract the results of the build.
///
pub trait Context: Sync + Send + Clone + Sized {
    fn results(&self) -> Arc<TaskResults>;
}

/// A worker in the Worker Pool.
///
/// Workers are constructed synchronously, and do all of their work in `run`, which returns once
/// there is nothing left to build.
///
#[async_trait(?Send)]
pub trait Worker {
    type Context: Context;

    fn new(id: usize, ctx: Self::Context) -> Result<Self, WorkerError>
    where
        Self: Sized;

    async fn run(&mut self) -> Result<(), WorkerError>;
}
