//! Sync primitives used by the scheduler.
//!
//! Building the tests with `--cfg shuttle` swaps these for shuttle's model-checked versions, so
//! the task queue can be explored under arbitrary thread interleavings.
//!

#[cfg(all(shuttle, test))]
pub(crate) use shuttle::{
    sync::{atomic, Arc, Mutex, RwLock},
    thread,
};

#[cfg(not(all(shuttle, test)))]
pub(crate) use std::sync::{atomic, Arc, Mutex, RwLock};
