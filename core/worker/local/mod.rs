mod context;
mod worker;

pub use context::*;
pub use worker::*;
