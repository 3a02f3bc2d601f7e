//! The worker process: claims jobs from the Broker, runs the SAT solver
//! child process, and commits results back to the Store.

pub mod reaper;
pub mod solver;
pub mod worker;

pub use worker::{Worker, WorkerConfig};
