//! Fold a batch of sequences on a grid of nodes and accelerators
//!
//! Every worker process resolves its rank from the environment, lists the
//! pending units, takes its contiguous shard and runs the external folding
//! program once per unit. Existing output directories mark finished units, so
//! an interrupted batch is resumed by starting it again.

pub mod collector;
pub mod completion;
pub mod config;
pub mod executors;
pub mod launcher;
pub mod logging;
pub mod partition;
pub mod rank;
pub mod unit;
pub mod worker;

pub use worker::run_worker;
