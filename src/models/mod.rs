//! # Engine Data Model
//!
//! Tasks, worker lifecycle records and dead-letter entries.

pub mod dead_letter;
pub mod task;
pub mod worker;

pub use dead_letter::DeadLetterEntry;
pub use task::{Payload, Task, TaskId};
pub use worker::{WorkerId, WorkerState, WorkerStatusReport};
