//! # Worker Pool
//!
//! Worker loops, the in-flight ledger and the task-level outcome policy.
//!
//! Each tier gets `workers.<tier>` loops. A loop homed on tier T serves every tier
//! from `emergency` down to T, always in strict priority, so higher tiers are never
//! left waiting while a lower-tier worker is idle.

pub mod ledger;
pub mod maintenance;
pub mod settle;
pub mod worker;

pub use ledger::{InFlightLedger, LedgerEntry};
pub use maintenance::{IdleMaintenance, NoopMaintenance};
pub use settle::{Settlement, TaskSettler};
pub use worker::{spawn_worker, WorkerLoop};
