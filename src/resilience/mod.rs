//! # Resilience Module
//!
//! Fault-tolerance primitives shared by the dispatch and worker layers.
//!
//! ## Architecture
//!
//! - **RetryPolicy**: the single exponential-backoff utility, used both for retries
//!   against one endpoint inside a dispatch call and for task-level retries across calls
//! - **EndpointTarget**: a ranked downstream address with a consecutive-failure circuit signal
//! - **StopSignal**: the process-wide cancellation flag every loop waits on
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_engine::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(2), 0.0);
//! assert_eq!(policy.delay_for(0), Duration::from_millis(100));
//! assert_eq!(policy.delay_for(1), Duration::from_millis(200));
//! ```

pub mod backoff;
pub mod endpoint;
pub mod stop;

pub use backoff::{RetryFailure, RetryPolicy};
pub use endpoint::{EndpointSnapshot, EndpointTarget};
pub use stop::StopSignal;
