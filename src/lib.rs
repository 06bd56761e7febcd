#![allow(clippy::doc_markdown)] // Allow technical terms like JSON-lines, SIGTERM in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Relay Engine
//!
//! In-process task relay: accepts opaque payloads into three priority tiers and
//! delivers each one to a ranked list of downstream endpoints, with retries,
//! endpoint failover, worker supervision, health scoring and time-boxed shutdown.
//!
//! ## Overview
//!
//! Callers `enqueue(tier, payload)`. Worker loops pull tasks in strict priority
//! (`emergency`, then `priority`, then `main`) and hand them to the dispatch
//! client, which tries endpoints in rank order and retries each with capped
//! exponential backoff. Every task ends exactly once: delivered, or recorded in
//! the dead-letter log.
//!
//! ## Module Organization
//!
//! - [`engine`] - The [`Engine`] facade and the shared [`EngineContext`]
//! - [`queue`] - Bounded tier queues and strict-priority dequeue
//! - [`dispatch`] - The [`Dispatcher`] collaborator trait and endpoint failover
//! - [`workers`] - Worker loops, in-flight ledger and task outcome policy
//! - [`supervisor`] - Crash detection and bounded restarts
//! - [`health`] - Composite health scoring published on a watch channel
//! - [`metrics`] - Mutex-guarded counters and dispatch timing samples
//! - [`shutdown`] - Priority drain under a hard time budget
//! - [`dead_letter`] - Append-only record of terminal failures
//! - [`resilience`] - Backoff, endpoint circuit signal, stop signal
//! - [`intake`] - Optional payload classification and tier routing
//! - [`config`] - Layered configuration loading and validation
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration scenarios
//! ```

pub mod config;
pub mod constants;
pub mod dead_letter;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod health;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod resilience;
pub mod shutdown;
pub mod supervisor;
pub mod workers;

pub use config::{ConfigManager, ConfigurationError, EngineConfig};
pub use constants::{DeadLetterReason, OverflowPolicy, StatusCategory, Tier, WorkerStatus};
pub use dead_letter::DeadLetterLog;
pub use dispatch::{DispatchClient, DispatchReceipt, Dispatcher};
pub use engine::{Engine, EngineBuilder, EngineContext};
pub use error::{DispatchError, EngineError, Result, SendError};
pub use health::{HealthMonitor, HealthSnapshot};
pub use intake::{Classifier, RoutingIntake};
pub use logging::init_structured_logging;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use models::{DeadLetterEntry, Payload, Task, TaskId, WorkerId, WorkerStatusReport};
pub use queue::{TaskQueueSet, TierQueueStats};
pub use resilience::{EndpointSnapshot, RetryPolicy, StopSignal};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use supervisor::{RecoveryAction, RecoveryEvent, RecoverySupervisor};
pub use workers::IdleMaintenance;
