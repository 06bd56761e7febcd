//! Shared fixtures for the engine integration tests.

#![allow(dead_code)] // Each test binary uses a different subset

pub mod builders;
pub mod mock_dispatcher;

pub use builders::*;
pub use mock_dispatcher::*;
