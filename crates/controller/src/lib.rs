//! ferrostor cluster controller.
//!
//! This crate provides:
//! - Named read/write locks over the object maps
//! - The transactional object model (nodes, resource and snapshot definitions, remotes)
//! - Lock scopes that pair a lock set with one transaction
//! - Receiving backups shipped from another cluster
//! - Health and Prometheus endpoints

pub mod backup;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod objects;
pub mod routes;
pub mod satellite;
pub mod scope;
pub mod state;

pub use error::{CtrlError, CtrlResult};
pub use locks::{LockGuard, LockGuardBuilder, LockManager, LockMode, LockObj};
pub use routes::create_router;
pub use scope::ScopeRunner;
pub use state::CtrlState;
