//! Core domain types and shared logic for the ferrostor cluster controller.
//!
//! This crate defines the data model used across all other crates:
//! - Validated object names and version triples
//! - Hierarchical property containers and priority-ordered resolution
//! - Structured API call results
//! - Bounded number pools (TCP ports for backup shipping)
//! - Configuration

pub mod api_call;
pub mod config;
pub mod error;
pub mod names;
pub mod number_pool;
pub mod props;
pub mod version;

pub use api_call::{ApiCallRc, ApiCallRcEntry, RetCode};
pub use error::{Error, Result};
pub use names::{
    NetInterfaceName, NodeName, RemoteName, ResourceName, SnapshotName, StorPoolName,
};
pub use number_pool::{DynamicNumberPool, PoolExhausted, PortPool};
pub use props::{PriorityProps, PropsMap, ReadOnlyProps, ValueWithDescription};
pub use version::Version;
