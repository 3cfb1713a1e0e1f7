//! Handler module - service registration and request dispatch.
//!
//! Provides:
//! - [`ServiceRegistry`] - maps service names to handlers
//! - [`ServiceHandler`] - maps operation names to executable operations
//!
//! # Example
//!
//! ```ignore
//! use framewire::handler::{ServiceHandler, ServiceRegistry};
//!
//! let registry = ServiceRegistry::new().service(
//!     ServiceHandler::new("user")
//!         .operation("getUserName", |id: u64| async move {
//!             Ok(format!("User{}", id))
//!         }),
//! );
//! ```

mod registry;

pub use registry::{
    BoxFuture, Operation, OperationResult, ServiceHandler, ServiceRegistry, TypedOperation,
};
