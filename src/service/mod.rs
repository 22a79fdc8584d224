//! Service host - dispatch loop and handler registry.

pub mod handler;
pub mod host;

pub use handler::{handler_fn, Handler, HandlerError, HandlerRegistry};
pub use host::ServiceHost;
