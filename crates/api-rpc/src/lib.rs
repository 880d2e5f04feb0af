//! JSON-RPC API Layer
//!
//! Worker endpoint executing serialized audience jobs, and the matching
//! client-side invoker used by the runner.

pub mod error;
pub mod handler;
pub mod invoker;
pub mod server;
pub mod types;

pub use invoker::RpcInvoker;
pub use server::{RpcServer, RpcServerConfig};
