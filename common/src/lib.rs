pub mod config;
pub mod ipc;
pub mod routes;
pub mod types;

pub use config::*;
pub use ipc::{IpcRequest, IpcResponse};
pub use routes::{GuardOutcome, Route};
pub use types::*;
