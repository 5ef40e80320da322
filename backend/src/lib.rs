//! DocBridge Backend Library
//!
//! This module exposes the backend functionality as a library so it can be
//! used by tests and by hosts that embed the daemon.

pub mod api;
pub mod config;
pub mod error;
pub mod ipc;
pub mod storage;
pub mod transfer;

// Re-export commonly used types
pub use api::ApiHandlers;
pub use config::Config;
pub use error::{BackendError, BackendResult};
pub use ipc::IpcServer;
pub use storage::AccountStores;
pub use transfer::TransferService;
