//! OneChat client - real-time synchronization core
//!
//! Keeps a normalized in-memory view of groups, messages, permissions and
//! the current user consistent across REST confirmations and socket events.

pub mod logging;

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod gateway;
pub mod storage;
pub mod stores;
pub mod ws;

#[cfg(test)]
mod testing;

pub use api_client::ApiClient;
pub use auth_session::{Session, SessionError, SessionEvent};
pub use config::ClientConfig;
pub use gateway::{MutationGateway, Upload};
pub use storage::{Storage, StorageError};
pub use stores::{Action, PermissionKey, Store, StoreHandle};
pub use ws::{ConnectionState, EventRouter, SocketProvider, Transport};
