//! Shared types for the OneChat client: wire models, socket protocol,
//! permission bits and REST error envelopes.

pub mod error;
pub mod models;
pub mod permissions;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use permissions::Permission;
pub use protocol::*;
