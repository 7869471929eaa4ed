//! Real-time channel to the chat server.
//!
//! ```text
//!   socket frames ──► Transport ──► EventRouter ──► handlers ──► Store
//!                        ▲
//!   send_message ────────┘ (queued until OPEN)
//! ```
//!
//! [`SocketProvider`] owns one transport and one router for the lifetime
//! of a session. Handlers write to the store; nothing reads events directly.

mod connection;
mod handlers;
mod provider;
mod router;

pub use connection::{ConnectionState, Transport, TransportError};
pub use handlers::{register_default_handlers, HandlerContext};
pub use provider::SocketProvider;
pub use router::{DispatchOutcome, EventRouter, Handler};
