//! The socket provider: one [`Transport`] wired to one [`EventRouter`].

use std::sync::Arc;

use onechat_shared::Opcode;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::connection::{ConnectionState, Transport, TransportError};
use super::handlers::{register_default_handlers, HandlerContext};
use super::router::EventRouter;
use crate::stores::StoreHandle;

/// Owns the socket for one session. Dropping it tears the connection down.
pub struct SocketProvider {
    transport: Transport,
    router: Arc<EventRouter>,
}

impl SocketProvider {
    pub fn new() -> Self {
        let router = Arc::new(EventRouter::new());
        let dispatcher = router.clone();
        let transport = Transport::new(move |text| {
            dispatcher.dispatch_text(text);
        });
        Self { transport, router }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.subscribe_state()
    }

    pub fn connect(&self, url: &str) {
        self.transport.connect(url);
    }

    pub fn register_event<F>(&self, op: Opcode, handler: F)
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.router.register_event(op, handler);
    }

    pub fn remove_event(&self, op: Opcode) -> bool {
        self.router.remove_event(op)
    }

    pub fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), TransportError> {
        self.transport.send(payload)
    }

    /// Install the handler set that keeps `store` in sync with the socket.
    pub fn install_default_handlers(
        &self,
        store: StoreHandle,
        token: String,
        on_auth_failure: Arc<dyn Fn() + Send + Sync>,
    ) {
        register_default_handlers(
            &self.router,
            HandlerContext {
                transport: self.transport.clone(),
                store,
                token,
                on_auth_failure,
            },
        );
    }

    /// Close the connection and drop every handler registration.
    pub fn teardown(&self) {
        crate::log_info!("Tearing down socket provider");
        self.transport.shutdown();
        self.router.clear();
    }
}

impl Default for SocketProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SocketProvider {
    fn drop(&mut self) {
        self.teardown();
    }
}
