//! Socket transport: one connection, an outbound queue, and the state
//! machine that ties them together.
//!
//! Payloads sent while the connection isn't open are queued in memory and
//! flushed in FIFO order on the next transition to OPEN. Closing the
//! connection keeps the queue; nothing reconnects automatically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::UnboundedSender;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

mod connection_native;

/// Connection state for the socket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed { reason: Option<String> },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Connecting or open: a new `connect` must not start another connection.
    pub fn is_active(&self) -> bool {
        self.is_open() || self.is_connecting()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Callback receiving every inbound text frame, in arrival order.
pub type FrameSink = Arc<dyn Fn(&str) + Send + Sync>;

struct TransportInner {
    state: ConnectionState,
    queue: VecDeque<Value>,
    writer: Option<UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    /// Bumped on every `connect`, so a finished connection can't touch a newer one.
    generation: u64,
}

/// Owned handle to the socket. Clones share the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Mutex<TransportInner>>,
    on_frame: FrameSink,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl Transport {
    pub fn new(on_frame: impl Fn(&str) + Send + Sync + 'static) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Mutex::new(TransportInner {
                state: ConnectionState::Idle,
                queue: VecDeque::new(),
                writer: None,
                task: None,
                generation: 0,
            })),
            on_frame: Arc::new(on_frame),
            state_tx: Arc::new(state_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut TransportInner, state: ConnectionState) {
        inner.state = state.clone();
        self.state_tx.send_replace(state);
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Number of payloads waiting for the connection to open.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Open the connection. No-op while already connecting or open.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, url: &str) {
        let mut inner = self.lock();
        if inner.state.is_active() {
            crate::log_debug!("Transport already {:?}, ignoring connect", inner.state);
            return;
        }

        inner.generation += 1;
        let generation = inner.generation;
        self.set_state(&mut inner, ConnectionState::Connecting);
        crate::log_info!("Connecting socket to {}", url);

        let task = connection_native::spawn(self.clone(), url.to_string(), generation);
        if let Some(previous) = inner.task.replace(task) {
            previous.abort();
        }
    }

    /// Transmit now if open, otherwise queue for the next OPEN.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), TransportError> {
        let value = serde_json::to_value(payload)?;
        let mut inner = self.lock();

        if inner.state.is_open() {
            if let Some(writer) = inner.writer.as_ref() {
                let text = serde_json::to_string(&value)?;
                if writer.unbounded_send(text).is_ok() {
                    return Ok(());
                }
                crate::log_warn!("Socket writer gone, queueing payload");
            }
        }

        inner.queue.push_back(value);
        crate::log_debug!("Queued outbound payload ({} pending)", inner.queue.len());
        Ok(())
    }

    /// Transition to OPEN: flush the queue into `writer`, then route new
    /// sends straight to it. Ignored if `generation` is no longer current.
    pub(crate) fn on_open(&self, generation: u64, writer: UnboundedSender<String>) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }

        let queued = inner.queue.len();
        while let Some(value) = inner.queue.pop_front() {
            let text = match serde_json::to_string(&value) {
                Ok(text) => text,
                Err(e) => {
                    crate::log_error!("Dropping unencodable queued payload: {}", e);
                    continue;
                }
            };
            if writer.unbounded_send(text).is_err() {
                inner.queue.push_front(value);
                break;
            }
        }
        if queued > 0 {
            crate::log_info!("Flushed {} queued payloads", queued - inner.queue.len());
        }

        inner.writer = Some(writer);
        self.set_state(&mut inner, ConnectionState::Open);
        true
    }

    /// Transition to CLOSED. The queue is preserved.
    pub(crate) fn on_close(&self, generation: u64, reason: Option<String>) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        inner.writer = None;
        inner.task = None;
        self.set_state(&mut inner, ConnectionState::Closed { reason });
    }

    pub(crate) fn on_failed(&self, generation: u64, reason: String) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        inner.writer = None;
        inner.task = None;
        self.set_state(&mut inner, ConnectionState::Failed { reason });
    }

    pub(crate) fn deliver(&self, text: &str) {
        (self.on_frame)(text);
    }

    /// Close the connection for good and discard anything still queued.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        // Dropping the writer lets the write half send a close frame.
        inner.writer = None;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.queue.clear();
        self.set_state(
            &mut inner,
            ConnectionState::Closed {
                reason: Some("shutdown".to_string()),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_channel::mpsc::unbounded;
    use serde_json::json;

    fn drain(rx: &mut futures_channel::mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[test]
    fn test_send_before_open_queues_then_flushes_in_order_once() {
        let transport = Transport::new(|_| {});
        for i in 0..5 {
            transport.send(&json!({ "n": i })).unwrap();
        }
        assert_eq!(transport.pending(), 5);

        let (tx, mut rx) = unbounded();
        assert!(transport.on_open(transport.generation(), tx));
        assert_eq!(transport.pending(), 0);
        assert!(transport.state().is_open());

        let delivered = drain(&mut rx);
        let expected: Vec<Value> = (0..5).map(|i| json!({ "n": i })).collect();
        assert_eq!(delivered, expected);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_send_while_open_goes_straight_out() {
        let transport = Transport::new(|_| {});
        let (tx, mut rx) = unbounded();
        transport.on_open(transport.generation(), tx);

        transport.send(&json!({ "token": "abc" })).unwrap();
        assert_eq!(transport.pending(), 0);
        assert_eq!(drain(&mut rx), vec![json!({ "token": "abc" })]);
    }

    #[test]
    fn test_close_preserves_queue_for_next_open() {
        let transport = Transport::new(|_| {});
        let (tx, _rx) = unbounded();
        let generation = transport.generation();
        transport.on_open(generation, tx);
        transport.on_close(generation, Some("bye".into()));
        assert_eq!(
            transport.state(),
            ConnectionState::Closed {
                reason: Some("bye".into())
            }
        );

        transport.send(&json!(1)).unwrap();
        transport.send(&json!(2)).unwrap();
        assert_eq!(transport.pending(), 2);

        let (tx, mut rx) = unbounded();
        transport.on_open(generation, tx);
        assert_eq!(drain(&mut rx), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_dead_writer_falls_back_to_queue() {
        let transport = Transport::new(|_| {});
        let (tx, rx) = unbounded();
        transport.on_open(transport.generation(), tx);
        drop(rx);

        transport.send(&json!("late")).unwrap();
        assert_eq!(transport.pending(), 1);
    }

    #[test]
    fn test_connect_is_noop_while_open() {
        let transport = Transport::new(|_| {});
        let (tx, _rx) = unbounded();
        let generation = transport.generation();
        transport.on_open(generation, tx);

        // Returns before spawning anything, so no runtime is needed.
        transport.connect("ws://127.0.0.1:9/ws");
        assert_eq!(transport.generation(), generation);
        assert!(transport.state().is_open());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let transport = Transport::new(|_| {});
        let (tx, _rx) = unbounded();
        assert!(!transport.on_open(transport.generation() + 1, tx));
        assert_eq!(transport.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_shutdown_discards_queue() {
        let transport = Transport::new(|_| {});
        transport.send(&json!(1)).unwrap();
        let mut states = transport.subscribe_state();
        transport.shutdown();
        assert_eq!(transport.pending(), 0);
        assert!(states.has_changed().unwrap());
        assert!(matches!(
            *states.borrow_and_update(),
            ConnectionState::Closed { .. }
        ));
    }

    #[test]
    fn test_frames_reach_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let transport = Transport::new(move |text| sink.lock().unwrap().push(text.to_string()));
        transport.deliver(r#"{"op":"USER_AUTH_INIT"}"#);
        assert_eq!(seen.lock().unwrap().as_slice(), [r#"{"op":"USER_AUTH_INIT"}"#]);
    }
}
