//! Socket driver using tokio-tungstenite.

use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::Transport;

/// Spawn the task owning one connection attempt and its lifetime.
pub(super) fn spawn(transport: Transport, url: String, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                crate::log_error!("Socket connection to {} failed: {}", url, e);
                transport.on_failed(generation, e.to_string());
                return;
            }
        };
        crate::log_info!("Socket connected to {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (sender, mut receiver) = unbounded::<String>();

        // Write task: ends when the transport drops its sender.
        let write_task = tokio::spawn(async move {
            while let Some(json) = receiver.next().await {
                crate::log_debug!("Socket send: {}", json);
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    crate::log_error!("Socket send failed: {}", e);
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        if !transport.on_open(generation, sender) {
            write_task.abort();
            return;
        }

        let mut reason = None;
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    crate::log_debug!("Socket received: {}", text.as_str());
                    transport.deliver(text.as_str());
                }
                Ok(Message::Close(frame)) => {
                    reason = frame.map(|f| f.reason.as_str().to_string());
                    crate::log_info!("Socket to {} received close frame", url);
                    break;
                }
                Ok(Message::Ping(data)) => {
                    // Pong is handled automatically by tungstenite
                    crate::log_debug!("Received ping: {:?}", data);
                }
                Ok(_) => {}
                Err(e) => {
                    crate::log_error!("Socket read error: {}", e);
                    reason = Some(e.to_string());
                    break;
                }
            }
        }

        write_task.abort();
        crate::log_info!("Socket to {} closed", url);
        transport.on_close(generation, reason);
    })
}
