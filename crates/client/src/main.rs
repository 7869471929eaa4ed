//! OneChat client - headless entry point
//!
//! Restores the persisted session, opens the socket and keeps the store in
//! sync until Ctrl-C.

use onechat_client::{logging, ClientConfig, Session, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("onechat_client=debug");

    let config = ClientConfig::from_env();
    onechat_client::log_info!("API base: {}", config.api_base_url());

    let session = Session::new(config)?;
    if !session.restore() {
        anyhow::bail!(
            "no stored credentials in {}; log in first",
            session.storage().root().display()
        );
    }
    session.bootstrap()?;

    let mut events = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                onechat_client::log_info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::AuthExpired) => {
                    onechat_client::log_warn!("Your token has expired. Please login again");
                }
                Ok(SessionEvent::LoggedOut) | Err(_) => break,
            },
        }
    }

    let summary = session.store().read(|store| {
        format!(
            "{} groups, {} permission entries",
            store.groups.len(),
            store.permissions.len()
        )
    });
    onechat_client::log_info!("Store at exit: {}", summary);
    Ok(())
}
