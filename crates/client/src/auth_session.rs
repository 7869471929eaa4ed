//! Authentication session: persisted credentials, socket bootstrap and the
//! forced logout that follows a rejected token.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use onechat_shared::{ApiError, AuthResponse, Credentials, User};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::gateway::MutationGateway;
use crate::storage::{Storage, StorageError, TOKEN_KEY, USER_KEY};
use crate::stores::{Action, StoreHandle};
use crate::ws::{ConnectionState, SocketProvider};

/// Announcements for whatever presents the session to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The socket rejected our token; a purge follows after the configured delay.
    AuthExpired,
    LoggedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid socket url: {0}")]
    SocketUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy)]
enum AuthKind {
    Login,
    Signup,
}

impl AuthKind {
    fn path(self) -> &'static str {
        match self {
            AuthKind::Login => "/auth/login",
            AuthKind::Signup => "/auth/signup",
        }
    }
}

/// Cloneable handle; clones share credentials, store and socket.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ClientConfig,
    storage: Storage,
    store: StoreHandle,
    api: ApiClient,
    token: RwLock<Option<String>>,
    provider: Mutex<Option<SocketProvider>>,
    /// Delayed purge for a rejected token, at most one at a time.
    pending_purge: Mutex<Option<PendingPurge>>,
    events: broadcast::Sender<SessionEvent>,
}

struct PendingPurge {
    token: Option<String>,
    task: JoinHandle<()>,
}

impl Session {
    /// Session using `config.data_dir`, or the platform config dir.
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        let storage = match &config.data_dir {
            Some(dir) => Storage::at(dir),
            None => Storage::platform()?,
        };
        Ok(Self::with_storage(config, storage))
    }

    pub fn with_storage(config: ClientConfig, storage: Storage) -> Self {
        let (events, _) = broadcast::channel(16);
        let inner = SessionInner {
            api: ApiClient::new().with_base_url(config.api_base_url()),
            store: StoreHandle::new(config.message_capacity),
            config,
            storage,
            token: RwLock::new(None),
            provider: Mutex::new(None),
            pending_purge: Mutex::new(None),
            events,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn provider_slot(&self) -> MutexGuard<'_, Option<SocketProvider>> {
        self.inner.provider.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn purge_slot(&self) -> MutexGuard<'_, Option<PendingPurge>> {
        self.inner
            .pending_purge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending_purge(&self) {
        if let Some(pending) = self.purge_slot().take() {
            pending.task.abort();
        }
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.provider_slot().as_ref().map(SocketProvider::state)
    }

    /// API client carrying the current bearer token.
    pub fn client(&self) -> ApiClient {
        self.inner.api.clone().with_token(self.token())
    }

    pub fn gateway(&self) -> MutationGateway {
        MutationGateway::new(self.client(), self.inner.store.clone())
            .with_storage(self.inner.storage.clone())
    }

    /// Load the persisted token and profile. Returns whether a token was found.
    pub fn restore(&self) -> bool {
        let Some(token) = self.inner.storage.load::<String>(TOKEN_KEY) else {
            return false;
        };
        self.set_token(Some(token));
        if let Some(user) = self.inner.storage.load::<User>(USER_KEY) {
            self.inner.store.dispatch(Action::SetUser(user));
        }
        crate::log_info!(
            "Restored session from {}",
            self.inner.storage.root().display()
        );
        true
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Option<User>, SessionError> {
        self.authenticate(AuthKind::Login, credentials).await
    }

    pub async fn signup(&self, credentials: &Credentials) -> Result<Option<User>, SessionError> {
        self.authenticate(AuthKind::Signup, credentials).await
    }

    async fn authenticate(
        &self,
        kind: AuthKind,
        credentials: &Credentials,
    ) -> Result<Option<User>, SessionError> {
        let response: AuthResponse = self.inner.api.post_raw(kind.path(), credentials).await?;
        self.accept(response)
    }

    fn accept(&self, response: AuthResponse) -> Result<Option<User>, SessionError> {
        self.cancel_pending_purge();
        self.inner.storage.save(TOKEN_KEY, &response.token)?;
        self.set_token(Some(response.token));
        if let Some(user) = &response.user {
            self.inner.storage.save(USER_KEY, user)?;
            self.inner.store.dispatch(Action::SetUser(user.clone()));
        }
        Ok(response.user)
    }

    /// Install the default handlers and open the socket. Replaces any
    /// provider from an earlier bootstrap.
    pub fn bootstrap(&self) -> Result<(), SessionError> {
        let token = self.token().ok_or(SessionError::NotAuthenticated)?;
        let url = self.inner.config.socket_url()?;

        // The provider lives inside the session, so its handlers must not keep it alive.
        let session = Arc::downgrade(&self.inner);
        let on_auth_failure: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(inner) = session.upgrade() {
                Session { inner }.handle_auth_failure();
            }
        });

        let provider = SocketProvider::new();
        provider.install_default_handlers(self.inner.store.clone(), token, on_auth_failure);
        provider.connect(&url);

        if let Some(previous) = self.provider_slot().replace(provider) {
            previous.teardown();
        }
        Ok(())
    }

    /// Announce expiry now, purge credentials after the configured delay.
    ///
    /// The purge is skipped if the token changed in the meantime. Repeated
    /// failures for the same token share one pending purge.
    pub fn handle_auth_failure(&self) {
        let rejected = self.token();
        let mut slot = self.purge_slot();
        if slot
            .as_ref()
            .is_some_and(|pending| pending.token == rejected && !pending.task.is_finished())
        {
            crate::log_debug!("Purge already pending for the rejected token");
            return;
        }

        let _ = self.inner.events.send(SessionEvent::AuthExpired);
        let delay = self.inner.config.auth_failure_delay;
        crate::log_warn!("Token rejected, logging out in {:?}", delay);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            drop(slot);
            self.logout();
            return;
        };

        let session = Arc::downgrade(&self.inner);
        let expected = rejected.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = session.upgrade() else {
                return;
            };
            let session = Session { inner };
            {
                let mut slot = session.purge_slot();
                if slot.as_ref().is_some_and(|pending| pending.token == expected) {
                    slot.take();
                }
            }
            if session.token() != expected {
                crate::log_info!("Credentials changed since rejection, skipping purge");
                return;
            }
            session.logout();
        });

        if let Some(previous) = slot.replace(PendingPurge {
            token: rejected,
            task,
        }) {
            previous.task.abort();
        }
    }

    /// Purge credentials, reset the store and close the socket.
    pub fn logout(&self) {
        self.cancel_pending_purge();
        if !self.inner.storage.clear() {
            crate::log_warn!("Stored credentials were not fully removed");
        }
        self.set_token(None);
        self.inner.store.dispatch(Action::Reset);

        let provider = self.provider_slot().take();
        if let Some(provider) = provider {
            provider.teardown();
        }
        crate::log_info!("Logged out");
        let _ = self.inner.events.send(SessionEvent::LoggedOut);
    }

    /// Delete the account on the server, then log out.
    pub async fn delete_account(&self) -> Result<(), SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        self.gateway().delete_user().await?;
        self.logout();
        Ok(())
    }
}
