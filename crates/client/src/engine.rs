//! Session lifecycle.
//!
//! [`ChatEngine`] turns credentials into an [`ActiveSession`], which owns the
//! event stream connection and the reconciler for one identity. Logging out
//! consumes the session, so nothing from it carries over to the next login.

use std::sync::Arc;

use banter_shared::{ChatError, Session, User};
use tokio::sync::watch;

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::reconciler::Reconciler;
use crate::session::SessionStore;
use crate::ws::{ConnectionState, EventStream};

pub struct ChatEngine {
    config: ClientConfig,
    sessions: SessionStore,
}

impl ChatEngine {
    pub fn new(config: ClientConfig, sessions: SessionStore) -> Self {
        Self { config, sessions }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn api(&self) -> ApiClient {
        ApiClient::new().with_base_url(&self.config.api_url)
    }

    /// Start a session for an authenticated identity.
    ///
    /// The credentials are persisted, the stream is connected and the initial
    /// state is loaded. A rejected credential tears everything down again and
    /// forgets the stored session.
    pub async fn start(&self, session: Session) -> Result<ActiveSession, ChatError> {
        self.sessions.set(&session)?;

        let directory = Arc::new(self.api().with_token(&session.token));
        let stream = Arc::new(EventStream::new(
            self.config.ws_url()?,
            self.config.reconnect.clone(),
        ));
        let reconciler = Reconciler::new(
            session.user.clone(),
            directory,
            stream.clone(),
            self.config.sync.clone(),
        );
        reconciler.attach(&stream);
        stream.connect(&session.user.id);

        if let Err(e) = reconciler.load_initial().await {
            if e.requires_login() {
                crate::log_warn!("Stored credential for {} was rejected", session.user.username);
                stream.disconnect();
                self.sessions.clear();
                return Err(e);
            }
            crate::log_warn!("Initial load incomplete: {}", e);
        }

        crate::log_info!("Session started for {}", session.user.username);
        Ok(ActiveSession {
            session,
            reconciler,
            stream,
            sessions: self.sessions.clone(),
        })
    }

    /// Start from the stored session, if there is one.
    pub async fn resume(&self) -> Result<Option<ActiveSession>, ChatError> {
        match self.sessions.get() {
            Some(session) => self.start(session).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<ActiveSession, ChatError> {
        let session: Session = self.api().login(email, password).await?.into();
        self.start(session).await
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<ActiveSession, ChatError> {
        let session: Session = self.api().signup(username, email, password).await?.into();
        self.start(session).await
    }
}

/// One signed-in identity: its stream connection and its state.
pub struct ActiveSession {
    session: Session,
    reconciler: Reconciler,
    stream: Arc<EventStream>,
    sessions: SessionStore,
}

impl ActiveSession {
    pub fn user(&self) -> &User {
        &self.session.user
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.stream.watch_state()
    }

    /// Tear down the stream, discard state and forget the stored credentials.
    pub fn logout(self) {
        crate::log_info!("Logging out {}", self.session.user.username);
        self.stream.disconnect();
        self.reconciler.reset();
        self.sessions.clear();
    }

    /// Close the connection but keep the stored credentials for next time.
    pub fn shutdown(self) {
        crate::log_info!("Shutting down session for {}", self.session.user.username);
        self.reconciler.stop_typing();
        self.stream.disconnect();
    }
}
