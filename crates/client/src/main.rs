//! Banter client - headless entry point
//!
//! Resumes the stored session (or logs in with `BANTER_EMAIL` and
//! `BANTER_PASSWORD`), keeps it in sync and logs a summary line whenever
//! the state changes. Ctrl-C closes the connection but keeps the session.

use std::sync::Arc;

use anyhow::{bail, Context};
use banter_client::{logging, ChatEngine, ClientConfig, FileStore, KeyValueStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = ClientConfig::from_env();
    let store: Arc<dyn KeyValueStore> = match &config.data_dir {
        Some(dir) => Arc::new(FileStore::new(dir)),
        None => Arc::new(FileStore::in_config_dir().context("locating the config directory")?),
    };
    let engine = ChatEngine::new(config, SessionStore::new(store));

    let resumed = match engine.resume().await {
        Ok(resumed) => resumed,
        Err(e) => {
            banter_client::log_warn!("Could not resume stored session: {}", e);
            None
        }
    };
    let active = match resumed {
        Some(active) => active,
        None => {
            let (Ok(email), Ok(password)) = (
                std::env::var("BANTER_EMAIL"),
                std::env::var("BANTER_PASSWORD"),
            ) else {
                bail!("no stored session; set BANTER_EMAIL and BANTER_PASSWORD to log in");
            };
            engine
                .login(&email, &password)
                .await
                .context("logging in")?
        }
    };

    let reconciler = active.reconciler().clone();
    let mut changes = reconciler.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    banter_client::log_info!("Signed in as {}", active.user().username);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = reconciler.with_state(|s| {
                    format!(
                        "{} chats, {} unread, {} online, {} requests, active={:?}, {:?}",
                        s.chats.len(),
                        s.chats.total_unread(),
                        s.roster.online().len(),
                        s.requests.len(),
                        s.active_chat_id(),
                        s.connection,
                    )
                });
                banter_client::log_info!("{}", summary);
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    active.shutdown();
    Ok(())
}
