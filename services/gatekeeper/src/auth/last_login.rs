//! Detached last-login refresh.
//!
//! Runs on its own spawned task with its own timeout, so it outlives the
//! request that triggered it and never adds latency to the auth decision.
use crate::observability::Observer;
use crate::store::IdentityStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct LastLoginUpdater {
    store: Arc<dyn IdentityStore>,
    observer: Arc<dyn Observer>,
    timeout: Duration,
}

impl LastLoginUpdater {
    pub fn new(store: Arc<dyn IdentityStore>, observer: Arc<dyn Observer>, timeout: Duration) -> Self {
        Self {
            store,
            observer,
            timeout,
        }
    }

    /// Schedule the update. The handle is only useful to tests; callers are
    /// free to drop it.
    pub fn schedule(&self, user_id: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let observer = self.observer.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let outcome =
                match tokio::time::timeout(timeout, store.update_last_login(&user_id, Utc::now()))
                    .await
                {
                    Ok(Ok(())) => "ok",
                    Ok(Err(err)) => {
                        tracing::warn!(%user_id, error = %err, "last login update failed");
                        "error"
                    }
                    Err(_) => {
                        tracing::warn!(%user_id, ?timeout, "last login update timed out");
                        "timeout"
                    }
                };
            observer.last_login_update(outcome);
        })
    }
}
