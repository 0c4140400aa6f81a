//! Wires store, broker, remote view and listeners over one transport.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;
use crate::config::Options;
use crate::listeners::spawn_listeners;
use crate::remote_view::RemoteView;
use crate::store::{spawn_store, StoreHandle};
use crate::transport::Transport;

/// A running livesync runtime.
pub struct Engine {
    pub store: StoreHandle,
    pub broker: Broker,
    pub remote_view: RemoteView,
    cancel: CancellationToken,
    listeners: JoinHandle<()>,
}

impl Engine {
    /// Spawns every task. Must be called inside a tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, options: &Options) -> Self {
        let store = spawn_store(options);
        let broker = Broker::new(Arc::clone(&transport));
        let remote_view = RemoteView::new(store.clone(), broker.clone(), options);
        let cancel = CancellationToken::new();
        let listeners = spawn_listeners(transport, store.clone(), remote_view.clone(), cancel.clone());

        info!(
            request_timeout_ms = options.request_timeout_ms,
            create_session_timeout_ms = options.create_session_timeout_ms,
            "engine started"
        );

        Self {
            store,
            broker,
            remote_view,
            cancel,
            listeners,
        }
    }

    /// Token that stops the listener loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops listening and waits for the listener loop to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.listeners.await;
        info!("engine stopped");
    }
}
