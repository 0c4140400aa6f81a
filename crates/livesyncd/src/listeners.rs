//! Wires inbound transport messages to store transitions.
//!
//! Messages are handled in arrival order. Work that waits on a reply
//! (probes, session list requests) runs on its own task so the loop keeps
//! draining messages meanwhile.

use std::sync::Arc;

use livesync_protocol::{Inbound, MessageName};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::remote_view::RemoteView;
use crate::store::StoreHandle;
use crate::transport::Transport;

/// Names the listener loop reacts to.
pub const LISTENED: [MessageName; 10] = [
    MessageName::EditorConnect,
    MessageName::EditorDisconnect,
    MessageName::EditorFiles,
    MessageName::RvConnection,
    MessageName::RvSessionList,
    MessageName::RvSessionClosed,
    MessageName::Open,
    MessageName::ClientConnect,
    MessageName::ClientDisconnect,
    MessageName::Close,
];

/// Spawns the listener loop. It stops when `cancel` fires or the
/// transport goes away.
///
/// A session list request is issued once at startup.
pub fn spawn_listeners(
    transport: Arc<dyn Transport>,
    store: StoreHandle,
    remote_view: RemoteView,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut messages = transport.subscribe(&MessageName::join(&LISTENED));

    tokio::spawn(async move {
        info!("listeners starting");
        refresh_session_list(&remote_view);

        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                envelope = messages.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let inbound = match Inbound::parse(&envelope) {
                Ok(Some(inbound)) => inbound,
                Ok(None) => continue,
                Err(err) => {
                    warn!(name = %envelope.name, error = %err, "dropping malformed message");
                    continue;
                }
            };
            debug!(name = %envelope.name, "inbound message");

            if let Some(action) = inbound.editor_action() {
                if store.dispatch(action).await.is_err() {
                    break;
                }
                continue;
            }

            let result = match inbound {
                Inbound::SessionList(sessions) => remote_view.reconcile(sessions).await,
                Inbound::SessionClosed { origin } => remote_view.session_closed(origin).await,
                Inbound::Close => remote_view.disconnected().await,
                Inbound::Connection => {
                    let remote_view = remote_view.clone();
                    tokio::spawn(async move {
                        let _ = remote_view.check_connection().await;
                    });
                    Ok(())
                }
                Inbound::Open | Inbound::ClientConnect | Inbound::ClientDisconnect => {
                    refresh_session_list(&remote_view);
                    Ok(())
                }
                Inbound::EditorConnect(_) | Inbound::EditorDisconnect(_) | Inbound::EditorFiles(_) => {
                    Ok(())
                }
            };
            if result.is_err() {
                break;
            }
        }

        info!("listeners stopped");
    })
}

fn refresh_session_list(remote_view: &RemoteView) {
    let remote_view = remote_view.clone();
    tokio::spawn(async move {
        if let Err(err) = remote_view.request_session_list().await {
            debug!(error = %err, "session list refresh abandoned");
        }
    });
}
