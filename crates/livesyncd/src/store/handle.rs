//! Client interface for interacting with the StoreActor.
//!
//! The `StoreHandle` provides a cheap-to-clone interface for dispatching
//! actions, reading snapshots and registering change subscriptions.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `StoreError::ChannelClosed`

use std::sync::Arc;

use livesync_core::{Action, Diff, Keyed, Routed, Snapshot};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{Dispatched, StoreCommand, StoreError, StoreEvent};
use crate::subscribe::{KeyedWatch, Selected, Subscriber, SubscriptionId, Watch};

// ============================================================================
// Store Handle
// ============================================================================

/// Handle for interacting with the store actor.
///
/// ```ignore
/// let store = spawn_store(&Options::default());
/// store.dispatch(SessionAction::toggle_enabled(url)).await?;
///
/// let id = store
///     .subscribe(|s| s.remote_view.clone(), |rv| println!("connected: {}", rv.connected))
///     .await?;
/// ```
#[derive(Clone)]
pub struct StoreHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<StoreCommand>,

    /// Event broadcaster for subscribing to changes
    event_sender: broadcast::Sender<StoreEvent>,
}

impl StoreHandle {
    pub fn new(sender: mpsc::Sender<StoreCommand>, event_sender: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Applies one action and waits until it has been applied.
    ///
    /// # Errors
    ///
    /// - `StoreError::ChannelClosed` if the actor has shut down
    pub async fn dispatch(&self, action: impl Into<Action>) -> Result<Dispatched, StoreError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::Dispatch {
                action: Box::new(action.into()),
                respond_to: tx,
            })
            .await
            .map_err(|_| StoreError::ChannelClosed)?;

        rx.await.map_err(|_| StoreError::ChannelClosed)
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::GetSnapshot { respond_to: tx })
            .await
            .map_err(|_| StoreError::ChannelClosed)?;

        rx.await.map_err(|_| StoreError::ChannelClosed)
    }

    /// Calls `on_change` whenever the value picked by `select` changes by reference.
    ///
    /// The value at registration time does not fire.
    pub async fn subscribe<S, F, C>(&self, select: F, on_change: C) -> Result<SubscriptionId, StoreError>
    where
        S: Selected,
        F: Fn(&Snapshot) -> S + Send + 'static,
        C: FnMut(&S) + Send + 'static,
    {
        self.register(Box::new(Watch::new(select, on_change))).await
    }

    /// Calls `on_change(value, key)` once per key whose value changed by
    /// reference in the collection picked by `collection`.
    pub async fn subscribe_keyed<V, F, C>(
        &self,
        collection: F,
        mut on_change: C,
    ) -> Result<SubscriptionId, StoreError>
    where
        V: Send + Sync + 'static,
        F: Fn(&Snapshot) -> Keyed<Arc<V>> + Send + 'static,
        C: FnMut(&Arc<V>, &str) + Send + 'static,
    {
        let watch = KeyedWatch::new(
            collection,
            None::<fn(&V)>,
            Box::new(move |value: &Arc<V>, key: &str, _: Option<&()>, _: Option<&()>| {
                on_change(value, key)
            }),
        );
        self.register(Box::new(watch)).await
    }

    /// Like [`StoreHandle::subscribe_keyed`], further gated on `inner`:
    /// a changed entry fires only if `inner(entry)` changed too. The
    /// callback receives `(value, key, new_inner, old_inner)`.
    pub async fn subscribe_keyed_inner<V, I, F, G, C>(
        &self,
        collection: F,
        inner: G,
        mut on_change: C,
    ) -> Result<SubscriptionId, StoreError>
    where
        V: Send + Sync + 'static,
        I: Selected,
        F: Fn(&Snapshot) -> Keyed<Arc<V>> + Send + 'static,
        G: Fn(&V) -> I + Send + 'static,
        C: FnMut(&Arc<V>, &str, &I, Option<&I>) + Send + 'static,
    {
        let watch = KeyedWatch::new(
            collection,
            Some(inner),
            Box::new(move |value: &Arc<V>, key: &str, new: Option<&I>, old: Option<&I>| {
                if let Some(new) = new {
                    on_change(value, key, new, old);
                }
            }),
        );
        self.register(Box::new(watch)).await
    }

    /// Drops a subscription. Fire-and-forget.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        // Actor gone means the subscription is gone too
        let _ = self.sender.send(StoreCommand::Unsubscribe { id }).await;
    }

    /// Raw change events, one per transition.
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_sender.subscribe()
    }

    /// Routes a browser-side diff against the current snapshot.
    pub async fn diff_for_editor(&self, diff: &Diff) -> Result<Vec<Routed>, StoreError> {
        Ok(self.snapshot().await?.diff_for_editor(diff))
    }

    /// Routes an editor-side diff against the current snapshot.
    pub async fn diff_for_browser(&self, diff: &Diff) -> Result<Vec<Routed>, StoreError> {
        Ok(self.snapshot().await?.diff_for_browser(diff))
    }

    /// True while the store actor is running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn register(&self, subscriber: Box<dyn Subscriber>) -> Result<SubscriptionId, StoreError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::Subscribe {
                subscriber,
                respond_to: tx,
            })
            .await
            .map_err(|_| StoreError::ChannelClosed)?;

        rx.await.map_err(|_| StoreError::ChannelClosed)
    }
}
