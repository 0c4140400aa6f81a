//! Store actor - owns the snapshot and applies actions one at a time.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)
//! - Event publish failures are ignored (nobody is listening)

use std::sync::Arc;

use livesync_core::{reduce, Action, Condense, Snapshot};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use super::commands::{Dispatched, StoreCommand, StoreEvent};
use crate::subscribe::{Subscriber, SubscriptionId};

// ============================================================================
// Store Actor
// ============================================================================

/// The store actor - owns the one authoritative snapshot.
///
/// Processes commands sequentially. A snapshot handed out is never
/// mutated afterwards, so readers hold them without locks.
pub struct StoreActor {
    /// Command receiver
    receiver: mpsc::Receiver<StoreCommand>,

    snapshot: Arc<Snapshot>,

    /// Patch backlog condensing rule
    condense: Arc<dyn Condense>,

    subscribers: Vec<(SubscriptionId, Box<dyn Subscriber>)>,
    next_subscription: u64,

    /// Event publisher for snapshot changes
    event_publisher: broadcast::Sender<StoreEvent>,
}

impl StoreActor {
    pub fn new(
        receiver: mpsc::Receiver<StoreCommand>,
        event_publisher: broadcast::Sender<StoreEvent>,
        condense: Arc<dyn Condense>,
    ) -> Self {
        Self {
            receiver,
            snapshot: Arc::new(Snapshot::default()),
            condense,
            subscribers: Vec::new(),
            next_subscription: 0,
            event_publisher,
        }
    }

    /// Runs the actor event loop until every sender is dropped.
    pub async fn run(mut self) {
        info!("Store actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            tabs = self.snapshot.tabs.len(),
            editors = self.snapshot.editors.list.len(),
            "Store actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::Dispatch { action, respond_to } => {
                let result = self.handle_dispatch(&action);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            StoreCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(Arc::clone(&self.snapshot));
            }
            StoreCommand::Subscribe {
                mut subscriber,
                respond_to,
            } => {
                subscriber.prime(&self.snapshot);
                let id = SubscriptionId(self.next_subscription);
                self.next_subscription += 1;
                self.subscribers.push((id, subscriber));
                debug!(subscription = id.0, "subscriber registered");
                let _ = respond_to.send(id);
            }
            StoreCommand::Unsubscribe { id } => {
                self.subscribers.retain(|(existing, _)| *existing != id);
                debug!(subscription = id.0, "subscriber removed");
            }
        }
    }

    fn handle_dispatch(&mut self, action: &Action) -> Dispatched {
        let previous = Arc::clone(&self.snapshot);
        let next = reduce(&previous, action, self.condense.as_ref());

        if Arc::ptr_eq(&next, &previous) {
            trace!(action = action.kind(), "action changed nothing");
            return Dispatched {
                changed: false,
                snapshot: previous,
            };
        }

        debug!(action = action.kind(), "snapshot updated");
        self.snapshot = Arc::clone(&next);

        for (_, subscriber) in &mut self.subscribers {
            subscriber.notify(&next);
        }

        // No receivers is fine
        let _ = self.event_publisher.send(StoreEvent::Changed {
            action: action.kind(),
            previous,
            current: Arc::clone(&next),
        });

        Dispatched {
            changed: true,
            snapshot: next,
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }
}
