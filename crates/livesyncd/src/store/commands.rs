//! Store actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `StoreActor`:
//! - `StoreCommand`: Commands sent to the actor
//! - `StoreError`: Errors that can occur during store operations
//! - `StoreEvent`: Events published by the store for subscribers

use std::sync::Arc;

use livesync_core::{Action, Snapshot};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::subscribe::{Subscriber, SubscriptionId};

// ============================================================================
// Store Commands
// ============================================================================

/// Commands sent to the store actor.
///
/// Each command that expects an answer carries a oneshot sender. Commands
/// are applied strictly in the order they are received.
pub enum StoreCommand {
    /// Apply one action to the snapshot.
    Dispatch {
        action: Box<Action>,
        respond_to: oneshot::Sender<Dispatched>,
    },

    /// Read the current snapshot.
    GetSnapshot {
        respond_to: oneshot::Sender<Arc<Snapshot>>,
    },

    /// Register a change subscription, primed with the current snapshot.
    Subscribe {
        subscriber: Box<dyn Subscriber>,
        respond_to: oneshot::Sender<SubscriptionId>,
    },

    /// Drop a subscription. Fire-and-forget.
    Unsubscribe { id: SubscriptionId },
}

impl std::fmt::Debug for StoreCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatch { action, .. } => f
                .debug_struct("Dispatch")
                .field("action", &action.kind())
                .finish_non_exhaustive(),
            Self::GetSnapshot { .. } => f.write_str("GetSnapshot"),
            Self::Subscribe { .. } => f.write_str("Subscribe"),
            Self::Unsubscribe { id } => f.debug_struct("Unsubscribe").field("id", id).finish(),
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// False when the action left the snapshot untouched.
    pub changed: bool,
    /// Snapshot after the action.
    pub snapshot: Arc<Snapshot>,
}

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("store channel closed")]
    ChannelClosed,
}

// ============================================================================
// Store Events
// ============================================================================

/// Published after every transition that produced a new snapshot.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Changed {
        /// Name of the action that caused the change.
        action: &'static str,
        previous: Arc<Snapshot>,
        current: Arc<Snapshot>,
    },
}
