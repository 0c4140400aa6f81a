//! Snapshot store using Actor pattern.
//!
//! The store owns the one authoritative [`Snapshot`]. Actions arrive over an
//! mpsc channel and are reduced one at a time; every transition that
//! produces a new snapshot notifies subscriptions and is broadcast as a
//! [`StoreEvent`].
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ listeners / RV  │────▶│   StoreActor    │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   StoreCommand        │   StoreEvent          │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!      Dispatch              Arc<Snapshot>           observers
//! ```
//!
//! [`Snapshot`]: livesync_core::Snapshot
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use livesync_core::{Condense, NetEffect};
use tokio::sync::{broadcast, mpsc};

use crate::config::Options;

mod actor;
mod commands;
mod handle;

pub use actor::StoreActor;
pub use commands::{Dispatched, StoreCommand, StoreError, StoreEvent};
pub use handle::StoreHandle;

/// Spawns the store actor with the default [`NetEffect`] condensing rule.
pub fn spawn_store(options: &Options) -> StoreHandle {
    spawn_store_with(options, Arc::new(NetEffect))
}

/// Spawns the store actor with a custom patch condensing rule.
pub fn spawn_store_with(options: &Options, condense: Arc<dyn Condense>) -> StoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(options.command_buffer.max(1));
    let (event_tx, _) = broadcast::channel(options.event_buffer.max(1));

    let actor = StoreActor::new(cmd_rx, event_tx.clone(), condense);
    tokio::spawn(actor.run());

    StoreHandle::new(cmd_tx, event_tx)
}
