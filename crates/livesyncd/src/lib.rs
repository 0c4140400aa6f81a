//! livesync runtime - snapshot store, request/response broker and
//! remote view sessions
//!
//! - `store` - actor owning the one authoritative snapshot
//! - `subscribe` - reference-change subscriptions over the snapshot
//! - `transport` - named-message transport seam plus an in-process one
//! - `broker` - request/response with timeout over a transport
//! - `remote_view` - remote view session lifecycle
//! - `listeners` - inbound message routing
//! - `config` - TOML options
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   listeners     │────▶│        StoreActor           │   │
//! │  │ (inbound msgs)  │     │  (snapshot owner)           │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │                   │
//! │           ▼                             │ dispatch          │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │    Transport    │◀────│   RemoteView  +  Broker     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broker;
pub mod config;
pub mod engine;
pub mod listeners;
pub mod remote_view;
pub mod store;
pub mod subscribe;
pub mod transport;

pub use broker::{Broker, BrokerError, Request};
pub use config::{ConfigError, Options};
pub use engine::Engine;
pub use remote_view::{
    Continuation, CreateSessionRequest, RemoteView, RemoteViewError, SessionDelegate,
};
pub use store::{spawn_store, Dispatched, StoreError, StoreEvent, StoreHandle};
pub use subscribe::{Selected, SubscriptionId};
pub use transport::{LocalTransport, Transport, TransportError};
