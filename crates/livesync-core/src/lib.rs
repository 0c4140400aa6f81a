//! livesync core - snapshot types and reducers
//!
//! This crate holds everything that is a pure function of state: the
//! structural-sharing containers, the resource → file mapper, diff
//! routing and one reducer per entity family. Nothing here is async.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod diff;
pub mod editor;
pub mod error;
pub mod immutable;
pub mod mapping;
pub mod patch;
pub mod remote_view;
pub mod session;
pub mod state;
pub mod tab;

// Re-exports for convenience
pub use diff::{Diff, Routed};
pub use editor::{EditorAction, EditorId, EditorRecord, EditorRegistry};
pub use error::{DomainError, DomainResult};
pub use immutable::{Draft, KeySet, Keyed, Zone};
pub use patch::{Condense, NetEffect, Patch, PatchAction, PatchSet};
pub use remote_view::{
    ConnectionState, RemoteViewAction, RemoteViewSession, RemoteViewState, SessionError,
};
pub use session::{Direction, SessionAction, SessionConfig, Sessions};
pub use state::{reduce, Action, Snapshot};
pub use tab::{BrowserTab, TabAction, TabInfo, TabSession, Tabs};
