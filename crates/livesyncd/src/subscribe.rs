//! Change subscriptions over the snapshot.
//!
//! A subscription selects a slice of the snapshot and fires its callback
//! when the selected value changes by reference. Selection is a typed
//! closure; the reference test comes from [`Selected`].
//!
//! Callbacks run on the store task right after each transition, in
//! registration order. They must not block.

use std::sync::Arc;

use livesync_core::{ConnectionState, KeySet, Keyed, Snapshot};

/// Values a subscription can watch.
pub trait Selected: Send + 'static {
    /// True when `self` and `other` are the same value for change detection.
    fn same(&self, other: &Self) -> bool;
}

impl<T: ?Sized + Send + Sync + 'static> Selected for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<V: Send + Sync + 'static> Selected for Keyed<V> {
    fn same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Selected for KeySet {
    fn same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<S: Selected> Selected for Option<S> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! selected_by_value {
    ($($ty:ty),* $(,)?) => {
        $(impl Selected for $ty {
            fn same(&self, other: &Self) -> bool {
                self == other
            }
        })*
    };
}

selected_by_value!(bool, usize, u64, String, ConnectionState, ());

/// Opaque id returned by `subscribe*`; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Anything the store notifies after a transition.
///
/// Implemented by the watches built through `StoreHandle::subscribe*`.
pub trait Subscriber: Send {
    /// Records the value at registration time without firing.
    fn prime(&mut self, snapshot: &Snapshot);

    fn notify(&mut self, snapshot: &Snapshot);
}

// ============================================================================
// Whole-value watch
// ============================================================================

pub(crate) struct Watch<S, F, C> {
    select: F,
    on_change: C,
    current: Option<S>,
}

impl<S, F, C> Watch<S, F, C>
where
    S: Selected,
    F: Fn(&Snapshot) -> S + Send + 'static,
    C: FnMut(&S) + Send + 'static,
{
    pub(crate) fn new(select: F, on_change: C) -> Self {
        Self {
            select,
            on_change,
            current: None,
        }
    }
}

impl<S, F, C> Subscriber for Watch<S, F, C>
where
    S: Selected,
    F: Fn(&Snapshot) -> S + Send + 'static,
    C: FnMut(&S) + Send + 'static,
{
    fn prime(&mut self, snapshot: &Snapshot) {
        self.current = Some((self.select)(snapshot));
    }

    fn notify(&mut self, snapshot: &Snapshot) {
        let next = (self.select)(snapshot);
        if self.current.as_ref().is_some_and(|current| current.same(&next)) {
            return;
        }
        (self.on_change)(&next);
        self.current = Some(next);
    }
}

// ============================================================================
// Per-key watch
// ============================================================================

type KeyCallback<V, I> = Box<dyn FnMut(&Arc<V>, &str, Option<&I>, Option<&I>) + Send>;

/// Fires once per changed key of a keyed collection.
///
/// With an inner projection, a changed entry only fires when the projected
/// value changed too. Removed keys never fire.
pub(crate) struct KeyedWatch<V, I, F, G> {
    collection: F,
    inner: Option<G>,
    on_change: KeyCallback<V, I>,
    current: Keyed<Arc<V>>,
}

impl<V, I, F, G> KeyedWatch<V, I, F, G>
where
    V: Send + Sync + 'static,
    I: Selected,
    F: Fn(&Snapshot) -> Keyed<Arc<V>> + Send + 'static,
    G: Fn(&V) -> I + Send + 'static,
{
    pub(crate) fn new(collection: F, inner: Option<G>, on_change: KeyCallback<V, I>) -> Self {
        Self {
            collection,
            inner,
            on_change,
            current: Keyed::new(),
        }
    }
}

impl<V, I, F, G> Subscriber for KeyedWatch<V, I, F, G>
where
    V: Send + Sync + 'static,
    I: Selected,
    F: Fn(&Snapshot) -> Keyed<Arc<V>> + Send + 'static,
    G: Fn(&V) -> I + Send + 'static,
{
    fn prime(&mut self, snapshot: &Snapshot) {
        self.current = (self.collection)(snapshot);
    }

    fn notify(&mut self, snapshot: &Snapshot) {
        let next = (self.collection)(snapshot);
        if next.ptr_eq(&self.current) {
            return;
        }

        for (key, value) in &next {
            let previous = self.current.get(key);
            if previous.is_some_and(|previous| Arc::ptr_eq(previous, value)) {
                continue;
            }
            match &self.inner {
                Some(project) => {
                    let new_inner = project(value);
                    let old_inner = previous.map(|previous| project(previous));
                    if old_inner.as_ref().is_some_and(|old| old.same(&new_inner)) {
                        continue;
                    }
                    (self.on_change)(value, key, Some(&new_inner), old_inner.as_ref());
                }
                None => (self.on_change)(value, key, None, None),
            }
        }

        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_core::{RemoteViewSession, RemoteViewState};
    use std::sync::Mutex;

    fn snapshot_with(sessions: Keyed<Arc<RemoteViewSession>>) -> Snapshot {
        Snapshot {
            remote_view: Arc::new(RemoteViewState {
                connected: true,
                sessions,
            }),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_watch_fires_on_reference_change_only() {
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let mut watch = Watch::new(
            |s: &Snapshot| s.remote_view.sessions.clone(),
            move |_: &Keyed<Arc<RemoteViewSession>>| *counter.lock().unwrap() += 1,
        );

        let first = snapshot_with(Keyed::new());
        watch.prime(&first);
        watch.notify(&first);
        assert_eq!(*fired.lock().unwrap(), 0);

        let second = snapshot_with(
            Keyed::new().set("http://a", Arc::new(RemoteViewSession::pending("http://a"))),
        );
        watch.notify(&second);
        watch.notify(&second);
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn test_keyed_watch_with_inner_projection() {
        let seen: Arc<Mutex<Vec<(String, ConnectionState, Option<ConnectionState>)>>> =
            Arc::default();
        let log = Arc::clone(&seen);
        let mut watch = KeyedWatch::new(
            |s: &Snapshot| s.remote_view.sessions.clone(),
            Some(|session: &RemoteViewSession| session.state),
            Box::new(move |_: &Arc<RemoteViewSession>, key: &str, new: Option<&ConnectionState>, old: Option<&ConnectionState>| {
                if let Some(new) = new {
                    log.lock().unwrap().push((key.to_string(), *new, old.copied()));
                }
            }),
        );
        watch.prime(&Snapshot::default());

        let pending = Keyed::new().set("http://a", Arc::new(RemoteViewSession::pending("http://a")));
        watch.notify(&snapshot_with(pending.clone()));

        let mut refreshed = RemoteViewSession::pending("http://a");
        refreshed.public_id = Some("x".to_string());
        let same_state = pending.set("http://a", Arc::new(refreshed.clone()));
        watch.notify(&snapshot_with(same_state.clone()));

        let connected = same_state.set("http://a", Arc::new(refreshed.connected()));
        watch.notify(&snapshot_with(connected));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("http://a".to_string(), ConnectionState::Pending, None),
                (
                    "http://a".to_string(),
                    ConnectionState::Connected,
                    Some(ConnectionState::Pending)
                ),
            ]
        );
    }
}
