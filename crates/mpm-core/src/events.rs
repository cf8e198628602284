//! Event Hook Bus: synchronous, cancellable notifications fired around
//! every lifecycle operation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One lifecycle notification. `cancelled` is the only mutable state;
/// subscribers flip it to abort the in-flight operation.
pub struct Event {
    /// Which kind of event this is.
    pub kind: EventKind,
    /// The plugin the event concerns.
    pub name: String,
    /// The installed artifact's path, when the firing operation has one on
    /// hand (currently only [`EventKind::PluginUninstall`]).
    pub path: Option<PathBuf>,
    cancelled: bool,
}

impl Event {
    fn new(kind: EventKind, name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
            path,
            cancelled: false,
        }
    }

    /// Marks the in-flight operation as cancelled. Has no effect on
    /// [`EventKind::PluginOutdated`], which is not cancellable.
    pub fn cancel(&mut self) {
        if self.kind != EventKind::PluginOutdated {
            self.cancelled = true;
        }
    }

    /// Whether any subscriber has cancelled this event.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// The lifecycle moment an [`Event`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A manifest entry was added.
    PluginAdd,
    /// A manifest entry was removed.
    PluginRemove,
    /// About to fetch and place an artifact.
    PluginInstall,
    /// About to delete an installed artifact.
    PluginUninstall,
    /// About to replace an installed artifact with a newer version.
    PluginUpdate,
    /// A plugin was pinned against updates.
    PluginLock,
    /// A plugin was un-pinned.
    PluginUnlock,
    /// A plugin was found to have a newer version available. Not
    /// cancellable; typically dispatched on the host's main thread.
    PluginOutdated,
}

type Subscriber = Arc<dyn Fn(&mut Event) + Send + Sync>;
type HostThreadDispatcher = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// Synchronous broadcast bus. Subscribers are invoked in registration order
/// and MUST return promptly — they run inline with the firing call.
#[derive(Default, Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    host_thread_dispatcher: Arc<Mutex<Option<HostThreadDispatcher>>>,
}

impl EventBus {
    /// A bus with no subscribers and no host-thread dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber, invoked for every event this bus fires.
    pub fn subscribe(&self, subscriber: impl Fn(&mut Event) + Send + Sync + 'static) {
        self.subscribers.lock().unwrap().push(Arc::new(subscriber));
    }

    /// Installs the callback used for host-thread-affine events (at minimum
    /// [`EventKind::PluginOutdated`]). Without one installed, such events
    /// are dispatched inline like any other.
    pub fn set_host_thread_dispatcher(&self, dispatcher: impl Fn(&mut Event) + Send + Sync + 'static) {
        *self.host_thread_dispatcher.lock().unwrap() = Some(Arc::new(dispatcher));
    }

    /// Fires `kind` for `name`, running every subscriber in order, and
    /// returns whether the event ended cancelled.
    pub fn fire(&self, kind: EventKind, name: &str) -> bool {
        self.dispatch(Event::new(kind, name, None))
    }

    /// Like [`Self::fire`], but attaches the installed artifact's path to
    /// the event. Used by [`EventKind::PluginUninstall`].
    pub fn fire_with_path(&self, kind: EventKind, name: &str, path: impl Into<PathBuf>) -> bool {
        self.dispatch(Event::new(kind, name, Some(path.into())))
    }

    fn dispatch(&self, mut event: Event) -> bool {
        let kind = event.kind;

        if kind == EventKind::PluginOutdated {
            if let Some(dispatcher) = self.host_thread_dispatcher.lock().unwrap().as_ref() {
                dispatcher(&mut event);
                return event.is_cancelled();
            }
        }

        for subscriber in self.subscribers.lock().unwrap().iter() {
            subscriber(&mut event);
            if event.is_cancelled() {
                break;
            }
        }
        event.is_cancelled()
    }
}
