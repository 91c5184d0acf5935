use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::{adapter::Adapter, context::Context, error::Error, work_item::WorkItem};

/// Called before a work item is invoked, with the shared context and the owning adapter.
pub type BeforeEach<C, P, T> =
    Arc<dyn Fn(&WorkItem<C, P, T>, &Context<C>, &Adapter<C, P, T>) + Send + Sync>;

/// Called once the outcome of a work item has settled, whether or not it failed.
pub type AfterEach<C, P, T> = Arc<dyn Fn(&WorkItem<C, P, T>, Result<&T, &Error>) + Send + Sync>;

/// Called when a work item failed, after [`AfterEach`].
pub type OnError<C, P, T> = Arc<dyn Fn(&Error, &WorkItem<C, P, T>) + Send + Sync>;

/// The notifications an adapter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeEach,
    AfterEach,
    Error,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeEach => "beforeEach",
            Self::AfterEach => "afterEach",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a subscription, see [`Adapter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    kind: EventKind,
    id: u64,
}

impl ListenerId {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

type Listeners<L> = RwLock<Vec<(u64, L)>>;

/// Listener lists, one per event kind.
///
/// Emitting iterates over a snapshot of the list, so listeners may subscribe or unsubscribe from
/// inside a notification.
pub(crate) struct Events<C, P, T> {
    next_id: AtomicU64,
    before_each: Listeners<BeforeEach<C, P, T>>,
    after_each: Listeners<AfterEach<C, P, T>>,
    error: Listeners<OnError<C, P, T>>,
}

impl<C, P, T> Events<C, P, T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            before_each: RwLock::new(Vec::new()),
            after_each: RwLock::new(Vec::new()),
            error: RwLock::new(Vec::new()),
        }
    }

    fn next_id(&self, kind: EventKind) -> ListenerId {
        ListenerId {
            kind,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn on_before_each(&self, listener: BeforeEach<C, P, T>) -> ListenerId {
        let id = self.next_id(EventKind::BeforeEach);
        self.before_each.write().push((id.id, listener));
        id
    }

    pub(crate) fn on_after_each(&self, listener: AfterEach<C, P, T>) -> ListenerId {
        let id = self.next_id(EventKind::AfterEach);
        self.after_each.write().push((id.id, listener));
        id
    }

    pub(crate) fn on_error(&self, listener: OnError<C, P, T>) -> ListenerId {
        let id = self.next_id(EventKind::Error);
        self.error.write().push((id.id, listener));
        id
    }

    pub(crate) fn off(&self, id: ListenerId) -> bool {
        match id.kind {
            EventKind::BeforeEach => remove(&self.before_each, id.id),
            EventKind::AfterEach => remove(&self.after_each, id.id),
            EventKind::Error => remove(&self.error, id.id),
        }
    }

    pub(crate) fn count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::BeforeEach => self.before_each.read().len(),
            EventKind::AfterEach => self.after_each.read().len(),
            EventKind::Error => self.error.read().len(),
        }
    }

    pub(crate) fn emit_before_each(
        &self,
        item: &WorkItem<C, P, T>,
        context: &Context<C>,
        owner: &Adapter<C, P, T>,
    ) {
        let listeners = snapshot(&self.before_each);
        trace!(
            event = %EventKind::BeforeEach,
            listeners = listeners.len(),
            item = item.name(),
            "emit"
        );

        for listener in listeners {
            guarded(EventKind::BeforeEach, || listener(item, context, owner));
        }
    }

    pub(crate) fn emit_after_each(&self, item: &WorkItem<C, P, T>, result: Result<&T, &Error>) {
        let listeners = snapshot(&self.after_each);
        trace!(
            event = %EventKind::AfterEach,
            listeners = listeners.len(),
            item = item.name(),
            "emit"
        );

        for listener in listeners {
            guarded(EventKind::AfterEach, || listener(item, result));
        }
    }

    pub(crate) fn emit_error(&self, error: &Error, item: &WorkItem<C, P, T>) {
        let listeners = snapshot(&self.error);
        trace!(
            event = %EventKind::Error,
            listeners = listeners.len(),
            item = item.name(),
            "emit"
        );

        for listener in listeners {
            guarded(EventKind::Error, || listener(error, item));
        }
    }
}

/// Run one listener. A panicking listener is logged and skipped, the remaining listeners and
/// the work item are not affected.
fn guarded(kind: EventKind, listener: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(listener)) {
        warn!(event = %kind, error = %Error::from_panic(payload), "listener panicked");
    }
}

fn snapshot<L: Clone>(listeners: &Listeners<L>) -> Vec<L> {
    listeners
        .read()
        .iter()
        .map(|(_, listener)| listener.clone())
        .collect()
}

fn remove<L>(listeners: &Listeners<L>, id: u64) -> bool {
    let mut listeners = listeners.write();
    let before = listeners.len();
    listeners.retain(|(listener_id, _)| *listener_id != id);

    listeners.len() != before
}
