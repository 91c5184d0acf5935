use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    context::Context,
    error::Error,
    events::{EventKind, Events, ListenerId},
    iterator::ItemIterator,
    options::{configure, Options, Settings},
    work_item::WorkItem,
};

type Registry = Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static GLOBALS: OnceLock<Registry> = OnceLock::new();

/// An `Adapter` holds the configuration and the listeners that iterators created from it share.
///
/// The adapter turns work items into the per-item function a batch driver expects. Options set on
/// construction are merged with the options passed to [`Adapter::make_iterator`], later values
/// win. Clones of an adapter share configuration and listeners.
///
/// # Example
/// ```rust
/// use batch_adapter::{Adapter, Error, Options, WorkItem};
/// use futures::{stream, StreamExt};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let adapter: Adapter<(), (), i32> = Adapter::new(Options::new().settle(true));
/// let iterator = adapter.make_iterator(Options::new());
///
/// let items: Vec<WorkItem<(), (), i32>> = vec![
///     WorkItem::sync("one", |_, _| Ok(1)),
///     WorkItem::sync("two", |_, _| Err(Error::msg("two err"))),
///     WorkItem::callback("three", |_, _, done| done.ok(3)),
/// ];
///
/// // a series driver
/// let slots: Vec<_> = stream::iter(items)
///     .then(|item| iterator.iterate(item))
///     .collect()
///     .await;
///
/// assert_eq!(slots[0].as_ref().unwrap().value(), Some(&1));
/// assert_eq!(slots[1].as_ref().unwrap().error().unwrap().to_string(), "two err");
/// assert_eq!(slots[2].as_ref().unwrap().value(), Some(&3));
/// # });
/// ```
pub struct Adapter<C, P, T> {
    inner: Arc<Inner<C, P, T>>,
}

struct Inner<C, P, T> {
    settings: Mutex<Settings<C, P, T>>,
    events: Events<C, P, T>,
}

impl<C, P, T> Adapter<C, P, T>
where
    C: Default + Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    /// Create an adapter. Listeners passed in `options` are subscribed right away.
    pub fn new(mut options: Options<C, P, T>) -> Self {
        let events = Events::new();
        subscribe_hooks(&events, &mut options);

        let settings = configure(Options::new().settle(false), Options::new(), options);

        Self {
            inner: Arc::new(Inner {
                settings: Mutex::new(settings),
                events,
            }),
        }
    }

    /// The shared adapter for this combination of context, param and result types.
    ///
    /// It is created with default options on first use, every later call returns a clone of it.
    ///
    /// ```rust
    /// use batch_adapter::{Adapter, Options};
    ///
    /// let adapter = Adapter::<(), (), i32>::global();
    /// adapter.set_options(Options::new().settle(true));
    ///
    /// assert!(Adapter::<(), (), i32>::global().settings().settle);
    /// ```
    pub fn global() -> Self {
        let registry = GLOBALS.get_or_init(Registry::default);
        let mut adapters = registry.lock();
        let key = TypeId::of::<Self>();

        if let Some(adapter) = adapters.get(&key).and_then(|a| a.downcast_ref::<Self>()) {
            return adapter.clone();
        }

        let adapter = Self::default();
        adapters.insert(key, Box::new(adapter.clone()));
        adapter
    }

    /// Merge `options` over the stored configuration and keep the result. Listeners in `options`
    /// are subscribed.
    pub fn set_options(&self, mut options: Options<C, P, T>) -> Settings<C, P, T> {
        subscribe_hooks(&self.inner.events, &mut options);

        let mut current = self.inner.settings.lock();
        let merged = configure(Options::new(), current.clone().into(), options);
        *current = merged.clone();

        merged
    }

    /// Create the per-item function for a batch driver.
    ///
    /// `options` are merged over the stored configuration, not just over the defaults, and the
    /// merged configuration is kept for later calls. The returned iterator works on a snapshot of
    /// it: creating another iterator does not change the settings of this one, but both share
    /// the context handle unless a new context is passed.
    pub fn make_iterator(&self, options: Options<C, P, T>) -> ItemIterator<C, P, T> {
        let settings = self.set_options(options);

        debug!(
            settle = settings.settle,
            params = settings.params.len(),
            custom_invoke = settings.invoke.is_some(),
            "iterator created"
        );

        ItemIterator::new(self.clone(), settings)
    }
}

impl<C, P, T> Adapter<C, P, T> {
    pub fn on_before_each<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&WorkItem<C, P, T>, &Context<C>, &Adapter<C, P, T>) + Send + Sync + 'static,
    {
        self.inner.events.on_before_each(Arc::new(listener))
    }

    pub fn on_after_each<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&WorkItem<C, P, T>, Result<&T, &Error>) + Send + Sync + 'static,
    {
        self.inner.events.on_after_each(Arc::new(listener))
    }

    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Error, &WorkItem<C, P, T>) + Send + Sync + 'static,
    {
        self.inner.events.on_error(Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.events.count(kind)
    }

    /// A snapshot of the stored configuration.
    pub fn settings(&self) -> Settings<C, P, T> {
        self.inner.settings.lock().clone()
    }

    /// The context handle of the stored configuration.
    pub fn context(&self) -> Context<C> {
        self.inner.settings.lock().context.clone()
    }

    pub(crate) fn events(&self) -> &Events<C, P, T> {
        &self.inner.events
    }
}

fn subscribe_hooks<C, P, T>(events: &Events<C, P, T>, options: &mut Options<C, P, T>) {
    if let Some(listener) = options.before_each.take() {
        events.on_before_each(listener);
    }
    if let Some(listener) = options.after_each.take() {
        events.on_after_each(listener);
    }
    if let Some(listener) = options.on_error.take() {
        events.on_error(listener);
    }
}

impl<C, P, T> Default for Adapter<C, P, T>
where
    C: Default + Send + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new(Options::new())
    }
}

impl<C, P, T> Clone for Adapter<C, P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, P, T> fmt::Debug for Adapter<C, P, T>
where
    C: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("settings", &*self.inner.settings.lock())
            .field("before_each", &self.listener_count(EventKind::BeforeEach))
            .field("after_each", &self.listener_count(EventKind::AfterEach))
            .field("error", &self.listener_count(EventKind::Error))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_resolves_defaults() {
        let adapter = Adapter::<Vec<i32>, i32, i32>::default();
        let settings = adapter.settings();

        assert!(!settings.settle);
        assert!(settings.params.is_empty());
        assert!(settings.context.snapshot().is_empty());
    }

    #[test]
    fn new_subscribes_hooks() {
        let adapter = Adapter::<(), (), i32>::new(
            Options::new()
                .before_each(|_, _, _| {})
                .after_each(|_, _| {})
                .on_error(|_, _| {}),
        );

        assert_eq!(adapter.listener_count(EventKind::BeforeEach), 1);
        assert_eq!(adapter.listener_count(EventKind::AfterEach), 1);
        assert_eq!(adapter.listener_count(EventKind::Error), 1);
    }

    #[test]
    fn make_iterator_merges_over_stored_options() {
        let adapter = Adapter::<(), &'static str, i32>::new(Options::new().settle(true));

        let iterator = adapter.make_iterator(Options::new().params(vec!["a"]));

        assert!(iterator.settings().settle);
        assert_eq!(&*iterator.settings().params, &["a"]);

        // the merged options are kept
        let settings = adapter.settings();
        assert!(settings.settle);
        assert_eq!(&*settings.params, &["a"]);
    }

    #[test]
    fn iterators_keep_their_snapshot() {
        let adapter = Adapter::<(), i32, i32>::default();

        let first = adapter.make_iterator(Options::new().settle(true));
        let second = adapter.make_iterator(Options::new().params(vec![1, 2]));
        let third = adapter.make_iterator(Options::new().settle(false));

        assert!(first.settings().settle);
        assert!(first.settings().params.is_empty());

        assert!(second.settings().settle);
        assert_eq!(&*second.settings().params, &[1, 2]);

        assert!(!third.settings().settle);
        assert!(first.context().ptr_eq(third.context()));
    }

    #[test]
    fn make_iterator_subscribes_hooks_once_per_call() {
        let adapter = Adapter::<(), (), i32>::default();

        adapter.make_iterator(Options::new().before_each(|_, _, _| {}));
        adapter.make_iterator(Options::new().after_each(|_, _| {}));

        assert_eq!(adapter.listener_count(EventKind::BeforeEach), 1);
        assert_eq!(adapter.listener_count(EventKind::AfterEach), 1);

        adapter.make_iterator(Options::new());
        assert_eq!(adapter.listener_count(EventKind::BeforeEach), 1);
    }

    #[test]
    fn off_removes_listener() {
        let adapter = Adapter::<(), (), i32>::default();
        let id = adapter.on_error(|_, _| {});

        assert_eq!(adapter.listener_count(EventKind::Error), 1);
        assert!(adapter.off(id));
        assert_eq!(adapter.listener_count(EventKind::Error), 0);
    }

    #[test]
    fn global_is_shared_per_type() {
        struct Marker;

        let first = Adapter::<(), Arc<Marker>, u8>::global();
        let second = Adapter::<(), Arc<Marker>, u8>::global();
        first.on_error(|_, _| {});

        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert_eq!(second.listener_count(EventKind::Error), 1);

        let other = Adapter::<(), Arc<Marker>, u16>::global();
        assert_eq!(other.listener_count(EventKind::Error), 0);
    }

    #[test]
    fn context_is_replaced_wholesale() {
        let adapter = Adapter::<Vec<i32>, (), ()>::new(Options::new().context(vec![1, 2]));
        let before = adapter.context();

        adapter.set_options(Options::new().context(vec![3]));

        assert_eq!(before.snapshot(), vec![1, 2]);
        assert_eq!(adapter.context().snapshot(), vec![3]);
    }
}
